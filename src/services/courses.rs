use serde::Serialize;
use uuid::Uuid;

use crate::{
    cache,
    error::{AppError, Result},
    models::{
        course::{insert_milestone, Course, CourseChanges, CourseDetail, Milestone, NewCourse, Video},
        pagination::{Page, Pagination},
    },
    repositories::course::{self as course_repo, CourseFilter, EnrollOutcome},
    state::AppState,
};

/// A page of courses.
#[derive(Debug, Serialize)]
pub struct CoursePage {
    pub courses: Vec<Course>,
    pub pagination: Pagination,
}

/// Data for a new video. Order and id are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub duration: f64,
    pub thumbnail: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrolledEvent<'a> {
    course_id: Uuid,
    title: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentEnrolledEvent {
    course_id: Uuid,
    student_id: Uuid,
    total_students: usize,
}

pub fn cache_key(course_id: Uuid) -> String {
    format!("course:{}", course_id)
}

/// Drops the cached detail. Failure only means a stale read until the TTL.
pub async fn invalidate(state: &AppState, course_id: Uuid) {
    let mut redis = state.redis.clone();
    if let Err(e) = cache::delete(&mut redis, &[cache_key(course_id)]).await {
        tracing::warn!("Could not invalidate cache for course {}: {}", course_id, e);
    }
}

/// Owner-scoped queries match nothing for a missing course and for a course
/// someone else teaches alike. Both read as the same 404.
fn owned<T>(found: Option<T>) -> Result<T> {
    found.ok_or_else(|| AppError::NotFound("Course not found or access denied".to_string()))
}

fn enrollment_result(outcome: EnrollOutcome) -> Result<Course> {
    match outcome {
        EnrollOutcome::Enrolled(course) => Ok(course),
        EnrollOutcome::AlreadyEnrolled => {
            Err(AppError::BadRequest("Already enrolled in this course".to_string()))
        }
        EnrollOutcome::NotFound => Err(AppError::NotFound("Course not found".to_string())),
    }
}

pub async fn create_course(state: &AppState, instructor_id: Uuid, course: NewCourse) -> Result<Course> {
    let course = course_repo::create_course(&state.db, &instructor_id, &course).await?;
    tracing::info!("✅ Course created: {} by {}", course.id, instructor_id);
    Ok(course)
}

/// Read-through lookup of the course detail.
///
/// Cache failures fall back to the database.
pub async fn get_course(state: &AppState, course_id: Uuid) -> Result<CourseDetail> {
    let key = cache_key(course_id);
    let mut redis = state.redis.clone();

    match cache::get_json::<CourseDetail>(&mut redis, &key).await {
        Ok(Some(course)) => {
            tracing::debug!("📦 Cache hit for {}", key);
            return Ok(course);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Course cache read failed for {}: {}", key, e),
    }

    let course = course_repo::find_by_id(&state.db, &course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;
    let students = course_repo::student_summaries(&state.db, &course.students_enrolled).await?;
    let detail = course.with_students(students);

    if let Err(e) =
        cache::set_json_ex(&mut redis, &key, &detail, state.config.course_cache_ttl_secs).await
    {
        tracing::warn!("Course cache write failed for {}: {}", key, e);
    }

    Ok(detail)
}

pub async fn list_published(state: &AppState, filter: CourseFilter, page: Page) -> Result<CoursePage> {
    let (courses, total) = course_repo::list_published(&state.db, &filter, page).await?;
    Ok(CoursePage {
        courses,
        pagination: Pagination::new(page, total),
    })
}

pub async fn my_courses(state: &AppState, student_id: Uuid, page: Page) -> Result<CoursePage> {
    let (courses, total) = course_repo::list_enrolled(&state.db, &student_id, page).await?;
    Ok(CoursePage {
        courses,
        pagination: Pagination::new(page, total),
    })
}

/// Updates a course the caller owns and tells everyone watching it.
pub async fn update_course(
    state: &AppState,
    course_id: Uuid,
    owner_id: Uuid,
    changes: CourseChanges,
) -> Result<Course> {
    let course = owned(course_repo::update_owned(&state.db, &course_id, &owner_id, &changes).await?)?;

    invalidate(state, course_id).await;
    state
        .notifications
        .emit_to_course(course_id, "course-updated", &course);

    Ok(course)
}

pub async fn delete_course(state: &AppState, course_id: Uuid, owner_id: Uuid) -> Result<()> {
    let removed = course_repo::delete_owned(&state.db, &course_id, &owner_id).await?;
    owned(removed.then_some(()))?;
    invalidate(state, course_id).await;
    tracing::info!("🗑️ Course deleted: {}", course_id);
    Ok(())
}

/// Enrolls a student once. A second attempt is rejected.
pub async fn enroll(state: &AppState, course_id: Uuid, student_id: Uuid) -> Result<Course> {
    let course = enrollment_result(course_repo::enroll(&state.db, &course_id, &student_id).await?)?;

    invalidate(state, course_id).await;

    let hub = &state.notifications;
    hub.emit_to_user(
        student_id,
        "enrolled",
        &EnrolledEvent {
            course_id,
            title: &course.title,
        },
    );
    hub.emit_to_course(
        course_id,
        "student-enrolled",
        &StudentEnrolledEvent {
            course_id,
            student_id,
            total_students: course.students_enrolled.len(),
        },
    );

    tracing::info!("🎓 Student {} enrolled in {}", student_id, course_id);
    Ok(course)
}

/// Adds a milestone to an owned course, keeping milestones ordered.
pub async fn add_milestone(
    state: &AppState,
    course_id: Uuid,
    owner_id: Uuid,
    milestone: Milestone,
) -> Result<(Course, Milestone)> {
    let edited = course_repo::edit_milestones(&state.db, &course_id, &owner_id, |milestones| {
        insert_milestone(milestones, milestone.clone());
        Ok(milestone)
    })
    .await?;
    let (course, milestone) = owned(edited)?;

    invalidate(state, course_id).await;
    state
        .notifications
        .emit_to_course(course_id, "course-updated", &course);

    Ok((course, milestone))
}

/// Appends a video to a milestone of an owned course.
pub async fn add_video(
    state: &AppState,
    course_id: Uuid,
    owner_id: Uuid,
    milestone_id: Uuid,
    video: NewVideo,
) -> Result<(Course, Video)> {
    let edited = course_repo::edit_milestones(&state.db, &course_id, &owner_id, |milestones| {
        let milestone = milestones
            .iter_mut()
            .find(|m| m.id == milestone_id)
            .ok_or_else(|| AppError::NotFound("Milestone not found".to_string()))?;

        let video = Video {
            id: Uuid::new_v4(),
            title: video.title,
            description: video.description,
            url: video.url,
            duration: video.duration,
            thumbnail: video.thumbnail,
            is_published: false,
            order: milestone.next_video_order(),
        };
        milestone.videos.push(video.clone());
        Ok(video)
    })
    .await?;
    let (course, video) = owned(edited)?;

    invalidate(state, course_id).await;
    state
        .notifications
        .emit_to_course(course_id, "course-updated", &course);

    Ok((course, video))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};
    use chrono::Utc;

    use crate::models::{course::Level, user::UserSummary};

    fn course(students: Vec<Uuid>) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            title: "Rust for Backend Developers".to_string(),
            description: "From ownership to production web services.".to_string(),
            instructor: UserSummary {
                id: Uuid::new_v4(),
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                avatar: None,
            },
            price: 200.0,
            discount: 25.0,
            discounted_price: 150.0,
            category: "programming".to_string(),
            level: Level::Intermediate,
            thumbnail: None,
            milestones: Vec::new(),
            students_enrolled: students,
            rating: 0.0,
            total_reviews: 0,
            is_published: true,
            featured: false,
            requirements: Vec::new(),
            learning_outcomes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn foreign_courses_read_as_not_found_or_denied() {
        let err = owned::<Course>(None).unwrap_err();
        assert!(
            matches!(&err, AppError::NotFound(msg) if msg == "Course not found or access denied"),
            "{:?}",
            err
        );
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let mine = course(Vec::new());
        let id = mine.id;
        assert_eq!(owned(Some(mine)).unwrap().id, id);
    }

    #[test]
    fn a_second_enrollment_is_a_bad_request() {
        let student = Uuid::new_v4();
        let enrolled = enrollment_result(EnrollOutcome::Enrolled(course(vec![student]))).unwrap();
        assert_eq!(enrolled.students_enrolled, vec![student]);

        let again = enrollment_result(EnrollOutcome::AlreadyEnrolled).unwrap_err();
        assert!(
            matches!(&again, AppError::BadRequest(msg) if msg == "Already enrolled in this course")
        );
        assert_eq!(again.into_response().status(), StatusCode::BAD_REQUEST);

        let missing = enrollment_result(EnrollOutcome::NotFound).unwrap_err();
        assert!(matches!(&missing, AppError::NotFound(msg) if msg == "Course not found"));
    }
}
