use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        course::{Course, Level, Milestone, Video},
        pagination::{Page, PageQuery},
        session::AuthUser,
    },
    repositories::course::CourseFilter,
    response,
    services::courses as course_service,
    state::AppState,
    validation::{
        course::{AddVideoRequest, CreateCourseRequest, CreateMilestoneRequest, UpdateCourseRequest},
        extract::ValidatedJson,
    },
};

#[derive(Debug, Default, Deserialize)]
pub struct ListCoursesQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub category: Option<String>,
    pub level: Option<String>,
    pub instructor: Option<String>,
}

impl ListCoursesQuery {
    /// Resolves the filters. Empty values are ignored; unknown levels and
    /// malformed instructor ids are rejected.
    fn filter(&self) -> Result<CourseFilter> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let level = present(&self.level)
            .map(|raw| raw.parse::<Level>())
            .transpose()
            .map_err(|e| AppError::invalid_field("level", e))?;

        let instructor = present(&self.instructor)
            .map(|raw| Uuid::parse_str(&raw))
            .transpose()
            .map_err(|_| AppError::invalid_field("instructor", "must be a valid id"))?;

        Ok(CourseFilter {
            category: present(&self.category),
            level,
            instructor,
        })
    }
}

#[derive(Serialize)]
struct CourseData<T> {
    course: T,
}

#[derive(Serialize)]
struct MilestoneData {
    course: Course,
    milestone: Milestone,
}

#[derive(Serialize)]
struct VideoData {
    course: Course,
    video: Video,
}

/// Parses a path id. Anything that is not a UUID names no resource.
pub fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::resource_not_found())
}

pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListCoursesQuery>,
) -> Result<Response> {
    let filter = query.filter()?;
    let page = Page::from(&query.page);
    tracing::debug!("📚 Listing courses: {:?} {:?}", filter, page);

    let courses = course_service::list_published(&state, filter, page).await?;
    Ok(response::ok(courses))
}

pub async fn my_courses(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let courses = course_service::my_courses(&state, user.id, Page::from(&query)).await?;
    Ok(response::ok(courses))
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Response> {
    let course = course_service::get_course(&state, parse_id(&course_id)?).await?;
    Ok(response::ok(CourseData { course }))
}

#[axum::debug_handler]
pub async fn create_course(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(payload): ValidatedJson<CreateCourseRequest>,
) -> Result<Response> {
    let course = course_service::create_course(&state, user.id, payload.into()).await?;
    Ok(response::created(CourseData { course }))
}

pub async fn update_course(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateCourseRequest>,
) -> Result<Response> {
    let course =
        course_service::update_course(&state, parse_id(&course_id)?, user.id, payload.into())
            .await?;
    Ok(response::ok(CourseData { course }))
}

pub async fn delete_course(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<String>,
) -> Result<Response> {
    course_service::delete_course(&state, parse_id(&course_id)?, user.id).await?;
    Ok(response::message("Course deleted successfully"))
}

pub async fn enroll(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<String>,
) -> Result<Response> {
    let course = course_service::enroll(&state, parse_id(&course_id)?, user.id).await?;
    Ok(response::ok_with_message(
        "Enrolled in course successfully",
        CourseData { course },
    ))
}

pub async fn add_milestone(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<CreateMilestoneRequest>,
) -> Result<Response> {
    let (course, milestone) =
        course_service::add_milestone(&state, parse_id(&course_id)?, user.id, payload.into())
            .await?;
    Ok(response::created(MilestoneData { course, milestone }))
}

pub async fn add_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((course_id, milestone_id)): Path<(String, String)>,
    ValidatedJson(payload): ValidatedJson<AddVideoRequest>,
) -> Result<Response> {
    let (course, video) = course_service::add_video(
        &state,
        parse_id(&course_id)?,
        user.id,
        parse_id(&milestone_id)?,
        payload.into(),
    )
    .await?;
    Ok(response::created(VideoData { course, video }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(level: Option<&str>, instructor: Option<&str>) -> ListCoursesQuery {
        ListCoursesQuery {
            level: level.map(str::to_string),
            instructor: instructor.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn malformed_path_ids_are_not_found() {
        assert!(matches!(parse_id("not-a-uuid"), Err(AppError::NotFound(_))));
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn empty_filters_are_ignored() {
        let filter = query(Some(""), Some("  ")).filter().unwrap();
        assert_eq!(filter.level, None);
        assert_eq!(filter.instructor, None);
        assert_eq!(filter.category, None);
    }

    #[test]
    fn known_filters_are_parsed() {
        let id = Uuid::new_v4();
        let filter = query(Some("advanced"), Some(&id.to_string())).filter().unwrap();
        assert_eq!(filter.level, Some(Level::Advanced));
        assert_eq!(filter.instructor, Some(id));
    }

    #[test]
    fn bad_filters_are_validation_errors() {
        assert!(matches!(
            query(Some("expert"), None).filter(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            query(None, Some("abc")).filter(),
            Err(AppError::Validation(_))
        ));
    }
}
