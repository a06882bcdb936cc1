use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        course::{Course, CourseModeration},
        pagination::{Page, Pagination},
        user::{Role, UserProfile},
    },
    repositories::{course as course_repo, user as user_repo},
    services::courses::{self, CoursePage},
    state::AppState,
};

/// How many recent users and courses the dashboard shows.
const RECENT_ITEMS: i64 = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_users: i64,
    pub total_courses: i64,
    pub total_instructors: i64,
    pub total_students: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: Stats,
    pub recent_users: Vec<UserProfile>,
    pub recent_courses: Vec<Course>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<UserProfile>,
    pub pagination: Pagination,
}

/// Maps the `status` query value to a publication filter.
///
/// Absent or empty means every course. `published` selects published
/// courses and any other value selects unpublished ones.
pub fn status_filter(status: Option<&str>) -> Option<bool> {
    status.filter(|s| !s.is_empty()).map(|s| s == "published")
}

pub async fn dashboard(state: &AppState) -> Result<Dashboard> {
    let db = &state.db;
    let (total_users, total_courses, total_instructors, total_students, recent_users, recent_courses) = tokio::try_join!(
        user_repo::count(db, None),
        course_repo::count(db),
        user_repo::count(db, Some(Role::Instructor)),
        user_repo::count(db, Some(Role::Student)),
        user_repo::recent(db, RECENT_ITEMS),
        course_repo::recent(db, RECENT_ITEMS),
    )?;

    Ok(Dashboard {
        stats: Stats {
            total_users,
            total_courses,
            total_instructors,
            total_students,
        },
        recent_users: recent_users.into_iter().map(UserProfile::from).collect(),
        recent_courses,
    })
}

pub async fn list_users(state: &AppState, role: Option<Role>, page: Page) -> Result<UserPage> {
    let (users, total) = tokio::try_join!(
        user_repo::list(&state.db, role, page),
        user_repo::count(&state.db, role),
    )?;
    Ok(UserPage {
        users: users.into_iter().map(UserProfile::from).collect(),
        pagination: Pagination::new(page, total),
    })
}

pub async fn update_user(
    state: &AppState,
    user_id: Uuid,
    name: Option<String>,
    role: Option<Role>,
    avatar: Option<String>,
) -> Result<UserProfile> {
    let user = user_repo::admin_update(
        &state.db,
        &user_id,
        name.as_deref().map(str::trim),
        role,
        avatar.as_deref(),
    )
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!("🛠️ Admin updated user {}", user_id);
    Ok(user.into())
}

/// Deletes the account. Courses it taught go with it through the foreign
/// key, so every course it touched is dropped from the cache afterwards.
pub async fn delete_user(state: &AppState, user_id: Uuid) -> Result<()> {
    let touched = course_repo::ids_touching_user(&state.db, &user_id).await?;
    if !user_repo::delete_user(&state.db, &user_id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    for course_id in &touched {
        courses::invalidate(state, *course_id).await;
    }
    crate::services::otp::clear_session_keys(state, user_id).await?;
    tracing::info!(
        "🗑️ Admin deleted user {} ({} cached course(s) invalidated)",
        user_id,
        touched.len()
    );
    Ok(())
}

pub async fn list_courses(state: &AppState, status: Option<&str>, page: Page) -> Result<CoursePage> {
    let (courses, total) = course_repo::list_all(&state.db, status_filter(status), page).await?;
    Ok(CoursePage {
        courses,
        pagination: Pagination::new(page, total),
    })
}

pub async fn moderate_course(
    state: &AppState,
    course_id: Uuid,
    moderation: CourseModeration,
) -> Result<Course> {
    let course = course_repo::moderate(&state.db, &course_id, &moderation)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

    courses::invalidate(state, course_id).await;
    tracing::info!("🛠️ Admin moderated course {}", course_id);
    Ok(course)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_follows_the_query_value() {
        assert_eq!(status_filter(None), None);
        assert_eq!(status_filter(Some("published")), Some(true));
        assert_eq!(status_filter(Some("draft")), Some(false));
        assert_eq!(status_filter(Some("")), None);
    }
}
