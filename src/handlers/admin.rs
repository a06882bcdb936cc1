use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    handlers::courses::parse_id,
    models::{
        course::Course,
        pagination::{Page, PageQuery},
        user::{Role, UserProfile},
    },
    response,
    services::admin as admin_service,
    state::AppState,
    validation::{auth::UpdateUserRequest, course::ModerateCourseRequest, extract::ValidatedJson},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub role: Option<String>,
}

impl ListUsersQuery {
    fn role(&self) -> Result<Option<Role>> {
        self.role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::parse::<Role>)
            .transpose()
            .map_err(|e| AppError::invalid_field("role", e))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListCoursesQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub status: Option<String>,
}

#[derive(Serialize)]
struct UserData {
    user: UserProfile,
}

#[derive(Serialize)]
struct CourseData {
    course: Course,
}

pub async fn stats(State(state): State<AppState>) -> Result<Response> {
    let dashboard = admin_service::dashboard(&state).await?;
    Ok(response::ok(dashboard))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Response> {
    let role = query.role()?;
    let users = admin_service::list_users(&state, role, Page::from(&query.page)).await?;
    Ok(response::ok(users))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> Result<Response> {
    let user = admin_service::update_user(
        &state,
        parse_id(&user_id)?,
        payload.name,
        payload.role,
        payload.avatar,
    )
    .await?;
    Ok(response::ok(UserData { user }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response> {
    admin_service::delete_user(&state, parse_id(&user_id)?).await?;
    Ok(response::message("User deleted successfully"))
}

pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListCoursesQuery>,
) -> Result<Response> {
    let courses =
        admin_service::list_courses(&state, query.status.as_deref(), Page::from(&query.page))
            .await?;
    Ok(response::ok(courses))
}

pub async fn moderate_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<ModerateCourseRequest>,
) -> Result<Response> {
    let course =
        admin_service::moderate_course(&state, parse_id(&course_id)?, payload.into()).await?;
    Ok(response::ok(CourseData { course }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_query(role: Option<&str>) -> ListUsersQuery {
        ListUsersQuery {
            role: role.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn role_filter_accepts_known_roles_only() {
        assert_eq!(role_query(None).role().unwrap(), None);
        assert_eq!(role_query(Some("")).role().unwrap(), None);
        assert_eq!(role_query(Some("student")).role().unwrap(), Some(Role::Student));
        assert!(matches!(
            role_query(Some("superuser")).role(),
            Err(AppError::Validation(_))
        ));
    }
}
