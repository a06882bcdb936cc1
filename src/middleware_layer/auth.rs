use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
    Extension,
};
use tower_cookies::Cookies;

use crate::{
    crypto::tokens::TokenKind,
    error::{AppError, Result},
    models::{session::AuthUser, user::Role},
    repositories::user as user_repo,
    state::AppState,
};

/// Name of the cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "accessToken";
/// Name of the cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Extracts the access token: cookie first, then `Authorization: Bearer`.
fn extract_access_token(cookies: &Cookies, headers: &HeaderMap) -> Option<String> {
    cookies
        .get(ACCESS_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Verifies an access token and returns the caller it names.
pub fn authenticate(state: &AppState, token: &str) -> Result<AuthUser> {
    let claims = state
        .tokens
        .verify(TokenKind::Access, token)
        .map_err(|e| {
            tracing::warn!("❌ Rejected access token: {}", e);
            AppError::Authentication("Invalid access token".to_string())
        })?;
    Ok(AuthUser {
        id: claims.sub,
        role: claims.role,
    })
}

/// A middleware that requires a valid access token.
///
/// Inserts the [`AuthUser`] into the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    tracing::debug!("🔐 Checking authentication...");

    let token = extract_access_token(&cookies, request.headers())
        .ok_or_else(|| AppError::Authentication("Access token required".to_string()))?;
    let user = authenticate(&state, &token)?;

    tracing::debug!("✅ User authenticated: {}", user.id);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Fails with 403 unless `user` holds one of `allowed`.
pub fn authorize(user: &AuthUser, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        tracing::warn!("❌ Role {} not in {:?} for user {}", user.role.as_str(), allowed, user.id);
        Err(AppError::Forbidden)
    }
}

/// Replaces the role carried by the token with the one on record.
///
/// A deleted account is no longer authenticated.
pub fn current_user(user: &AuthUser, stored_role: Option<Role>) -> Result<AuthUser> {
    let role = stored_role
        .ok_or_else(|| AppError::Authentication("User no longer exists".to_string()))?;
    if role != user.role {
        tracing::warn!(
            "⚠️ Token role {} is stale for user {}, now {}",
            user.role.as_str(),
            user.id,
            role.as_str()
        );
    }
    Ok(AuthUser { id: user.id, role })
}

/// Route layers for the role sets the API uses. Must run after
/// [`require_auth`].
///
/// The admin gate checks the role on record rather than the one in the
/// token, so a demotion or deletion takes effect immediately.
pub async fn require_admin(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let stored = user_repo::find_by_id(&state.db, &user.id).await?;
    let user = current_user(&user, stored.map(|u| u.role))?;
    authorize(&user, &[Role::Admin])?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn require_instructor(
    Extension(user): Extension<AuthUser>,
    request: Request<Body>,
    next: Next,
) -> Result<Response> {
    authorize(&user, &[Role::Instructor, Role::Admin])?;
    Ok(next.run(request).await)
}

pub async fn require_student(
    Extension(user): Extension<AuthUser>,
    request: Request<Body>,
    next: Next,
) -> Result<Response> {
    authorize(&user, &[Role::Student])?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use axum::{routing::get, Router};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn roles_outside_the_list_are_forbidden() {
        assert!(authorize(&user(Role::Admin), &[Role::Instructor, Role::Admin]).is_ok());
        assert!(authorize(&user(Role::Instructor), &[Role::Instructor, Role::Admin]).is_ok());
        assert!(matches!(
            authorize(&user(Role::Student), &[Role::Instructor, Role::Admin]),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            authorize(&user(Role::Admin), &[Role::Student]),
            Err(AppError::Forbidden)
        ));
    }

    async fn gated_status(gate: Router, role: Role) -> StatusCode {
        let app = gate.layer(Extension(user(role)));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    fn gate<F, Fut>(layer: F) -> Router
    where
        F: Fn(Extension<AuthUser>, Request<Body>, Next) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Response>> + Send + 'static,
    {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn(layer))
    }

    #[tokio::test]
    async fn role_gates_answer_403_for_other_roles() {
        assert_eq!(gated_status(gate(require_instructor), Role::Admin).await, StatusCode::OK);
        assert_eq!(gated_status(gate(require_instructor), Role::Student).await, StatusCode::FORBIDDEN);
        assert_eq!(gated_status(gate(require_student), Role::Student).await, StatusCode::OK);
        assert_eq!(gated_status(gate(require_student), Role::Instructor).await, StatusCode::FORBIDDEN);
    }

    #[test]
    fn demoted_admins_lose_access_at_once() {
        let token_user = user(Role::Admin);

        let demoted = current_user(&token_user, Some(Role::Student)).unwrap();
        assert_eq!(demoted.id, token_user.id);
        assert!(matches!(authorize(&demoted, &[Role::Admin]), Err(AppError::Forbidden)));

        let still_admin = current_user(&token_user, Some(Role::Admin)).unwrap();
        assert!(authorize(&still_admin, &[Role::Admin]).is_ok());
    }

    #[test]
    fn deleted_accounts_are_unauthenticated() {
        let err = current_user(&user(Role::Admin), None).unwrap_err();
        assert!(matches!(&err, AppError::Authentication(msg) if msg == "User no longer exists"));
    }

    #[test]
    fn bearer_tokens_are_read_from_the_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
