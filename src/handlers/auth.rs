use axum::{
    body::Bytes,
    extract::State,
    response::Response,
    Extension,
};
use serde::Serialize;
use tower_cookies::cookie::time::Duration;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use crate::{
    crypto::tokens::TokenPair,
    error::{AppError, Result},
    middleware_layer::auth::{ACCESS_COOKIE, REFRESH_COOKIE},
    models::{session::AuthUser, user::UserProfile},
    response,
    services::auth as auth_service,
    state::AppState,
    validation::{
        auth::{
            ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest,
            RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, VerifyEmailRequest,
        },
        extract::ValidatedJson,
    },
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionData {
    user: UserProfile,
    /// Whether a verification code was emailed during this request.
    otp_sent: bool,
}

#[derive(Serialize)]
struct UserData {
    user: UserProfile,
}

/// Creates an HttpOnly, SameSite=Strict cookie scoped to the whole site.
fn create_secure_cookie(
    name: &'static str,
    value: String,
    max_age_secs: i64,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_max_age(Duration::seconds(max_age_secs.max(0)));
    cookie.set_path("/");
    cookie
}

/// Sets both token cookies. Each cookie lives as long as its token.
fn set_session_cookies(cookies: &Cookies, state: &AppState, tokens: &TokenPair) {
    let secure = state.config.is_production();
    let now = chrono::Utc::now();

    cookies.add(create_secure_cookie(
        ACCESS_COOKIE,
        tokens.access.token.clone(),
        (tokens.access.expires_at - now).num_seconds(),
        secure,
    ));
    cookies.add(create_secure_cookie(
        REFRESH_COOKIE,
        tokens.refresh.token.clone(),
        (tokens.refresh.expires_at - now).num_seconds(),
        secure,
    ));
}

fn clear_session_cookies(cookies: &Cookies) {
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        let mut cookie = Cookie::new(name, "");
        cookie.set_max_age(Duration::seconds(0));
        cookie.set_path("/");
        cookies.remove(cookie);
    }
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt for {}", payload.email);

    let outcome = auth_service::register(
        &state,
        payload.name,
        payload.email,
        payload.password,
        payload.role,
    )
    .await?;

    set_session_cookies(&cookies, &state, &outcome.tokens);
    tracing::info!("✅ User registered: {}", outcome.user.id);

    Ok(response::created(SessionData {
        user: outcome.user.into(),
        otp_sent: outcome.otp_sent,
    }))
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Response> {
    let outcome = auth_service::login(&state, payload.email, payload.password).await?;

    set_session_cookies(&cookies, &state, &outcome.tokens);
    tracing::info!("✅ User logged in: {}", outcome.user.id);

    Ok(response::ok(SessionData {
        user: outcome.user.into(),
        otp_sent: outcome.otp_sent,
    }))
}

/// Handles user logout.
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    cookies: Cookies,
) -> Result<Response> {
    auth_service::logout(&state, user.id).await?;
    clear_session_cookies(&cookies);
    Ok(response::message("Logged out successfully"))
}

/// Rotates the token pair. The refresh token comes from the cookie or,
/// failing that, from `{"refreshToken": "..."}` in the body.
pub async fn refresh_token(
    State(state): State<AppState>,
    cookies: Cookies,
    body: Bytes,
) -> Result<Response> {
    let presented = cookies
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| {
            sonic_rs::from_slice::<RefreshRequest>(&body)
                .ok()
                .and_then(|req| req.refresh_token)
        })
        .ok_or_else(|| AppError::Authentication("Refresh token required".to_string()))?;

    let (user, tokens) = match auth_service::refresh(&state, &presented).await {
        Ok(rotated) => rotated,
        Err(e @ AppError::Authentication(_)) => {
            clear_session_cookies(&cookies);
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    set_session_cookies(&cookies, &state, &tokens);
    Ok(response::ok_with_message(
        "Token refreshed successfully",
        UserData { user: user.into() },
    ))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(payload): ValidatedJson<VerifyEmailRequest>,
) -> Result<Response> {
    let user = auth_service::verify_email(&state, user.id, &payload.otp).await?;
    Ok(response::ok_with_message(
        "Email verified successfully",
        UserData { user: user.into() },
    ))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response> {
    auth_service::resend_otp(&state, user.id).await?;
    Ok(response::message("OTP sent to your email"))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ForgotPasswordRequest>,
) -> Result<Response> {
    auth_service::forgot_password(&state, &payload.email).await?;
    Ok(response::message(
        "If an account exists for this email, a reset code has been sent",
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    cookies: Cookies,
    ValidatedJson(payload): ValidatedJson<ResetPasswordRequest>,
) -> Result<Response> {
    auth_service::reset_password(&state, &payload.email, &payload.otp, payload.new_password)
        .await?;
    clear_session_cookies(&cookies);
    Ok(response::message("Password reset successfully"))
}

/// Handles password changes for the signed-in user.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(payload): ValidatedJson<ChangePasswordRequest>,
) -> Result<Response> {
    auth_service::change_password(
        &state,
        user.id,
        payload.current_password,
        payload.new_password,
    )
    .await?;
    Ok(response::message("Password changed successfully"))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response> {
    let user = auth_service::profile(&state, user.id).await?;
    Ok(response::ok(UserData { user: user.into() }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(payload): ValidatedJson<UpdateProfileRequest>,
) -> Result<Response> {
    let user = auth_service::update_profile(&state, user.id, payload.name, payload.avatar).await?;
    Ok(response::ok(UserData { user: user.into() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookies_are_locked_down() {
        let cookie = create_secure_cookie(ACCESS_COOKIE, "token".to_string(), 900, true);
        assert_eq!(cookie.name(), "accessToken");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(900)));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn development_cookies_are_not_secure_only() {
        let cookie = create_secure_cookie(REFRESH_COOKIE, "token".to_string(), -5, false);
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(0)));
    }
}
