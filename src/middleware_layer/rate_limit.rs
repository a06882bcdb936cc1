//! Redis counters for the abuse-prone endpoints.
//!
//! Counters live under `rate_limit:{scope}:{subject}` and expire with their
//! window. Redis failures let the request through.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::aio::ConnectionManager;
use sonic_rs::JsonValueTrait;
use std::net::SocketAddr;

use crate::{
    error::AppError,
    models::session::AuthUser,
    services::auth::normalize_email,
    state::AppState,
};

/// Largest body read while looking for the email field.
const MAX_INSPECTED_BODY: usize = 64 * 1024;

/// One limiter: at most `max_attempts` counted requests per `window_secs`.
#[derive(Debug, Clone, Copy)]
pub struct Limit {
    pub scope: &'static str,
    pub max_attempts: i64,
    pub window_secs: i64,
    pub message: &'static str,
}

pub const REGISTER: Limit = Limit {
    scope: "register",
    max_attempts: 5,
    window_secs: 60 * 60,
    message: "Too many accounts created from this IP",
};

pub const LOGIN: Limit = Limit {
    scope: "login",
    max_attempts: 5,
    window_secs: 15 * 60,
    message: "Too many failed login attempts",
};

pub const OTP_REQUEST: Limit = Limit {
    scope: "otp_request",
    max_attempts: 3,
    window_secs: 15 * 60,
    message: "Too many OTP requests",
};

pub const OTP_VERIFY: Limit = Limit {
    scope: "otp_verify",
    max_attempts: 5,
    window_secs: 15 * 60,
    message: "Too many OTP attempts",
};

impl Limit {
    pub fn key(&self, subject: &str) -> String {
        format!("rate_limit:{}:{}", self.scope, subject)
    }

    /// The 429 returned while the window is closed.
    fn exceeded(&self, ttl_secs: i64) -> AppError {
        let minutes = ((ttl_secs.max(0) + 59) / 60).max(1);
        AppError::RateLimitExceeded(format!(
            "{}. Try again in {} minutes",
            self.message, minutes
        ))
    }
}

/// Extracts the real IP address from the request extensions.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reads `email` from a JSON body.
fn email_from_body(body: &[u8]) -> Option<String> {
    let json = sonic_rs::from_slice::<sonic_rs::Value>(body).ok()?;
    json.get("email")
        .and_then(|v| v.as_str())
        .map(normalize_email)
        .filter(|email| !email.is_empty())
}

/// Picks who a limiter counts against: the signed-in user, else the email
/// in the body, else the client IP. The body is put back untouched; a body
/// over [`MAX_INSPECTED_BODY`] is refused with a 413.
async fn subject_of(req: Request<Body>) -> Result<(Request<Body>, String), AppError> {
    if let Some(user) = req.extensions().get::<AuthUser>() {
        let subject = format!("user:{}", user.id);
        return Ok((req, subject));
    }

    let ip = extract_real_ip(&req);
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_INSPECTED_BODY)
        .await
        .map_err(|e| {
            tracing::debug!("Refusing body from {} before rate limiting: {}", ip, e);
            AppError::PayloadTooLarge("Request body too large".to_string())
        })?;

    let subject = email_from_body(&bytes)
        .map(|email| format!("email:{}", email))
        .unwrap_or_else(|| format!("ip:{}", ip));

    Ok((Request::from_parts(parts, Body::from(bytes)), subject))
}

/// Returns the remaining lockout when the counter is at its limit.
async fn locked_for(redis: &mut ConnectionManager, limit: &Limit, key: &str) -> Option<i64> {
    let count: Option<i64> = match redis::cmd("GET").arg(key).query_async(redis).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("Rate limit lookup failed for {}: {}", key, e);
            return None;
        }
    };

    if count.unwrap_or(0) < limit.max_attempts {
        return None;
    }

    let ttl: i64 = redis::cmd("TTL")
        .arg(key)
        .query_async(redis)
        .await
        .unwrap_or(limit.window_secs);
    Some(ttl)
}

/// Counts one attempt. The window starts with the first attempt.
async fn bump(redis: &mut ConnectionManager, limit: &Limit, key: &str) {
    let count: redis::RedisResult<i64> = redis::cmd("INCR").arg(key).query_async(redis).await;
    match count {
        Ok(1) => {
            let expired: redis::RedisResult<()> = redis::cmd("EXPIRE")
                .arg(key)
                .arg(limit.window_secs)
                .query_async(redis)
                .await;
            if let Err(e) = expired {
                tracing::warn!("Rate limit expiry failed for {}: {}", key, e);
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Rate limit increment failed for {}: {}", key, e),
    }
}

async fn clear(redis: &mut ConnectionManager, key: &str) {
    let cleared: redis::RedisResult<()> = redis::cmd("DEL").arg(key).query_async(redis).await;
    if let Err(e) = cleared {
        tracing::warn!("Rate limit reset failed for {}: {}", key, e);
    }
}

/// Counts every request against the subject.
async fn limit_every_attempt(state: AppState, limit: Limit, req: Request<Body>, next: Next) -> Response {
    let (req, subject) = match subject_of(req).await {
        Ok(inspected) => inspected,
        Err(e) => return e.into_response(),
    };
    let key = limit.key(&subject);
    let mut redis = state.redis.clone();

    if let Some(ttl) = locked_for(&mut redis, &limit, &key).await {
        return limit.exceeded(ttl).into_response();
    }
    bump(&mut redis, &limit, &key).await;

    next.run(req).await
}

/// Counts only rejected requests and resets the counter on success.
async fn limit_failures(state: AppState, limit: Limit, req: Request<Body>, next: Next) -> Response {
    let (req, subject) = match subject_of(req).await {
        Ok(inspected) => inspected,
        Err(e) => return e.into_response(),
    };
    let key = limit.key(&subject);
    let mut redis = state.redis.clone();

    if let Some(ttl) = locked_for(&mut redis, &limit, &key).await {
        return limit.exceeded(ttl).into_response();
    }

    let response = next.run(req).await;

    if response.status().is_client_error() {
        bump(&mut redis, &limit, &key).await;
    } else if response.status().is_success() {
        clear(&mut redis, &key).await;
    }

    response
}

/// A middleware that rate limits user registration per IP.
pub async fn rate_limit_register(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_real_ip(&req);
    let key = REGISTER.key(&ip);
    let mut redis = state.redis.clone();

    if let Some(ttl) = locked_for(&mut redis, &REGISTER, &key).await {
        return REGISTER.exceeded(ttl).into_response();
    }
    bump(&mut redis, &REGISTER, &key).await;

    next.run(req).await
}

/// A middleware that rate limits failed logins per email.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limit_failures(state, LOGIN, req, next).await
}

/// A middleware that rate limits OTP emails per user or email.
pub async fn rate_limit_otp_request(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limit_every_attempt(state, OTP_REQUEST, req, next).await
}

/// A middleware that rate limits wrong OTP guesses per user or email.
pub async fn rate_limit_otp_verify(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limit_failures(state, OTP_VERIFY, req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped() {
        assert_eq!(LOGIN.key("email:ada@example.com"), "rate_limit:login:email:ada@example.com");
        assert_ne!(OTP_REQUEST.key("user:1"), OTP_VERIFY.key("user:1"));
    }

    #[test]
    fn email_subject_is_normalized() {
        assert_eq!(
            email_from_body(br#"{"email":" Ada@Example.com ","password":"x"}"#).as_deref(),
            Some("ada@example.com")
        );
        assert_eq!(email_from_body(br#"{"password":"x"}"#), None);
        assert_eq!(email_from_body(b"not json"), None);
    }

    #[test]
    fn lockout_message_rounds_minutes_up() {
        match LOGIN.exceeded(61) {
            AppError::RateLimitExceeded(msg) => assert!(msg.ends_with("2 minutes"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
        match LOGIN.exceeded(-2) {
            AppError::RateLimitExceeded(msg) => assert!(msg.ends_with("1 minutes"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn signed_in_users_are_counted_by_id() {
        let id = uuid::Uuid::new_v4();
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut().insert(AuthUser {
            id,
            role: crate::models::user::Role::Student,
        });
        let (_, subject) = subject_of(req).await.unwrap();
        assert_eq!(subject, format!("user:{}", id));
    }

    #[tokio::test]
    async fn body_survives_inspection() {
        let req = Request::builder()
            .body(Body::from(r#"{"email":"ada@example.com"}"#))
            .unwrap();
        let (req, subject) = subject_of(req).await.unwrap();
        assert_eq!(subject, "email:ada@example.com");
        let bytes = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"email":"ada@example.com"}"#);
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused_not_emptied() {
        let padding = "x".repeat(MAX_INSPECTED_BODY + 1);
        let req = Request::builder()
            .body(Body::from(format!(r#"{{"email":"ada@example.com","pad":"{}"}}"#, padding)))
            .unwrap();

        let Err(err) = subject_of(req).await else {
            panic!("oversized body was accepted");
        };
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        assert_eq!(
            err.into_response().status(),
            axum::http::StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[tokio::test]
    async fn bodies_without_email_fall_back_to_ip() {
        let req = Request::builder().body(Body::from("{}")).unwrap();
        let (req, subject) = subject_of(req).await.unwrap();
        assert_eq!(subject, "ip:unknown");
        let bytes = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"{}");
    }
}
