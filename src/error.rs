use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tokio_postgres::error::SqlState;

/// A single failed validation rule, reported back to the client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    /// The dotted path of the offending field (`body.email`, `milestones[0].title`).
    pub path: String,
    /// A human readable description of the failure.
    pub message: String,
}

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection could not be taken from the pool.
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The pool could not be built.
    #[error("Database pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Outbound mail could not be built or delivered.
    #[error("Mail error: {0}")]
    Mail(String),

    /// The managed media store rejected or failed an upload.
    #[error("Media store error: {0}")]
    Media(String),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The caller is authenticated but its role is not allowed.
    #[error("Access denied")]
    Forbidden,

    /// A resource not found error.
    #[error("{0}")]
    NotFound(String),

    /// A request that is well-formed but not acceptable in the current state.
    #[error("{0}")]
    BadRequest(String),

    /// A multipart body could not be read.
    #[error("Multipart error: {0}")]
    Multipart(String),

    /// A validation error with per-field details.
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// A row was missing an expected column.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// A cached or outgoing value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// A request body was larger than the handler accepts.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// An optional integration was required but is not configured.
    #[error("{0}")]
    NotConfigured(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Shorthand for a 404 with the generic store message.
    pub fn resource_not_found() -> Self {
        AppError::NotFound("Resource not found".to_string())
    }

    /// Builds a single-field validation error.
    pub fn invalid_field(path: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError {
            path: path.into(),
            message: message.into(),
        }])
    }

    /// Resolves the status code and client-facing message, logging the cause.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Database(e) => {
                let (status, message) = map_sql_state(e.code());
                if status.is_server_error() {
                    tracing::error!("Database error: {}", e);
                } else {
                    tracing::debug!("Database constraint error: {}", e);
                }
                (status, message.to_string())
            }

            AppError::Pool(e) => {
                tracing::error!("Database pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }

            AppError::CreatePool(e) => {
                tracing::error!("Database pool creation error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }

            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }

            AppError::Mail(msg) => {
                tracing::error!("Mail error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to send email".to_string())
            }

            AppError::Media(msg) => {
                tracing::error!("Media store error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Upload failed".to_string())
            }

            AppError::Authentication(msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Forbidden => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "Access denied".to_string())
            }

            AppError::NotFound(msg) => {
                tracing::debug!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, msg.clone())
            }

            AppError::BadRequest(msg) => {
                tracing::debug!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Multipart(msg) => {
                tracing::warn!("Multipart error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Validation(details) => {
                tracing::debug!("Validation failed: {} field(s)", details.len());
                (StatusCode::BAD_REQUEST, "Validation failed".to_string())
            }

            AppError::MissingData(column) => {
                tracing::error!("Missing column in row: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }

            AppError::Serialization(msg) => {
                tracing::error!("Serialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }

            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }

            AppError::RateLimitExceeded(msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, msg.clone())
            }

            AppError::PayloadTooLarge(msg) => {
                tracing::warn!("Payload too large: {}", msg);
                (StatusCode::PAYLOAD_TOO_LARGE, msg.clone())
            }

            AppError::NotConfigured(msg) => {
                tracing::error!("Not configured: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        }
    }
}

/// Maps a PostgreSQL error code to the fixed client response.
///
/// Constraint violations are the client's fault; malformed identifiers are
/// reported as missing resources. Anything else is an opaque 500.
pub fn map_sql_state(code: Option<&SqlState>) -> (StatusCode, &'static str) {
    match code {
        Some(c) if *c == SqlState::UNIQUE_VIOLATION => {
            (StatusCode::BAD_REQUEST, "Duplicate field value entered")
        }
        Some(c) if *c == SqlState::CHECK_VIOLATION || *c == SqlState::NOT_NULL_VIOLATION => {
            (StatusCode::BAD_REQUEST, "Validation Error")
        }
        Some(c) if *c == SqlState::INVALID_TEXT_REPRESENTATION => {
            (StatusCode::NOT_FOUND, "Resource not found")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [FieldError]>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        let details = match &self {
            AppError::Validation(details) => Some(details.as_slice()),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            message: &message,
            details,
        };

        crate::response::json(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn sql_states_map_to_fixed_responses() {
        assert_eq!(
            map_sql_state(Some(&SqlState::UNIQUE_VIOLATION)),
            (StatusCode::BAD_REQUEST, "Duplicate field value entered")
        );
        assert_eq!(
            map_sql_state(Some(&SqlState::CHECK_VIOLATION)).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            map_sql_state(Some(&SqlState::NOT_NULL_VIOLATION)).1,
            "Validation Error"
        );
        assert_eq!(
            map_sql_state(Some(&SqlState::INVALID_TEXT_REPRESENTATION)),
            (StatusCode::NOT_FOUND, "Resource not found")
        );
        assert_eq!(
            map_sql_state(Some(&SqlState::T_R_DEADLOCK_DETECTED)).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(map_sql_state(None).0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn validation_errors_carry_details() {
        let response = AppError::invalid_field("email", "not a valid email address").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_of(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["details"][0]["path"], "email");
    }

    #[tokio::test]
    async fn internal_errors_hide_their_cause() {
        let response = AppError::Internal("secret connection string".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_of(response).await;
        assert_eq!(body["message"], "Internal Server Error");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn missing_integrations_are_named() {
        let response =
            AppError::NotConfigured("Upload service not configured".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_of(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Upload service not configured");
    }

    #[test]
    fn client_errors_keep_their_status() {
        let cases = [
            (AppError::Authentication("Invalid credentials".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (AppError::resource_not_found(), StatusCode::NOT_FOUND),
            (AppError::BadRequest("Already enrolled in this course".into()), StatusCode::BAD_REQUEST),
            (AppError::RateLimitExceeded("slow down".into()), StatusCode::TOO_MANY_REQUESTS),
            (AppError::PayloadTooLarge("Request body too large".into()), StatusCode::PAYLOAD_TOO_LARGE),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
