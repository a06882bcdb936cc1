use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{response, state::AppState};

#[derive(Serialize)]
struct Health<'a> {
    status: &'static str,
    timestamp: DateTime<Utc>,
    /// Seconds since startup.
    uptime: f64,
    environment: &'a str,
}

#[derive(Serialize)]
struct NotFound {
    success: bool,
    message: String,
}

pub async fn health(State(state): State<AppState>) -> Response {
    response::json(
        StatusCode::OK,
        &Health {
            status: "OK",
            timestamp: Utc::now(),
            uptime: state.started_at.elapsed().as_secs_f64(),
            environment: &state.config.app_env,
        },
    )
}

pub async fn not_found(uri: Uri) -> Response {
    response::json(
        StatusCode::NOT_FOUND,
        &NotFound {
            success: false,
            message: format!("Not found - {}", uri.path()),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_routes_name_the_path() {
        let response = not_found("/api/v1/nowhere?x=1".parse().unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Not found - /api/v1/nowhere");
    }
}
