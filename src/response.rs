use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The success envelope shared by every JSON endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Serializes `body` with sonic-rs and tags it as JSON.
pub fn json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response {
    match sonic_rs::to_string(body) {
        Ok(body) => {
            let mut response = (status, body).into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => {
            tracing::error!("Response serialization failed: {}", e);
            let mut response = (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"success":false,"message":"Internal Server Error"}"#,
            )
                .into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
    }
}

/// `200 {"success": true, "data": ...}`
pub fn ok<T: Serialize>(data: T) -> Response {
    with_data(StatusCode::OK, None, data)
}

/// `201 {"success": true, "data": ...}`
pub fn created<T: Serialize>(data: T) -> Response {
    with_data(StatusCode::CREATED, None, data)
}

/// `200 {"success": true, "message": ..., "data": ...}`
pub fn ok_with_message<T: Serialize>(message: &str, data: T) -> Response {
    with_data(StatusCode::OK, Some(message.to_string()), data)
}

/// `200 {"success": true, "message": ...}`
pub fn message(message: &str) -> Response {
    json(
        StatusCode::OK,
        &ApiResponse::<()> {
            success: true,
            message: Some(message.to_string()),
            data: None,
        },
    )
}

fn with_data<T: Serialize>(status: StatusCode, message: Option<String>, data: T) -> Response {
    json(
        status,
        &ApiResponse {
            success: true,
            message,
            data: Some(data),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        id: u32,
    }

    #[tokio::test]
    async fn envelopes_are_json() {
        let response = created(Payload { id: 7 });
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], 7);
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn message_only_envelope_has_no_data() {
        let bytes = axum::body::to_bytes(message("Logged out successfully").into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Logged out successfully");
        assert!(body.get("data").is_none());
    }
}
