use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use garde::Validate;
use serde::de::DeserializeOwned;

use crate::error::{AppError, FieldError};

/// JSON body that is deserialized with sonic-rs and then validated.
///
/// Both failures become a 400 `Validation failed` with per-field details.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    T::Context: Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Unreadable body: {}", e)))?;

        let value: T = sonic_rs::from_slice(&bytes)
            .map_err(|e| AppError::invalid_field("body", e.to_string()))?;

        value.validate().map_err(report_to_error)?;
        Ok(Self(value))
    }
}

/// Flattens a garde report into client-facing field errors.
pub fn report_to_error(report: garde::Report) -> AppError {
    let details = report
        .iter()
        .map(|(path, error)| FieldError {
            path: camel_case(&path.to_string()),
            message: error.to_string(),
        })
        .collect();
    AppError::Validation(details)
}

/// `new_password` -> `newPassword`, matching the JSON field names.
fn camel_case(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut upper = false;
    for c in path.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    struct Payload {
        #[garde(length(min = 6))]
        new_password: String,
    }

    fn request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn paths_are_camel_cased() {
        assert_eq!(camel_case("new_password"), "newPassword");
        assert_eq!(camel_case("learning_outcomes[0]"), "learningOutcomes[0]");
        assert_eq!(camel_case("email"), "email");
    }

    #[tokio::test]
    async fn valid_bodies_pass_through() {
        let ValidatedJson(payload) =
            ValidatedJson::<Payload>::from_request(request(r#"{"newPassword":"secret1"}"#), &())
                .await
                .unwrap();
        assert_eq!(payload.new_password, "secret1");
    }

    #[tokio::test]
    async fn rule_violations_name_the_field() {
        let err = ValidatedJson::<Payload>::from_request(request(r#"{"newPassword":"123"}"#), &())
            .await
            .err()
            .unwrap();
        match err {
            AppError::Validation(details) => assert_eq!(details[0].path, "newPassword"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let err = ValidatedJson::<Payload>::from_request(request("{not json"), &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
