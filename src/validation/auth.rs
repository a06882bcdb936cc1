//! Request bodies for the account endpoints.

use garde::Validate;
use serde::Deserialize;

use crate::models::user::Role;

/// The request payload for user registration.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[garde(length(chars, min = 2, max = 100))]
    pub name: String,
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 6, max = 128))]
    pub password: String,
    /// Defaults to `student`.
    #[serde(default)]
    #[garde(skip)]
    pub role: Role,
}

/// The request payload for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

/// The request payload for the refresh endpoint. The cookie wins when both
/// are present.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    #[garde(skip)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[garde(length(min = 6, max = 6))]
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[garde(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 6, max = 6))]
    pub otp: String,
    #[garde(length(min = 6, max = 128))]
    pub new_password: String,
}

/// The request payload for changing a user's password.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[garde(length(min = 1, max = 128))]
    pub current_password: String,
    #[garde(length(min = 6, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    #[garde(length(chars, min = 2, max = 100))]
    pub name: Option<String>,
    #[serde(default)]
    #[garde(url)]
    pub avatar: Option<String>,
}

/// Admin edit of another user.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[serde(default)]
    #[garde(length(chars, min = 2, max = 100))]
    pub name: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub role: Option<Role>,
    #[serde(default)]
    #[garde(url)]
    pub avatar: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: serde::de::DeserializeOwned>(json: &str) -> T {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn register_defaults_to_student() {
        let req: RegisterRequest =
            parse(r#"{"name":"Ada","email":"ada@example.com","password":"secret1"}"#);
        assert!(req.validate().is_ok());
        assert_eq!(req.role, Role::Student);
    }

    #[test]
    fn register_rules_match_the_form() {
        let req: RegisterRequest = parse(
            r#"{"name":"A","email":"not-an-email","password":"12345","role":"instructor"}"#,
        );
        let report = req.validate().unwrap_err();
        let fields: Vec<String> = report.iter().map(|(path, _)| path.to_string()).collect();
        assert!(fields.contains(&"name".to_string()));
        assert!(fields.contains(&"email".to_string()));
        assert!(fields.contains(&"password".to_string()));
    }

    #[test]
    fn unknown_roles_do_not_parse() {
        let parsed = serde_json::from_str::<RegisterRequest>(
            r#"{"name":"Ada","email":"ada@example.com","password":"secret1","role":"root"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn profile_fields_are_optional_but_checked() {
        let empty: UpdateProfileRequest = parse("{}");
        assert!(empty.validate().is_ok());

        let bad: UpdateProfileRequest = parse(r#"{"avatar":"not a url"}"#);
        assert!(bad.validate().is_err());

        let good: UpdateProfileRequest =
            parse(r#"{"name":"Grace","avatar":"https://cdn.example.com/a.png"}"#);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn otp_must_be_six_characters() {
        let short: VerifyEmailRequest = parse(r#"{"otp":"123"}"#);
        assert!(short.validate().is_err());
        let ok: VerifyEmailRequest = parse(r#"{"otp":"123456"}"#);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn change_password_uses_camel_case_fields() {
        let req: ChangePasswordRequest =
            parse(r#"{"currentPassword":"old-secret","newPassword":"new-secret"}"#);
        assert!(req.validate().is_ok());
    }
}
