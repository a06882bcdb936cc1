use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::models::user::Role;

/// The authenticated caller, taken from a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

/// The refresh token currently valid for a user.
///
/// Lives under `refresh_token:{user_id}` with a Redis TTL equal to the
/// token lifetime. `expires_at` mirrors that TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshRecord {
    pub fn key(user_id: Uuid) -> String {
        format!("refresh_token:{}", user_id)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Constant-time comparison against a presented token.
    pub fn matches(&self, presented: &str) -> bool {
        self.token.as_bytes().ct_eq(presented.as_bytes()).into()
    }

    /// Decides whether `presented` may be rotated, given what the store holds.
    ///
    /// Only the most recently issued token passes. Expiry is checked before
    /// the comparison.
    pub fn check(
        stored: Option<&RefreshRecord>,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RefreshRejection> {
        let record = stored.ok_or(RefreshRejection::Missing)?;
        if record.is_expired_at(now) {
            return Err(RefreshRejection::Expired);
        }
        if !record.matches(presented) {
            return Err(RefreshRejection::Superseded);
        }
        Ok(())
    }
}

/// Why a presented refresh token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    Missing,
    Expired,
    Superseded,
}

impl RefreshRejection {
    /// Whether the stored record must be dropped, ending the session.
    pub fn revokes_session(self) -> bool {
        !matches!(self, RefreshRejection::Missing)
    }

    pub fn message(self) -> &'static str {
        match self {
            RefreshRejection::Missing => "Refresh token not found",
            RefreshRejection::Expired => "Refresh token expired",
            RefreshRejection::Superseded => "Invalid refresh token",
        }
    }
}

/// What an OTP unlocks. Each purpose has its own key so a reset code can
/// never verify an email and the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    EmailVerification,
    PasswordReset,
}

impl OtpPurpose {
    pub const ALL: [OtpPurpose; 2] = [OtpPurpose::EmailVerification, OtpPurpose::PasswordReset];

    pub fn key(self, user_id: Uuid) -> String {
        match self {
            OtpPurpose::EmailVerification => format!("otp:email_verification:{}", user_id),
            OtpPurpose::PasswordReset => format!("otp:password_reset:{}", user_id),
        }
    }

    pub fn subject(self) -> &'static str {
        match self {
            OtpPurpose::EmailVerification => "Your OTP Code - Expires in 5 Minutes",
            OtpPurpose::PasswordReset => "Your Password Reset Code - Expires in 5 Minutes",
        }
    }
}

/// Why a presented OTP was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpRejection {
    Expired,
    Mismatch,
}

/// A one-time passcode and its explicit expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRecord {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl OtpRecord {
    pub fn issue(code: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            code,
            expires_at: now + ttl,
        }
    }

    /// Time left before expiry, never negative.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// A record with no time left is expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_at(now) <= Duration::zero()
    }

    /// Checks expiry first, then the code in constant time.
    pub fn check(&self, candidate: &str, now: DateTime<Utc>) -> Result<(), OtpRejection> {
        if self.is_expired_at(now) {
            return Err(OtpRejection::Expired);
        }
        if !bool::from(self.code.as_bytes().ct_eq(candidate.trim().as_bytes())) {
            return Err(OtpRejection::Mismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(now: DateTime<Utc>) -> OtpRecord {
        OtpRecord::issue("482913".to_string(), now, Duration::minutes(5))
    }

    #[test]
    fn otp_is_valid_just_before_expiry() {
        let issued = Utc::now();
        let otp = record(issued);
        let almost = otp.expires_at - Duration::milliseconds(1);
        assert_eq!(otp.check("482913", almost), Ok(()));
    }

    #[test]
    fn otp_is_expired_at_exactly_zero_remaining() {
        let issued = Utc::now();
        let otp = record(issued);
        assert_eq!(otp.remaining_at(otp.expires_at), Duration::zero());
        assert!(otp.is_expired_at(otp.expires_at));
        assert_eq!(otp.check("482913", otp.expires_at), Err(OtpRejection::Expired));
    }

    #[test]
    fn expiry_wins_over_a_wrong_code() {
        let otp = record(Utc::now());
        let later = otp.expires_at + Duration::seconds(30);
        assert_eq!(otp.check("000000", later), Err(OtpRejection::Expired));
        assert_eq!(otp.remaining_at(later), Duration::zero());
    }

    #[test]
    fn wrong_or_truncated_codes_are_rejected() {
        let now = Utc::now();
        let otp = record(now);
        assert_eq!(otp.check("482914", now), Err(OtpRejection::Mismatch));
        assert_eq!(otp.check("48291", now), Err(OtpRejection::Mismatch));
        assert_eq!(otp.check(" 482913 ", now), Ok(()));
    }

    #[test]
    fn purposes_use_distinct_keys() {
        let id = Uuid::new_v4();
        assert_ne!(
            OtpPurpose::EmailVerification.key(id),
            OtpPurpose::PasswordReset.key(id)
        );
        assert!(RefreshRecord::key(id).starts_with("refresh_token:"));
    }

    #[test]
    fn refresh_record_compares_whole_token() {
        let record = RefreshRecord {
            token: "header.payload.signature".to_string(),
            expires_at: Utc::now() + Duration::days(7),
        };
        assert!(record.matches("header.payload.signature"));
        assert!(!record.matches("header.payload.signatur"));
        assert!(!record.is_expired_at(Utc::now()));
    }

    #[test]
    fn only_the_latest_refresh_token_rotates() {
        let now = Utc::now();
        let latest = RefreshRecord {
            token: "second.issued.token".to_string(),
            expires_at: now + Duration::days(7),
        };

        assert_eq!(RefreshRecord::check(Some(&latest), "second.issued.token", now), Ok(()));

        let stale = RefreshRecord::check(Some(&latest), "first.issued.token", now).unwrap_err();
        assert_eq!(stale, RefreshRejection::Superseded);
        assert!(stale.revokes_session());
        assert_eq!(stale.message(), "Invalid refresh token");
    }

    #[test]
    fn missing_and_expired_refresh_records_are_refused() {
        let now = Utc::now();
        let missing = RefreshRecord::check(None, "any.token.value", now).unwrap_err();
        assert_eq!(missing, RefreshRejection::Missing);
        assert!(!missing.revokes_session());

        let lapsed = RefreshRecord {
            token: "any.token.value".to_string(),
            expires_at: now,
        };
        let expired = RefreshRecord::check(Some(&lapsed), "any.token.value", now).unwrap_err();
        assert_eq!(expired, RefreshRejection::Expired);
        assert!(expired.revokes_session());
        assert_eq!(expired.message(), "Refresh token expired");
    }
}
