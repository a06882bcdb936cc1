//! Access and refresh tokens.
//!
//! Both are HS256 JWTs carrying the user id and role. They are signed with
//! different secrets, so a refresh token is never accepted where an access
//! token is expected and the other way round.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::user::Role;

/// Seconds of clock skew tolerated on `exp`.
const LEEWAY_SECS: u64 = 5;

/// Claims carried by both token kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token so two tokens issued in the same second still differ.
    pub jti: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

/// A signed token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

/// Issues and verifies both token kinds.
#[derive(Clone)]
pub struct TokenCodec {
    access: Keys,
    refresh: Keys,
}

impl TokenCodec {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Self {
        Self {
            access: Keys {
                encoding: EncodingKey::from_secret(access_secret),
                decoding: DecodingKey::from_secret(access_secret),
                ttl: Duration::seconds(access_ttl_secs),
            },
            refresh: Keys {
                encoding: EncodingKey::from_secret(refresh_secret),
                decoding: DecodingKey::from_secret(refresh_secret),
                ttl: Duration::seconds(refresh_ttl_secs),
            },
        }
    }

    fn keys(&self, kind: TokenKind) -> &Keys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        self.keys(kind).ttl
    }

    pub fn issue(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let keys = self.keys(kind);
        let expires_at = now + keys.ttl;
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))?;

        Ok(IssuedToken { token, expires_at })
    }

    pub fn issue_pair(&self, user_id: Uuid, role: Role, now: DateTime<Utc>) -> Result<TokenPair> {
        Ok(TokenPair {
            access: self.issue(TokenKind::Access, user_id, role, now)?,
            refresh: self.issue(TokenKind::Refresh, user_id, role, now)?,
        })
    }

    pub fn verify(&self, kind: TokenKind, token: &str) -> std::result::Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;

        decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            b"access-secret-access-secret-0123",
            b"refresh-secret-refresh-secret-01",
            15 * 60,
            7 * 24 * 60 * 60,
        )
    }

    #[test]
    fn issued_tokens_verify_with_their_own_kind() {
        let codec = codec();
        let id = Uuid::new_v4();
        let pair = codec.issue_pair(id, Role::Instructor, Utc::now()).unwrap();

        let claims = codec.verify(TokenKind::Access, &pair.access.token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Instructor);

        let claims = codec.verify(TokenKind::Refresh, &pair.refresh.token).unwrap();
        assert_eq!(claims.sub, id);
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let codec = codec();
        let pair = codec.issue_pair(Uuid::new_v4(), Role::Student, Utc::now()).unwrap();

        assert_eq!(
            codec.verify(TokenKind::Access, &pair.refresh.token),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            codec.verify(TokenKind::Refresh, &pair.access.token),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_tokens_are_reported_as_expired() {
        let codec = codec();
        let long_ago = Utc::now() - Duration::hours(2);
        let token = codec
            .issue(TokenKind::Access, Uuid::new_v4(), Role::Student, long_ago)
            .unwrap();

        assert_eq!(
            codec.verify(TokenKind::Access, &token.token),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn tokens_issued_together_differ() {
        let codec = codec();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let a = codec.issue(TokenKind::Refresh, id, Role::Student, now).unwrap();
        let b = codec.issue(TokenKind::Refresh, id, Role::Student, now).unwrap();
        assert_ne!(a.token, b.token);
        assert_eq!(a.expires_at, now + Duration::days(7));
    }

    #[test]
    fn tampered_tokens_are_invalid() {
        let codec = codec();
        let token = codec
            .issue(TokenKind::Access, Uuid::new_v4(), Role::Admin, Utc::now())
            .unwrap()
            .token;
        let tampered = format!("{}x", token);
        assert_eq!(codec.verify(TokenKind::Access, &tampered), Err(TokenError::Invalid));
        assert_eq!(codec.verify(TokenKind::Access, "not.a.jwt"), Err(TokenError::Invalid));
    }
}
