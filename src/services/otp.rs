//! OTP records in Redis.
//!
//! Each record lives under its purpose key with a Redis TTL equal to the
//! OTP lifetime, and also carries `expires_at`. Both are written by the
//! same `SET EX`, and a read checks `expires_at` even when Redis has not
//! evicted the key yet.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    cache,
    crypto::otp::generate_otp,
    error::{AppError, Result},
    models::{
        session::{OtpPurpose, OtpRecord, OtpRejection, RefreshRecord},
        user::User,
    },
    state::AppState,
};

/// Creates a fresh OTP, replacing any earlier one for the same purpose.
pub async fn issue(state: &AppState, purpose: OtpPurpose, user_id: Uuid) -> Result<OtpRecord> {
    let ttl_secs = state.config.otp_ttl_secs.max(1);
    let record = OtpRecord::issue(generate_otp()?, Utc::now(), Duration::seconds(ttl_secs));

    let mut redis = state.redis.clone();
    cache::set_json_ex(&mut redis, &purpose.key(user_id), &record, ttl_secs as u64).await?;

    tracing::debug!("🔢 Issued {:?} OTP for user {}", purpose, user_id);
    Ok(record)
}

/// Issues an OTP and mails it to the user.
pub async fn issue_and_send(state: &AppState, purpose: OtpPurpose, user: &User) -> Result<()> {
    let record = issue(state, purpose, user.id).await?;
    state
        .mailer
        .send_otp(&user.email, &record.code, purpose, record.expires_at)
        .await
}

/// Checks `candidate` and deletes the record when it matches.
///
/// An expired record is deleted as well. A wrong code leaves the record in
/// place until it expires or is replaced.
pub async fn consume(
    state: &AppState,
    purpose: OtpPurpose,
    user_id: Uuid,
    candidate: &str,
) -> Result<()> {
    let key = purpose.key(user_id);
    let mut redis = state.redis.clone();

    let record: Option<OtpRecord> = cache::get_json(&mut redis, &key).await?;
    let Some(record) = record else {
        return Err(AppError::BadRequest("OTP expired or not found".to_string()));
    };

    match record.check(candidate, Utc::now()) {
        Ok(()) => {
            cache::delete(&mut redis, &[key]).await?;
            Ok(())
        }
        Err(OtpRejection::Expired) => {
            cache::delete(&mut redis, &[key]).await?;
            Err(AppError::BadRequest("OTP has expired".to_string()))
        }
        Err(OtpRejection::Mismatch) => {
            tracing::warn!("Wrong {:?} OTP for user {}", purpose, user_id);
            Err(AppError::BadRequest("Invalid OTP".to_string()))
        }
    }
}

/// Removes the refresh record and every OTP of the user.
pub async fn clear_session_keys(state: &AppState, user_id: Uuid) -> Result<()> {
    let mut keys = vec![RefreshRecord::key(user_id)];
    keys.extend(OtpPurpose::ALL.iter().map(|purpose| purpose.key(user_id)));

    let mut redis = state.redis.clone();
    cache::delete(&mut redis, &keys).await
}
