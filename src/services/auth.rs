use chrono::Utc;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::cache;
use crate::crypto::password;
use crate::crypto::tokens::{TokenKind, TokenPair};
use crate::error::{AppError, Result};
use crate::models::session::{OtpPurpose, RefreshRecord, RefreshRejection};
use crate::models::user::{Role, User};
use crate::repositories::user as user_repo;
use crate::services::otp;
use crate::state::AppState;

/// A signed-in user and the tokens handed to the client.
pub struct AuthOutcome {
    pub user: User,
    pub tokens: TokenPair,
    /// Whether a verification OTP was mailed as part of this call.
    pub otp_sent: bool,
}

/// Normalizes an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Argon2 is CPU bound, so it runs off the async workers.
async fn hash_password(plain: String) -> Result<String> {
    let plain = Zeroizing::new(plain);
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

async fn verify_password(plain: String, hash: String) -> Result<bool> {
    let plain = Zeroizing::new(plain);
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
}

/// Issues a token pair and stores the refresh token as the only valid one.
pub async fn start_session(state: &AppState, user: &User) -> Result<TokenPair> {
    let tokens = state.tokens.issue_pair(user.id, user.role, Utc::now())?;

    let record = RefreshRecord {
        token: tokens.refresh.token.clone(),
        expires_at: tokens.refresh.expires_at,
    };
    let ttl_secs = state.tokens.ttl(TokenKind::Refresh).num_seconds().max(1) as u64;

    let mut redis = state.redis.clone();
    cache::set_json_ex(&mut redis, &RefreshRecord::key(user.id), &record, ttl_secs).await?;

    Ok(tokens)
}

/// Mails a verification OTP without failing the surrounding request.
async fn offer_verification_otp(state: &AppState, user: &User) -> bool {
    match otp::issue_and_send(state, OtpPurpose::EmailVerification, user).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("❌ Could not send verification OTP to {}: {}", user.id, e);
            false
        }
    }
}

/// Creates a new account and signs it in.
pub async fn register(
    state: &AppState,
    name: String,
    email: String,
    password: String,
    role: Role,
) -> Result<AuthOutcome> {
    let email = normalize_email(&email);
    tracing::debug!("🔐 Registering user: {}", email);

    if user_repo::find_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::BadRequest("User already exists".to_string()));
    }

    let password_hash = hash_password(password).await?;
    let user = user_repo::create_user(&state.db, name.trim(), &email, &password_hash, role).await?;
    tracing::info!("✅ User created with ID: {}", user.id);

    let tokens = start_session(state, &user).await?;
    let otp_sent = offer_verification_otp(state, &user).await;

    Ok(AuthOutcome {
        user,
        tokens,
        otp_sent,
    })
}

/// Checks credentials and signs the user in.
///
/// An unknown email and a wrong password produce the same error.
pub async fn login(state: &AppState, email: String, password: String) -> Result<AuthOutcome> {
    let email = normalize_email(&email);
    tracing::debug!("🔐 Authenticating user: {}", email);

    let user = user_repo::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

    if !verify_password(password, user.password.clone()).await? {
        return Err(AppError::Authentication("Invalid credentials".to_string()));
    }

    let user = user_repo::touch_last_login(&state.db, &user.id).await?;
    tracing::info!("✅ User authenticated: {}", user.id);

    let tokens = start_session(state, &user).await?;
    let otp_sent = if user.is_verified {
        false
    } else {
        offer_verification_otp(state, &user).await
    };

    Ok(AuthOutcome {
        user,
        tokens,
        otp_sent,
    })
}

/// Ends every session of the user and drops pending OTPs.
pub async fn logout(state: &AppState, user_id: Uuid) -> Result<()> {
    otp::clear_session_keys(state, user_id).await?;
    tracing::info!("👋 User logged out: {}", user_id);
    Ok(())
}

/// Rotates the refresh token.
///
/// The presented token must be the one currently stored. A valid but
/// superseded token revokes the stored one as well, ending the session.
pub async fn refresh(state: &AppState, presented: &str) -> Result<(User, TokenPair)> {
    let claims = state
        .tokens
        .verify(TokenKind::Refresh, presented)
        .map_err(|_| AppError::Authentication("Invalid refresh token".to_string()))?;

    let key = RefreshRecord::key(claims.sub);
    let mut redis = state.redis.clone();

    let record: Option<RefreshRecord> = cache::get_json(&mut redis, &key).await?;
    if let Err(rejection) = RefreshRecord::check(record.as_ref(), presented, Utc::now()) {
        if rejection == RefreshRejection::Superseded {
            tracing::warn!("Superseded refresh token presented for user {}", claims.sub);
        }
        if rejection.revokes_session() {
            cache::delete(&mut redis, &[key]).await?;
        }
        return Err(AppError::Authentication(rejection.message().to_string()));
    }

    let user = user_repo::find_by_id(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid refresh token".to_string()))?;

    let tokens = start_session(state, &user).await?;
    tracing::debug!("🔄 Rotated refresh token for user {}", user.id);
    Ok((user, tokens))
}

async fn load_user(state: &AppState, user_id: Uuid) -> Result<User> {
    user_repo::find_by_id(&state.db, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Marks the email verified when `otp` matches the pending code.
pub async fn verify_email(state: &AppState, user_id: Uuid, otp_code: &str) -> Result<User> {
    let user = load_user(state, user_id).await?;
    if user.is_verified {
        return Err(AppError::BadRequest("Email already verified".to_string()));
    }

    otp::consume(state, OtpPurpose::EmailVerification, user_id, otp_code).await?;
    user_repo::set_verified(&state.db, &user_id).await?;
    tracing::info!("✅ Email verified for user: {}", user_id);

    Ok(User {
        is_verified: true,
        ..user
    })
}

/// Replaces the pending verification OTP and mails the new one.
pub async fn resend_otp(state: &AppState, user_id: Uuid) -> Result<()> {
    let user = load_user(state, user_id).await?;
    if user.is_verified {
        return Err(AppError::BadRequest("Email already verified".to_string()));
    }
    otp::issue_and_send(state, OtpPurpose::EmailVerification, &user).await
}

/// Mails a password-reset OTP when the account exists.
///
/// Succeeds either way so the response does not reveal which emails are
/// registered.
pub async fn forgot_password(state: &AppState, email: &str) -> Result<()> {
    let email = normalize_email(email);
    let Some(user) = user_repo::find_by_email(&state.db, &email).await? else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(());
    };

    if let Err(e) = otp::issue_and_send(state, OtpPurpose::PasswordReset, &user).await {
        tracing::error!("❌ Could not send reset OTP to {}: {}", user.id, e);
    }
    Ok(())
}

/// Sets a new password after checking the reset OTP. Ends every session.
pub async fn reset_password(
    state: &AppState,
    email: &str,
    otp_code: &str,
    new_password: String,
) -> Result<()> {
    let email = normalize_email(email);
    let user = user_repo::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::BadRequest("OTP expired or not found".to_string()))?;

    otp::consume(state, OtpPurpose::PasswordReset, user.id, otp_code).await?;

    let password_hash = hash_password(new_password).await?;
    user_repo::update_password(&state.db, &user.id, &password_hash).await?;

    let mut redis = state.redis.clone();
    cache::delete(&mut redis, &[RefreshRecord::key(user.id)]).await?;

    tracing::info!("✅ Password reset for user: {}", user.id);
    Ok(())
}

/// Changes a user's password after checking the current one.
pub async fn change_password(
    state: &AppState,
    user_id: Uuid,
    current_password: String,
    new_password: String,
) -> Result<()> {
    tracing::info!("🔑 Changing password for user: {}", user_id);

    let user = load_user(state, user_id).await?;
    if !verify_password(current_password, user.password).await? {
        return Err(AppError::Authentication(
            "Current password is incorrect".to_string(),
        ));
    }

    let password_hash = hash_password(new_password).await?;
    user_repo::update_password(&state.db, &user_id, &password_hash).await?;

    tracing::info!("✅ Password changed for user: {}", user_id);
    Ok(())
}

pub async fn profile(state: &AppState, user_id: Uuid) -> Result<User> {
    load_user(state, user_id).await
}

pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    name: Option<String>,
    avatar: Option<String>,
) -> Result<User> {
    user_repo::update_profile(
        &state.db,
        &user_id,
        name.as_deref().map(str::trim),
        avatar.as_deref(),
    )
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
