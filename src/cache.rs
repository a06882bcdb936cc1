//! Thin JSON helpers over the Redis connection manager.

use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{AppError, Result};

/// Reads and decodes a JSON value.
///
/// A value that no longer decodes (for example after a schema change) is
/// dropped and reported as a miss.
pub async fn get_json<T: DeserializeOwned>(
    redis: &mut ConnectionManager,
    key: &str,
) -> Result<Option<T>> {
    let raw: Option<String> = redis.get(key).await?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    match sonic_rs::from_str::<T>(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
            let _: () = redis.del(key).await?;
            Ok(None)
        }
    }
}

/// Encodes `value` as JSON and stores it with a TTL in seconds.
pub async fn set_json_ex<T: Serialize>(
    redis: &mut ConnectionManager,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<()> {
    let json = sonic_rs::to_string(value)
        .map_err(|e| AppError::Serialization(format!("{}: {}", key, e)))?;

    let _: () = redis.set_ex(key, json, ttl_secs.max(1)).await?;
    Ok(())
}

/// Deletes every key in `keys`. Missing keys are not an error.
pub async fn delete(redis: &mut ConnectionManager, keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let _: () = redis.del(keys).await?;
    Ok(())
}
