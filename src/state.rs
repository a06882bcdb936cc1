use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use std::time::Instant;
use crate::config::Config;
use crate::crypto::tokens::TokenCodec;
use crate::error::{AppError, Result};
use crate::services::{mail::Mailer, media::MediaStore, notifications::NotificationHub};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The Redis connection manager.
    pub redis: ConnectionManager,
    /// The application's configuration.
    pub config: Config,
    /// Signs and verifies access and refresh tokens.
    pub tokens: TokenCodec,
    pub mailer: Mailer,
    pub media: MediaStore,
    /// WebSocket rooms.
    pub notifications: NotificationHub,
    /// When the process started, for `/health`.
    pub started_at: Instant,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized");

        let tokens = TokenCodec::new(
            &config.jwt_secret,
            &config.jwt_refresh_secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
        );

        let mailer = Mailer::from_config(config.smtp.as_ref())
            .map_err(|e| AppError::Mail(format!("SMTP transport: {}", e)))?;
        let media = MediaStore::new(config.media.clone())
            .map_err(|e| AppError::Media(format!("HTTP client: {}", e)))?;
        tracing::info!("✅ Mail and media clients initialized");

        Ok(AppState {
            db,
            redis,
            config: config.clone(),
            tokens,
            mailer,
            media,
            notifications: NotificationHub::new(),
            started_at: Instant::now(),
        })
    }
}
