use std::env;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// SMTP settings. Absent when `SMTP_HOST` is unset.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Zeroizing<String>,
}

/// Media store credentials. Absent when `CLOUDINARY_CLOUD_NAME` is unset.
#[derive(Clone)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: Zeroizing<String>,
    pub folder: String,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The TCP port the HTTP server binds.
    pub port: u16,
    /// `development` or `production`; production turns on secure cookies.
    pub app_env: String,
    /// Origins allowed by CORS.
    pub frontend_urls: Vec<String>,
    /// HS256 secret for access tokens.
    pub jwt_secret: Zeroizing<Vec<u8>>,
    /// HS256 secret for refresh tokens.
    pub jwt_refresh_secret: Zeroizing<Vec<u8>>,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub otp_ttl_secs: i64,
    pub course_cache_ttl_secs: u64,
    pub smtp: Option<SmtpConfig>,
    pub media: Option<MediaConfig>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_refresh_secret =
            env::var("JWT_REFRESH_SECRET").context("JWT_REFRESH_SECRET must be set")?;

        if jwt_secret.len() < 32 || jwt_refresh_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET and JWT_REFRESH_SECRET must be at least 32 characters");
        }
        if jwt_secret == jwt_refresh_secret {
            anyhow::bail!("JWT_SECRET and JWT_REFRESH_SECRET must differ");
        }

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) if !host.trim().is_empty() => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", 587)?,
                username: env::var("SMTP_USER").context("SMTP_USER must be set with SMTP_HOST")?,
                password: Zeroizing::new(
                    env::var("SMTP_PASS").context("SMTP_PASS must be set with SMTP_HOST")?,
                ),
            }),
            _ => None,
        };

        let media = match env::var("CLOUDINARY_CLOUD_NAME") {
            Ok(cloud_name) if !cloud_name.trim().is_empty() => Some(MediaConfig {
                cloud_name,
                api_key: env::var("CLOUDINARY_API_KEY")
                    .context("CLOUDINARY_API_KEY must be set with CLOUDINARY_CLOUD_NAME")?,
                api_secret: Zeroizing::new(
                    env::var("CLOUDINARY_API_SECRET")
                        .context("CLOUDINARY_API_SECRET must be set with CLOUDINARY_CLOUD_NAME")?,
                ),
                folder: env::var("UPLOAD_FOLDER")
                    .unwrap_or_else(|_| "education-platform".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            port: parse_or("PORT", 5000)?,
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            frontend_urls: split_origins(
                &env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string()),
            ),
            jwt_secret: Zeroizing::new(jwt_secret.into_bytes()),
            jwt_refresh_secret: Zeroizing::new(jwt_refresh_secret.into_bytes()),
            access_token_ttl_secs: parse_or("ACCESS_TOKEN_TTL_SECS", 15 * 60)?,
            refresh_token_ttl_secs: parse_or("REFRESH_TOKEN_TTL_SECS", 7 * 24 * 60 * 60)?,
            otp_ttl_secs: parse_or("OTP_TTL_SECS", 5 * 60)?,
            course_cache_ttl_secs: parse_or("COURSE_CACHE_TTL_SECS", 3600)?,
            smtp,
            media,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            split_origins("http://localhost:5173, https://app.example.com ,"),
            vec!["http://localhost:5173", "https://app.example.com"]
        );
    }
}
