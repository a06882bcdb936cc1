//! Image uploads to the managed media store (Cloudinary upload API).

use std::time::Duration;

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::MediaConfig;
use crate::error::{AppError, Result};

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
/// Formats the store is told to accept.
pub const ALLOWED_FORMATS: &str = "jpg,jpeg,png,gif";
/// Images are scaled down to fit 500x500.
pub const TRANSFORMATION: &str = "c_limit,h_500,w_500";

/// Where an uploaded image ended up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Validates that `bytes` is an accepted image and returns its MIME type.
///
/// The type is sniffed from the content; the client's declared type is
/// ignored.
pub fn sniff_image(bytes: &[u8]) -> Result<&'static str> {
    if bytes.is_empty() {
        return Err(AppError::BadRequest("No file uploaded".to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest(format!(
            "File too large (max {}MB)",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }

    match infer::get(bytes).map(|kind| kind.mime_type()) {
        Some(mime @ ("image/jpeg" | "image/png" | "image/gif")) => Ok(mime),
        _ => Err(AppError::BadRequest("Only image files are allowed".to_string())),
    }
}

/// Signs upload parameters: `k=v` pairs sorted by key, joined by `&`,
/// followed by the API secret, hashed with SHA-256.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Client for the media store.
#[derive(Clone)]
pub struct MediaStore {
    client: reqwest::Client,
    config: Option<MediaConfig>,
}

impl MediaStore {
    pub fn new(config: Option<MediaConfig>) -> anyhow::Result<Self> {
        if config.is_none() {
            tracing::warn!("⚠️ CLOUDINARY_CLOUD_NAME not set; uploads are disabled");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    /// Uploads one image. `bytes` must already have passed [`sniff_image`].
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: String,
        mime: &str,
    ) -> Result<UploadedImage> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| AppError::NotConfigured("Upload service not configured".to_string()))?;

        let signed = vec![
            ("allowed_formats", ALLOWED_FORMATS.to_string()),
            ("folder", config.folder.clone()),
            ("timestamp", Utc::now().timestamp().to_string()),
            ("transformation", TRANSFORMATION.to_string()),
        ];
        let signature = sign_params(&signed, &config.api_secret);

        let file = Part::bytes(bytes)
            .file_name(filename)
            .mime_str(mime)
            .map_err(|e| AppError::Media(format!("Invalid MIME type: {}", e)))?;

        let mut form = Form::new().part("file", file);
        for (key, value) in signed {
            form = form.text(key, value);
        }
        form = form
            .text("api_key", config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            config.cloud_name
        );

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Media(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(AppError::Media(format!("{}: {}", status, message)));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::Media(format!("Unexpected upload response: {}", e)))?;

        tracing::info!("✅ Image uploaded: {}", uploaded.public_id);

        Ok(UploadedImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_padding(magic: &[u8]) -> Vec<u8> {
        let mut bytes = magic.to_vec();
        bytes.resize(64, 0);
        bytes
    }

    #[test]
    fn accepts_common_image_formats() {
        let png = with_padding(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        let gif = with_padding(b"GIF89a");
        let jpeg = with_padding(&[0xFF, 0xD8, 0xFF, 0xE0]);

        assert_eq!(sniff_image(&png).unwrap(), "image/png");
        assert_eq!(sniff_image(&gif).unwrap(), "image/gif");
        assert_eq!(sniff_image(&jpeg).unwrap(), "image/jpeg");
    }

    #[test]
    fn rejects_non_images_and_oversized_files() {
        let pdf = with_padding(b"%PDF-1.7");
        assert!(matches!(sniff_image(&pdf), Err(AppError::BadRequest(_))));
        assert!(matches!(sniff_image(b"plain text"), Err(AppError::BadRequest(_))));
        assert!(matches!(sniff_image(&[]), Err(AppError::BadRequest(_))));

        let mut huge = with_padding(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        huge.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(matches!(sniff_image(&huge), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn signature_ignores_parameter_order() {
        let a = sign_params(
            &[("timestamp", "1700000000".into()), ("folder", "edu".into())],
            "secret",
        );
        let b = sign_params(
            &[("folder", "edu".into()), ("timestamp", "1700000000".into())],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn signature_matches_manual_digest() {
        let expected = hex::encode(Sha256::digest(b"folder=edu&timestamp=1700000000secret"));
        let actual = sign_params(
            &[("timestamp", "1700000000".into()), ("folder", "edu".into())],
            "secret",
        );
        assert_eq!(actual, expected);
        assert_ne!(
            actual,
            sign_params(&[("folder", "edu".into())], "other-secret")
        );
    }

    #[tokio::test]
    async fn unconfigured_store_refuses_uploads() {
        let store = MediaStore::new(None).unwrap();
        let err = store
            .upload_image(vec![1, 2, 3], "a.png".into(), "image/png")
            .await
            .unwrap_err();
        assert!(
            matches!(&err, AppError::NotConfigured(msg) if msg == "Upload service not configured")
        );
    }
}
