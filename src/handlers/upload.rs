use axum::{
    extract::{multipart::Field, Multipart, State},
    response::Response,
    Extension,
};
use futures::future::try_join_all;
use serde::Serialize;
use tokio::time::{timeout, Duration};

use crate::{
    error::{AppError, Result},
    models::session::AuthUser,
    response,
    services::media::{sniff_image, UploadedImage},
    state::AppState,
};

/// Most images accepted by `/upload/multiple`.
pub const MAX_FILES: usize = 5;
const FIELD_TIMEOUT_SECS: u64 = 60;

/// One image read from the request, already checked.
struct ImageFile {
    bytes: Vec<u8>,
    filename: String,
    mime: &'static str,
}

#[derive(Serialize)]
struct UploadedFiles {
    files: Vec<UploadedImage>,
}

async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>> {
    match timeout(Duration::from_secs(FIELD_TIMEOUT_SECS), multipart.next_field()).await {
        Ok(Ok(field)) => Ok(field),
        Ok(Err(e)) => Err(AppError::Multipart(format!("Parse error: {}", e))),
        Err(_) => Err(AppError::Multipart("Upload timeout exceeded".into())),
    }
}

async fn read_image(field: Field<'_>) -> Result<ImageFile> {
    let filename = field
        .file_name()
        .filter(|name| !name.is_empty())
        .unwrap_or("upload")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::Multipart(format!("{}: {}", filename, e)))?
        .to_vec();
    let mime = sniff_image(&bytes)?;
    Ok(ImageFile {
        bytes,
        filename,
        mime,
    })
}

/// Reads every part named `name`, failing once more than `max` are sent.
/// Other parts are skipped.
async fn collect_images(
    multipart: &mut Multipart,
    name: &str,
    max: usize,
) -> Result<Vec<ImageFile>> {
    let mut images = Vec::new();
    while let Some(field) = next_field(multipart).await? {
        if field.name() != Some(name) {
            continue;
        }
        if images.len() == max {
            return Err(AppError::BadRequest(format!("Too many files (max {})", max)));
        }
        images.push(read_image(field).await?);
    }
    Ok(images)
}

pub async fn upload_single(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Response> {
    let image = collect_images(&mut multipart, "image", 1)
        .await?
        .pop()
        .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

    tracing::info!("📤 Image upload from user {}: {}", user.id, image.filename);
    let uploaded = state
        .media
        .upload_image(image.bytes, image.filename, image.mime)
        .await?;
    Ok(response::ok(uploaded))
}

pub async fn upload_multiple(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Response> {
    let images = collect_images(&mut multipart, "images", MAX_FILES).await?;
    if images.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".to_string()));
    }

    tracing::info!("📤 {} image(s) uploaded by user {}", images.len(), user.id);
    let files = try_join_all(images.into_iter().map(|image| {
        state
            .media
            .upload_image(image.bytes, image.filename, image.mime)
    }))
    .await?;
    Ok(response::ok(UploadedFiles { files }))
}
