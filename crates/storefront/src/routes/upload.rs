//! Image upload handler.
//!
//! Accepts a multipart body with a `file` field (JPEG, PNG or WebP). With
//! `resize=true` (the default) the image is shrunk to fit 1200 px and stored
//! as JPEG; with `resize=false` the original bytes are kept.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::routes::extract::ApiQuery;
use crate::services::images::{MAX_UPLOAD_BYTES, process_upload};
use crate::state::AppState;

/// Upload query parameters.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default = "default_resize")]
    pub resize: bool,
}

const fn default_resize() -> bool {
    true
}

/// Upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Value to store in an `image` or `thumbnail` field.
    pub reference: String,
}

/// POST /api/upload?resize=true|false
#[instrument(skip_all, fields(admin_id = %admin.id, resize = query.resize))]
pub async fn upload(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiQuery(query): ApiQuery<UploadQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart request: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field.bytes().await.map_err(|e| {
                AppError::Validation(format!(
                    "could not read file (maximum {MAX_UPLOAD_BYTES} bytes): {e}"
                ))
            })?;
            data = Some(bytes.to_vec());
            break;
        }
    }

    let data =
        data.ok_or_else(|| AppError::Validation("no 'file' field in multipart body".into()))?;

    let reference = process_upload(state.images(), data, query.resize).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { reference })))
}
