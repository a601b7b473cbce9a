use super::read_file_field;
use crate::{
    codec::{self, CodecError},
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum UploadImageError {
    #[error("Solo se aceptan JPG y PNG.")]
    UnsupportedType(Option<String>),
    #[error("Missing `file` field")]
    MissingFile,
    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("{0}")]
    Codec(#[from] CodecError),
    #[error("Image processing task failed: {0}")]
    Task(String),
}

impl IntoResponse for UploadImageError {
    fn into_response(self) -> Response {
        let status = match self {
            UploadImageError::UnsupportedType(_)
            | UploadImageError::MissingFile
            | UploadImageError::Multipart(_) => StatusCode::BAD_REQUEST,
            UploadImageError::Codec(_) | UploadImageError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct UploadImageResponse {
    pub image_base64: String,
}

#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<UploadImageResponse>, UploadImageError> {
    state.metrics.record_request("upload_image");

    let file = read_file_field(&mut multipart, "file")
        .await?
        .ok_or(UploadImageError::MissingFile)?;

    let content_type = file.content_type.as_deref().unwrap_or_default();
    if !state.upload.is_allowed(content_type) {
        tracing::warn!("Rejected upload with content type {:?}", file.content_type);
        return Err(UploadImageError::UnsupportedType(file.content_type));
    }

    let max_dimension = state.upload.max_dimension;
    let quality = state.upload.jpeg_quality;
    let image_base64 = tokio::task::spawn_blocking(move || {
        let frame = codec::decode_bytes(&file.data)?;
        let original = frame.dimensions();
        let frame = codec::resize_to_bound(frame, max_dimension);
        tracing::debug!("Resized upload from {:?} to {:?}", original, frame.dimensions());
        codec::encode(&frame, quality)
    })
    .await
    .map_err(|e| UploadImageError::Task(e.to_string()))??;

    Ok(Json(UploadImageResponse { image_base64 }))
}
