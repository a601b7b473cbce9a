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
use microscope_detection::ModelError;
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

/// Quality used for annotated results, matching the streaming path.
const ANNOTATED_QUALITY: u8 = 50;

#[derive(Error, Debug)]
pub enum AnalyzeImageError {
    #[error("No se pudo leer la imagen.")]
    Unreadable(CodecError),
    #[error("Missing `file` field")]
    MissingFile,
    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Prediction failed: {0}")]
    Prediction(#[from] ModelError),
    #[error("Image conversion failed: {0}")]
    ImageConversion(CodecError),
    #[error("Analysis task failed: {0}")]
    Task(String),
}

impl IntoResponse for AnalyzeImageError {
    fn into_response(self) -> Response {
        let status = match self {
            AnalyzeImageError::Unreadable(_)
            | AnalyzeImageError::MissingFile
            | AnalyzeImageError::Multipart(_) => StatusCode::BAD_REQUEST,
            AnalyzeImageError::Prediction(_)
            | AnalyzeImageError::ImageConversion(_)
            | AnalyzeImageError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct AnalyzeImageResponse {
    pub annotated_image_base64: String,
}

#[instrument(skip(state, multipart))]
pub async fn analyze_image(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeImageResponse>, AnalyzeImageError> {
    state.metrics.record_request("analyze_image");

    let file = read_file_field(&mut multipart, "file")
        .await?
        .ok_or(AnalyzeImageError::MissingFile)?;

    let inference = state.inference.clone();
    let metrics = state.metrics.clone();
    let analyze = move || -> Result<String, AnalyzeImageError> {
        let frame = codec::decode_bytes(&file.data).map_err(AnalyzeImageError::Unreadable)?;

        let started = Instant::now();
        let result = inference.detect_and_render(&frame)?;
        metrics.record_prediction_duration(started.elapsed().as_millis() as u64, "analyze_image");
        tracing::info!("Analyzed image with {} detections", result.detections.len());

        codec::encode(&result.annotated, ANNOTATED_QUALITY)
            .map_err(AnalyzeImageError::ImageConversion)
    };
    let annotated_image_base64 = tokio::task::spawn_blocking(analyze)
        .await
        .map_err(|e| AnalyzeImageError::Task(e.to_string()))??;

    Ok(Json(AnalyzeImageResponse {
        annotated_image_base64,
    }))
}
