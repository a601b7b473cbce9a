mod analyze_image;
mod analyze_with_ai;
mod assets;
mod health;
mod metrics;
mod stream;
mod upload_image;

use crate::server::SharedState;
use axum::{
    extract::{multipart::MultipartError, Multipart},
    routing::{get, post},
    Router,
};
use bytes::Bytes;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(assets::index))
        .route("/sw.js", get(assets::service_worker))
        .route("/manifest.json", get(assets::manifest))
        .route("/static/{*path}", get(assets::static_asset))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/upload_image/", post(upload_image::upload_image))
        .route("/analyze_image/", post(analyze_image::analyze_image))
        .route("/analyze_with_ai/", post(analyze_with_ai::analyze_with_ai))
        .route("/ws", get(stream::stream_frames))
}

/// A file part pulled out of a multipart form.
pub(crate) struct UploadedFile {
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Returns the first part named `name`, or `None` if the form has none.
pub(crate) async fn read_file_field(
    multipart: &mut Multipart,
    name: &str,
) -> Result<Option<UploadedFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(name) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;
        return Ok(Some(UploadedFile { content_type, data }));
    }
    Ok(None)
}
