use crate::server::SharedState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::{Component, Path as FsPath, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Not found")]
    NotFound,
    #[error("Failed to read asset: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AssetError {
    fn into_response(self) -> Response {
        let status = match self {
            AssetError::NotFound => StatusCode::NOT_FOUND,
            AssetError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

fn content_type_for(path: &FsPath) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("json") | Some("webmanifest") => "application/json",
        Some("css") => "text/css",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

async fn serve_file(path: PathBuf, content_type: &'static str) -> Result<Response, AssetError> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("Asset not found: {:?}", path);
            Err(AssetError::NotFound)
        }
        Err(e) => Err(AssetError::Io(e)),
    }
}

/// Only plain relative paths may address the static directory.
fn resolve_static(root: &FsPath, requested: &str) -> Option<PathBuf> {
    let relative = FsPath::new(requested);
    let is_plain = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !is_plain || requested.is_empty() {
        return None;
    }
    Some(root.join(relative))
}

pub async fn index(State(state): State<SharedState>) -> Result<Response, AssetError> {
    serve_file(state.server.web_root.join("index.html"), "text/html; charset=utf-8").await
}

pub async fn service_worker(State(state): State<SharedState>) -> Result<Response, AssetError> {
    serve_file(state.server.web_root.join("sw.js"), "application/javascript").await
}

pub async fn manifest(State(state): State<SharedState>) -> Result<Response, AssetError> {
    serve_file(state.server.web_root.join("manifest.json"), "application/json").await
}

pub async fn static_asset(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<Response, AssetError> {
    let file = resolve_static(&state.server.static_dir, &path).ok_or(AssetError::NotFound)?;
    let content_type = content_type_for(&file);
    serve_file(file, content_type).await
}
