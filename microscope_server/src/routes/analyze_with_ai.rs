use crate::{
    assistant::{build_messages, ChatTurn},
    server::SharedState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

const MISSING_DATA: &str = "Faltan datos.";
const ASSISTANT_FAILED: &str = "Error en Luna AI.";

#[derive(Debug, Deserialize)]
pub struct AnalyzeWithAiRequest {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatTurn>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeWithAiResponse {
    pub response: String,
}

fn reply(status: StatusCode, response: &str) -> Response {
    (
        status,
        Json(AnalyzeWithAiResponse {
            response: response.to_string(),
        }),
    )
        .into_response()
}

/// Upstream failures are logged but never echoed to the caller.
#[instrument(skip(state, payload))]
pub async fn analyze_with_ai(
    State(state): State<SharedState>,
    payload: Result<Json<AnalyzeWithAiRequest>, JsonRejection>,
) -> Response {
    state.metrics.record_request("analyze_with_ai");

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("Rejected assistant request: {}", rejection);
            return reply(StatusCode::BAD_REQUEST, MISSING_DATA);
        }
    };

    let image = request.image.filter(|image| !image.trim().is_empty());
    let turns = request.messages.filter(|turns| !turns.is_empty());
    let (Some(image), Some(turns)) = (image, turns) else {
        return reply(StatusCode::BAD_REQUEST, MISSING_DATA);
    };

    let messages = build_messages(&image, &turns);
    match state.assistant.complete(messages).await {
        Ok(text) => reply(StatusCode::OK, &text),
        Err(e) => {
            tracing::error!("Assistant request failed: {}", e);
            reply(StatusCode::INTERNAL_SERVER_ERROR, ASSISTANT_FAILED)
        }
    }
}
