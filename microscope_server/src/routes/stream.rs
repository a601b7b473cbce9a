use crate::{
    server::SharedState,
    session::{SessionSettings, StreamSession},
};
use axum::{extract::State, extract::WebSocketUpgrade, response::Response};
use tracing::instrument;

#[instrument(skip(state, ws))]
pub async fn stream_frames(State(state): State<SharedState>, ws: WebSocketUpgrade) -> Response {
    state.metrics.record_request("ws");

    ws.on_failed_upgrade(|e| tracing::warn!("Websocket upgrade failed: {}", e))
        .on_upgrade(move |socket| async move {
            let settings = SessionSettings {
                jpeg_quality: state.stream.jpeg_quality,
                inference_timeout: state.stream.get_inference_timeout(),
            };
            let mut session = StreamSession::new(
                socket,
                state.inference.clone(),
                settings,
                state.metrics.clone(),
            );
            session.run().await;
        })
}
