//! One streaming connection: receive a frame, annotate it, send it back,
//! strictly one at a time until the peer goes away.

use crate::{
    codec::{self, CodecError},
    telemetry::Metrics,
};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use microscope_detection::{InferenceService, ModelError};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::instrument;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to receive message: {0}")]
    Receive(String),
    #[error("Failed to send message: {0}")]
    Send(String),
    #[error("Failed to close connection: {0}")]
    Close(String),
}

/// The duplex channel a session reads frames from and writes results to.
#[async_trait]
pub trait FrameTransport: Send {
    /// `None` once the peer has gone away.
    async fn recv(&mut self) -> Option<Result<Message, TransportError>>;

    async fn send(&mut self, message: Message) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl FrameTransport for WebSocket {
    async fn recv(&mut self) -> Option<Result<Message, TransportError>> {
        WebSocket::recv(self)
            .await
            .map(|result| result.map_err(|e| TransportError::Receive(e.to_string())))
    }

    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        WebSocket::send(self, message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(self)
            .await
            .map_err(|e| TransportError::Close(e.to_string()))
    }
}

/// Wire format of both inbound and outbound frames.
#[derive(Debug, Serialize, Deserialize)]
pub struct FrameMessage {
    pub image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

/// Why a frame produced no response. None of these end the session.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("Message is not a frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Ignoring non-text message")]
    NonText,
    #[error("Frame could not be decoded: {0}")]
    Decode(CodecError),
    #[error("Inference failed: {0}")]
    Inference(#[from] ModelError),
    #[error("Result could not be encoded: {0}")]
    Encode(CodecError),
    #[error("Previous frame is still being processed")]
    Busy,
}

impl SkipReason {
    pub fn as_label(&self) -> &'static str {
        match self {
            SkipReason::Malformed(_) => "malformed",
            SkipReason::NonText => "non_text",
            SkipReason::Decode(_) => "decode",
            SkipReason::Inference(ModelError::Timeout(_)) => "timeout",
            SkipReason::Inference(_) => "inference",
            SkipReason::Encode(_) => "encode",
            SkipReason::Busy => "busy",
        }
    }
}

#[derive(Debug)]
pub enum FrameOutcome {
    Responded,
    Skipped(SkipReason),
    PeerClosed,
    TransportFailed(TransportError),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub jpeg_quality: u8,
    pub inference_timeout: Option<Duration>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub responded: u64,
    pub skipped: u64,
}

/// Decode, inference, render and encode of one frame on the blocking pool.
type FrameTask = JoinHandle<Result<String, SkipReason>>;

pub struct StreamSession<T: FrameTransport> {
    id: u64,
    transport: T,
    state: SessionState,
    inference: InferenceService,
    settings: SessionSettings,
    metrics: Arc<Metrics>,
    summary: SessionSummary,
    /// A pass that outlived its deadline. At most one frame task exists per
    /// session, so no new frame is started until this one has finished.
    overdue: Option<FrameTask>,
}

impl<T: FrameTransport> StreamSession<T> {
    pub fn new(
        transport: T,
        inference: InferenceService,
        settings: SessionSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        metrics.session_opened();
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            state: SessionState::Open,
            inference,
            settings,
            metrics,
            summary: SessionSummary::default(),
            overdue: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Drives the session until the peer disconnects or the transport fails,
    /// then closes it.
    #[instrument(skip(self), fields(session_id = self.id))]
    pub async fn run(&mut self) -> SessionSummary {
        tracing::info!("Streaming session opened");

        while self.state == SessionState::Open {
            match self.step().await {
                FrameOutcome::Responded => {}
                FrameOutcome::Skipped(reason) => {
                    tracing::warn!("Skipping frame: {}", reason);
                }
                FrameOutcome::PeerClosed => {
                    tracing::info!("Peer closed the stream");
                    self.state = SessionState::Closing;
                }
                FrameOutcome::TransportFailed(err) => {
                    tracing::warn!("Transport failed: {}", err);
                    self.state = SessionState::Closing;
                }
            }
        }

        self.close().await;
        tracing::info!(
            responded = self.summary.responded,
            skipped = self.summary.skipped,
            "Streaming session closed"
        );
        self.summary
    }

    /// Handles exactly one inbound message. A response is sent only for a
    /// frame that made it through decode, inference and encode.
    pub async fn step(&mut self) -> FrameOutcome {
        let message = match self.transport.recv().await {
            None => return FrameOutcome::PeerClosed,
            Some(Err(err)) => return FrameOutcome::TransportFailed(err),
            Some(Ok(message)) => message,
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return FrameOutcome::PeerClosed,
            _ => return self.skip(SkipReason::NonText),
        };

        if self.overdue.as_ref().is_some_and(|task| !task.is_finished()) {
            return self.skip(SkipReason::Busy);
        }
        // Its frame was already skipped when the deadline passed.
        self.overdue = None;

        let mut task = spawn_frame_task(
            self.inference.clone(),
            self.metrics.clone(),
            self.settings.jpeg_quality,
            text.as_str().to_owned(),
        );

        let joined = match self.settings.inference_timeout {
            None => task.await,
            Some(limit) => {
                let waited = tokio::time::timeout(limit, &mut task).await;
                match waited {
                    Ok(joined) => joined,
                    Err(_) => {
                        self.overdue = Some(task);
                        let limit_ms = limit.as_millis() as u64;
                        return self.skip(SkipReason::Inference(ModelError::Timeout(limit_ms)));
                    }
                }
            }
        };

        let reply = match joined {
            Ok(Ok(reply)) => reply,
            Ok(Err(reason)) => return self.skip(reason),
            Err(e) => return self.skip(SkipReason::Inference(ModelError::Task(e.to_string()))),
        };

        match self.transport.send(Message::Text(reply.into())).await {
            Ok(()) => {
                self.summary.responded += 1;
                FrameOutcome::Responded
            }
            Err(err) => FrameOutcome::TransportFailed(err),
        }
    }

    fn skip(&mut self, reason: SkipReason) -> FrameOutcome {
        self.summary.skipped += 1;
        self.metrics.record_frame_skipped(reason.as_label());
        FrameOutcome::Skipped(reason)
    }

    /// Releases the transport, then waits for an overdue frame task so no
    /// work outlives the session. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        if let Err(err) = self.transport.close().await {
            tracing::debug!("Ignoring close error: {}", err);
        }
        if let Some(task) = self.overdue.take() {
            if let Err(err) = task.await {
                tracing::debug!("Overdue frame task failed: {}", err);
            }
        }
        self.state = SessionState::Closed;
    }
}

impl<T: FrameTransport> Drop for StreamSession<T> {
    fn drop(&mut self) {
        self.metrics.session_closed();
    }
}

fn spawn_frame_task(
    inference: InferenceService,
    metrics: Arc<Metrics>,
    jpeg_quality: u8,
    text: String,
) -> FrameTask {
    tokio::task::spawn_blocking(move || -> Result<String, SkipReason> {
        let request: FrameMessage = serde_json::from_str(&text)?;
        let frame = codec::decode(&request.image).map_err(SkipReason::Decode)?;

        let started = Instant::now();
        let result = inference.detect_and_render(&frame)?;
        metrics.record_prediction_duration(started.elapsed().as_millis() as u64, "ws");

        let image = codec::encode(&result.annotated, jpeg_quality).map_err(SkipReason::Encode)?;
        Ok(serde_json::to_string(&FrameMessage { image })?)
    })
}
