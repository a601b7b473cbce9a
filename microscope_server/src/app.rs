use crate::assistant::{ChatClient, OpenAiClient};
use crate::config::Config;
use crate::server::HttpServer;

use anyhow::Context;
use microscope_detection::{InferenceService, ModelService, OrtModelService, Renderer};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

/// Loads the detector, label font and language-model client described by
/// `config`.
fn build_services(config: &Config) -> anyhow::Result<(InferenceService, Arc<dyn ChatClient>)> {
    let model: Arc<dyn ModelService> = Arc::new(
        OrtModelService::new(&config.model).context("failed to initialize model service")?,
    );
    let renderer = Renderer::from_font_file(config.model.font_file.as_deref())
        .context("failed to load label font")?;
    let assistant: Arc<dyn ChatClient> = Arc::new(
        OpenAiClient::from_config(&config.assistant)
            .context("failed to initialize assistant client")?,
    );

    Ok((InferenceService::new(model, renderer), assistant))
}

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let (inference, assistant) = build_services(&config).inspect_err(|e| {
        tracing::error!("Startup failed: {:#}", e);
    })?;
    tracing::info!("Serving {} detection classes", inference.class_count());

    let server = HttpServer::new(inference, assistant, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, draining connections");

    let _ = shutdown_tx.send(());
    server_handle
        .await
        .context("server task panicked")?
        .context("server exited with an error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
