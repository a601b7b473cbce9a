mod fixtures;
pub use fixtures::*;

use async_trait::async_trait;
use image::RgbImage;
use microscope_detection::{
    config::ModelConfig, ColorLabel, Detection, InferenceService, ModelError, ModelService,
    Renderer,
};
use microscope_server::{
    assistant::{AssistantError, ChatClient},
    config::{AssistantConfig, Config, LogLevel, ServerConfig, StreamConfig, UploadConfig},
    server::HttpServer,
};
use serde_json::Value;
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio::sync::broadcast;

/// Reports one object covering the middle of every frame.
pub struct MockModelService {
    class_labels: Vec<ColorLabel>,
}

impl MockModelService {
    pub fn new() -> Self {
        Self {
            class_labels: vec![ColorLabel {
                label: "cocci".to_string(),
                red: 0,
                green: 255,
                blue: 0,
            }],
        }
    }
}

impl ModelService for MockModelService {
    fn predict(&self, frame: &RgbImage) -> Result<Vec<Detection>, ModelError> {
        let (width, height) = (frame.width() as f32, frame.height() as f32);
        Ok(vec![Detection {
            class_id: 0,
            class_label: "cocci".to_string(),
            color: [0, 255, 0],
            confidence: 0.91,
            x1: width / 4.0,
            y1: height / 4.0,
            x2: width * 3.0 / 4.0,
            y2: height * 3.0 / 4.0,
        }])
    }

    fn labels(&self) -> &[ColorLabel] {
        &self.class_labels
    }
}

#[derive(Default)]
pub struct MockAssistant {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub last_messages: Mutex<Vec<Value>>,
}

impl MockAssistant {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for MockAssistant {
    async fn complete(&self, messages: Vec<Value>) -> Result<String, AssistantError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages;
        if self.fail {
            return Err(AssistantError::Status {
                status: 503,
                body: "upstream secret detail".to_string(),
            });
        }
        Ok("Se observan cocos agrupados en racimos.".to_string())
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub assistant: Arc<MockAssistant>,
    shutdown_tx: broadcast::Sender<()>,
    _web_root: tempfile::TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn write_web_root(root: &Path) -> std::io::Result<()> {
    std::fs::write(root.join("index.html"), "<html><body>MicroOV</body></html>")?;
    std::fs::write(root.join("sw.js"), "self.addEventListener('fetch', () => {});")?;
    std::fs::write(root.join("manifest.json"), r#"{"name":"MicroOV"}"#)?;
    std::fs::create_dir_all(root.join("static"))?;
    std::fs::write(root.join("static").join("main.js"), "console.log('ok');")?;
    Ok(())
}

pub fn test_config(web_root: &Path) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            web_root: web_root.to_path_buf(),
            static_dir: web_root.join("static"),
            max_body_bytes: 10 * 1024 * 1024,
        },
        log_level: LogLevel::Debug,
        model: ModelConfig {
            model_dir: PathBuf::from("models"),
            onnx_file: "unused.onnx".to_string(),
            num_instances: 1,
            min_probability: 0.5,
            iou_threshold: 0.7,
            labels_dir: PathBuf::from("models"),
            labels_file: "unused.txt".to_string(),
            font_file: None,
        },
        stream: StreamConfig::default(),
        upload: UploadConfig::default(),
        assistant: AssistantConfig::default(),
    }
}

pub async fn spawn_server(assistant: MockAssistant) -> anyhow::Result<TestServer> {
    let web_root = tempfile::TempDir::new()?;
    write_web_root(web_root.path())?;

    let config = test_config(web_root.path());
    let assistant = Arc::new(assistant);
    let inference = InferenceService::new(Arc::new(MockModelService::new()), Renderer::default());

    let server = HttpServer::new(inference, assistant.clone(), &config).await?;
    let addr = server.local_addr()?;

    let (shutdown_tx, _) = broadcast::channel(1);
    server.run(shutdown_tx.subscribe()).await?;

    Ok(TestServer {
        addr,
        assistant,
        shutdown_tx,
        _web_root: web_root,
    })
}
