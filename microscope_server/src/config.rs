use microscope_detection::config::ModelConfig;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub log_level: LogLevel,
    pub model: ModelConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding `index.html`, `sw.js` and `manifest.json`.
    #[serde(default = "default_web_root")]
    pub web_root: PathBuf,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_web_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_max_body_bytes() -> usize {
    20 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_stream_quality")]
    pub jpeg_quality: u8,
    /// Per-frame inference deadline. Unset means frames wait for the model.
    #[serde(default)]
    pub inference_timeout_ms: Option<u64>,
}

fn default_stream_quality() -> u8 {
    50
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_stream_quality(),
            inference_timeout_ms: None,
        }
    }
}

impl StreamConfig {
    pub fn get_inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_upload_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

fn default_max_dimension() -> u32 {
    640
}

fn default_upload_quality() -> u8 {
    75
}

fn default_allowed_mime_types() -> Vec<String> {
    vec!["image/jpeg".to_string(), "image/png".to_string()]
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            jpeg_quality: default_upload_quality(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

impl UploadConfig {
    pub fn is_allowed(&self, mime_type: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_assistant_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_assistant_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_assistant_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl AssistantConfig {
    pub fn get_completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn read_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Selects which overlay file is read on top of `base.yaml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "Unknown environment `{}`, expected `local` or `production`",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            other => Err(format!(
                "Unsupported log level `{}`, expected `debug` or `info`",
                other
            )),
        }
    }
}

/// Reads `configuration/` under the working directory for the environment
/// named by `APP_ENVIRONMENT` (default `local`).
pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| Environment::Local.as_str().to_string())
        .parse::<Environment>()
        .map_err(config::ConfigError::Message)?;

    let config = load_configuration(&base_path.join("configuration"), environment)?;
    if let Err(e) = config.model.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }
    Ok(config)
}

/// Layers `base.yaml`, then `{environment}.yaml`, then `MICROOV_*` variables
/// (`__` separates nested keys, e.g. `MICROOV_SERVER__PORT`).
pub fn load_configuration(
    directory: &Path,
    environment: Environment,
) -> Result<Config, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::from(directory.join("base.yaml")))
        .add_source(
            config::File::from(directory.join(format!("{}.yaml", environment.as_str())))
                .required(false),
        )
        .add_source(
            config::Environment::with_prefix("MICROOV")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize::<Config>()
}
