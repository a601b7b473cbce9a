use crate::config::AssistantConfig;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::instrument;

const SYSTEM_PROMPT: &str = "Eres Luna, una IA de microscopía. \
Actúas como técnico de laboratorio.\n\
Describe visualmente la imagen de forma técnica y profesional.\n\
No emitas diagnósticos ni recomendaciones médicas.";

const UNKNOWN_SAMPLE: &str = "indefinido";

static SAMPLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)La muestra es (.*?)(?: con| y un pH)").expect("sample pattern is valid")
});

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("No API key configured for the language model")]
    MissingApiKey,
    #[error("Request to the language model failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Language model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Language model returned no content")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Pulls the sample type out of the user's framing sentence, e.g.
/// "La muestra es sangre con tinción Gram" yields "sangre".
pub fn extract_sample_type(prompt: &str) -> String {
    SAMPLE_PATTERN
        .captures(prompt)
        .and_then(|captures| captures.get(1))
        .map(|sample| sample.as_str().trim().to_lowercase())
        .unwrap_or_else(|| UNKNOWN_SAMPLE.to_string())
}

/// Builds the chat payload: system prompt with the extracted context, prior
/// turns as plain text, and the image attached to the final turn only.
pub fn build_messages(image_base64: &str, turns: &[ChatTurn]) -> Vec<Value> {
    let last_prompt = turns.last().map(|turn| turn.content.as_str()).unwrap_or("");
    let sample_type = extract_sample_type(last_prompt);

    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(json!({
        "role": "system",
        "content": format!("{}\nContexto: {}.", SYSTEM_PROMPT, sample_type),
    }));

    if let Some((last, history)) = turns.split_last() {
        for turn in history {
            messages.push(json!({ "role": turn.role, "content": turn.content }));
        }
        messages.push(json!({
            "role": "user",
            "content": [
                { "type": "text", "text": last.content },
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:image/jpeg;base64,{}", image_base64) },
                },
            ],
        }));
    }

    messages
}

#[async_trait]
pub trait ChatClient: Send + Sync + 'static {
    async fn complete(&self, messages: Vec<Value>) -> Result<String, AssistantError>;
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &AssistantConfig, api_key: Option<String>) -> Result<Self, AssistantError> {
        let http = reqwest::Client::builder()
            .timeout(config.get_timeout())
            .build()?;
        Ok(Self {
            http,
            url: config.get_completions_url(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
        })
    }

    /// Reads the key from the configured environment variable. A missing key
    /// only surfaces on the first completion request.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let api_key = config.read_api_key();
        if api_key.is_none() {
            tracing::warn!("{} is not set, assistant requests will fail", config.api_key_env);
        }
        Self::new(config, api_key)
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    #[instrument(skip(self, messages), fields(model = %self.model, turns = messages.len()))]
    async fn complete(&self, messages: Vec<Value>) -> Result<String, AssistantError> {
        let api_key = self.api_key.as_deref().ok_or(AssistantError::MissingApiKey)?;

        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AssistantError::EmptyResponse)
    }
}
