//! Text completion providers for `/complete` and `/beende`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::provider::{http_client, post_json, ProviderError};

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Continue `prompt`, producing at most `max_length` tokens in total.
    async fn complete(&self, prompt: &str, max_length: usize) -> Result<String, ProviderError>;
}

pub fn from_config(config: &GenerationConfig) -> Result<Box<dyn GenerationProvider>, ProviderError> {
    match config {
        GenerationConfig::Http { endpoint, api_key } => {
            Ok(Box::new(HttpGenerator::new(endpoint.clone(), api_key.clone())?))
        }
        GenerationConfig::Stub => Ok(Box::new(StubGenerator)),
    }
}

/// Text-generation endpoint speaking the Hugging Face inference format.
pub struct HttpGenerator {
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Serialize)]
struct GenerateParameters {
    max_length: usize,
    return_full_text: bool,
}

#[derive(Deserialize, Debug)]
struct Generated {
    generated_text: String,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum GenerateResponse {
    List(Vec<Generated>),
    Single(Generated),
    Error { error: String },
}

impl HttpGenerator {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint,
            api_key,
            http: http_client()?,
        })
    }
}

fn parse_generation(body: &str) -> Result<String, ProviderError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    match parsed {
        GenerateResponse::List(list) => list
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or(ProviderError::Empty),
        GenerateResponse::Single(g) => Ok(g.generated_text),
        GenerateResponse::Error { error } => Err(ProviderError::Api(error)),
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerator {
    async fn complete(&self, prompt: &str, max_length: usize) -> Result<String, ProviderError> {
        info!("✍️ Generating completion for {} chars", prompt.chars().count());

        let request = GenerateRequest {
            inputs: prompt,
            parameters: GenerateParameters {
                max_length,
                return_full_text: true,
            },
        };

        let body = post_json(&self.http, &self.endpoint, self.api_key.as_deref(), &request).await?;
        debug!("generation response: {} bytes", body.len());
        parse_generation(&body)
    }
}

/// Echoes the prompt with a fixed continuation. Never fails.
pub struct StubGenerator;

#[async_trait]
impl GenerationProvider for StubGenerator {
    async fn complete(&self, prompt: &str, max_length: usize) -> Result<String, ProviderError> {
        let text = format!("{prompt} und dann kamen die Echsenmenschen");
        Ok(text.split_whitespace().take(max_length).collect::<Vec<_>>().join(" "))
    }
}
