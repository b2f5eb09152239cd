use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::prefilter::DEFAULT_EXCLUSION_PHRASES;

/// Environment variable overriding `telegram_bot_token`.
pub const TOKEN_ENV: &str = "ALUHUT_TELEGRAM_TOKEN";
/// Environment variable overriding `threshold`.
pub const THRESHOLD_ENV: &str = "ALUHUT_THRESHOLD";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// Where sentence embeddings come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum EmbeddingConfig {
    /// Remote feature-extraction endpoint.
    Http {
        endpoint: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    /// Local ONNX sentence-transformers model (requires the `onnx` feature).
    Onnx {
        model_dir: PathBuf,
        /// BERT exports want `token_type_ids`, XLM-R exports don't.
        #[serde(default)]
        token_type_ids: bool,
        #[serde(default = "default_max_tokens")]
        max_length: usize,
    },
    /// Deterministic hash-based vectors, for trying the bot without a model.
    Stub {
        #[serde(default = "default_embedding_dim")]
        dim: usize,
    },
}

/// Where `/complete` gets its text from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum GenerationConfig {
    Http {
        endpoint: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    Stub,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    #[serde(default = "default_threshold")]
    threshold: f32,
    /// safetensors file with the classifier head.
    #[serde(default = "default_weights")]
    classifier_weights: String,
    #[serde(default = "default_embedding_dim")]
    embedding_dim: usize,
    embedding: EmbeddingConfig,
    generation: Option<GenerationConfig>,
    #[serde(default = "default_completion_length")]
    max_completion_length: usize,
    #[serde(default)]
    exclusion_phrases: Vec<String>,
    /// Name used when the sender has none.
    #[serde(default = "default_fallback_name")]
    fallback_name: String,
    /// Directory for state files (logs). Defaults to current directory.
    data_dir: Option<String>,
}

fn default_threshold() -> f32 {
    0.7
}

fn default_weights() -> String {
    "classifier.safetensors".to_string()
}

fn default_embedding_dim() -> usize {
    768
}

fn default_max_tokens() -> usize {
    256
}

fn default_completion_length() -> usize {
    50
}

fn default_fallback_name() -> String {
    "Anonymus".to_string()
}

fn check_endpoint(section: &str, endpoint: &str) -> Result<(), ConfigError> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{section} endpoint must be an http(s) URL, got '{endpoint}'"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    /// Probabilities strictly above this are conspiracies.
    pub threshold: f32,
    pub classifier_weights: PathBuf,
    pub embedding_dim: usize,
    pub embedding: EmbeddingConfig,
    /// `None` disables `/complete` and `/beende`.
    pub generation: Option<GenerationConfig>,
    pub max_completion_length: usize,
    pub exclusion_phrases: Vec<String>,
    pub fallback_name: String,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
}

impl Config {
    /// Load from a JSON file, applying overrides from the process environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading overrides through `env`.
    pub fn load_with_env<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let mut file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if let Some(token) = env(TOKEN_ENV).filter(|t| !t.is_empty()) {
            file.telegram_bot_token = token;
        }
        if let Some(raw) = env(THRESHOLD_ENV) {
            file.threshold = raw.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("{THRESHOLD_ENV} is not a number: '{raw}'"))
            })?;
        }

        Self::validate(file)
    }

    fn validate(file: ConfigFile) -> Result<Self, ConfigError> {
        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation(format!(
                "telegram_bot_token is required (or set {TOKEN_ENV})"
            )));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }

        if !file.threshold.is_finite() || !(0.0..=1.0).contains(&file.threshold) {
            return Err(ConfigError::Validation(format!(
                "threshold must be between 0 and 1, got {}",
                file.threshold
            )));
        }
        if file.embedding_dim == 0 {
            return Err(ConfigError::Validation("embedding_dim must be positive".into()));
        }
        match &file.embedding {
            EmbeddingConfig::Http { endpoint, .. } => check_endpoint("embedding", endpoint)?,
            EmbeddingConfig::Stub { dim } if *dim != file.embedding_dim => {
                return Err(ConfigError::Validation(format!(
                    "stub embedding dim {dim} differs from embedding_dim {}",
                    file.embedding_dim
                )));
            }
            _ => {}
        }
        if let Some(GenerationConfig::Http { endpoint, .. }) = &file.generation {
            check_endpoint("generation", endpoint)?;
        }
        if file.max_completion_length == 0 {
            return Err(ConfigError::Validation("max_completion_length must be positive".into()));
        }

        let exclusion_phrases = if file.exclusion_phrases.is_empty() {
            DEFAULT_EXCLUSION_PHRASES.iter().map(|p| p.to_string()).collect()
        } else {
            file.exclusion_phrases
        };

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            threshold: file.threshold,
            classifier_weights: PathBuf::from(file.classifier_weights),
            embedding_dim: file.embedding_dim,
            embedding: file.embedding,
            generation: file.generation,
            max_completion_length: file.max_completion_length,
            exclusion_phrases,
            fallback_name: file.fallback_name,
            data_dir,
        })
    }
}
