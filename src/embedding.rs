//! Sentence embedding providers.
//!
//! The classifier only needs a fixed-length vector per text. Where it comes
//! from is up to the provider: a remote feature-extraction endpoint, a local
//! ONNX model (feature `onnx`), or a deterministic stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::provider::{http_client, post_json, ProviderError};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Output dimension, if the provider knows it ahead of time.
    fn dim(&self) -> Option<usize> {
        None
    }
}

/// Build the provider selected in the configuration.
pub fn from_config(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>, ProviderError> {
    match config {
        EmbeddingConfig::Http { endpoint, api_key } => {
            Ok(Box::new(HttpEmbedder::new(endpoint.clone(), api_key.clone())?))
        }
        #[cfg(feature = "onnx")]
        EmbeddingConfig::Onnx {
            model_dir,
            token_type_ids,
            max_length,
        } => Ok(Box::new(onnx::OnnxEmbedder::load(
            model_dir,
            *token_type_ids,
            *max_length,
        )?)),
        #[cfg(not(feature = "onnx"))]
        EmbeddingConfig::Onnx { .. } => Err(ProviderError::Unavailable(
            "this build has no ONNX support (enable the `onnx` feature)".into(),
        )),
        EmbeddingConfig::Stub { dim } => Ok(Box::new(StubEmbedder::new(*dim))),
    }
}

/// Feature-extraction endpoint speaking the Hugging Face inference format:
/// `{"inputs": text}` in, a vector (or a batch holding one vector) out.
pub struct HttpEmbedder {
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Single(Vec<f32>),
    Batch(Vec<Vec<f32>>),
}

impl HttpEmbedder {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint,
            api_key,
            http: http_client()?,
        })
    }
}

fn parse_embedding(body: &str) -> Result<Vec<f32>, ProviderError> {
    let parsed: EmbedResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let vector = match parsed {
        EmbedResponse::Single(v) => v,
        EmbedResponse::Batch(batch) => batch.into_iter().next().ok_or(ProviderError::Empty)?,
    };
    if vector.is_empty() {
        return Err(ProviderError::Empty);
    }
    // Out-of-range JSON numbers parse as infinity.
    if let Some(i) = vector.iter().position(|v| !v.is_finite()) {
        return Err(ProviderError::Parse(format!(
            "embedding component {i} is not finite ({})",
            vector[i]
        )));
    }
    Ok(vector)
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = post_json(
            &self.http,
            &self.endpoint,
            self.api_key.as_deref(),
            &EmbedRequest { inputs: text },
        )
        .await?;
        let vector = parse_embedding(&body)?;
        debug!(dim = vector.len(), "received embedding");
        Ok(vector)
    }
}

/// Deterministic embedder: the same text always maps to the same vector.
///
/// Values are derived from an FNV-1a hash of the text and lie in `[-1, 1)`.
pub struct StubEmbedder {
    dim: usize,
}

impl StubEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut state = text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        });
        (0..self.dim)
            .map(|_| {
                // xorshift64
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 40) as f32 / (1u64 << 23) as f32 - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.vector_for(text))
    }

    fn dim(&self) -> Option<usize> {
        Some(self.dim)
    }
}

#[cfg(feature = "onnx")]
pub mod onnx {
    //! Local sentence-transformers model through ONNX Runtime.
    //!
    //! The model directory must contain `model.onnx` and `tokenizer.json`.
    //! Token embeddings are mean-pooled over the attention mask and returned
    //! without normalization, as the classifier was trained on raw pooled
    //! vectors.

    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use ort::session::Session;
    use ort::value::Tensor;
    use tokenizers::Tokenizer;
    use tracing::info;

    use super::EmbeddingProvider;
    use crate::provider::ProviderError;

    /// Inference runs on tokio's blocking pool.
    pub struct OnnxEmbedder {
        model: Arc<Model>,
    }

    struct Model {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        token_type_ids: bool,
        dim: usize,
    }

    fn model_err(e: impl std::fmt::Display) -> ProviderError {
        ProviderError::Model(e.to_string())
    }

    impl OnnxEmbedder {
        pub fn load(
            model_dir: &Path,
            token_type_ids: bool,
            max_length: usize,
        ) -> Result<Self, ProviderError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            for required in [&model_path, &tokenizer_path] {
                if !required.exists() {
                    return Err(ProviderError::Unavailable(format!(
                        "{} not found",
                        required.display()
                    )));
                }
            }

            let session = Session::builder()
                .map_err(model_err)?
                .commit_from_file(&model_path)
                .map_err(model_err)?;

            let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(768);

            let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| model_err(format!("load tokenizer: {e}")))?;
            tokenizer
                .with_truncation(Some(tokenizers::TruncationParams {
                    max_length,
                    ..Default::default()
                }))
                .map_err(|e| model_err(format!("set truncation: {e}")))?;

            info!(dim, model = %model_path.display(), "loaded embedding model");
            Ok(Self {
                model: Arc::new(Model {
                    session: Mutex::new(session),
                    tokenizer,
                    token_type_ids,
                    dim,
                }),
            })
        }
    }

    impl Model {
        fn embed_blocking(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| model_err(format!("tokenize: {e}")))?;

            let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let mask: Vec<i64> = encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect();
            let seq_len = ids.len();
            let shape = [1i64, seq_len as i64];

            let ids_tensor = Tensor::from_array((shape, ids.into_boxed_slice())).map_err(model_err)?;
            let mask_tensor =
                Tensor::from_array((shape, mask.clone().into_boxed_slice())).map_err(model_err)?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| model_err("session lock poisoned"))?;

            // XLM-R based multilingual models take no token type ids.
            let run = if self.token_type_ids {
                let types: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
                let type_tensor =
                    Tensor::from_array((shape, types.into_boxed_slice())).map_err(model_err)?;
                session.run(ort::inputs![
                    "input_ids" => ids_tensor,
                    "attention_mask" => mask_tensor,
                    "token_type_ids" => type_tensor,
                ])
            } else {
                session.run(ort::inputs![
                    "input_ids" => ids_tensor,
                    "attention_mask" => mask_tensor,
                ])
            };
            let outputs = run.map_err(model_err)?;

            // Token embeddings: [1, seq_len, dim].
            let (output_shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(model_err)?;
            let dims: &[i64] = output_shape;
            if dims.len() != 3 || dims[0] != 1 || dims[2] as usize != self.dim {
                return Err(model_err(format!(
                    "unexpected output shape {dims:?}, expected [1, {seq_len}, {}]",
                    self.dim
                )));
            }

            let mut pooled = vec![0.0f32; self.dim];
            let mut count = 0.0f32;
            for (j, &m) in mask.iter().enumerate().take(dims[1] as usize) {
                if m > 0 {
                    let offset = j * self.dim;
                    for (d, p) in pooled.iter_mut().enumerate() {
                        *p += data[offset + d];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                for p in &mut pooled {
                    *p /= count;
                }
            }
            Ok(pooled)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for OnnxEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            let model = Arc::clone(&self.model);
            let text = text.to_owned();
            tokio::task::spawn_blocking(move || model.embed_blocking(&text))
                .await
                .map_err(|e| model_err(format!("embedding task failed: {e}")))?
        }

        fn dim(&self) -> Option<usize> {
            Some(self.model.dim)
        }
    }

    /// Last dimension of the model's first output, if static.
    fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
        match output_type {
            ort::value::ValueType::Tensor { shape, .. } => shape
                .last()
                .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_vector() {
        assert_eq!(parse_embedding("[0.5, -1.0, 2]").unwrap(), vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_parse_batch_takes_first() {
        assert_eq!(parse_embedding("[[1.0, 2.0], [3.0, 4.0]]").unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(parse_embedding("[]"), Err(ProviderError::Empty)));
        assert!(matches!(parse_embedding("[[]]"), Err(ProviderError::Empty)));
    }

    #[test]
    fn test_parse_rejects_overflowing_values() {
        let err = parse_embedding("[1e300, 0.0]").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(ref e) if e.contains("component 0")));
        assert!(matches!(parse_embedding("[[0.5, -1e39]]"), Err(ProviderError::Parse(_))));
    }

    #[test]
    fn test_parse_error_body() {
        let err = parse_embedding(r#"{"error": "model is loading"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[tokio::test]
    async fn test_stub_is_deterministic() {
        let stub = StubEmbedder::new(16);
        let a = stub.embed("Chemtrails").await.unwrap();
        let b = stub.embed("Chemtrails").await.unwrap();
        let c = stub.embed("chemtrails").await.unwrap();
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| (-1.0..1.0).contains(v)));
        assert_eq!(stub.dim(), Some(16));
    }

    #[tokio::test]
    async fn test_stub_from_config() {
        let provider = from_config(&EmbeddingConfig::Stub { dim: 4 }).unwrap();
        assert_eq!(provider.dim(), Some(4));
        assert_eq!(provider.embed("").await.unwrap().len(), 4);
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_unavailable_without_feature() {
        let config = EmbeddingConfig::Onnx {
            model_dir: std::path::PathBuf::from("models/x"),
            token_type_ids: false,
            max_length: 128,
        };
        assert!(matches!(from_config(&config), Err(ProviderError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_http_connection_failure() {
        // Nothing listens on port 9 (discard) on test machines.
        let embedder = HttpEmbedder::new("http://127.0.0.1:9/embed".into(), None).unwrap();
        let err = embedder.embed("hallo").await.unwrap_err();
        assert!(matches!(err, ProviderError::Http(_)));
    }
}
