//! Integration tests against a real sentence-embedding model.
//!
//! These tests require:
//! 1. An ONNX export of a sentence-transformers model with `model.onnx` and
//!    `tokenizer.json` (paraphrase-multilingual-mpnet-base-v2 recommended)
//! 2. Optionally, trained classifier weights matching its dimension
//!
//! Run with: cargo test --features integ_test,onnx --test onnx_model

#[cfg(all(feature = "integ_test", feature = "onnx"))]
mod tests {
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use aluhut::classifier::ClassifierHead;
    use aluhut::embedding::onnx::OnnxEmbedder;
    use aluhut::embedding::EmbeddingProvider;

    fn model_dir() -> PathBuf {
        std::env::var("ALUHUT_TEST_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/test/model"))
    }

    fn weights_path() -> PathBuf {
        std::env::var("ALUHUT_TEST_WEIGHTS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/test/classifier.safetensors"))
    }

    fn load_embedder() -> Option<OnnxEmbedder> {
        let dir = model_dir();
        if !dir.join("model.onnx").exists() {
            eprintln!("Skipping test: model not found at {:?}", dir);
            return None;
        }
        let token_type_ids = std::env::var("ALUHUT_TEST_TOKEN_TYPE_IDS").is_ok();
        Some(OnnxEmbedder::load(&dir, token_type_ids, 256).expect("Failed to load model"))
    }

    #[tokio::test]
    async fn test_embedding_has_model_dim() {
        let Some(embedder) = load_embedder() else {
            return;
        };
        let dim = embedder.dim().expect("ONNX embedder knows its dimension");
        let vector = embedder.embed("Die Erde ist eine Scheibe").await.unwrap();
        assert_eq!(vector.len(), dim);
        assert!(vector.iter().all(|v| v.is_finite()));
    }

    #[tokio::test]
    async fn test_embedding_is_deterministic() {
        let Some(embedder) = load_embedder() else {
            return;
        };
        let a = embedder.embed("Impfungen enthalten Mikrochips").await.unwrap();
        let b = embedder.embed("Impfungen enthalten Mikrochips").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_inference_leaves_runtime_free() {
        let Some(embedder) = load_embedder() else {
            return;
        };
        let text = "Die Mondlandung wurde in einem Studio gedreht. ".repeat(40);

        let (embedded_at, ticked_at) = tokio::join!(
            async {
                embedder.embed(&text).await.unwrap();
                Instant::now()
            },
            async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Instant::now()
            }
        );
        assert!(ticked_at < embedded_at, "runtime was blocked during inference");
    }

    #[tokio::test]
    async fn test_concurrent_embeddings_agree() {
        let Some(embedder) = load_embedder() else {
            return;
        };
        let (a, b) = tokio::join!(
            embedder.embed("Chemtrails sind echt"),
            embedder.embed("Chemtrails sind echt")
        );
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_empty_text_embeds() {
        let Some(embedder) = load_embedder() else {
            return;
        };
        let vector = embedder.embed("").await.unwrap();
        assert_eq!(Some(vector.len()), embedder.dim());
    }

    #[tokio::test]
    async fn test_classifies_with_trained_weights() {
        let Some(embedder) = load_embedder() else {
            return;
        };
        let weights = weights_path();
        if !weights.exists() {
            eprintln!("Skipping test: weights not found at {:?}", weights);
            return;
        }
        let dim = embedder.dim().unwrap();
        let head = ClassifierHead::load(&weights, dim).expect("Failed to load weights");

        let vector = embedder
            .embed("Die Regierung versteckt die Wahrheit über Chemtrails")
            .await
            .unwrap();
        let probs = head.forward(&vector).unwrap();
        println!("p(conspiracy) = {}", probs[1]);
        assert!((probs[0] + probs[1] - 1.0).abs() < 1e-5);
        assert!((0.0..=1.0).contains(&probs[1]));
    }
}
