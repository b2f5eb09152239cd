//! Per-process context and the two request flows.
//!
//! A [`BotContext`] is built once at startup and shared read-only between
//! all handler invocations.

use std::fmt;

use tracing::{debug, info};

use crate::classifier::{ClassifierError, ClassifierHead};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::generation::{self, GenerationProvider};
use crate::normalizer::Normalizer;
use crate::prefilter::ExclusionFilter;
use crate::provider::ProviderError;
use crate::reply::{self, Picker, Trigger, Verdict};

/// Failure while handling a single message.
#[derive(Debug)]
pub enum ProcessError {
    Embedding(ProviderError),
    Classifier(ClassifierError),
    Generation(ProviderError),
    /// `/complete` was used but no generation backend is configured.
    GenerationDisabled,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedding(e) => write!(f, "embedding failed: {e}"),
            Self::Classifier(e) => write!(f, "classification failed: {e}"),
            Self::Generation(e) => write!(f, "generation failed: {e}"),
            Self::GenerationDisabled => write!(f, "no generation backend configured"),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Embedding(e) | Self::Generation(e) => Some(e),
            Self::Classifier(e) => Some(e),
            Self::GenerationDisabled => None,
        }
    }
}

impl ProcessError {
    /// Text shown to the user instead of a reply.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::GenerationDisabled => reply::GENERATION_UNAVAILABLE_TEXT,
            _ => reply::FAILURE_TEXT,
        }
    }
}

/// Failure while building the context. Fatal at startup.
#[derive(Debug)]
pub enum StartupError {
    Classifier(ClassifierError),
    Provider(ProviderError),
    /// The embedding provider and the classifier disagree on dimension.
    Dimension { provider: usize, classifier: usize },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classifier(e) => write!(f, "{e}"),
            Self::Provider(e) => write!(f, "provider setup failed: {e}"),
            Self::Dimension {
                provider,
                classifier,
            } => write!(
                f,
                "embedding provider produces {provider}-dim vectors, classifier expects {classifier}"
            ),
        }
    }
}

impl std::error::Error for StartupError {}

pub struct BotContext {
    classifier: ClassifierHead,
    embedder: Box<dyn EmbeddingProvider>,
    generator: Option<Box<dyn GenerationProvider>>,
    normalizer: Normalizer,
    exclusion: ExclusionFilter,
    threshold: f32,
    fallback_name: String,
    max_completion_length: usize,
}

impl BotContext {
    pub fn new(
        classifier: ClassifierHead,
        embedder: Box<dyn EmbeddingProvider>,
        generator: Option<Box<dyn GenerationProvider>>,
        threshold: f32,
    ) -> Result<Self, StartupError> {
        if let Some(dim) = embedder.dim()
            && dim != classifier.dim()
        {
            return Err(StartupError::Dimension {
                provider: dim,
                classifier: classifier.dim(),
            });
        }

        Ok(Self {
            classifier,
            embedder,
            generator,
            normalizer: Normalizer::default(),
            exclusion: ExclusionFilter::default(),
            threshold,
            fallback_name: "Anonymus".to_string(),
            max_completion_length: 50,
        })
    }

    /// Load the classifier and build the providers named in `config`.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let classifier = ClassifierHead::load(&config.classifier_weights, config.embedding_dim)
            .map_err(StartupError::Classifier)?;
        let embedder = embedding::from_config(&config.embedding).map_err(StartupError::Provider)?;
        let generator = config
            .generation
            .as_ref()
            .map(generation::from_config)
            .transpose()
            .map_err(StartupError::Provider)?;

        if generator.is_none() {
            info!("No generation backend configured, /complete is disabled");
        }

        Ok(Self::new(classifier, embedder, generator, config.threshold)?
            .with_exclusion(ExclusionFilter::new(&config.exclusion_phrases))
            .with_fallback_name(config.fallback_name.clone())
            .with_max_completion_length(config.max_completion_length))
    }

    pub fn with_exclusion(mut self, exclusion: ExclusionFilter) -> Self {
        self.exclusion = exclusion;
        self
    }

    pub fn with_fallback_name(mut self, name: String) -> Self {
        self.fallback_name = name;
        self
    }

    pub fn with_max_completion_length(mut self, max_length: usize) -> Self {
        self.max_completion_length = max_length;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn display_name<'a>(&'a self, name: Option<&'a str>) -> &'a str {
        name.filter(|n| !n.trim().is_empty())
            .unwrap_or(self.fallback_name.as_str())
    }

    /// Normalize, filter and, unless excluded, classify `raw`.
    pub async fn verdict(&self, raw: &str) -> Result<(String, Verdict), ProcessError> {
        let text = self.normalizer.normalize(raw);

        if self.exclusion.check_exclusion(&text) {
            debug!("excluded: \"{}\"", preview(&text));
            return Ok((text, Verdict::Excluded));
        }

        let embedding = self
            .embedder
            .embed(&text)
            .await
            .map_err(ProcessError::Embedding)?;
        let probability = self
            .classifier
            .probability(&embedding)
            .map_err(ProcessError::Classifier)?;

        Ok((text, Verdict::Scored(probability)))
    }

    /// Full classification flow. `Ok(None)` means stay silent.
    pub async fn assess(
        &self,
        raw: &str,
        name: Option<&str>,
        trigger: Trigger,
        picker: &mut impl Picker,
    ) -> Result<Option<String>, ProcessError> {
        let (text, verdict) = self.verdict(raw).await?;

        info!("\"{}\" → {:?} ({:?})", preview(&text), verdict, trigger);

        Ok(reply::compose_verdict(
            verdict,
            trigger,
            self.threshold,
            self.display_name(name),
            &text,
            picker,
        ))
    }

    /// Completion flow for `/complete` and `/beende`.
    pub async fn complete(
        &self,
        raw: &str,
        name: Option<&str>,
        picker: &mut impl Picker,
    ) -> Result<String, ProcessError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or(ProcessError::GenerationDisabled)?;
        let prompt = self.normalizer.normalize(raw);

        let completion = generator
            .complete(&prompt, self.max_completion_length)
            .await
            .map_err(ProcessError::Generation)?;

        info!("✍️ \"{}\" → \"{}\"", preview(&prompt), preview(&completion));

        Ok(reply::compose_completion(
            &completion,
            self.display_name(name),
            picker,
        ))
    }
}

/// First 100 characters, for logging.
pub fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(100).collect();
    if preview.len() < text.len() {
        preview.push_str("...");
    }
    preview
}
