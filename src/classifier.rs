//! Feed-forward head that turns a sentence embedding into a conspiracy
//! probability.
//!
//! Layout (input dimension `D`):
//!
//! ```text
//! dropout -> Linear(D, 2D) -> softsign -> Linear(2D, D) -> softsign -> Linear(D, 2) -> softmax
//! ```
//!
//! Dropout is the identity at inference and is not represented. Weights are
//! read from a safetensors file using PyTorch `state_dict` names and the
//! `[out, in]` row-major layout of `torch.nn.Linear`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use tracing::{debug, info};

/// Number of output classes: `[not_conspiracy, conspiracy]`.
pub const NUM_CLASSES: usize = 2;

/// Index of the conspiracy class in the output distribution.
pub const CONSPIRACY_CLASS: usize = 1;

#[derive(Debug)]
pub enum ClassifierError {
    /// Weights file missing, unreadable, malformed, or shaped for another dimension.
    Load { path: PathBuf, reason: String },
    /// Embedding length differs from the dimension the head was built for.
    DimensionMismatch { expected: usize, actual: usize },
    /// NaN or infinity in the embedding, or produced by the forward pass.
    NonFinite(&'static str),
    /// Weights could not be written.
    Save { path: PathBuf, reason: String },
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { path, reason } => {
                write!(f, "failed to load classifier weights '{}': {}", path.display(), reason)
            }
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "embedding has dimension {actual}, classifier expects {expected}")
            }
            Self::NonFinite(what) => write!(f, "{what} contains NaN or infinite values"),
            Self::Save { path, reason } => {
                write!(f, "failed to save classifier weights '{}': {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for ClassifierError {}

/// A dense layer computing `weight * x + bias`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    /// Row-major `[out_features, in_features]`.
    weight: Vec<f32>,
    bias: Vec<f32>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Returns `None` if the buffer sizes disagree with the declared shape.
    pub fn new(
        weight: Vec<f32>,
        bias: Vec<f32>,
        in_features: usize,
        out_features: usize,
    ) -> Option<Self> {
        if weight.len() != in_features * out_features || bias.len() != out_features {
            return None;
        }
        Some(Self {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        debug_assert_eq!(input.len(), self.in_features);
        self.weight
            .chunks_exact(self.in_features)
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect()
    }
}

/// `x / (1 + |x|)`, element-wise.
fn softsign(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x /= 1.0 + x.abs();
    }
}

fn le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Numerically stable softmax over the logits.
fn softmax(logits: [f32; NUM_CLASSES]) -> [f32; NUM_CLASSES] {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = logits.map(|l| (l - max).exp());
    let sum: f32 = exps.iter().sum();
    exps.map(|e| e / sum)
}

/// Inference-only classifier head. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct ClassifierHead {
    f1: Linear,
    f2: Linear,
    f3: Linear,
    dim: usize,
}

const TENSOR_NAMES: [&str; 6] = [
    "f1.weight",
    "f1.bias",
    "f2.weight",
    "f2.bias",
    "f3.weight",
    "f3.bias",
];

impl ClassifierHead {
    /// Assemble a head from its three layers, checking that they chain
    /// `D -> 2D -> D -> 2`.
    pub fn from_layers(f1: Linear, f2: Linear, f3: Linear) -> Result<Self, String> {
        let dim = f1.in_features;
        let expected = [
            (&f1, dim, 2 * dim, "f1"),
            (&f2, 2 * dim, dim, "f2"),
            (&f3, dim, NUM_CLASSES, "f3"),
        ];
        for (layer, inputs, outputs, name) in expected {
            if layer.in_features != inputs || layer.out_features != outputs {
                return Err(format!(
                    "{name} is {}x{}, expected {}x{}",
                    layer.out_features, layer.in_features, outputs, inputs
                ));
            }
        }
        if dim == 0 {
            return Err("input dimension must be positive".into());
        }
        Ok(Self { f1, f2, f3, dim })
    }

    /// Load weights from a safetensors file and verify they were trained for
    /// embeddings of `expected_dim`.
    pub fn load<P: AsRef<Path>>(path: P, expected_dim: usize) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let load_err = |reason: String| ClassifierError::Load {
            path: path.to_path_buf(),
            reason,
        };

        info!("Loading classifier weights from {:?}", path);

        let data = std::fs::read(path).map_err(|e| load_err(e.to_string()))?;
        let tensors = SafeTensors::deserialize(&data)
            .map_err(|e| load_err(format!("not a safetensors file: {e}")))?;

        let read = |name: &str, shape: &[usize]| -> Result<Vec<f32>, ClassifierError> {
            let view = tensors
                .tensor(name)
                .map_err(|_| load_err(format!("missing tensor '{name}'")))?;
            if view.dtype() != Dtype::F32 {
                return Err(load_err(format!(
                    "tensor '{name}' has dtype {:?}, expected F32",
                    view.dtype()
                )));
            }
            if view.shape() != shape {
                return Err(load_err(format!(
                    "tensor '{name}' has shape {:?}, expected {:?}",
                    view.shape(),
                    shape
                )));
            }
            Ok(view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect())
        };

        let d = expected_dim;
        let linear = |weight: Vec<f32>, bias: Vec<f32>, inputs: usize, outputs: usize| {
            Linear::new(weight, bias, inputs, outputs)
                .ok_or_else(|| load_err("tensor data does not match its shape".into()))
        };

        let f1 = linear(
            read("f1.weight", &[2 * d, d])?,
            read("f1.bias", &[2 * d])?,
            d,
            2 * d,
        )?;
        let f2 = linear(
            read("f2.weight", &[d, 2 * d])?,
            read("f2.bias", &[d])?,
            2 * d,
            d,
        )?;
        let f3 = linear(
            read("f3.weight", &[NUM_CLASSES, d])?,
            read("f3.bias", &[NUM_CLASSES])?,
            d,
            NUM_CLASSES,
        )?;

        let head = Self::from_layers(f1, f2, f3).map_err(load_err)?;
        info!(dim = head.dim, "classifier weights loaded");
        Ok(head)
    }

    /// Write the weights in the layout [`ClassifierHead::load`] reads.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ClassifierError> {
        let path = path.as_ref();
        let save_err = |reason: String| ClassifierError::Save {
            path: path.to_path_buf(),
            reason,
        };

        let layers = [
            (&self.f1, TENSOR_NAMES[0], TENSOR_NAMES[1]),
            (&self.f2, TENSOR_NAMES[2], TENSOR_NAMES[3]),
            (&self.f3, TENSOR_NAMES[4], TENSOR_NAMES[5]),
        ];
        let buffers: Vec<(&str, Vec<usize>, Vec<u8>)> = layers
            .iter()
            .flat_map(|(layer, weight_name, bias_name)| {
                [
                    (
                        *weight_name,
                        vec![layer.out_features, layer.in_features],
                        le_bytes(&layer.weight),
                    ),
                    (*bias_name, vec![layer.out_features], le_bytes(&layer.bias)),
                ]
            })
            .collect();

        let mut tensors = HashMap::new();
        for (name, shape, bytes) in &buffers {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map_err(|e| save_err(format!("tensor '{name}': {e}")))?;
            tensors.insert(*name, view);
        }

        safetensors::serialize_to_file(&tensors, &None, path).map_err(|e| save_err(e.to_string()))
    }

    /// Embedding dimension this head accepts.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Class probabilities `[not_conspiracy, conspiracy]`.
    pub fn forward(&self, embedding: &[f32]) -> Result<[f32; NUM_CLASSES], ClassifierError> {
        if embedding.len() != self.dim {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.dim,
                actual: embedding.len(),
            });
        }
        if !embedding.iter().all(|v| v.is_finite()) {
            return Err(ClassifierError::NonFinite("embedding"));
        }

        let mut x = self.f1.forward(embedding);
        softsign(&mut x);
        let mut x = self.f2.forward(&x);
        softsign(&mut x);
        let logits = self.f3.forward(&x);

        let probs = softmax([logits[0], logits[1]]);
        // Finite inputs can still overflow in the dense layers.
        if !probs.iter().all(|p| p.is_finite()) {
            return Err(ClassifierError::NonFinite("classifier output"));
        }
        debug!(logits = ?logits, probs = ?probs, "classifier forward");
        Ok(probs)
    }

    /// Probability mass on the conspiracy class, in `[0, 1]`.
    pub fn probability(&self, embedding: &[f32]) -> Result<f32, ClassifierError> {
        Ok(self.forward(embedding)?[CONSPIRACY_CLASS])
    }
}
