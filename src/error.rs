//! Error types for the matting pipeline

use thiserror::Error;

/// Result type alias for matting operations
pub type Result<T, E = BackgroundRemovalError> = std::result::Result<T, E>;

/// Stage-local error taxonomy
///
/// Each variant corresponds to exactly one pipeline stage; the pipeline wraps
/// these into [`BackgroundRemovalError`] before surfacing them to callers.
#[derive(Error, Debug)]
pub enum MatteError {
    /// The shared model/preprocessor failed to initialize
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// Source bytes could not be obtained (missing file, network failure)
    #[error("Failed to fetch source '{reference}': {reason}")]
    ImageFetch {
        /// The failing source reference, for diagnostics
        reference: String,
        /// What went wrong while fetching
        reason: String,
    },

    /// Bytes could not be decoded into a canonical pixel buffer
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// The model ran but did not produce the expected output shape/name
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The raw tensor could not be turned into a valid per-pixel mask
    #[error("Mask resolution failed: {0}")]
    MaskResolution(String),

    /// Mask and image dimensions disagree at composite time
    #[error("Compositing failed: {0}")]
    Compositing(String),

    /// The external persistence collaborator failed
    #[error("Storage failed: {0}")]
    Storage(String),
}

impl MatteError {
    /// Create a new model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new fetch error carrying the failing reference
    pub fn fetch<R: Into<String>, S: Into<String>>(reference: R, reason: S) -> Self {
        Self::ImageFetch {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::ImageDecode(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new mask resolution error
    pub fn mask<S: Into<String>>(msg: S) -> Self {
        Self::MaskResolution(msg.into())
    }

    /// Create a new compositing error
    pub fn compositing<S: Into<String>>(msg: S) -> Self {
        Self::Compositing(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// The pipeline stage this error kind belongs to
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::ModelLoad(_) => Stage::ModelLoad,
            Self::ImageFetch { .. } => Stage::Fetch,
            Self::ImageDecode(_) => Stage::Decode,
            Self::Inference(_) => Stage::Inference,
            Self::MaskResolution(_) => Stage::MaskResolution,
            Self::Compositing(_) => Stage::Compositing,
            Self::Storage(_) => Stage::Storage,
        }
    }
}

/// Pipeline stages, used to label wrapped errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Shared model/preprocessor initialization
    ModelLoad,
    /// Resolving the source reference into bytes
    Fetch,
    /// Decoding bytes into the canonical RGBA buffer
    Decode,
    /// Running the segmentation model
    Inference,
    /// Activation, quantization and resampling of the raw tensor
    MaskResolution,
    /// Alpha application and encoding
    Compositing,
    /// Persisting the encoded artifact
    Storage,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ModelLoad => "model-load",
            Self::Fetch => "fetch",
            Self::Decode => "decode",
            Self::Inference => "inference",
            Self::MaskResolution => "mask-resolution",
            Self::Compositing => "compositing",
            Self::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Top-level error surfaced to callers
///
/// Carries the failing stage next to the original cause. No stage swallows or
/// downgrades an error into a fallback result, and nothing in this core
/// retries; retry policy belongs to the caller.
#[derive(Error, Debug)]
#[error("background removal failed at stage '{stage}': {source}")]
pub struct BackgroundRemovalError {
    /// The stage the pipeline was executing when the error occurred
    pub stage: Stage,
    /// The stage-local cause
    #[source]
    pub source: MatteError,
}

impl BackgroundRemovalError {
    /// Wrap a stage-local error with an explicit stage label
    #[must_use]
    pub fn at(stage: Stage, source: MatteError) -> Self {
        Self { stage, source }
    }

    /// The stage-local error kind
    #[must_use]
    pub fn kind(&self) -> &MatteError {
        &self.source
    }
}

impl From<MatteError> for BackgroundRemovalError {
    fn from(source: MatteError) -> Self {
        Self {
            stage: source.stage(),
            source,
        }
    }
}
