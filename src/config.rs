//! Per-request processing options

use crate::models::ModelProfile;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which layer of the image the composite isolates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Transparent-background cutout of the subject
    #[default]
    Foreground,
    /// The isolated background layer (inverted mask, same compositor)
    Background,
}

impl OutputMode {
    /// Short tag used in generated artifact file names
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
        }
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Execution provider for the inference backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect: CUDA, then CoreML, then CPU
    #[default]
    Auto,
    /// CPU only
    Cpu,
    /// NVIDIA GPU acceleration (falls back to CPU when unavailable)
    Cuda,
    /// Apple Silicon acceleration (falls back to CPU when unavailable)
    #[serde(rename = "coreml")]
    CoreMl,
}

/// Options for one matting request
///
/// Immutable once built; constructed per request and discarded after
/// processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MattingOptions {
    /// Foreground cutout or isolated background
    pub mode: OutputMode,
    /// Encoder effort, 0-100. Output pixels are always lossless; this maps
    /// to PNG compression effort only.
    pub quality: u8,
    /// Which segmentation model to run
    pub model_profile: ModelProfile,
    /// Optional deadline for the source-fetch suspension point
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl MattingOptions {
    /// Create a new options builder
    #[must_use]
    pub fn builder() -> MattingOptionsBuilder {
        MattingOptionsBuilder::new()
    }
}

impl Default for MattingOptions {
    fn default() -> Self {
        Self {
            mode: OutputMode::Foreground,
            quality: 90,
            model_profile: ModelProfile::Medium,
            timeout: None,
        }
    }
}

/// Builder for [`MattingOptions`]
pub struct MattingOptionsBuilder {
    options: MattingOptions,
}

impl MattingOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: MattingOptions::default(),
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.options.mode = mode;
        self
    }

    #[must_use]
    pub fn quality(mut self, quality: u8) -> Self {
        self.options.quality = quality.min(100);
        self
    }

    #[must_use]
    pub fn model_profile(mut self, profile: ModelProfile) -> Self {
        self.options.model_profile = profile;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Build the options. Quality is clamped at the setter, so construction
    /// cannot fail.
    #[must_use]
    pub fn build(self) -> MattingOptions {
        self.options
    }
}

impl Default for MattingOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
