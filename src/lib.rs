#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bg-matte
//!
//! A local image-matting (background-removal) core. Given a source image by
//! path, URL or in-memory bytes, it runs a segmentation model over the
//! pixels, resolves the raw output into a per-pixel alpha mask at the
//! source's resolution, composites either the foreground cutout or the
//! isolated background, and hands the lossless RGBA PNG to a pluggable
//! persistence collaborator.
//!
//! ## Features
//!
//! - **Two model profiles**: `small` (quantized, 512px working resolution)
//!   and `medium` (full precision, 1024px), downloaded and cached on first
//!   use
//! - **Shared model lifecycle**: the model loads exactly once per process;
//!   concurrent requests share the in-flight load, and a failed load resets
//!   so the next request may retry
//! - **Foreground and background modes** through one compositing path: the
//!   background layer is the same composite applied to the inverted mask
//! - **Hardware acceleration**: CUDA and `CoreML` execution providers with
//!   automatic fallback to CPU
//! - **Pluggable persistence**: implement [`ArtifactStore`] over your object
//!   storage; a filesystem store is included for local runs
//!
//! ## Quick Start
//!
#![cfg_attr(feature = "onnx", doc = "```rust,no_run")]
#![cfg_attr(not(feature = "onnx"), doc = "```rust,no_run,ignore")]
//! use bg_matte::{FsArtifactStore, MattingPipeline, SourceReference};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(FsArtifactStore::new("./artifacts".into()));
//! let pipeline = MattingPipeline::with_onnx(store)?;
//!
//! let source = SourceReference::from_path("input.jpg", "user-42");
//! let result = pipeline.remove_background(&source).await?;
//! println!("stored at {}", result.artifact.url);
//! # Ok(())
//! # }
//! ```
//!
//! Requests are configured per call through [`MattingOptions`]:
//!
//! ```rust,no_run
//! use bg_matte::{MattingOptions, ModelProfile, OutputMode, SourceReference};
//!
//! let options = MattingOptions::builder()
//!     .mode(OutputMode::Background)
//!     .model_profile(ModelProfile::Small)
//!     .quality(95)
//!     .build();
//! let source = SourceReference::from_url("https://example.com/photo.jpg", "user-42")
//!     .with_options(options);
//! ```
//!
//! ## Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend via `ort`, with CUDA and
//!   `CoreML` execution-provider support
//!
//! ## Error Handling
//!
//! Each stage has exactly one error kind; failures surface as
//! [`BackgroundRemovalError`] carrying the failing [`Stage`] next to the
//! stage-local [`MatteError`]. Nothing in this core retries; retry policy
//! belongs to the caller.

pub mod backends;
pub mod composite;
pub mod config;
pub mod decode;
pub mod download;
pub mod error;
pub mod inference;
pub mod loader;
pub mod mask;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod resource;
pub mod source;
pub mod storage;

pub use composite::{CompositeResult, Compositor};
pub use config::{ExecutionProvider, MattingOptions, MattingOptionsBuilder, OutputMode};
pub use decode::{CanonicalImage, CANONICAL_CHANNELS};
pub use download::ModelFetcher;
pub use error::{BackgroundRemovalError, MatteError, Result, Stage};
pub use inference::InferenceBackend;
pub use loader::ImageLoader;
pub use mask::{AlphaMask, MaskStatistics};
pub use models::{ModelInfo, ModelProfile, Preprocessor, ProfileSpec};
pub use pipeline::{MattingPipeline, MattingResult, ProcessingTimings};
pub use preprocess::ImagePreprocessor;
pub use resource::{ModelHandle, ModelLoader, ModelResource};
pub use source::{SourceKind, SourceReference};
pub use storage::{
    artifact_file_name, ArtifactStore, FsArtifactStore, MemoryArtifactStore, StoredArtifact,
    ARTIFACT_CATEGORY, ARTIFACT_CONTENT_TYPE,
};

#[cfg(feature = "onnx")]
pub use backends::{OnnxBackend, OnnxModelLoader};
pub use backends::{MockBackend, MockModelLoader};

/// One-shot convenience: build an ONNX pipeline and process a single source
///
/// Each call constructs its own pipeline, so the model is loaded per call.
/// Long-lived callers should hold a [`MattingPipeline`] instead and reuse it
/// across requests to amortize the load.
///
/// # Errors
///
/// Returns [`BackgroundRemovalError`] labeling the failing stage.
#[cfg(feature = "onnx")]
pub async fn remove_background(
    source: &SourceReference,
    store: std::sync::Arc<dyn ArtifactStore>,
) -> Result<MattingResult> {
    let pipeline = MattingPipeline::with_onnx(store)?;
    pipeline.remove_background(source).await
}
