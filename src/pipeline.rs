//! End-to-end matting pipeline
//!
//! Orchestrates fetch, decode, model readiness, inference, mask resolution,
//! compositing and the single store call. Every request is self-contained;
//! only the model resources outlive a call. The CPU-bound section runs on
//! the blocking pool so a single-threaded runtime caller is never starved.

use crate::{
    composite::{CompositeResult, Compositor},
    config::MattingOptions,
    decode::CanonicalImage,
    error::{BackgroundRemovalError, MatteError, Result},
    loader::ImageLoader,
    mask::{AlphaMask, MaskStatistics},
    models::ModelProfile,
    preprocess::ImagePreprocessor,
    resource::{ModelLoader, ModelResource},
    source::SourceReference,
    storage::{
        artifact_file_name, ArtifactStore, StoredArtifact, ARTIFACT_CATEGORY,
        ARTIFACT_CONTENT_TYPE,
    },
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, span, Level};

/// Per-stage millisecond breakdown of one request
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingTimings {
    /// Model readiness wait (near zero once warm)
    pub model_load_ms: u64,
    /// Source fetch
    pub fetch_ms: u64,
    /// Decode into the canonical buffer
    pub decode_ms: u64,
    /// Resize, normalize, tensor conversion
    pub preprocess_ms: u64,
    /// Model execution
    pub inference_ms: u64,
    /// Sigmoid, quantization, resample
    pub mask_ms: u64,
    /// Alpha application and PNG encoding
    pub composite_ms: u64,
    /// Store call
    pub store_ms: u64,
    /// End-to-end wall time
    pub total_ms: u64,
}

/// Outcome of one successful matting request
#[derive(Debug, Clone)]
pub struct MattingResult {
    /// Opaque reference returned by the store
    pub artifact: StoredArtifact,
    /// Output width, always the source width
    pub width: u32,
    /// Output height, always the source height
    pub height: u32,
    /// Pixel-class counts of the resolved mask
    pub mask_statistics: MaskStatistics,
    /// Per-stage timing breakdown
    pub timings: ProcessingTimings,
}

struct BlockingOutput {
    composite: CompositeResult,
    statistics: MaskStatistics,
    preprocess_ms: u64,
    inference_ms: u64,
    mask_ms: u64,
    composite_ms: u64,
}

/// The background-removal pipeline
///
/// Holds one [`ModelResource`] per profile, all sharing the injected loader,
/// plus the fetch client and the persistence collaborator. Cheap to share
/// behind an `Arc`; every call is independent.
pub struct MattingPipeline {
    small: ModelResource,
    medium: ModelResource,
    loader: ImageLoader,
    store: Arc<dyn ArtifactStore>,
}

impl MattingPipeline {
    /// Build a pipeline around a model loader and a store
    ///
    /// # Errors
    ///
    /// Fails when the HTTP fetch client cannot be built.
    pub fn new(
        model_loader: Arc<dyn ModelLoader>,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, MatteError> {
        Ok(Self {
            small: ModelResource::new(Arc::clone(&model_loader), ModelProfile::Small),
            medium: ModelResource::new(model_loader, ModelProfile::Medium),
            loader: ImageLoader::new()?,
            store,
        })
    }

    /// Build a pipeline over the default ONNX loader
    ///
    /// # Errors
    ///
    /// Fails when the HTTP fetch client cannot be built.
    #[cfg(feature = "onnx")]
    pub fn with_onnx(store: Arc<dyn ArtifactStore>) -> Result<Self, MatteError> {
        Self::new(Arc::new(crate::backends::OnnxModelLoader::new()), store)
    }

    /// Bound every model load with a deadline
    #[must_use]
    pub fn with_model_load_timeout(mut self, timeout: Duration) -> Self {
        self.small = self.small.with_load_timeout(timeout);
        self.medium = self.medium.with_load_timeout(timeout);
        self
    }

    /// The model resource serving a profile
    #[must_use]
    pub fn resource(&self, profile: ModelProfile) -> &ModelResource {
        match profile {
            ModelProfile::Small => &self.small,
            ModelProfile::Medium => &self.medium,
        }
    }

    /// Remove or isolate the background of one source image
    ///
    /// Runs fetch → decode → model readiness → preprocess → inference →
    /// mask resolution → composite, then calls the store exactly once. The
    /// output always has the source's pixel dimensions. The first error
    /// aborts the run; nothing is stored on failure.
    ///
    /// # Errors
    ///
    /// Returns [`BackgroundRemovalError`] labeling the failing stage around
    /// the stage-local cause.
    #[instrument(
        skip(self, source),
        fields(
            source = %source.kind.display_name(),
            owner = %source.owner_id,
            mode = %source.options.mode,
            profile = %source.options.model_profile,
        )
    )]
    pub async fn remove_background(
        &self,
        source: &SourceReference,
    ) -> Result<MattingResult, BackgroundRemovalError> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let options = source.options.clone();

        info!("Starting background removal");

        let fetch_start = Instant::now();
        let bytes = self.loader.load(&source.kind, options.timeout).await?;
        timings.fetch_ms = elapsed_ms(fetch_start);
        debug!(bytes = bytes.len(), "Source fetched");

        // Decode before touching the model, so invalid input never pays the
        // model-load cost and never reaches inference.
        let decode_start = Instant::now();
        let image = tokio::task::spawn_blocking(move || CanonicalImage::decode(&bytes))
            .await
            .map_err(|e| MatteError::decode(format!("decode task failed: {e}")))??;
        timings.decode_ms = elapsed_ms(decode_start);
        let (width, height) = image.dimensions();
        debug!(width, height, "Source decoded");

        let model_start = Instant::now();
        let handle = self.resource(options.model_profile).ensure_ready().await?;
        timings.model_load_ms = elapsed_ms(model_start);

        let process_span = span!(Level::INFO, "processing", width, height);
        let opts = options.clone();
        let processed = tokio::task::spawn_blocking(move || {
            let _entered = process_span.entered();
            Self::process(&image, &handle, &opts)
        })
        .await
        .map_err(|e| MatteError::inference(format!("processing task failed: {e}")))??;
        timings.preprocess_ms = processed.preprocess_ms;
        timings.inference_ms = processed.inference_ms;
        timings.mask_ms = processed.mask_ms;
        timings.composite_ms = processed.composite_ms;

        let file_name = artifact_file_name(options.mode);
        let store_start = Instant::now();
        let artifact = self
            .store
            .store(
                &processed.composite.bytes,
                &source.owner_id,
                ARTIFACT_CATEGORY,
                &file_name,
                ARTIFACT_CONTENT_TYPE,
            )
            .await?;
        timings.store_ms = elapsed_ms(store_start);
        timings.total_ms = elapsed_ms(total_start);

        info!(
            total_ms = timings.total_ms,
            inference_ms = timings.inference_ms,
            artifact = %artifact.url,
            "Background removal complete"
        );

        Ok(MattingResult {
            artifact,
            width,
            height,
            mask_statistics: processed.statistics,
            timings,
        })
    }

    /// The CPU-bound middle of the pipeline, one blocking-pool task
    fn process(
        image: &CanonicalImage,
        handle: &crate::resource::ModelHandle,
        options: &MattingOptions,
    ) -> Result<BlockingOutput, MatteError> {
        let preprocess_start = Instant::now();
        let input = ImagePreprocessor::to_tensor(image, &handle.preprocessor)?;
        let preprocess_ms = elapsed_ms(preprocess_start);

        let inference_start = Instant::now();
        let output = handle.backend.infer(&input)?;
        let inference_ms = elapsed_ms(inference_start);

        let mask_start = Instant::now();
        let mask = AlphaMask::resolve(&output, image.dimensions())?;
        let mask_ms = elapsed_ms(mask_start);
        let statistics = mask.statistics();

        let composite_start = Instant::now();
        let composite = Compositor::composite(image, &mask, options.mode, options.quality)?;
        let composite_ms = elapsed_ms(composite_start);

        Ok(BlockingOutput {
            composite,
            statistics,
            preprocess_ms,
            inference_ms,
            mask_ms,
            composite_ms,
        })
    }
}

impl std::fmt::Debug for MattingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MattingPipeline")
            .field("small", &self.small)
            .field("medium", &self.medium)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
