//! ONNX Runtime inference backend
//!
//! Wraps an `ort` session behind the [`InferenceBackend`] trait. The session
//! is built once per model load with the requested execution provider and a
//! fixed Level3 optimization level. Output extraction is deterministic: the
//! tensor named by the model profile is read, and its absence is an
//! inference error, never a fallback to positional probing.

use crate::config::ExecutionProvider;
use crate::download::ModelFetcher;
use crate::error::MatteError;
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelProfile};
use crate::resource::{ModelHandle, ModelLoader};
use ndarray::{Array4, Ix4};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};
use std::sync::Mutex;

/// ONNX Runtime backend holding one loaded session
pub struct OnnxBackend {
    // Session::run takes &mut; the mutex restores the &self contract the
    // shared model handle needs. Inference requests serialize here.
    session: Mutex<Session>,
    output_name: String,
    input_shape: (usize, usize, usize, usize),
    output_shape: (usize, usize, usize, usize),
}

impl OnnxBackend {
    /// Build a session from an in-memory ONNX payload
    ///
    /// # Errors
    ///
    /// Returns `MatteError::ModelLoad` when the session cannot be built.
    pub fn from_memory(
        model_data: &[u8],
        output_name: &str,
        working_resolution: (u32, u32),
        provider: ExecutionProvider,
    ) -> Result<Self, MatteError> {
        let builder = Session::builder()
            .map_err(|e| MatteError::model_load(format!("failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| MatteError::model_load(format!("failed to set optimization level: {e}")))?;

        let builder = Self::apply_provider(builder, provider)?;

        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(4);
        let intra_threads = cores;
        let inter_threads = (cores / 4).max(1);

        let session = builder
            .with_parallel_execution(true)
            .map_err(|e| MatteError::model_load(format!("failed to enable parallel execution: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| MatteError::model_load(format!("failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| MatteError::model_load(format!("failed to set inter threads: {e}")))?
            .commit_from_memory(model_data)
            .map_err(|e| MatteError::model_load(format!("failed to build session: {e}")))?;

        let (width, height) = working_resolution;
        let (w, h) = (width as usize, height as usize);

        Ok(Self {
            session: Mutex::new(session),
            output_name: output_name.to_string(),
            input_shape: (1, 3, h, w),
            output_shape: (1, 1, h, w),
        })
    }

    /// Attach the requested execution provider to the session builder
    fn apply_provider(
        builder: ort::session::builder::SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<ort::session::builder::SessionBuilder, MatteError> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        let builder = match provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available {
                    log::info!("Execution provider: CUDA");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available {
                    log::info!("Execution provider: CoreML");
                    providers.push(CoreMLExecutionProvider::default().build());
                }
                if providers.is_empty() {
                    log::info!("Execution provider: CPU");
                    builder
                } else {
                    builder
                        .with_execution_providers(providers)
                        .map_err(|e| {
                            MatteError::model_load(format!(
                                "failed to set execution providers: {e}"
                            ))
                        })?
                }
            },
            ExecutionProvider::Cuda => {
                if cuda_available {
                    log::info!("Execution provider: CUDA");
                    builder
                        .with_execution_providers([CUDAExecutionProvider::default().build()])
                        .map_err(|e| {
                            MatteError::model_load(format!(
                                "failed to set CUDA execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!("CUDA requested but not available, falling back to CPU");
                    builder
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    log::info!("Execution provider: CoreML");
                    builder
                        .with_execution_providers([CoreMLExecutionProvider::default().build()])
                        .map_err(|e| {
                            MatteError::model_load(format!(
                                "failed to set CoreML execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!("CoreML requested but not available, falling back to CPU");
                    builder
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("Execution provider: CPU");
                builder
            },
        };

        Ok(builder)
    }
}

impl std::fmt::Debug for OnnxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxBackend")
            .field("output_name", &self.output_name)
            .field("input_shape", &self.input_shape)
            .field("output_shape", &self.output_shape)
            .finish_non_exhaustive()
    }
}

impl InferenceBackend for OnnxBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>, MatteError> {
        if input.dim() != self.input_shape {
            return Err(MatteError::inference(format!(
                "input shape {:?} does not match model shape {:?}",
                input.dim(),
                self.input_shape
            )));
        }

        let input_value = Value::from_array(input.clone())
            .map_err(|e| MatteError::inference(format!("failed to convert input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MatteError::inference("ONNX session mutex poisoned"))?;

        let started = std::time::Instant::now();
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| MatteError::inference(format!("ONNX inference failed: {e}")))?;
        log::debug!(
            "Inference took {:.1}ms",
            started.elapsed().as_secs_f64() * 1000.0
        );

        // The declared output name is the single source of truth.
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| {
                MatteError::inference(format!(
                    "model produced no output named {:?} (available: {:?})",
                    self.output_name,
                    outputs.keys().collect::<Vec<_>>()
                ))
            })?
            .try_extract_array::<f32>()
            .map_err(|e| MatteError::inference(format!("failed to extract output tensor: {e}")))?;

        output
            .to_owned()
            .into_dimensionality::<Ix4>()
            .map_err(|e| MatteError::inference(format!("output tensor is not four-dimensional: {e}")))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.input_shape
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.output_shape
    }
}

/// Production loader: fetch the payload, build the session off the runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxModelLoader {
    provider: ExecutionProvider,
}

impl OnnxModelLoader {
    /// Loader with automatic provider selection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader pinned to a specific execution provider
    #[must_use]
    pub fn with_provider(provider: ExecutionProvider) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self, profile: ModelProfile) -> Result<ModelHandle, MatteError> {
        let spec = profile.spec();
        let fetcher = ModelFetcher::new()?;
        let model_path = fetcher.fetch(&spec).await?;

        let model_data = tokio::fs::read(&model_path).await.map_err(|e| {
            MatteError::model_load(format!(
                "failed to read cached model {}: {e}",
                model_path.display()
            ))
        })?;
        let size_bytes = model_data.len();

        let working_resolution = spec.preprocessor.working_resolution();
        let output_name = spec.output_name;
        let provider = self.provider;

        // Session construction parses and optimizes the whole graph; keep it
        // off the async runtime.
        let backend = tokio::task::spawn_blocking(move || {
            OnnxBackend::from_memory(&model_data, output_name, working_resolution, provider)
        })
        .await
        .map_err(|e| MatteError::model_load(format!("session build task failed: {e}")))??;

        let info = ModelInfo {
            name: spec.name.to_string(),
            size_bytes,
            input_shape: backend.input_shape(),
            output_shape: backend.output_shape(),
        };

        Ok(ModelHandle {
            backend: Box::new(backend),
            preprocessor: spec.preprocessor,
            info,
        })
    }
}
