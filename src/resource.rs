//! Shared model lifecycle
//!
//! The loaded segmentation model is the only shared mutable state in this
//! core. [`ModelResource`] guards it with a memoized-future cell: the first
//! `ensure_ready` call starts the load, concurrent callers clone the same
//! in-flight future and share its outcome, and a failure resets the cell so
//! the next call may retry. Nothing here retries on its own.

use crate::{
    error::MatteError,
    inference::InferenceBackend,
    models::{ModelInfo, ModelProfile, Preprocessor},
};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A loaded model together with its paired preprocessor
pub struct ModelHandle {
    /// The inference backend holding the session
    pub backend: Box<dyn InferenceBackend>,
    /// Companion preprocessing configuration
    pub preprocessor: Preprocessor,
    /// Metadata for logging
    pub info: ModelInfo,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("info", &self.info)
            .field("preprocessor", &self.preprocessor)
            .finish_non_exhaustive()
    }
}

/// Seam for performing the slow model load
///
/// The production implementation downloads/reads the ONNX payload and builds
/// a session; tests inject counting or failing loaders.
#[async_trait::async_trait]
pub trait ModelLoader: Send + Sync {
    /// Perform the (slow, network- and CPU-bound) load for a profile
    ///
    /// # Errors
    ///
    /// Returns `MatteError::ModelLoad` when the model or its preprocessor
    /// cannot be initialized.
    async fn load(&self, profile: ModelProfile) -> Result<ModelHandle, MatteError>;
}

/// Outcome type carried by the shared in-flight future. `Shared` requires
/// `Clone`, so failures travel as the load-failure reason string.
type LoadOutcome = Result<Arc<ModelHandle>, String>;
type LoadFuture = Shared<BoxFuture<'static, LoadOutcome>>;

enum LoadState {
    Unloaded,
    Loading(LoadFuture),
    Ready(Arc<ModelHandle>),
}

/// Process-lifetime owner of the shared segmentation model
pub struct ModelResource {
    state: Arc<Mutex<LoadState>>,
    loader: Arc<dyn ModelLoader>,
    profile: ModelProfile,
    load_timeout: Option<Duration>,
}

impl ModelResource {
    /// Create a resource that loads `profile` through `loader` on first use
    #[must_use]
    pub fn new(loader: Arc<dyn ModelLoader>, profile: ModelProfile) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoadState::Unloaded)),
            loader,
            profile,
            load_timeout: None,
        }
    }

    /// Bound the model load with a deadline; exceeding it surfaces as
    /// `MatteError::ModelLoad` and resets the cell like any other failure.
    #[must_use]
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Create a resource backed by the default ONNX loader
    #[cfg(feature = "onnx")]
    #[must_use]
    pub fn for_profile(profile: ModelProfile) -> Self {
        Self::new(
            Arc::new(crate::backends::OnnxModelLoader::new()),
            profile,
        )
    }

    /// The profile this resource loads
    #[must_use]
    pub fn profile(&self) -> ModelProfile {
        self.profile
    }

    /// Whether the model reached the `Ready` state
    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().await, LoadState::Ready(_))
    }

    /// Return the shared model handle, loading it exactly once
    ///
    /// - `Ready`: returns the cached handle immediately, no I/O.
    /// - `Loading`: awaits the same in-flight load as every other caller.
    /// - `Unloaded`: starts the load; all callers arriving before completion
    ///   share its outcome, success or failure.
    ///
    /// # Errors
    ///
    /// Returns `MatteError::ModelLoad` when the underlying load fails or
    /// exceeds the configured deadline. The state resets to `Unloaded` on
    /// failure, so a later call may retry.
    pub async fn ensure_ready(&self) -> Result<Arc<ModelHandle>, MatteError> {
        let shared = {
            let mut state = self.state.lock().await;
            match &*state {
                LoadState::Ready(handle) => return Ok(Arc::clone(handle)),
                LoadState::Loading(in_flight) => in_flight.clone(),
                LoadState::Unloaded => {
                    let in_flight = self.begin_load();
                    *state = LoadState::Loading(in_flight.clone());
                    in_flight
                },
            }
        };

        shared.await.map_err(MatteError::ModelLoad)
    }

    /// Build the shared load future. The future publishes the terminal
    /// state itself right before resolving, so exactly one state transition
    /// happens per load attempt.
    fn begin_load(&self) -> LoadFuture {
        let loader = Arc::clone(&self.loader);
        let state = Arc::clone(&self.state);
        let profile = self.profile;
        let timeout = self.load_timeout;

        log::info!("Loading segmentation model (profile: {profile})");

        async move {
            let load = loader.load(profile);
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, load).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(MatteError::model_load(format!(
                        "load exceeded deadline of {:.1}s",
                        limit.as_secs_f32()
                    ))),
                },
                None => load.await,
            };

            let outcome: LoadOutcome = result.map(Arc::new).map_err(|e| match e {
                MatteError::ModelLoad(reason) => reason,
                other => other.to_string(),
            });

            let mut state = state.lock().await;
            match &outcome {
                Ok(handle) => {
                    log::info!(
                        "Model ready: {} ({} bytes)",
                        handle.info.name,
                        handle.info.size_bytes
                    );
                    *state = LoadState::Ready(Arc::clone(handle));
                },
                Err(reason) => {
                    log::warn!("Model load failed, state reset for retry: {reason}");
                    *state = LoadState::Unloaded;
                },
            }

            outcome
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for ModelResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelResource")
            .field("profile", &self.profile)
            .field("load_timeout", &self.load_timeout)
            .finish_non_exhaustive()
    }
}
