//! Deterministic in-process backend for tests
//!
//! `MockBackend` produces a fixed radial logit pattern (confident foreground
//! in the center, confident background at the edges, a soft ring between) and
//! counts every `infer` call, so tests can assert both mask behavior and that
//! inference was or was not reached. `MockModelLoader` builds handles around
//! it with configurable failures and delays for lifecycle tests.

use crate::{
    error::MatteError,
    inference::InferenceBackend,
    models::{ModelInfo, ModelProfile, Preprocessor},
    resource::{ModelHandle, ModelLoader},
};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Inference backend with a deterministic synthetic output
pub struct MockBackend {
    size: usize,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl MockBackend {
    /// Create a backend working at a square `size`x`size` resolution
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    /// Make every `infer` call fail
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Shared counter of `infer` invocations
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Number of `infer` invocations so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>, MatteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(MatteError::inference("mock backend configured to fail"));
        }

        let expected = self.input_shape();
        let got = input.dim();
        if got != expected {
            return Err(MatteError::inference(format!(
                "input shape {got:?} does not match model shape {expected:?}"
            )));
        }

        let size = self.size;
        let center = (size as f32 - 1.0) / 2.0;
        // Positive logits inside a disc of half the working radius, negative
        // outside, with a linear transition band so quantization produces
        // partial alpha values.
        let radius = size as f32 / 4.0;
        let output = Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
            let dy = y as f32 - center;
            let dx = x as f32 - center;
            let dist = (dx * dx + dy * dy).sqrt();
            (radius - dist) * 0.5
        });

        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.size, self.size)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        (1, 1, self.size, self.size)
    }
}

/// Counting, optionally failing loader for lifecycle tests
pub struct MockModelLoader {
    size: usize,
    loads: AtomicUsize,
    fail_remaining: AtomicUsize,
    delay: Option<Duration>,
    infer_calls: Arc<AtomicUsize>,
}

impl MockModelLoader {
    /// Create a loader producing `MockBackend`s at the given working size
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            loads: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            delay: None,
            infer_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the first `n` load attempts, then succeed
    #[must_use]
    pub fn fail_times(self, n: usize) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Sleep this long inside every load attempt
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of load attempts (successful or not)
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Counter shared by every backend this loader produces
    #[must_use]
    pub fn inference_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.infer_calls)
    }
}

#[async_trait::async_trait]
impl ModelLoader for MockModelLoader {
    async fn load(&self, profile: ModelProfile) -> Result<ModelHandle, MatteError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MatteError::model_load("mock loader configured to fail"));
        }

        let mut backend = MockBackend::new(self.size);
        backend.calls = Arc::clone(&self.infer_calls);
        let size = self.size as u32;

        Ok(ModelHandle {
            info: ModelInfo {
                name: format!("mock-{profile}"),
                size_bytes: 0,
                input_shape: backend.input_shape(),
                output_shape: backend.output_shape(),
            },
            preprocessor: Preprocessor {
                target_size: [size, size],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
            backend: Box::new(backend),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radial_pattern_shape_and_range() {
        let backend = MockBackend::new(16);
        let input = Array4::zeros((1, 3, 16, 16));
        let output = backend.infer(&input).unwrap();

        assert_eq!(output.dim(), (1, 1, 16, 16));
        // Center logit positive, corner logit negative.
        assert!(output[[0, 0, 8, 8]] > 0.0);
        assert!(output[[0, 0, 0, 0]] < 0.0);
        assert_eq!(backend.call_count(), 1);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let backend = MockBackend::new(16);
        let input = Array4::zeros((1, 3, 8, 8));
        let err = backend.infer(&input).unwrap_err();
        assert!(matches!(err, MatteError::Inference(_)));
        // The call still counts; callers validate before invoking.
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_loader_fail_then_recover() {
        let loader = MockModelLoader::new(8).fail_times(2);

        assert!(loader.load(ModelProfile::Small).await.is_err());
        assert!(loader.load(ModelProfile::Small).await.is_err());
        let handle = loader.load(ModelProfile::Small).await.unwrap();

        assert_eq!(loader.load_count(), 3);
        assert_eq!(handle.preprocessor.working_resolution(), (8, 8));
    }
}
