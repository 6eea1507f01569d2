//! Inference backend implementations

pub mod mock;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use mock::{MockBackend, MockModelLoader};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxBackend, OnnxModelLoader};
