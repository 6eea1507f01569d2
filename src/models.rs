//! Model profiles and preprocessing metadata

use serde::{Deserialize, Serialize};

/// Named segmentation model profiles exposed by the public contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProfile {
    /// Quantized model at a reduced working resolution; faster, coarser mattes
    Small,
    /// Full-precision model at the native working resolution
    #[default]
    Medium,
}

impl ModelProfile {
    /// Resolve the profile into its concrete model specification
    #[must_use]
    pub fn spec(self) -> ProfileSpec {
        match self {
            Self::Small => ProfileSpec {
                name: "rmbg-1.4-quantized",
                file_url: "https://huggingface.co/briaai/RMBG-1.4/resolve/main/onnx/model_quantized.onnx",
                output_name: "output",
                preprocessor: Preprocessor {
                    target_size: [512, 512],
                    normalization_mean: [0.5, 0.5, 0.5],
                    normalization_std: [1.0, 1.0, 1.0],
                },
            },
            Self::Medium => ProfileSpec {
                name: "rmbg-1.4",
                file_url: "https://huggingface.co/briaai/RMBG-1.4/resolve/main/onnx/model.onnx",
                output_name: "output",
                preprocessor: Preprocessor {
                    target_size: [1024, 1024],
                    normalization_mean: [0.5, 0.5, 0.5],
                    normalization_std: [1.0, 1.0, 1.0],
                },
            },
        }
    }
}

impl std::fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Small => f.write_str("small"),
            Self::Medium => f.write_str("medium"),
        }
    }
}

/// Concrete model specification a profile resolves to
#[derive(Debug, Clone)]
pub struct ProfileSpec {
    /// Cache/display name
    pub name: &'static str,
    /// Download URL of the ONNX payload
    pub file_url: &'static str,
    /// The single output tensor this model is declared to produce. Inference
    /// extracts exactly this name; anything else is an error, never a guess.
    pub output_name: &'static str,
    /// Companion preprocessor configuration
    pub preprocessor: Preprocessor,
}

/// Paired preprocessor configuration for a model
///
/// The working resolution here is the model's fixed input/output resolution,
/// independent of any source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Working resolution, `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel normalization mean (RGB, 0-1 range)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub normalization_std: [f32; 3],
}

impl Preprocessor {
    /// Working resolution as `(width, height)`
    #[must_use]
    pub fn working_resolution(&self) -> (u32, u32) {
        (self.target_size[0], self.target_size[1])
    }
}

/// Metadata about a loaded model, for logging and diagnostics
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Profile name the model was loaded for
    pub name: String,
    /// Model payload size in bytes
    pub size_bytes: usize,
    /// Expected input shape, NCHW
    pub input_shape: (usize, usize, usize, usize),
    /// Expected output shape, NCHW
    pub output_shape: (usize, usize, usize, usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_resolve() {
        let small = ModelProfile::Small.spec();
        let medium = ModelProfile::Medium.spec();

        assert_ne!(small.file_url, medium.file_url);
        assert_eq!(small.preprocessor.working_resolution(), (512, 512));
        assert_eq!(medium.preprocessor.working_resolution(), (1024, 1024));
        assert_eq!(small.output_name, "output");
    }

    #[test]
    fn test_profile_serde_names() {
        let json = serde_json::to_string(&ModelProfile::Small).unwrap();
        assert_eq!(json, "\"small\"");
        let back: ModelProfile = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(back, ModelProfile::Medium);
    }

    #[test]
    fn test_profile_display() {
        assert_eq!(ModelProfile::Small.to_string(), "small");
        assert_eq!(ModelProfile::Medium.to_string(), "medium");
    }
}
