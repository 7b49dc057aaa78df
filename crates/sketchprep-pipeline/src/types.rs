//! Shared types for the sketch preprocessing pipeline.

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::definition::InstanceId;
use crate::params::ParamSet;

/// Re-export `GrayImage` so downstream crates can reference single-channel
/// intermediates without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so callers can hand decoded images to
/// [`PixelBuffer::from`] without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// How a step came to produce its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The untouched source at step index 0.
    Original,
    /// The step ran and produced a new buffer.
    Applied,
    /// The stage toggle was off; the input passed through.
    Skipped,
    /// The stage toggle was on but a controlling flag kept it from running.
    Disabled,
    /// The kernel failed; the input passed through unchanged.
    Failed,
}

impl StepStatus {
    /// Whether the step's buffer is its input, unmodified.
    #[must_use]
    pub const fn is_passthrough(self) -> bool {
        matches!(self, Self::Skipped | Self::Disabled | Self::Failed)
    }
}

/// One pipeline stage's output plus provenance.
///
/// Step index 0 is always the unmodified source and carries no algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position in the result sequence, starting at 0 for the source.
    pub step_index: usize,

    /// Human-readable label (e.g. `"Gaussian Blur #2"`,
    /// `"Step 9: Contour Simplification (SKIPPED)"`).
    pub label: String,

    /// The buffer produced by this step.
    pub buffer: PixelBuffer,

    /// Registry id, or enhanced stage id, that produced the buffer.
    pub algorithm_id: Option<String>,

    /// Definition handle of the instance that produced the buffer.
    pub instance_id: Option<InstanceId>,

    /// Parameters the step ran with (after default resolution).
    pub applied_params: Option<ParamSet>,

    /// Whether the step applied, passed through, or failed.
    pub status: StepStatus,
}

impl StepResult {
    /// The step-0 record wrapping the unmodified source.
    #[must_use]
    pub fn original(source: &PixelBuffer) -> Self {
        Self {
            step_index: 0,
            label: "Original".to_owned(),
            buffer: source.clone(),
            algorithm_id: None,
            instance_id: None,
            applied_params: None,
            status: StepStatus::Original,
        }
    }
}

/// Errors that can occur while building or running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Registry lookup on an id that was never registered.
    #[error("unknown algorithm: {id}")]
    UnknownAlgorithm {
        /// The id that failed to resolve.
        id: String,
    },

    /// A kernel could not run with the parameters it was given.
    #[error("{algorithm} failed: {reason}")]
    KernelExecution {
        /// Registry id of the failing algorithm.
        algorithm: String,
        /// What went wrong.
        reason: String,
    },

    /// Strict validation rejected a parameter value.
    #[error("invalid parameter {param} for {algorithm}: {reason}")]
    InvalidParameter {
        /// Registry id of the algorithm.
        algorithm: String,
        /// Offending parameter name.
        param: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No instance with this handle exists in the definition.
    #[error("no algorithm instance with id {0}")]
    UnknownInstance(InstanceId),

    /// The algorithm does not allow more than one instance per definition.
    #[error("{id} allows only one instance per pipeline")]
    DuplicateInstance {
        /// Registry id of the algorithm.
        id: String,
    },

    /// A raw pixel vector did not match `width * height * 4`.
    #[error("pixel buffer of {width}x{height} needs {expected} bytes, got {actual}")]
    InvalidBuffer {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// `width * height * 4`.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),

    /// Failed to encode an output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(#[source] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A cancellation flag was raised between steps or images.
    #[error("pipeline run was cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::KernelExecution`].
    pub fn kernel(algorithm: &str, reason: impl Into<String>) -> Self {
        Self::KernelExecution {
            algorithm: algorithm.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the image variants
/// store their `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    UnknownAlgorithm { id: String },
    KernelExecution { algorithm: String, reason: String },
    InvalidParameter { algorithm: String, param: String, reason: String },
    UnknownInstance(InstanceId),
    DuplicateInstance { id: String },
    InvalidBuffer { width: u32, height: u32, expected: usize, actual: usize },
    ImageDecode(String),
    ImageEncode(String),
    EmptyInput,
    Cancelled,
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::UnknownAlgorithm { id } => PipelineErrorProxy::UnknownAlgorithm { id: id.clone() },
            Self::KernelExecution { algorithm, reason } => PipelineErrorProxy::KernelExecution {
                algorithm: algorithm.clone(),
                reason: reason.clone(),
            },
            Self::InvalidParameter {
                algorithm,
                param,
                reason,
            } => PipelineErrorProxy::InvalidParameter {
                algorithm: algorithm.clone(),
                param: param.clone(),
                reason: reason.clone(),
            },
            Self::UnknownInstance(id) => PipelineErrorProxy::UnknownInstance(*id),
            Self::DuplicateInstance { id } => PipelineErrorProxy::DuplicateInstance { id: id.clone() },
            Self::InvalidBuffer {
                width,
                height,
                expected,
                actual,
            } => PipelineErrorProxy::InvalidBuffer {
                width: *width,
                height: *height,
                expected: *expected,
                actual: *actual,
            },
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::ImageEncode(e) => PipelineErrorProxy::ImageEncode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::Cancelled => PipelineErrorProxy::Cancelled,
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::UnknownAlgorithm { id } => Self::UnknownAlgorithm { id },
            PipelineErrorProxy::KernelExecution { algorithm, reason } => {
                Self::KernelExecution { algorithm, reason }
            }
            PipelineErrorProxy::InvalidParameter {
                algorithm,
                param,
                reason,
            } => Self::InvalidParameter {
                algorithm,
                param,
                reason,
            },
            PipelineErrorProxy::UnknownInstance(id) => Self::UnknownInstance(id),
            PipelineErrorProxy::DuplicateInstance { id } => Self::DuplicateInstance { id },
            PipelineErrorProxy::InvalidBuffer {
                width,
                height,
                expected,
                actual,
            } => Self::InvalidBuffer {
                width,
                height,
                expected,
                actual,
            },
            // The typed image error cannot be rebuilt; keep the message.
            PipelineErrorProxy::ImageDecode(msg) => Self::KernelExecution {
                algorithm: "decode".to_owned(),
                reason: msg,
            },
            PipelineErrorProxy::ImageEncode(msg) => Self::KernelExecution {
                algorithm: "encode".to_owned(),
                reason: msg,
            },
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::Cancelled => Self::Cancelled,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- StepResult tests ---

    #[test]
    fn original_step_has_no_provenance() {
        let src = PixelBuffer::from_pixel(3, 2, [10, 20, 30, 255]);
        let step = StepResult::original(&src);
        assert_eq!(step.step_index, 0);
        assert_eq!(step.buffer, src);
        assert!(step.algorithm_id.is_none());
        assert!(step.instance_id.is_none());
        assert!(step.applied_params.is_none());
        assert_eq!(step.status, StepStatus::Original);
    }

    #[test]
    fn passthrough_statuses() {
        assert!(StepStatus::Skipped.is_passthrough());
        assert!(StepStatus::Disabled.is_passthrough());
        assert!(StepStatus::Failed.is_passthrough());
        assert!(!StepStatus::Applied.is_passthrough());
        assert!(!StepStatus::Original.is_passthrough());
    }

    // --- PipelineError tests ---

    #[test]
    fn error_unknown_algorithm_display() {
        let err = PipelineError::UnknownAlgorithm {
            id: "sharpenMore".to_owned(),
        };
        assert_eq!(err.to_string(), "unknown algorithm: sharpenMore");
    }

    #[test]
    fn error_kernel_execution_display() {
        let err = PipelineError::kernel("gaussianBlur", "sigma is not a number");
        assert_eq!(err.to_string(), "gaussianBlur failed: sigma is not a number");
    }

    #[test]
    fn error_invalid_buffer_display() {
        let err = PipelineError::InvalidBuffer {
            width: 2,
            height: 2,
            expected: 16,
            actual: 15,
        };
        assert_eq!(
            err.to_string(),
            "pixel buffer of 2x2 needs 16 bytes, got 15",
        );
    }

    #[test]
    fn error_empty_input_display() {
        assert_eq!(PipelineError::EmptyInput.to_string(), "input image data is empty");
    }

    // --- Serde round-trip tests ---

    #[test]
    fn error_serde_round_trip() {
        let err = PipelineError::InvalidParameter {
            algorithm: "clahe".to_owned(),
            param: "clipLimit".to_owned(),
            reason: "above maximum 10".to_owned(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), err.to_string());
    }

    #[test]
    fn step_status_serializes_snake_case() {
        let json = serde_json::to_string(&StepStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
    }
}
