//! sketchprep-pipeline: Image preprocessing for sketch digitization (sans-IO).
//!
//! Provides a library of raster kernels (grayscale, denoising, contrast,
//! edges, morphology, thresholding, contours, thinning, shading and shape
//! analysis), a registry that dispatches them by id with schema-described
//! parameters, and three ways of running them:
//!
//! - [`Executor::run_pipeline`]: a caller-built [`PipelineDefinition`],
//!   one step per algorithm instance;
//! - [`run_enhanced_pipeline`]: a fixed ten-stage cleanup pipeline;
//! - [`generate_combinations`] / [`evaluate_combinations`]: parameter
//!   sweeps for a single algorithm.
//!
//! Every run returns the untouched source followed by one
//! [`StepResult`] per step. This crate has **no I/O dependencies**: it
//! operates on in-memory buffers and byte slices.

pub mod blur;
pub mod buffer;
pub mod canny;
pub mod catalog;
pub mod components;
pub mod contour;
pub mod decompose;
pub mod definition;
pub mod edge;
pub mod enhance;
pub mod enhanced;
pub mod executor;
pub mod grayscale;
pub mod morphology;
pub mod params;
pub mod preview;
pub mod registry;
pub mod shading;
pub mod skeleton;
pub mod threshold;
pub mod types;

pub use buffer::PixelBuffer;
pub use catalog::{AlgorithmDescriptor, Category};
pub use definition::{AlgorithmInstance, DefinitionStep, InstanceId, PipelineDefinition};
pub use enhanced::{
    EnhancedParams, EnhancedStageToggles, OutputMode, Stage, ThresholdingMode, run_enhanced_pipeline,
    run_enhanced_pipeline_with,
};
pub use executor::{CancelFlag, Executor};
pub use params::{ParamKind, ParamSet, ParamSpec, ParamValue};
pub use preview::{
    MAX_PREVIEW_COMBINATIONS, PreviewCombination, PreviewResult, apply_selection, evaluate_combinations,
    generate_combinations,
};
pub use registry::Registry;
pub use types::{Dimensions, PipelineError, StepResult, StepStatus};

/// Decode an image and run a pipeline definition on it.
///
/// # Pipeline steps
///
/// 1. Decode the image bytes (PNG, JPEG, BMP, WebP) to RGBA
/// 2. Record the untouched source as step 0
/// 3. Dispatch every instance in order through the built-in registry
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
pub fn process(image_bytes: &[u8], definition: &PipelineDefinition) -> Result<Vec<StepResult>, PipelineError> {
    // 1. Decode.
    let source = PixelBuffer::decode(image_bytes)?;

    // 2-3. Execute; step failures degrade to passthrough.
    Ok(Executor::new().run_pipeline(&source, definition))
}

/// Decode an image and run the enhanced pipeline on it.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
pub fn process_enhanced(
    image_bytes: &[u8],
    params: &EnhancedParams,
    toggles: &EnhancedStageToggles,
) -> Result<Vec<StepResult>, PipelineError> {
    let source = PixelBuffer::decode(image_bytes)?;
    Ok(run_enhanced_pipeline(&source, params, toggles))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A PNG with a sharp black/white vertical boundary.
    fn sharp_edge_png(width: u32, height: u32) -> Vec<u8> {
        PixelBuffer::from_fn(width, height, |x, _| {
            if x < width / 2 { [0, 0, 0, 255] } else { [255, 255, 255, 255] }
        })
        .encode_png()
        .unwrap()
    }

    #[test]
    fn process_empty_input() {
        let result = process(&[], &PipelineDefinition::new());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00], &PipelineDefinition::new());
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn process_runs_definition_on_decoded_image() {
        let registry = Registry::new();
        let mut def = PipelineDefinition::new();
        def.add(&registry, "grayscale").unwrap();
        def.add(&registry, "otsuThreshold").unwrap();

        let results = process(&sharp_edge_png(20, 10), &def).unwrap();
        assert_eq!(results.len(), 3);
        let out = &results[2].buffer;
        assert_eq!(out.dimensions(), Dimensions { width: 20, height: 10 });
        assert_eq!(out.pixel(2, 5)[0], 0);
        assert_eq!(out.pixel(17, 5)[0], 255);
    }

    #[test]
    fn process_enhanced_returns_every_stage() {
        let params = EnhancedParams {
            target_size: 32,
            ..EnhancedParams::default()
        };
        let results = process_enhanced(&sharp_edge_png(40, 20), &params, &EnhancedStageToggles::default()).unwrap();
        assert_eq!(results.len(), 11);
        assert_eq!(results[1].buffer.dimensions(), Dimensions { width: 32, height: 32 });
        assert_eq!(results[10].buffer.dimensions(), Dimensions { width: 32, height: 32 });
    }
}
