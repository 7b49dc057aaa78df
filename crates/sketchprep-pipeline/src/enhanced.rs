//! The fixed ten-stage sketch cleanup pipeline.
//!
//! Stages run in order on a single gray image; each can be toggled off, in
//! which case its input passes through and the step is labelled
//! `(SKIPPED)`. Ink is dark (< 128) from stage 5 onward.
//!
//! Two stages are conditional beyond their toggle:
//!
//! - Stage 6 (ridge filter) also requires [`EnhancedParams::use_ridge_filter`];
//!   with the toggle on and the flag off it is labelled `(DISABLED)`.
//! - Stage 9 (simplify) only runs on a skeleton. When stage 8 did not
//!   apply, stage 9 is skipped regardless of its toggle and stage 10 reads
//!   the stage 7 mask.

use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::blur::{anisotropic_diffusion, bilateral_filter, gaussian_blur};
use crate::buffer::{PixelBuffer, clamped_luma, luma_from_fn, to_byte};
use crate::canny::canny;
use crate::components::{BinaryMask, Connectivity, label_components};
use crate::enhance::{clahe, unsharp_mask};
use crate::executor::{CancelFlag, check, guarded};
use crate::morphology::{MorphologyOp, StructuringElement, apply_gray};
use crate::params::ParamSet;
use crate::shading::flat_dark_mask;
use crate::skeleton::zhang_suen;
use crate::threshold::{AdaptiveMethod, ThresholdType, adaptive_threshold, otsu_threshold, sauvola_threshold};
use crate::types::{PipelineError, StepResult, StepStatus};

/// Gray level separating ink from paper in binary stages.
const INK_BELOW: u8 = 128;

/// Gray level of mask-only ink in [`OutputMode::Combined`].
const COMBINED_MASK_GRAY: u8 = 128;

/// Flank distance of the ridge detector, in pixels.
const RIDGE_REACH: i64 = 2;

/// One stage of the enhanced pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Grayscale, resize and pad.
    Standardize,
    /// Edge-preserving noise reduction.
    Denoise,
    /// Local contrast and stroke boost.
    Enhance,
    /// Flat-fill suppression.
    Shading,
    /// Binarization.
    Threshold,
    /// Thin-line filter.
    Ridge,
    /// Gap closing, spur and speck removal.
    Cleanup,
    /// Thinning.
    Skeleton,
    /// Line smoothing.
    Simplify,
    /// Final composition.
    Output,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Self; 10] = [
        Self::Standardize,
        Self::Denoise,
        Self::Enhance,
        Self::Shading,
        Self::Threshold,
        Self::Ridge,
        Self::Cleanup,
        Self::Skeleton,
        Self::Simplify,
        Self::Output,
    ];

    /// 1-based stage number; also the stage's index in the result list.
    #[must_use]
    pub const fn number(self) -> usize {
        self as usize + 1
    }

    /// Toggle name, also used as the step's `algorithm_id`.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Standardize => "step1_standardize",
            Self::Denoise => "step2_denoise",
            Self::Enhance => "step3_enhance",
            Self::Shading => "step4_shading",
            Self::Threshold => "step5_threshold",
            Self::Ridge => "step6_ridge",
            Self::Cleanup => "step7_cleanup",
            Self::Skeleton => "step8_skeleton",
            Self::Simplify => "step9_simplify",
            Self::Output => "step10_output",
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Standardize => "Standardize",
            Self::Denoise => "Denoise",
            Self::Enhance => "Contrast Enhancement",
            Self::Shading => "Shading Removal",
            Self::Threshold => "Thresholding",
            Self::Ridge => "Ridge Filter",
            Self::Cleanup => "Morphological Cleanup",
            Self::Skeleton => "Skeletonization",
            Self::Simplify => "Contour Simplification",
            Self::Output => "Output",
        }
    }

    /// Look up a stage by toggle name.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }
}

/// Binarization used by stage 5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdingMode {
    /// Sauvola local threshold.
    #[default]
    Sauvola,
    /// Gaussian adaptive threshold.
    Adaptive,
    /// Global Otsu threshold.
    Otsu,
    /// Adaptive threshold with Canny edges added as ink.
    EdgeFusion,
}

/// What stage 10 emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// The skeleton (or the mask when skeletonization is off).
    #[default]
    Lines,
    /// The cleaned stage 7 mask.
    Mask,
    /// Lines at 0 over mask ink at 128 on white.
    Combined,
}

/// Tunables of the enhanced pipeline.
///
/// Every field has a default, so a partial JSON document overrides only
/// the fields it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancedParams {
    /// Side of the square working canvas. `0` keeps the source size.
    pub target_size: u32,
    /// Gray level of the padding around a non-square source.
    pub pad_color: u8,

    /// Bilateral filter diameter.
    pub bilateral_diameter: u32,
    /// Bilateral range sigma.
    pub bilateral_sigma_color: f64,
    /// Bilateral spatial sigma.
    pub bilateral_sigma_space: f64,
    /// Perona-Malik iterations.
    pub diffusion_iterations: u32,
    /// Perona-Malik edge threshold.
    pub diffusion_kappa: f64,
    /// Perona-Malik step size.
    pub diffusion_gamma: f64,

    /// CLAHE clip limit.
    pub clahe_clip_limit: f64,
    /// CLAHE tiles per side.
    pub clahe_tile_grid: u32,
    /// Unsharp mask blur sigma.
    pub unsharp_radius: f64,
    /// Unsharp mask gain.
    pub unsharp_amount: f64,
    /// Unsharp mask minimum difference.
    pub unsharp_threshold: f64,
    /// Black-hat structuring element size.
    pub blackhat_kernel_size: u32,
    /// Fraction of the black-hat response subtracted from each pixel.
    pub blackhat_strength: f64,

    /// Variance window of the shading detector.
    pub shading_window: u32,
    /// Variance below which a dark pixel counts as flat fill.
    pub shading_variance_threshold: f64,
    /// Pixels at or above this level are never shading.
    pub shading_intensity_ceiling: u8,
    /// Flat-fill fraction above which shading is removed.
    pub shading_threshold: f64,

    /// Stage 5 algorithm.
    pub thresholding_mode: ThresholdingMode,
    /// Sauvola window.
    pub sauvola_window: u32,
    /// Sauvola sensitivity.
    pub sauvola_k: f64,
    /// Adaptive block size (also used by edge fusion).
    pub adaptive_block_size: u32,
    /// Adaptive offset (also used by edge fusion).
    pub adaptive_c: f64,
    /// Edge fusion Canny low threshold.
    pub canny_low: f64,
    /// Edge fusion Canny high threshold.
    pub canny_high: f64,

    /// Whether stage 6 runs when its toggle is on.
    pub use_ridge_filter: bool,
    /// Minimum ridge response an ink pixel needs to survive stage 6.
    pub ridge_threshold: f64,

    /// Ink gap-closing element size (`<= 1` disables).
    pub cleanup_close_size: u32,
    /// Ink spur-removal element size (`<= 1` disables).
    pub cleanup_open_size: u32,
    /// Ink components smaller than this are erased.
    pub min_component_area: u32,

    /// Zhang-Suen pass cap.
    pub skeleton_max_iterations: u32,
    /// Simplification strength; the smoothing sigma is ten times this.
    pub simplify_epsilon: f64,

    /// Stage 10 composition.
    pub output_mode: OutputMode,
}

impl EnhancedParams {
    /// Default [`EnhancedParams::target_size`].
    pub const DEFAULT_TARGET_SIZE: u32 = 1024;
    /// Default [`EnhancedParams::pad_color`].
    pub const DEFAULT_PAD_COLOR: u8 = 255;
    /// Default [`EnhancedParams::shading_threshold`].
    pub const DEFAULT_SHADING_THRESHOLD: f64 = 0.15;
    /// Default [`EnhancedParams::sauvola_window`].
    pub const DEFAULT_SAUVOLA_WINDOW: u32 = 51;
    /// Default [`EnhancedParams::sauvola_k`].
    pub const DEFAULT_SAUVOLA_K: f64 = 0.2;
    /// Default [`EnhancedParams::ridge_threshold`].
    pub const DEFAULT_RIDGE_THRESHOLD: f64 = 10.0;
    /// Default [`EnhancedParams::min_component_area`].
    pub const DEFAULT_MIN_COMPONENT_AREA: u32 = 8;
    /// Default [`EnhancedParams::skeleton_max_iterations`].
    pub const DEFAULT_SKELETON_MAX_ITERATIONS: u32 = 50;
}

impl Default for EnhancedParams {
    fn default() -> Self {
        Self {
            target_size: Self::DEFAULT_TARGET_SIZE,
            pad_color: Self::DEFAULT_PAD_COLOR,
            bilateral_diameter: 7,
            bilateral_sigma_color: 50.0,
            bilateral_sigma_space: 50.0,
            diffusion_iterations: 5,
            diffusion_kappa: 30.0,
            diffusion_gamma: 0.15,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            unsharp_radius: 1.0,
            unsharp_amount: 1.0,
            unsharp_threshold: 2.0,
            blackhat_kernel_size: 9,
            blackhat_strength: 0.5,
            shading_window: 15,
            shading_variance_threshold: 80.0,
            shading_intensity_ceiling: 200,
            shading_threshold: Self::DEFAULT_SHADING_THRESHOLD,
            thresholding_mode: ThresholdingMode::default(),
            sauvola_window: Self::DEFAULT_SAUVOLA_WINDOW,
            sauvola_k: Self::DEFAULT_SAUVOLA_K,
            adaptive_block_size: 15,
            adaptive_c: 8.0,
            canny_low: 50.0,
            canny_high: 150.0,
            use_ridge_filter: false,
            ridge_threshold: Self::DEFAULT_RIDGE_THRESHOLD,
            cleanup_close_size: 3,
            cleanup_open_size: 1,
            min_component_area: Self::DEFAULT_MIN_COMPONENT_AREA,
            skeleton_max_iterations: Self::DEFAULT_SKELETON_MAX_ITERATIONS,
            simplify_epsilon: 0.02,
            output_mode: OutputMode::default(),
        }
    }
}

/// Per-stage on/off switches, named by [`Stage::id`].
///
/// Everything is on by default except the ridge filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools, missing_docs)]
pub struct EnhancedStageToggles {
    pub step1_standardize: bool,
    pub step2_denoise: bool,
    pub step3_enhance: bool,
    pub step4_shading: bool,
    pub step5_threshold: bool,
    pub step6_ridge: bool,
    pub step7_cleanup: bool,
    pub step8_skeleton: bool,
    pub step9_simplify: bool,
    pub step10_output: bool,
}

impl Default for EnhancedStageToggles {
    fn default() -> Self {
        Self {
            step1_standardize: true,
            step2_denoise: true,
            step3_enhance: true,
            step4_shading: true,
            step5_threshold: true,
            step6_ridge: false,
            step7_cleanup: true,
            step8_skeleton: true,
            step9_simplify: true,
            step10_output: true,
        }
    }
}

impl EnhancedStageToggles {
    fn slot(&mut self, stage: Stage) -> &mut bool {
        match stage {
            Stage::Standardize => &mut self.step1_standardize,
            Stage::Denoise => &mut self.step2_denoise,
            Stage::Enhance => &mut self.step3_enhance,
            Stage::Shading => &mut self.step4_shading,
            Stage::Threshold => &mut self.step5_threshold,
            Stage::Ridge => &mut self.step6_ridge,
            Stage::Cleanup => &mut self.step7_cleanup,
            Stage::Skeleton => &mut self.step8_skeleton,
            Stage::Simplify => &mut self.step9_simplify,
            Stage::Output => &mut self.step10_output,
        }
    }

    /// Whether `stage` is switched on.
    #[must_use]
    pub const fn enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Standardize => self.step1_standardize,
            Stage::Denoise => self.step2_denoise,
            Stage::Enhance => self.step3_enhance,
            Stage::Shading => self.step4_shading,
            Stage::Threshold => self.step5_threshold,
            Stage::Ridge => self.step6_ridge,
            Stage::Cleanup => self.step7_cleanup,
            Stage::Skeleton => self.step8_skeleton,
            Stage::Simplify => self.step9_simplify,
            Stage::Output => self.step10_output,
        }
    }

    /// Switch `stage` on or off.
    pub fn set(&mut self, stage: Stage, on: bool) {
        *self.slot(stage) = on;
    }
}

/// Run every stage on `source`.
///
/// Returns eleven results: the original followed by one per stage. A stage
/// whose work fails passes its input through with [`StepStatus::Failed`].
#[must_use = "returns the per-stage results"]
pub fn run_enhanced_pipeline(
    source: &PixelBuffer,
    params: &EnhancedParams,
    toggles: &EnhancedStageToggles,
) -> Vec<StepResult> {
    let mut run = EnhancedRun::new(source, params, toggles);
    for stage in Stage::ALL {
        run.advance(stage);
    }
    run.results
}

/// [`run_enhanced_pipeline`], checking `cancel` before every stage.
///
/// # Errors
///
/// [`PipelineError::Cancelled`] if the flag is raised before the last
/// stage has run.
#[tracing::instrument(skip_all, fields(width = source.width(), height = source.height(), mode = ?params.thresholding_mode))]
pub fn run_enhanced_pipeline_with(
    source: &PixelBuffer,
    params: &EnhancedParams,
    toggles: &EnhancedStageToggles,
    cancel: Option<&CancelFlag>,
) -> Result<Vec<StepResult>, PipelineError> {
    let mut run = EnhancedRun::new(source, params, toggles);
    for stage in Stage::ALL {
        check(cancel)?;
        run.advance(stage);
    }
    Ok(run.results)
}

/// Per-image state of one enhanced run. Result `n` holds stage `n`.
struct EnhancedRun<'a> {
    params: &'a EnhancedParams,
    toggles: &'a EnhancedStageToggles,
    results: Vec<StepResult>,
}

impl<'a> EnhancedRun<'a> {
    fn new(source: &PixelBuffer, params: &'a EnhancedParams, toggles: &'a EnhancedStageToggles) -> Self {
        let mut results = Vec::with_capacity(Stage::ALL.len() + 1);
        results.push(StepResult::original(source));
        Self {
            params,
            toggles,
            results,
        }
    }

    fn output_of(&self, stage: Stage) -> &PixelBuffer {
        &self.results[stage.number()].buffer
    }

    fn advance(&mut self, stage: Stage) {
        let step = self.step(stage);
        self.results.push(step);
    }

    fn step(&self, stage: Stage) -> StepResult {
        let step_index = stage.number();
        let input = &self.results[step_index - 1].buffer;
        let title = format!("Step {step_index}: {}", stage.name());
        let passthrough = |status: StepStatus, suffix: &str| StepResult {
            step_index,
            label: format!("{title} ({suffix})"),
            buffer: input.clone(),
            algorithm_id: Some(stage.id().to_owned()),
            instance_id: None,
            applied_params: None,
            status,
        };

        if !self.toggles.enabled(stage) {
            return passthrough(StepStatus::Skipped, "SKIPPED");
        }
        if stage == Stage::Ridge && !self.params.use_ridge_filter {
            return passthrough(StepStatus::Disabled, "DISABLED");
        }
        if stage == Stage::Simplify && self.results[Stage::Skeleton.number()].status != StepStatus::Applied {
            return passthrough(StepStatus::Skipped, "SKIPPED");
        }

        let start = Instant::now();
        match guarded(stage.id(), || self.apply(stage, input)) {
            Ok((buffer, applied)) => {
                tracing::debug!(stage = stage.id(), elapsed = ?start.elapsed(), "stage applied");
                StepResult {
                    step_index,
                    label: title,
                    buffer,
                    algorithm_id: Some(stage.id().to_owned()),
                    instance_id: None,
                    applied_params: Some(applied),
                    status: StepStatus::Applied,
                }
            }
            Err(error) => {
                tracing::warn!(stage = stage.id(), %error, "stage failed, passing input through");
                passthrough(StepStatus::Failed, "FAILED")
            }
        }
    }

    fn apply(&self, stage: Stage, input: &PixelBuffer) -> Result<(PixelBuffer, ParamSet), PipelineError> {
        let p = self.params;
        let out = match stage {
            Stage::Standardize => (
                PixelBuffer::from_luma(&standardize(&input.to_luma(), p.target_size, p.pad_color)),
                ParamSet::new().with("targetSize", p.target_size).with("padColor", u32::from(p.pad_color)),
            ),
            Stage::Denoise => {
                let smoothed = bilateral_filter(input, p.bilateral_diameter, p.bilateral_sigma_color, p.bilateral_sigma_space);
                (
                    anisotropic_diffusion(&smoothed, p.diffusion_iterations, p.diffusion_kappa, p.diffusion_gamma),
                    ParamSet::new()
                        .with("bilateralDiameter", p.bilateral_diameter)
                        .with("diffusionIterations", p.diffusion_iterations)
                        .with("diffusionKappa", p.diffusion_kappa),
                )
            }
            Stage::Enhance => {
                let contrasted = clahe(input, p.clahe_clip_limit, p.clahe_tile_grid);
                let sharpened = unsharp_mask(&contrasted, p.unsharp_radius, p.unsharp_amount, p.unsharp_threshold);
                (
                    PixelBuffer::from_luma(&boost_strokes(&sharpened.to_luma(), p.blackhat_kernel_size, p.blackhat_strength)),
                    ParamSet::new()
                        .with("clipLimit", p.clahe_clip_limit)
                        .with("unsharpAmount", p.unsharp_amount)
                        .with("blackhatStrength", p.blackhat_strength),
                )
            }
            Stage::Shading => {
                let (gray, density, removed) = remove_shading(&input.to_luma(), p);
                (
                    PixelBuffer::from_luma(&gray),
                    ParamSet::new()
                        .with("shadingDensity", density)
                        .with("shadingThreshold", p.shading_threshold)
                        .with("shadingRemoved", removed),
                )
            }
            Stage::Threshold => (
                binarize(input, p)?,
                ParamSet::new().with("mode", thresholding_name(p.thresholding_mode)),
            ),
            Stage::Ridge => {
                let reference = self.output_of(Stage::Shading).to_luma();
                (
                    PixelBuffer::from_luma(&ridge_filter(&input.to_luma(), &reference, p.ridge_threshold)),
                    ParamSet::new().with("ridgeThreshold", p.ridge_threshold),
                )
            }
            Stage::Cleanup => (
                PixelBuffer::from_luma(&cleanup(&input.to_luma(), p)),
                ParamSet::new()
                    .with("closeSize", p.cleanup_close_size)
                    .with("openSize", p.cleanup_open_size)
                    .with("minComponentArea", p.min_component_area),
            ),
            Stage::Skeleton => {
                let mut mask = BinaryMask::from_gray(&input.to_luma(), |v| v < INK_BELOW);
                let passes = zhang_suen(&mut mask, p.skeleton_max_iterations);
                tracing::trace!(passes, "skeleton converged");
                (
                    PixelBuffer::from_luma(&mask.to_gray(0, 255)),
                    ParamSet::new()
                        .with("maxIterations", p.skeleton_max_iterations)
                        .with("passes", passes),
                )
            }
            Stage::Simplify => (
                gaussian_blur(input, 3, p.simplify_epsilon * 10.0),
                ParamSet::new().with("epsilon", p.simplify_epsilon),
            ),
            Stage::Output => (
                compose(input, self.output_of(Stage::Cleanup), p.output_mode),
                ParamSet::new().with("outputMode", output_name(p.output_mode)),
            ),
        };
        Ok(out)
    }
}

const fn thresholding_name(mode: ThresholdingMode) -> &'static str {
    match mode {
        ThresholdingMode::Sauvola => "sauvola",
        ThresholdingMode::Adaptive => "adaptive",
        ThresholdingMode::Otsu => "otsu",
        ThresholdingMode::EdgeFusion => "edge_fusion",
    }
}

const fn output_name(mode: OutputMode) -> &'static str {
    match mode {
        OutputMode::Lines => "lines",
        OutputMode::Mask => "mask",
        OutputMode::Combined => "combined",
    }
}

// ───────────────────────────── Stage 1: Standardize ─────────────────────────────

/// Fit the longest side to `target` and centre on a `target` square.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn standardize(gray: &GrayImage, target: u32, pad: u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    if target == 0 || w == 0 || h == 0 {
        return gray.clone();
    }
    let scale = f64::from(target) / f64::from(w.max(h));
    let fit = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, target);
    let (nw, nh) = (fit(w), fit(h));
    let resized = if (nw, nh) == (w, h) {
        gray.clone()
    } else {
        imageops::resize(gray, nw, nh, FilterType::Triangle)
    };
    let mut canvas = GrayImage::from_pixel(target, target, Luma([pad]));
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from((target - nw) / 2),
        i64::from((target - nh) / 2),
    );
    canvas
}

// ───────────────────────────── Stage 3: Enhance ─────────────────────────────

/// Darken thin strokes by a fraction of the black-hat response.
fn boost_strokes(gray: &GrayImage, kernel_size: u32, strength: f64) -> GrayImage {
    let hat = apply_gray(gray, MorphologyOp::BlackHat, &StructuringElement::square(kernel_size));
    luma_from_fn(gray.width(), gray.height(), |x, y| {
        let v = f64::from(gray.get_pixel(x, y).0[0]);
        to_byte(strength.mul_add(-f64::from(hat.get_pixel(x, y).0[0]), v))
    })
}

// ───────────────────────────── Stage 4: Shading ─────────────────────────────

/// Returns the (possibly repainted) image, the flat-fill density and
/// whether fill was removed.
#[allow(clippy::cast_precision_loss)]
fn remove_shading(gray: &GrayImage, p: &EnhancedParams) -> (GrayImage, f64, bool) {
    let mask = flat_dark_mask(
        gray,
        p.shading_window,
        p.shading_variance_threshold,
        p.shading_intensity_ceiling,
    );
    let total = u64::from(gray.width()) * u64::from(gray.height());
    let density = if total == 0 {
        0.0
    } else {
        mask.count() as f64 / total as f64
    };
    if density <= p.shading_threshold {
        return (gray.clone(), density, false);
    }
    let out = luma_from_fn(gray.width(), gray.height(), |x, y| {
        if mask.get(i64::from(x), i64::from(y)) {
            255
        } else {
            gray.get_pixel(x, y).0[0]
        }
    });
    (out, density, true)
}

// ───────────────────────────── Stage 5: Threshold ─────────────────────────────

#[allow(clippy::cast_possible_truncation)]
fn binarize(input: &PixelBuffer, p: &EnhancedParams) -> Result<PixelBuffer, PipelineError> {
    let adaptive = || {
        adaptive_threshold(
            input,
            255,
            AdaptiveMethod::Gaussian,
            ThresholdType::Binary,
            p.adaptive_block_size,
            p.adaptive_c,
        )
    };
    Ok(match p.thresholding_mode {
        ThresholdingMode::Sauvola => sauvola_threshold(input, p.sauvola_window, p.sauvola_k),
        ThresholdingMode::Adaptive => adaptive(),
        ThresholdingMode::Otsu => otsu_threshold(input, ThresholdType::Binary),
        ThresholdingMode::EdgeFusion => {
            if p.canny_low > p.canny_high {
                return Err(PipelineError::kernel(
                    Stage::Threshold.id(),
                    format!("canny_low {} exceeds canny_high {}", p.canny_low, p.canny_high),
                ));
            }
            let edges = canny(input, p.canny_low as f32, p.canny_high as f32, 3, false).to_luma();
            let base = adaptive().to_luma();
            PixelBuffer::from_luma(&luma_from_fn(base.width(), base.height(), |x, y| {
                if edges.get_pixel(x, y).0[0] > 0 { 0 } else { base.get_pixel(x, y).0[0] }
            }))
        }
    })
}

// ───────────────────────────── Stage 6: Ridge ─────────────────────────────

/// How much brighter the flanks of `(x, y)` are than the pixel itself,
/// taking the strongest of four directions.
fn ridge_response(gray: &GrayImage, x: u32, y: u32) -> f64 {
    const DIRECTIONS: [(i64, i64); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];
    let (x, y) = (i64::from(x), i64::from(y));
    let centre = f64::from(clamped_luma(gray, x, y));
    DIRECTIONS
        .iter()
        .map(|&(dx, dy)| {
            let a = f64::from(clamped_luma(gray, x + dx * RIDGE_REACH, y + dy * RIDGE_REACH));
            let b = f64::from(clamped_luma(gray, x - dx * RIDGE_REACH, y - dy * RIDGE_REACH));
            (a + b) / 2.0 - centre
        })
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Keep only ink pixels that sit on a ridge of `reference`.
fn ridge_filter(binary: &GrayImage, reference: &GrayImage, threshold: f64) -> GrayImage {
    luma_from_fn(binary.width(), binary.height(), |x, y| {
        let v = binary.get_pixel(x, y).0[0];
        let on_reference = x < reference.width() && y < reference.height();
        if v < INK_BELOW && on_reference && ridge_response(reference, x, y) < threshold {
            255
        } else {
            v
        }
    })
}

// ───────────────────────────── Stage 7: Cleanup ─────────────────────────────

/// Close ink gaps, open away spurs, then erase small ink specks.
///
/// Ink is dark, so closing the ink is an opening of the image and the
/// reverse.
fn cleanup(binary: &GrayImage, p: &EnhancedParams) -> GrayImage {
    let mut img = binary.clone();
    if p.cleanup_close_size > 1 {
        img = apply_gray(&img, MorphologyOp::TrueOpening, &StructuringElement::square(p.cleanup_close_size));
    }
    if p.cleanup_open_size > 1 {
        img = apply_gray(&img, MorphologyOp::TrueClosing, &StructuringElement::square(p.cleanup_open_size));
    }
    let mut mask = BinaryMask::from_gray(&img, |v| v < INK_BELOW);
    let min_area = p.min_component_area as usize;
    for component in label_components(&mask, Connectivity::Eight).components {
        if component.area() < min_area {
            for &(x, y) in &component.pixels {
                mask.set(x, y, false);
            }
        }
    }
    mask.to_gray(0, 255)
}

// ───────────────────────────── Stage 10: Output ─────────────────────────────

fn compose(lines: &PixelBuffer, mask: &PixelBuffer, mode: OutputMode) -> PixelBuffer {
    match mode {
        OutputMode::Lines => PixelBuffer::from_luma(&lines.to_luma()),
        OutputMode::Mask => PixelBuffer::from_luma(&mask.to_luma()),
        OutputMode::Combined => {
            let (lines, mask) = (lines.to_luma(), mask.to_luma());
            PixelBuffer::from_luma(&luma_from_fn(lines.width(), lines.height(), |x, y| {
                let on_mask = x < mask.width() && y < mask.height() && mask.get_pixel(x, y).0[0] < INK_BELOW;
                if lines.get_pixel(x, y).0[0] < INK_BELOW {
                    0
                } else if on_mask {
                    COMBINED_MASK_GRAY
                } else {
                    255
                }
            }))
        }
    }
}
