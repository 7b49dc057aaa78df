//! The built-in algorithm catalogue.
//!
//! Every entry pairs a parameter schema with a kernel adapter that reads
//! its typed parameters out of a [`ParamSet`] and calls the library
//! function. Schema order matters: the preview engine samples parameters
//! in the order listed here.

use serde::Serialize;

use crate::blur::{anisotropic_diffusion, bilateral_filter, gaussian_blur, median_filter};
use crate::buffer::{PixelBuffer, to_byte};
use crate::canny::canny;
use crate::contour::{BoundaryKind, boundary_extraction, contour_detection, contour_simplification};
use crate::decompose::{DecompositionMode, DecompositionOutput, DecompositionParams, shape_decomposition};
use crate::edge::{EdgeDirection, laplacian_edges, sobel_edges};
use crate::enhance::{clahe, unsharp_mask};
use crate::grayscale::{GrayscaleMethod, gamma_correct_in_place, grayscale_in_place};
use crate::morphology::{KernelShape, MorphologyOp, morphology};
use crate::params::{ParamSet, ParamSpec};
use crate::shading::{ShadingMetric, intensity_variance, shading_removal, texture_segmentation};
use crate::skeleton::skeletonize;
use crate::threshold::{AdaptiveMethod, ThresholdType, adaptive_threshold, multi_otsu, otsu_threshold, sauvola_threshold};
use crate::types::PipelineError;

/// Signature shared by every kernel adapter.
pub type Kernel = fn(&PixelBuffer, &ParamSet) -> Result<PixelBuffer, PipelineError>;

/// Grouping used by UIs to arrange the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Color to gray conversion.
    Preprocessing,
    /// Smoothing and denoising.
    Noise,
    /// Contrast and sharpness.
    Enhancement,
    /// Edge detectors.
    Edges,
    /// Morphology and thinning.
    Morphology,
    /// Binarization.
    Threshold,
    /// Connected-region outlines.
    Contours,
    /// Shading and texture suppression.
    Shading,
    /// Stroke versus fill separation.
    Shapes,
}

impl Category {
    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Preprocessing => "Preprocessing",
            Self::Noise => "Noise Reduction",
            Self::Enhancement => "Enhancement",
            Self::Edges => "Edge Detection",
            Self::Morphology => "Morphology",
            Self::Threshold => "Thresholding",
            Self::Contours => "Contours",
            Self::Shading => "Shading Removal",
            Self::Shapes => "Shape Analysis",
        }
    }
}

/// Immutable description of one registered algorithm.
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmDescriptor {
    /// Registry id (camelCase).
    pub id: &'static str,
    /// Display name.
    pub display_name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// UI grouping.
    pub category: Category,
    /// Whether a definition may hold more than one instance.
    pub allow_multiple: bool,
    /// Parameter schema, in sampling order.
    pub params: Vec<ParamSpec>,
    /// Kernel adapter.
    #[serde(skip)]
    pub kernel: Kernel,
}

impl AlgorithmDescriptor {
    /// The schema's default values.
    #[must_use]
    pub fn default_params(&self) -> ParamSet {
        self.params.iter().map(|s| (s.name, s.default.clone())).collect()
    }

    /// The schema entry for `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|s| s.name == name)
    }
}

#[allow(clippy::too_many_arguments)]
fn entry(
    id: &'static str,
    display_name: &'static str,
    description: &'static str,
    category: Category,
    allow_multiple: bool,
    params: Vec<ParamSpec>,
    kernel: Kernel,
) -> AlgorithmDescriptor {
    AlgorithmDescriptor {
        id,
        display_name,
        description,
        category,
        allow_multiple,
        params,
        kernel,
    }
}

/// Every built-in algorithm, in display order.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn builtin() -> Vec<AlgorithmDescriptor> {
    use Category::{Contours, Edges, Enhancement, Morphology, Noise, Preprocessing, Shading, Shapes, Threshold};

    vec![
        entry(
            "grayscale",
            "Grayscale Conversion",
            "Convert to grayscale using weighted RGB channels",
            Preprocessing,
            false,
            vec![
                ParamSpec::choice("method", "Conversion Method", GrayscaleMethod::Luminance, &[
                    GrayscaleMethod::Luminance,
                    GrayscaleMethod::Average,
                    GrayscaleMethod::Lightness,
                    GrayscaleMethod::Custom,
                ]),
                ParamSpec::numeric("redWeight", "Red Weight", (0.0, 1.0, 0.001), 0.299, &[0.1, 0.299, 0.5, 0.8]),
                ParamSpec::numeric("greenWeight", "Green Weight", (0.0, 1.0, 0.001), 0.587, &[0.3, 0.587, 0.8]),
                ParamSpec::numeric("blueWeight", "Blue Weight", (0.0, 1.0, 0.001), 0.114, &[0.05, 0.114, 0.3]),
            ],
            run_grayscale,
        ),
        entry(
            "gaussianBlur",
            "Gaussian Blur",
            "Smooth image with Gaussian kernel to reduce noise",
            Noise,
            true,
            vec![
                ParamSpec::numeric("kernelSize", "Kernel Size", (1.0, 15.0, 2.0), 5.0, &[1.0, 3.0, 7.0, 11.0, 15.0]),
                ParamSpec::numeric("sigma", "Sigma", (0.1, 5.0, 0.1), 1.4, &[0.3, 1.0, 2.0, 4.0]),
            ],
            run_gaussian_blur,
        ),
        entry(
            "medianFilter",
            "Median Filter",
            "Remove salt-and-pepper noise while preserving edges",
            Noise,
            true,
            vec![ParamSpec::numeric("kernelSize", "Kernel Size", (3.0, 9.0, 2.0), 5.0, &[3.0, 5.0, 7.0, 9.0])],
            run_median_filter,
        ),
        entry(
            "bilateralFilter",
            "Bilateral Filter",
            "Edge-preserving smoothing filter",
            Noise,
            true,
            vec![
                ParamSpec::numeric("d", "Diameter", (5.0, 15.0, 2.0), 9.0, &[5.0, 9.0, 15.0]),
                ParamSpec::numeric("sigmaColor", "Sigma Color", (10.0, 150.0, 5.0), 75.0, &[25.0, 75.0, 125.0]),
                ParamSpec::numeric("sigmaSpace", "Sigma Space", (10.0, 150.0, 5.0), 75.0, &[25.0, 75.0, 125.0]),
            ],
            run_bilateral_filter,
        ),
        entry(
            "anisotropicDiffusion",
            "Anisotropic Diffusion",
            "Iterative edge-preserving smoothing",
            Noise,
            true,
            vec![
                ParamSpec::numeric("iterations", "Iterations", (1.0, 20.0, 1.0), 10.0, &[5.0, 10.0, 15.0]),
                ParamSpec::numeric("kappa", "Diffusion Constant", (10.0, 100.0, 5.0), 30.0, &[20.0, 30.0, 50.0]),
                ParamSpec::numeric("gamma", "Rate of Diffusion", (0.1, 0.3, 0.01), 0.2, &[0.1, 0.2, 0.3]),
            ],
            run_anisotropic_diffusion,
        ),
        entry(
            "unsharpMask",
            "Unsharp Masking",
            "Enhance edge details and sharpness",
            Enhancement,
            true,
            vec![
                ParamSpec::numeric("radius", "Radius", (0.5, 5.0, 0.1), 1.5, &[0.5, 1.5, 3.0, 5.0]),
                ParamSpec::numeric("amount", "Amount", (0.5, 3.0, 0.1), 1.5, &[0.5, 1.5, 2.5]),
                ParamSpec::numeric("threshold", "Threshold", (0.0, 50.0, 1.0), 3.0, &[0.0, 3.0, 15.0, 30.0]),
            ],
            run_unsharp_mask,
        ),
        entry(
            "gammaCorrection",
            "Gamma Correction",
            "Adjust image brightness and contrast",
            Enhancement,
            true,
            vec![ParamSpec::numeric("gamma", "Gamma Value", (0.1, 3.0, 0.1), 1.0, &[0.3, 0.7, 1.0, 1.5, 2.2])],
            run_gamma_correction,
        ),
        entry(
            "clahe",
            "CLAHE (Contrast Enhancement)",
            "Contrast Limited Adaptive Histogram Equalization",
            Enhancement,
            true,
            vec![
                ParamSpec::numeric("clipLimit", "Clip Limit", (1.0, 10.0, 0.5), 3.0, &[2.0, 3.0, 5.0]),
                ParamSpec::numeric("tileGridSize", "Tile Grid Size", (4.0, 16.0, 2.0), 8.0, &[4.0, 8.0, 12.0]),
            ],
            run_clahe,
        ),
        entry(
            "sobelEdgeDetection",
            "Sobel Edge Detection",
            "Gradient-based edge detection",
            Edges,
            true,
            vec![
                ParamSpec::numeric("ksize", "Kernel Size", (1.0, 7.0, 2.0), 3.0, &[1.0, 3.0, 5.0, 7.0]),
                ParamSpec::numeric("lowThreshold", "Low Threshold", (0.0, 255.0, 5.0), 50.0, &[30.0, 50.0, 80.0]),
                ParamSpec::numeric("highThreshold", "High Threshold", (50.0, 300.0, 10.0), 100.0, &[60.0, 100.0, 140.0, 180.0]),
                ParamSpec::choice("direction", "Direction", EdgeDirection::Both, &[
                    EdgeDirection::Both,
                    EdgeDirection::Horizontal,
                    EdgeDirection::Vertical,
                ]),
            ],
            run_sobel,
        ),
        entry(
            "laplacianEdgeDetection",
            "Laplacian Edge Detection",
            "Second derivative edge detection",
            Edges,
            true,
            vec![
                ParamSpec::numeric("ksize", "Kernel Size", (1.0, 7.0, 2.0), 3.0, &[1.0, 3.0, 5.0]),
                ParamSpec::numeric("threshold", "Threshold", (10.0, 100.0, 5.0), 30.0, &[20.0, 30.0, 50.0]),
            ],
            run_laplacian,
        ),
        entry(
            "cannyEdgeDetection",
            "Canny Edge Detection",
            "Multi-stage edge detection algorithm",
            Edges,
            true,
            vec![
                ParamSpec::numeric("lowThreshold", "Low Threshold", (10.0, 150.0, 5.0), 50.0, &[20.0, 50.0, 80.0, 120.0]),
                ParamSpec::numeric("highThreshold", "High Threshold", (50.0, 300.0, 10.0), 150.0, &[80.0, 150.0, 220.0, 280.0]),
                ParamSpec::numeric("gaussianKernel", "Gaussian Kernel", (3.0, 7.0, 2.0), 5.0, &[3.0, 5.0, 7.0]),
                ParamSpec::flag("l2Gradient", "L2 Gradient", true),
            ],
            run_canny,
        ),
        entry(
            "morphology",
            "Morphological Operations",
            "Shape-based image processing operations",
            Morphology,
            true,
            vec![
                ParamSpec::choice("operation", "Operation", MorphologyOp::Closing, &[
                    MorphologyOp::Opening,
                    MorphologyOp::Closing,
                    MorphologyOp::Gradient,
                    MorphologyOp::Dilation,
                    MorphologyOp::Erosion,
                ]),
                ParamSpec::numeric("kernelSize", "Kernel Size", (1.0, 15.0, 2.0), 3.0, &[1.0, 3.0, 7.0, 11.0]),
                ParamSpec::choice("kernelShape", "Kernel Shape", KernelShape::Rectangle, &[
                    KernelShape::Rectangle,
                    KernelShape::Ellipse,
                    KernelShape::Cross,
                ]),
                ParamSpec::numeric("iterations", "Iterations", (1.0, 5.0, 1.0), 1.0, &[1.0, 2.0, 3.0, 4.0]),
            ],
            run_morphology,
        ),
        entry(
            "otsuThreshold",
            "Otsu Threshold",
            "Automatic global thresholding",
            Threshold,
            false,
            vec![ParamSpec::choice("thresholdType", "Threshold Type", ThresholdType::Binary, &[
                ThresholdType::Binary,
                ThresholdType::BinaryInv,
            ])],
            run_otsu,
        ),
        entry(
            "multiOtsu",
            "Multi-level Otsu",
            "Three-class thresholding",
            Threshold,
            false,
            vec![ParamSpec::numeric("classes", "Number of Classes", (2.0, 5.0, 1.0), 3.0, &[2.0, 3.0, 4.0])],
            run_multi_otsu,
        ),
        entry(
            "adaptiveThreshold",
            "Adaptive Threshold",
            "Local thresholding for varying illumination",
            Threshold,
            true,
            vec![
                ParamSpec::numeric("maxValue", "Max Value", (200.0, 255.0, 5.0), 255.0, &[200.0, 255.0]),
                ParamSpec::choice("adaptiveMethod", "Adaptive Method", AdaptiveMethod::Gaussian, &[
                    AdaptiveMethod::Mean,
                    AdaptiveMethod::Gaussian,
                ]),
                ParamSpec::choice("thresholdType", "Threshold Type", ThresholdType::Binary, &[
                    ThresholdType::Binary,
                    ThresholdType::BinaryInv,
                ]),
                ParamSpec::numeric("blockSize", "Block Size", (3.0, 21.0, 2.0), 11.0, &[5.0, 9.0, 15.0, 21.0]),
                ParamSpec::numeric("c", "Constant C", (0.0, 20.0, 1.0), 2.0, &[0.0, 2.0, 8.0, 15.0]),
            ],
            run_adaptive,
        ),
        entry(
            "sauvolaThreshold",
            "Sauvola Threshold",
            "Local binarization robust to uneven paper tone",
            Threshold,
            true,
            vec![
                ParamSpec::numeric("windowSize", "Window Size", (3.0, 101.0, 2.0), 51.0, &[25.0, 51.0, 75.0]),
                ParamSpec::numeric("k", "Sensitivity k", (0.05, 0.5, 0.01), 0.2, &[0.1, 0.2, 0.3, 0.5]),
            ],
            run_sauvola,
        ),
        entry(
            "contourDetection",
            "Contour Detection & Filtering",
            "Find and filter contours by area and perimeter",
            Contours,
            true,
            vec![
                ParamSpec::numeric("minArea", "Min Area", (10.0, 2000.0, 10.0), 100.0, &[50.0, 100.0, 200.0]),
                ParamSpec::numeric("maxArea", "Max Area", (1000.0, 50_000.0, 100.0), 10_000.0, &[5000.0, 10_000.0, 20_000.0]),
                ParamSpec::numeric("minPerimeter", "Min Perimeter", (10.0, 500.0, 10.0), 50.0, &[30.0, 50.0, 80.0]),
                ParamSpec::numeric("thickness", "Line Thickness", (1.0, 5.0, 1.0), 2.0, &[1.0, 2.0, 3.0]),
                ParamSpec::flag("fillContours", "Fill Contours", false),
            ],
            run_contour_detection,
        ),
        entry(
            "contourSimplification",
            "Contour Simplification",
            "Smooth detected contours",
            Contours,
            true,
            vec![
                ParamSpec::numeric("epsilon", "Epsilon (Approximation)", (0.001, 0.1, 0.001), 0.02, &[0.01, 0.02, 0.05]),
                ParamSpec::flag("closed", "Closed Contours", true),
            ],
            run_contour_simplification,
        ),
        entry(
            "boundaryExtraction",
            "Boundary Extraction",
            "Extract outlines of filled shapes and regions",
            Contours,
            true,
            vec![
                ParamSpec::choice("method", "Boundary Type", BoundaryKind::External, &[
                    BoundaryKind::External,
                    BoundaryKind::Internal,
                    BoundaryKind::Both,
                ]),
                ParamSpec::numeric("minShapeArea", "Min Shape Area", (50.0, 5000.0, 50.0), 500.0, &[200.0, 500.0, 1000.0, 2000.0]),
                ParamSpec::numeric("smoothing", "Boundary Smoothing", (0.0, 5.0, 1.0), 1.0, &[0.0, 1.0, 3.0]),
                ParamSpec::numeric("thickness", "Outline Thickness", (1.0, 5.0, 1.0), 2.0, &[1.0, 2.0, 3.0]),
                ParamSpec::flag("preserveHoles", "Preserve Holes", true),
            ],
            run_boundary_extraction,
        ),
        entry(
            "skeletonization",
            "Skeletonization",
            "Reduce shapes to one-pixel skeletons (Zhang-Suen)",
            Morphology,
            false,
            vec![ParamSpec::numeric("maxIterations", "Max Iterations", (1.0, 50.0, 1.0), 20.0, &[10.0, 20.0, 30.0])],
            run_skeletonization,
        ),
        entry(
            "shadingRemoval",
            "Shading Removal",
            "Remove filled regions and shading using texture analysis",
            Shading,
            true,
            vec![
                ParamSpec::choice("method", "Detection Method", ShadingMetric::Variance, &[
                    ShadingMetric::Variance,
                    ShadingMetric::Entropy,
                    ShadingMetric::Gradient,
                ]),
                ParamSpec::numeric("windowSize", "Analysis Window", (5.0, 21.0, 2.0), 11.0, &[5.0, 9.0, 15.0, 21.0]),
                ParamSpec::numeric("threshold", "Shading Threshold", (0.1, 2.0, 0.1), 0.8, &[0.3, 0.8, 1.3, 1.8]),
                ParamSpec::numeric("morphClose", "Morphological Closing", (1.0, 7.0, 2.0), 3.0, &[1.0, 3.0, 5.0, 7.0]),
            ],
            run_shading_removal,
        ),
        entry(
            "intensityVariance",
            "Intensity Variance Filter",
            "Remove regions with low intensity variance (flat shading)",
            Shading,
            true,
            vec![
                ParamSpec::numeric("kernelSize", "Kernel Size", (5.0, 21.0, 2.0), 9.0, &[5.0, 9.0, 15.0, 21.0]),
                ParamSpec::numeric("varianceThreshold", "Variance Threshold", (50.0, 500.0, 10.0), 200.0, &[75.0, 150.0, 300.0, 450.0]),
                ParamSpec::flag("preserveEdges", "Preserve Edges", true),
            ],
            run_intensity_variance,
        ),
        entry(
            "textureSegmentation",
            "Texture Segmentation",
            "Separate lines from textured or shaded regions",
            Shading,
            true,
            vec![
                ParamSpec::numeric("filterSize", "Filter Size", (3.0, 15.0, 2.0), 7.0, &[5.0, 7.0, 11.0]),
                ParamSpec::numeric("energyThreshold", "Energy Threshold", (0.01, 0.5, 0.01), 0.1, &[0.05, 0.1, 0.2]),
            ],
            run_texture_segmentation,
        ),
        entry(
            "shapeDecomposition",
            "Shape Decomposition",
            "Separate line strokes from filled regions",
            Shapes,
            true,
            vec![
                ParamSpec::choice("mode", "Processing Mode", DecompositionMode::Balanced, &[
                    DecompositionMode::Conservative,
                    DecompositionMode::Balanced,
                    DecompositionMode::Aggressive,
                ]),
                ParamSpec::numeric("strokeThickness", "Max Stroke Thickness", (1.0, 15.0, 1.0), 5.0, &[3.0, 5.0, 8.0, 12.0]),
                ParamSpec::numeric("fillThreshold", "Min Fill Area", (50.0, 3000.0, 50.0), 800.0, &[200.0, 500.0, 800.0, 1500.0]),
                ParamSpec::numeric("aspectRatioLimit", "Stroke Aspect Ratio", (2.0, 25.0, 1.0), 6.0, &[4.0, 6.0, 10.0, 15.0]),
                ParamSpec::numeric("densityThreshold", "Fill Density", (0.1, 0.9, 0.1), 0.6, &[0.3, 0.6, 0.8]),
                ParamSpec::numeric("edgePreservation", "Edge Preservation", (0.0, 10.0, 1.0), 3.0, &[0.0, 3.0, 7.0]),
                ParamSpec::choice("outputMode", "Output Mode", DecompositionOutput::SmartBoundaries, &[
                    DecompositionOutput::LinesOnly,
                    DecompositionOutput::BoundariesOnly,
                    DecompositionOutput::SmartBoundaries,
                    DecompositionOutput::Combined,
                ]),
            ],
            run_shape_decomposition,
        ),
    ]
}

// ───────────────────────── kernel adapters ──────────────────────────

fn run_grayscale(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "grayscale";
    let method = p.choice(ID, "method")?;
    let weights = [
        p.number(ID, "redWeight")?,
        p.number(ID, "greenWeight")?,
        p.number(ID, "blueWeight")?,
    ];
    let mut out = buf.clone();
    grayscale_in_place(&mut out, method, weights);
    Ok(out)
}

fn run_gaussian_blur(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "gaussianBlur";
    Ok(gaussian_blur(buf, p.odd_size(ID, "kernelSize")?, p.number(ID, "sigma")?))
}

fn run_median_filter(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    Ok(median_filter(buf, p.odd_size("medianFilter", "kernelSize")?))
}

fn run_bilateral_filter(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "bilateralFilter";
    Ok(bilateral_filter(
        buf,
        p.size(ID, "d")?,
        p.number(ID, "sigmaColor")?,
        p.number(ID, "sigmaSpace")?,
    ))
}

fn run_anisotropic_diffusion(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "anisotropicDiffusion";
    Ok(anisotropic_diffusion(
        buf,
        p.size(ID, "iterations")?,
        p.number(ID, "kappa")?,
        p.number(ID, "gamma")?,
    ))
}

fn run_unsharp_mask(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "unsharpMask";
    Ok(unsharp_mask(
        buf,
        p.number(ID, "radius")?,
        p.number(ID, "amount")?,
        p.number(ID, "threshold")?,
    ))
}

fn run_gamma_correction(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    let gamma = p.number("gammaCorrection", "gamma")?;
    let mut out = buf.clone();
    gamma_correct_in_place(&mut out, gamma);
    Ok(out)
}

fn run_clahe(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    Ok(clahe(buf, p.number("clahe", "clipLimit")?, p.size("clahe", "tileGridSize")?))
}

fn run_sobel(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "sobelEdgeDetection";
    Ok(sobel_edges(
        buf,
        p.size(ID, "ksize")?,
        p.number(ID, "lowThreshold")?,
        p.number(ID, "highThreshold")?,
        p.choice(ID, "direction")?,
    ))
}

fn run_laplacian(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "laplacianEdgeDetection";
    Ok(laplacian_edges(buf, p.size(ID, "ksize")?, p.number(ID, "threshold")?))
}

#[allow(clippy::cast_possible_truncation)]
fn run_canny(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "cannyEdgeDetection";
    Ok(canny(
        buf,
        p.number(ID, "lowThreshold")? as f32,
        p.number(ID, "highThreshold")? as f32,
        p.odd_size(ID, "gaussianKernel")?,
        p.flag(ID, "l2Gradient")?,
    ))
}

fn run_morphology(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "morphology";
    Ok(morphology(
        buf,
        p.choice(ID, "operation")?,
        p.size(ID, "kernelSize")?,
        p.choice(ID, "kernelShape")?,
        p.size(ID, "iterations")?,
    ))
}

fn run_otsu(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    Ok(otsu_threshold(buf, p.choice("otsuThreshold", "thresholdType")?))
}

fn run_multi_otsu(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    Ok(multi_otsu(buf, p.size("multiOtsu", "classes")?))
}

fn run_adaptive(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "adaptiveThreshold";
    Ok(adaptive_threshold(
        buf,
        to_byte(p.number(ID, "maxValue")?),
        p.choice(ID, "adaptiveMethod")?,
        p.choice(ID, "thresholdType")?,
        p.size(ID, "blockSize")?,
        p.number(ID, "c")?,
    ))
}

fn run_sauvola(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "sauvolaThreshold";
    Ok(sauvola_threshold(buf, p.size(ID, "windowSize")?, p.number(ID, "k")?))
}

fn run_contour_detection(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "contourDetection";
    Ok(contour_detection(
        buf,
        p.size(ID, "minArea")? as usize,
        p.size(ID, "maxArea")? as usize,
        p.size(ID, "minPerimeter")? as usize,
        p.size(ID, "thickness")?,
        p.flag(ID, "fillContours")?,
    ))
}

fn run_contour_simplification(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "contourSimplification";
    Ok(contour_simplification(buf, p.number(ID, "epsilon")?, p.flag(ID, "closed")?))
}

fn run_boundary_extraction(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "boundaryExtraction";
    Ok(boundary_extraction(
        buf,
        p.choice(ID, "method")?,
        p.size(ID, "minShapeArea")? as usize,
        p.number(ID, "smoothing")?,
        p.size(ID, "thickness")?,
        p.flag(ID, "preserveHoles")?,
    ))
}

fn run_skeletonization(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    Ok(skeletonize(buf, p.size("skeletonization", "maxIterations")?))
}

fn run_shading_removal(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "shadingRemoval";
    Ok(shading_removal(
        buf,
        p.choice(ID, "method")?,
        p.size(ID, "windowSize")?,
        p.number(ID, "threshold")?,
        p.size(ID, "morphClose")?,
    ))
}

fn run_intensity_variance(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "intensityVariance";
    Ok(intensity_variance(
        buf,
        p.size(ID, "kernelSize")?,
        p.number(ID, "varianceThreshold")?,
        p.flag(ID, "preserveEdges")?,
    ))
}

fn run_texture_segmentation(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "textureSegmentation";
    Ok(texture_segmentation(buf, p.size(ID, "filterSize")?, p.number(ID, "energyThreshold")?))
}

fn run_shape_decomposition(buf: &PixelBuffer, p: &ParamSet) -> Result<PixelBuffer, PipelineError> {
    const ID: &str = "shapeDecomposition";
    let params = DecompositionParams {
        stroke_thickness: p.number(ID, "strokeThickness")?,
        fill_threshold: p.number(ID, "fillThreshold")?,
        aspect_ratio_limit: p.number(ID, "aspectRatioLimit")?,
        density_threshold: p.number(ID, "densityThreshold")?,
        edge_preservation: p.number(ID, "edgePreservation")?,
    };
    Ok(shape_decomposition(buf, p.choice(ID, "mode")?, params, p.choice(ID, "outputMode")?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::params::ParamKind;

    #[test]
    fn ids_are_unique() {
        let all = builtin();
        let mut ids: Vec<_> = all.iter().map(|d| d.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), all.len());
        assert_eq!(all.len(), 24);
    }

    #[test]
    fn defaults_satisfy_their_schema() {
        for d in builtin() {
            for spec in &d.params {
                assert!(spec.check(&spec.default).is_ok(), "{}.{} default", d.id, spec.name);
                assert!(!spec.preview_values.is_empty(), "{}.{} previews", d.id, spec.name);
            }
        }
    }

    #[test]
    fn preview_options_are_valid_choices() {
        for d in builtin() {
            for spec in &d.params {
                if let ParamKind::Choice { .. } = spec.kind {
                    for v in &spec.preview_values {
                        assert!(spec.check(v).is_ok(), "{}.{} preview {v}", d.id, spec.name);
                    }
                }
            }
        }
    }

    #[test]
    fn every_kernel_runs_on_defaults() {
        let buf = PixelBuffer::from_fn(24, 18, |x, y| {
            let v = if (8..16).contains(&x) && y > 4 { 20 } else { 230 };
            [v, v.saturating_sub(10), v, 255]
        });
        for d in builtin() {
            let out = (d.kernel)(&buf, &d.default_params()).unwrap();
            assert_eq!(out.dimensions(), buf.dimensions(), "{}", d.id);
        }
    }

    #[test]
    fn unknown_option_is_kernel_error() {
        let d = builtin().into_iter().find(|d| d.id == "morphology").unwrap();
        let mut p = d.default_params();
        p.set("operation", "melt");
        let err = (d.kernel)(&PixelBuffer::new(4, 4), &p).unwrap_err();
        assert!(matches!(err, PipelineError::KernelExecution { .. }));
    }

    #[test]
    fn category_names() {
        assert_eq!(Category::Noise.name(), "Noise Reduction");
        assert_eq!(Category::Shapes.name(), "Shape Analysis");
    }
}
