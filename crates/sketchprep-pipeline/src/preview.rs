//! Parameter-sweep previews.
//!
//! [`generate_combinations`] picks a small, deterministic set of parameter
//! overrides from an algorithm's preview values; [`evaluate_combinations`]
//! runs each of them on every image. Neither touches a pipeline
//! definition: a chosen combination is copied into an instance with
//! [`apply_selection`].

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::definition::{InstanceId, PipelineDefinition};
use crate::executor::guarded;
use crate::params::{ParamSet, ParamSpec, ParamValue};
use crate::registry::Registry;
use crate::types::PipelineError;

/// Hard cap on the number of combinations per sweep.
pub const MAX_PREVIEW_COMBINATIONS: usize = 15;

/// One point of a parameter sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewCombination {
    /// Position in the sweep.
    pub combo_id: usize,
    /// Values that differ from the instance's own parameters.
    pub param_overrides: ParamSet,
    /// Human-readable summary, e.g. `"gamma: 0.3"`.
    pub label: String,
}

/// One combination applied to one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResult {
    /// Which combination produced this buffer.
    pub combo_id: usize,
    /// Index of the source image in the evaluated slice.
    pub image_index: usize,
    /// The processed image.
    pub buffer: PixelBuffer,
    /// Copied from the combination.
    pub label: String,
}

/// Values a parameter is swept over: its preview list, or its default
/// when the list is empty.
fn sweep_values(spec: &ParamSpec) -> Vec<ParamValue> {
    if spec.preview_values.is_empty() {
        vec![spec.default.clone()]
    } else {
        spec.preview_values.clone()
    }
}

fn combination(combo_id: usize, param_overrides: ParamSet, label: String) -> PreviewCombination {
    PreviewCombination {
        combo_id,
        param_overrides,
        label,
    }
}

/// Sample parameter combinations for `algorithm_id`.
///
/// At most `min(grid_budget, 15)` combinations are returned. The strategy
/// depends on the number of parameters in the schema:
///
/// - one: the first preview values, in order;
/// - two: the four corners and the centre of the value grid, then (for
///   budgets above five) the four edge midpoints, then the rest of the
///   grid in row-major order;
/// - three or more: all defaults, all minimal, all maximal, each
///   parameter alone at its minimum and maximum (when that differs from
///   its default), then every parameter at its middle value.
///
/// # Errors
///
/// [`PipelineError::UnknownAlgorithm`] if `algorithm_id` is not registered.
pub fn generate_combinations(
    registry: &Registry,
    algorithm_id: &str,
    grid_budget: usize,
) -> Result<Vec<PreviewCombination>, PipelineError> {
    let schema = registry.schema(algorithm_id)?;
    let budget = grid_budget.min(MAX_PREVIEW_COMBINATIONS);
    let combos = match schema {
        [] => Vec::new(),
        [only] => single(only, budget),
        [first, second] => pairs(first, second, budget),
        _ => distinctive(schema, budget),
    };
    tracing::debug!(algorithm = algorithm_id, count = combos.len(), budget, "generated preview combinations");
    Ok(combos)
}

fn single(spec: &ParamSpec, budget: usize) -> Vec<PreviewCombination> {
    sweep_values(spec)
        .into_iter()
        .take(budget)
        .enumerate()
        .map(|(i, v)| {
            let label = format!("{}: {v}", spec.name);
            combination(i, ParamSet::new().with(spec.name, v), label)
        })
        .collect()
}

fn pairs(first: &ParamSpec, second: &ParamSpec, budget: usize) -> Vec<PreviewCombination> {
    let (a, b) = (sweep_values(first), sweep_values(second));
    let (last_a, last_b) = (a.len() - 1, b.len() - 1);
    let (mid_a, mid_b) = (a.len() / 2, b.len() / 2);

    let mut picks = vec![(0, 0), (0, last_b), (last_a, 0), (last_a, last_b), (mid_a, mid_b)];
    if budget > 5 {
        picks.extend([(0, mid_b), (last_a, mid_b), (mid_a, 0), (mid_a, last_b)]);
    }
    picks.extend((0..a.len()).flat_map(|i| (0..b.len()).map(move |j| (i, j))));

    let mut seen = Vec::new();
    for pick in picks {
        if seen.len() == budget {
            break;
        }
        if !seen.contains(&pick) {
            seen.push(pick);
        }
    }

    seen.into_iter()
        .enumerate()
        .map(|(id, (i, j))| {
            let label = format!("{}: {}, {}: {}", first.name, a[i], second.name, b[j]);
            let overrides = ParamSet::new().with(first.name, a[i].clone()).with(second.name, b[j].clone());
            combination(id, overrides, label)
        })
        .collect()
}

fn distinctive(schema: &[ParamSpec], budget: usize) -> Vec<PreviewCombination> {
    let values: Vec<Vec<ParamValue>> = schema.iter().map(sweep_values).collect();
    let defaults: ParamSet = schema.iter().map(|s| (s.name, s.default.clone())).collect();
    let across = |pick: fn(&[ParamValue]) -> &ParamValue| -> ParamSet {
        schema
            .iter()
            .zip(&values)
            .map(|(s, v)| (s.name, pick(v).clone()))
            .collect()
    };

    let mut combos = vec![
        combination(0, defaults.clone(), "Default settings".to_owned()),
        combination(1, across(|v| &v[0]), "Minimal settings".to_owned()),
        combination(2, across(|v| &v[v.len() - 1]), "Maximal settings".to_owned()),
    ];

    for (spec, options) in schema.iter().zip(&values) {
        let extremes = if options.len() == 1 { vec![0] } else { vec![0, options.len() - 1] };
        for index in extremes {
            if combos.len() >= budget {
                break;
            }
            let value = &options[index];
            if Some(value) == defaults.get(spec.name) {
                continue;
            }
            let mut overrides = defaults.clone();
            overrides.set(spec.name, value.clone());
            let label = format!("{}: {value} (others default)", spec.name);
            combos.push(combination(combos.len(), overrides, label));
        }
    }

    if combos.len() < budget {
        let balanced = across(|v| &v[v.len() / 2]);
        combos.push(combination(combos.len(), balanced, "Balanced settings".to_owned()));
    }

    combos.truncate(budget);
    combos
}

fn evaluate_one(
    registry: &Registry,
    algorithm_id: &str,
    base: &ParamSet,
    image_index: usize,
    image: &PixelBuffer,
    combo: &PreviewCombination,
) -> Option<PreviewResult> {
    let mut params = base.clone();
    params.merge(&combo.param_overrides);
    match guarded(algorithm_id, || registry.dispatch(algorithm_id, image, &params)) {
        Ok(buffer) => Some(PreviewResult {
            combo_id: combo.combo_id,
            image_index,
            buffer,
            label: combo.label.clone(),
        }),
        Err(error) => {
            tracing::warn!(algorithm = algorithm_id, combo = combo.combo_id, image_index, %error, "preview combination failed");
            None
        }
    }
}

#[cfg(not(feature = "parallel"))]
fn evaluate_image(
    registry: &Registry,
    algorithm_id: &str,
    base: &ParamSet,
    image_index: usize,
    image: &PixelBuffer,
    combinations: &[PreviewCombination],
) -> Vec<PreviewResult> {
    combinations
        .iter()
        .filter_map(|combo| evaluate_one(registry, algorithm_id, base, image_index, image, combo))
        .collect()
}

#[cfg(feature = "parallel")]
fn evaluate_image(
    registry: &Registry,
    algorithm_id: &str,
    base: &ParamSet,
    image_index: usize,
    image: &PixelBuffer,
    combinations: &[PreviewCombination],
) -> Vec<PreviewResult> {
    use rayon::prelude::*;

    combinations
        .par_iter()
        .filter_map(|combo| evaluate_one(registry, algorithm_id, base, image_index, image, combo))
        .collect()
}

/// Run every combination on every image.
///
/// Each combination's overrides are merged over `base` (typically the
/// parameters of the instance being tuned). The outer vector follows
/// `images`, the inner one `combinations`. A combination whose kernel
/// fails is logged and left out of that image's row.
///
/// # Errors
///
/// [`PipelineError::UnknownAlgorithm`] if `algorithm_id` is not registered.
#[tracing::instrument(skip_all, fields(algorithm = algorithm_id, images = images.len(), combinations = combinations.len()))]
pub fn evaluate_combinations(
    registry: &Registry,
    algorithm_id: &str,
    combinations: &[PreviewCombination],
    images: &[PixelBuffer],
    base: &ParamSet,
) -> Result<Vec<Vec<PreviewResult>>, PipelineError> {
    registry.descriptor(algorithm_id)?;
    let mut rows = Vec::with_capacity(images.len());
    for (image_index, image) in images.iter().enumerate() {
        rows.push(evaluate_image(registry, algorithm_id, base, image_index, image, combinations));
        std::thread::yield_now();
    }
    Ok(rows)
}

/// Copy a combination's overrides into one instance of `definition`.
///
/// # Errors
///
/// [`PipelineError::UnknownInstance`] if `instance` is not present.
pub fn apply_selection(
    definition: &mut PipelineDefinition,
    instance: InstanceId,
    combination: &PreviewCombination,
) -> Result<(), PipelineError> {
    definition.apply_overrides(instance, &combination.param_overrides)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn labels(combos: &[PreviewCombination]) -> Vec<&str> {
        combos.iter().map(|c| c.label.as_str()).collect()
    }

    // ─────────────────────────── one parameter ───────────────────────────

    #[test]
    fn single_parameter_takes_preview_values_in_order() {
        let r = Registry::new();
        let combos = generate_combinations(&r, "gammaCorrection", 9).unwrap();
        assert_eq!(
            labels(&combos),
            ["gamma: 0.3", "gamma: 0.7", "gamma: 1", "gamma: 1.5", "gamma: 2.2"]
        );
        let ids: Vec<_> = combos.iter().map(|c| c.combo_id).collect();
        assert_eq!(ids, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn single_parameter_respects_budget() {
        let r = Registry::new();
        assert_eq!(generate_combinations(&r, "gammaCorrection", 2).unwrap().len(), 2);
        assert!(generate_combinations(&r, "gammaCorrection", 0).unwrap().is_empty());
    }

    // ─────────────────────────── two parameters ───────────────────────────

    #[test]
    fn two_parameters_start_with_corners_and_centre() {
        let r = Registry::new();
        // kernelSize [1,3,7,11,15] x sigma [0.3,1,2,4]
        let combos = generate_combinations(&r, "gaussianBlur", 5).unwrap();
        assert_eq!(
            labels(&combos),
            [
                "kernelSize: 1, sigma: 0.3",
                "kernelSize: 1, sigma: 4",
                "kernelSize: 15, sigma: 0.3",
                "kernelSize: 15, sigma: 4",
                "kernelSize: 7, sigma: 2",
            ]
        );
    }

    #[test]
    fn two_parameters_fill_budget_without_repeats() {
        let r = Registry::new();
        let combos = generate_combinations(&r, "gaussianBlur", 40).unwrap();
        assert_eq!(combos.len(), MAX_PREVIEW_COMBINATIONS);
        assert_eq!(combos[5].label, "kernelSize: 1, sigma: 2");
        assert_eq!(combos[9].label, "kernelSize: 1, sigma: 1");
        for (i, a) in combos.iter().enumerate() {
            assert!(combos[i + 1..].iter().all(|b| b.param_overrides != a.param_overrides));
        }
    }

    // ─────────────────────────── three or more ───────────────────────────

    #[test]
    fn many_parameters_lead_with_default_minimal_maximal() {
        let r = Registry::new();
        let combos = generate_combinations(&r, "cannyEdgeDetection", 15).unwrap();
        assert_eq!(labels(&combos)[..3], ["Default settings", "Minimal settings", "Maximal settings"]);
        assert_eq!(combos[0].param_overrides, r.default_params("cannyEdgeDetection").unwrap());
        assert_eq!(combos.last().unwrap().label, "Balanced settings");
        assert!(combos.len() <= MAX_PREVIEW_COMBINATIONS);
        assert!(combos.iter().skip(3).all(|c| c.label == "Balanced settings" || c.label.ends_with("(others default)")));
    }

    #[test]
    fn many_parameters_truncate_to_budget() {
        let r = Registry::new();
        let combos = generate_combinations(&r, "shapeDecomposition", 4).unwrap();
        assert_eq!(combos.len(), 4);
        assert!(combos[3].label.ends_with("(others default)"));
    }

    #[test]
    fn variations_equal_to_default_are_skipped() {
        let r = Registry::new();
        let defaults = r.default_params("cannyEdgeDetection").unwrap();
        for combo in generate_combinations(&r, "cannyEdgeDetection", 15).unwrap() {
            if combo.label.ends_with("(others default)") {
                assert_ne!(combo.param_overrides, defaults);
            }
        }
    }

    #[test]
    fn unknown_algorithm_is_an_error() {
        let r = Registry::new();
        assert!(matches!(
            generate_combinations(&r, "fourierFilter", 9),
            Err(PipelineError::UnknownAlgorithm { .. })
        ));
        assert!(evaluate_combinations(&r, "fourierFilter", &[], &[], &ParamSet::new()).is_err());
    }

    // ─────────────────────────── evaluation ───────────────────────────

    #[test]
    fn evaluation_covers_every_image_and_combination() {
        let r = Registry::new();
        let combos = generate_combinations(&r, "gammaCorrection", 9).unwrap();
        let images = [
            PixelBuffer::from_pixel(4, 4, [100, 100, 100, 255]),
            PixelBuffer::from_pixel(3, 5, [30, 60, 90, 255]),
        ];
        let rows = evaluate_combinations(&r, "gammaCorrection", &combos, &images, &ParamSet::new()).unwrap();
        assert_eq!(rows.len(), 2);
        for (image_index, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), combos.len());
            for (result, combo) in row.iter().zip(&combos) {
                assert_eq!(result.image_index, image_index);
                assert_eq!(result.combo_id, combo.combo_id);
                assert_eq!(result.buffer.dimensions(), images[image_index].dimensions());
                let expected = r.dispatch("gammaCorrection", &images[image_index], &combo.param_overrides).unwrap();
                assert_eq!(result.buffer, expected);
            }
        }
    }

    #[test]
    fn failed_combination_is_left_out() {
        let r = Registry::new();
        let combos = vec![
            combination(0, ParamSet::new().with("sigma", 1.0), "ok".to_owned()),
            combination(1, ParamSet::new().with("sigma", "wide"), "bad".to_owned()),
        ];
        let rows =
            evaluate_combinations(&r, "gaussianBlur", &combos, &[PixelBuffer::new(4, 4)], &ParamSet::new()).unwrap();
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0][0].label, "ok");
    }

    #[test]
    fn selection_updates_only_the_target_instance() {
        let r = Registry::new();
        let mut def = PipelineDefinition::new();
        let a = def.add(&r, "gaussianBlur").unwrap();
        let b = def.add(&r, "gaussianBlur").unwrap();
        let before = def.clone();
        let combos = generate_combinations(&r, "gaussianBlur", 9).unwrap();
        let rows = evaluate_combinations(&r, "gaussianBlur", &combos, &[PixelBuffer::new(6, 6)], &def.get(a).unwrap().params);
        assert!(rows.is_ok());
        assert_eq!(def, before);

        apply_selection(&mut def, a, &combos[3]).unwrap();
        assert_eq!(def.get(a).unwrap().params.get("sigma"), Some(&ParamValue::Number(4.0)));
        assert_eq!(def.get(a).unwrap().params.get("kernelSize"), Some(&ParamValue::Number(15.0)));
        assert_eq!(def.get(b).unwrap().params, before.get(b).unwrap().params);
    }
}
