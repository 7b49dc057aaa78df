//! sketchprep-bench: CLI tool for running sketch preprocessing on image files.
//!
//! Decodes images from disk, runs a pipeline definition, the enhanced
//! ten-stage pipeline or a parameter sweep on them, prints a per-step
//! report and optionally writes every intermediate buffer as PNG.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin sketchprep-bench -- list
//! cargo run --release --bin sketchprep-bench -- run --definition steps.json scan.png --out out/
//! cargo run --release --bin sketchprep-bench -- enhanced --disable step8_skeleton scan.png --out out/
//! cargo run --release --bin sketchprep-bench -- preview sauvolaThreshold --budget 9 scan.png --out out/
//! ```
//!
//! Set `RUST_LOG=debug` for per-step timings from the library.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use sketchprep_pipeline::{
    DefinitionStep, EnhancedParams, EnhancedStageToggles, Executor, PipelineDefinition, PixelBuffer, Registry, Stage,
    StepResult, evaluate_combinations, generate_combinations, run_enhanced_pipeline,
};
use tracing_subscriber::EnvFilter;

/// Sketch preprocessing runs and parameter sweeps on image files.
#[derive(Parser)]
#[command(name = "sketchprep-bench", version)]
struct Cli {
    /// Number of runs per image for timing.
    #[arg(long, global = true, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the algorithm catalogue.
    List {
        /// Print the catalogue as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run a pipeline definition on each image.
    Run {
        /// JSON file: a list of `{"algorithm", "params"}` steps or a saved
        /// definition.
        #[arg(long)]
        definition: PathBuf,

        /// Input images (PNG, JPEG, BMP, WebP).
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Directory for per-step PNGs.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run the ten-stage enhanced pipeline on each image.
    Enhanced {
        /// Enhanced parameters as JSON; omitted fields keep their defaults.
        #[arg(long)]
        params_json: Option<String>,

        /// Stage to switch off (e.g. `step6_ridge`); repeatable.
        #[arg(long, value_name = "STAGE")]
        disable: Vec<String>,

        /// Stage to switch on (e.g. `step6_ridge`); repeatable.
        #[arg(long, value_name = "STAGE")]
        enable: Vec<String>,

        /// Input images (PNG, JPEG, BMP, WebP).
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Directory for per-stage PNGs.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Sweep one algorithm's parameters over each image.
    Preview {
        /// Registry id of the algorithm to sweep.
        algorithm: String,

        /// Maximum number of combinations (capped at 15).
        #[arg(long, default_value_t = 9)]
        budget: usize,

        /// Input images (PNG, JPEG, BMP, WebP).
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Directory for per-combination PNGs.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::List { json } => list(json),
        Command::Run {
            ref definition,
            ref images,
            ref out,
        } => run(definition, images, out.as_deref(), cli.runs),
        Command::Enhanced {
            ref params_json,
            ref disable,
            ref enable,
            ref images,
            ref out,
        } => enhanced(params_json.as_deref(), disable, enable, images, out.as_deref(), cli.runs),
        Command::Preview {
            ref algorithm,
            budget,
            ref images,
            ref out,
        } => preview(algorithm, budget, images, out.as_deref(), cli.runs),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

// ───────────────────────────── Commands ─────────────────────────────

fn list(json: bool) -> Result<(), String> {
    let registry = Registry::new();
    if json {
        let text = serde_json::to_string_pretty(registry.list_algorithms())
            .map_err(|e| format!("Error serializing catalogue: {e}"))?;
        println!("{text}");
        return Ok(());
    }

    println!("{:<26} {:<18} {}", "Id", "Category", "Parameters");
    println!("{}", "-".repeat(90));
    for descriptor in registry.list_algorithms() {
        let params: Vec<_> = descriptor.params.iter().map(|p| p.name).collect();
        println!(
            "{:<26} {:<18} {}",
            descriptor.id,
            descriptor.category.name(),
            params.join(", "),
        );
    }
    Ok(())
}

fn run(definition_path: &Path, images: &[PathBuf], out: Option<&Path>, runs: usize) -> Result<(), String> {
    let executor = Executor::new();
    let text = std::fs::read_to_string(definition_path)
        .map_err(|e| format!("Error reading {}: {e}", definition_path.display()))?;
    let definition = parse_definition(executor.registry(), &text)?;
    eprintln!("Definition: {} steps", definition.len());

    for path in images {
        let source = load(path)?;
        let (results, timings) = timed(runs, || executor.run_pipeline(&source, &definition));
        print_report(path, &results, &timings);
        if let Some(dir) = out {
            write_steps(dir, path, &results)?;
        }
    }
    Ok(())
}

fn enhanced(
    params_json: Option<&str>,
    disable: &[String],
    enable: &[String],
    images: &[PathBuf],
    out: Option<&Path>,
    runs: usize,
) -> Result<(), String> {
    let params: EnhancedParams = match params_json {
        Some(json) => serde_json::from_str(json).map_err(|e| format!("Error parsing --params-json: {e}"))?,
        None => EnhancedParams::default(),
    };
    let mut toggles = EnhancedStageToggles::default();
    for (names, on) in [(enable, true), (disable, false)] {
        for name in names {
            let stage = Stage::from_id(name).ok_or_else(|| format!("Unknown stage: {name}"))?;
            toggles.set(stage, on);
        }
    }
    eprintln!("Params: {params:#?}");

    for path in images {
        let source = load(path)?;
        let (results, timings) = timed(runs, || run_enhanced_pipeline(&source, &params, &toggles));
        print_report(path, &results, &timings);
        if let Some(dir) = out {
            write_steps(dir, path, &results)?;
        }
    }
    Ok(())
}

fn preview(algorithm: &str, budget: usize, images: &[PathBuf], out: Option<&Path>, runs: usize) -> Result<(), String> {
    let registry = Registry::new();
    let combos = generate_combinations(&registry, algorithm, budget).map_err(|e| e.to_string())?;
    let base = registry.default_params(algorithm).map_err(|e| e.to_string())?;
    let sources = images.iter().map(|p| load(p)).collect::<Result<Vec<_>, _>>()?;

    println!("{algorithm}: {} combinations", combos.len());
    for combo in &combos {
        println!("  [{:02}] {}", combo.combo_id, combo.label);
    }

    let (rows, timings) = timed(runs, || evaluate_combinations(&registry, algorithm, &combos, &sources, &base));
    let rows = rows.map_err(|e| e.to_string())?;
    print_timings(&timings);

    if let Some(dir) = out {
        for (path, row) in images.iter().zip(&rows) {
            for result in row {
                let name = output_name(path, result.combo_id, &result.label);
                write_png(dir, &name, &result.buffer)?;
            }
        }
    }
    Ok(())
}

// ───────────────────────────── Helpers ─────────────────────────────

/// Parse a definition file: a list of steps, or a saved definition.
fn parse_definition(registry: &Registry, text: &str) -> Result<PipelineDefinition, String> {
    // A step list is a JSON array; the saved form is an object.
    if text.trim_start().starts_with('[') {
        let steps: Vec<DefinitionStep> =
            serde_json::from_str(text).map_err(|e| format!("Error parsing definition steps: {e}"))?;
        return PipelineDefinition::from_steps(registry, steps).map_err(|e| e.to_string());
    }
    serde_json::from_str(text).map_err(|e| format!("Error parsing definition: {e}"))
}

fn load(path: &Path) -> Result<PixelBuffer, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    PixelBuffer::decode(&bytes).map_err(|e| format!("{}: {e}", path.display()))
}

/// Run `f` `runs` times, keeping the last result and every duration.
fn timed<T>(runs: usize, mut f: impl FnMut() -> T) -> (T, Vec<Duration>) {
    let mut timings = Vec::with_capacity(runs);
    let start = Instant::now();
    let mut result = f();
    timings.push(start.elapsed());
    for _ in 1..runs {
        let start = Instant::now();
        result = f();
        timings.push(start.elapsed());
    }
    (result, timings)
}

fn print_report(path: &Path, results: &[StepResult], timings: &[Duration]) {
    let (width, height) = results.first().map_or((0, 0), |r| (r.buffer.width(), r.buffer.height()));
    println!();
    println!("{} ({width}x{height})\n{}", path.display(), "=".repeat(60));
    println!("{:<4} {:<46} {:>8}", "#", "Step", "Status");
    println!("{}", "-".repeat(60));
    for step in results {
        let status = format!("{:?}", step.status).to_lowercase();
        println!("{:<4} {:<46} {status:>8}", step.step_index, step.label);
    }
    print_timings(timings);
}

/// Print the run duration, with min/mean/max when there are several runs.
#[allow(clippy::cast_precision_loss)]
fn print_timings(timings: &[Duration]) {
    let ms: Vec<f64> = timings.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
    match ms.as_slice() {
        [] => {}
        [only] => println!("Elapsed: {only:.3}ms"),
        _ => {
            let min = ms.iter().copied().reduce(f64::min).unwrap_or(0.0);
            let max = ms.iter().copied().reduce(f64::max).unwrap_or(0.0);
            let mean = ms.iter().sum::<f64>() / ms.len() as f64;
            println!("Elapsed ({} runs): min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms", ms.len());
        }
    }
}

fn write_steps(dir: &Path, source: &Path, results: &[StepResult]) -> Result<(), String> {
    for step in results {
        let name = output_name(source, step.step_index, &step.label);
        write_png(dir, &name, &step.buffer)?;
    }
    Ok(())
}

fn write_png(dir: &Path, name: &str, buffer: &PixelBuffer) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    let png = buffer.encode_png().map_err(|e| e.to_string())?;
    let path = dir.join(name);
    std::fs::write(&path, &png).map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = png.len(), "wrote image");
    Ok(())
}

/// `<stem>_<NN>_<slug>.png`
fn output_name(source: &Path, index: usize, label: &str) -> String {
    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    format!("{stem}_{index:02}_{}.png", slug(label))
}

fn slug(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn slug_collapses_punctuation() {
        assert_eq!(slug("Step 9: Contour Simplification (SKIPPED)"), "step-9-contour-simplification-skipped");
        assert_eq!(slug("Gaussian Blur #2"), "gaussian-blur-2");
        assert_eq!(slug("gamma: 0.3"), "gamma-0-3");
    }

    #[test]
    fn output_names_are_numbered() {
        let name = output_name(Path::new("scans/page.jpg"), 3, "Median Filter");
        assert_eq!(name, "page_03_median-filter.png");
    }

    #[test]
    fn definition_accepts_steps_or_saved_form() {
        let registry = Registry::new();
        let steps = parse_definition(&registry, r#"[{"algorithm": "grayscale"}]"#).unwrap();
        assert_eq!(steps.len(), 1);
        let saved = serde_json::to_string(&steps).unwrap();
        assert_eq!(parse_definition(&registry, &saved).unwrap(), steps);
        assert!(parse_definition(&registry, r#"[{"algorithm": "nope"}]"#).is_err());
    }

    #[test]
    fn definition_steps_take_boolean_flags() {
        let registry = Registry::new();
        let text = r#"[{"algorithm": "cannyEdgeDetection", "params": {"l2Gradient": false}}]"#;
        assert_eq!(parse_definition(&registry, text).unwrap().len(), 1);

        let err = parse_definition(&registry, r#"[{"algorithm": "grayscale", "params": {"method": [1]}}]"#).unwrap_err();
        assert!(err.starts_with("Error parsing definition steps:"), "{err}");
        assert!(!err.contains("instances"), "{err}");
    }
}
