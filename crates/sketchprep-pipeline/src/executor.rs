//! Individual-mode pipeline execution.
//!
//! Each instance of a [`PipelineDefinition`] is dispatched in order on the
//! buffer produced by the previous step. A step whose kernel fails (an
//! error or a panic) is logged and recorded as a passthrough, and the run
//! carries on with the unchanged buffer.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::buffer::PixelBuffer;
use crate::definition::{AlgorithmInstance, PipelineDefinition};
use crate::enhanced::{EnhancedParams, EnhancedStageToggles, run_enhanced_pipeline_with};
use crate::registry::Registry;
use crate::types::{PipelineError, StepResult, StepStatus};

/// Cooperative cancellation shared between a caller and a running batch.
///
/// Checked between steps and between images, never inside a kernel.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether the flag has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub(crate) fn check(cancel: Option<&CancelFlag>) -> Result<(), PipelineError> {
    if cancel.is_some_and(CancelFlag::is_cancelled) {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "kernel panicked".to_owned())
}

/// Run `f`, turning a panic into [`PipelineError::KernelExecution`].
pub(crate) fn guarded<T>(
    algorithm: &str,
    f: impl FnOnce() -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(PipelineError::kernel(algorithm, panic_message(&*payload))))
}

/// Runs pipeline definitions against a registry.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    registry: Registry,
}

impl Executor {
    /// An executor over the built-in registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor over a caller-supplied registry.
    #[must_use]
    pub const fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    /// The registry steps are dispatched through.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run every instance of `definition` on `source`.
    ///
    /// Always returns `definition.len() + 1` results; index 0 is the
    /// untouched source.
    #[must_use = "returns the per-step results"]
    #[tracing::instrument(skip_all, fields(steps = definition.len(), width = source.width(), height = source.height()))]
    pub fn run_pipeline(&self, source: &PixelBuffer, definition: &PipelineDefinition) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(definition.len() + 1);
        results.push(StepResult::original(source));
        for (index, instance) in definition.iter().enumerate() {
            let input = &results[index].buffer;
            let step = self.run_step(index + 1, definition, instance, input);
            results.push(step);
        }
        results
    }

    /// [`Executor::run_pipeline`], checking `cancel` before every step.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Cancelled`] if the flag is raised before the run
    /// completes.
    #[tracing::instrument(skip_all, fields(steps = definition.len()))]
    pub fn run_pipeline_cancellable(
        &self,
        source: &PixelBuffer,
        definition: &PipelineDefinition,
        cancel: &CancelFlag,
    ) -> Result<Vec<StepResult>, PipelineError> {
        let mut results = Vec::with_capacity(definition.len() + 1);
        results.push(StepResult::original(source));
        for (index, instance) in definition.iter().enumerate() {
            check(Some(cancel))?;
            let input = &results[index].buffer;
            let step = self.run_step(index + 1, definition, instance, input);
            results.push(step);
        }
        Ok(results)
    }

    /// Run `definition` on every image in order, yielding the thread
    /// between images.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Cancelled`] if `cancel` is raised between steps or
    /// images.
    #[tracing::instrument(skip_all, fields(images = images.len(), steps = definition.len()))]
    pub fn run_batch(
        &self,
        images: &[PixelBuffer],
        definition: &PipelineDefinition,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<Vec<StepResult>>, PipelineError> {
        let mut batch = Vec::with_capacity(images.len());
        for (image_index, source) in images.iter().enumerate() {
            check(cancel)?;
            tracing::info!(image_index, width = source.width(), height = source.height(), "running pipeline");
            let results = match cancel {
                Some(flag) => self.run_pipeline_cancellable(source, definition, flag)?,
                None => self.run_pipeline(source, definition),
            };
            batch.push(results);
            std::thread::yield_now();
        }
        Ok(batch)
    }

    /// Run the ten-stage enhanced pipeline on every image in order,
    /// yielding the thread between images.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Cancelled`] if `cancel` is raised between stages
    /// or images.
    #[tracing::instrument(skip_all, fields(images = images.len()))]
    pub fn run_enhanced_batch(
        &self,
        images: &[PixelBuffer],
        params: &EnhancedParams,
        toggles: &EnhancedStageToggles,
        cancel: Option<&CancelFlag>,
    ) -> Result<Vec<Vec<StepResult>>, PipelineError> {
        let mut batch = Vec::with_capacity(images.len());
        for (image_index, source) in images.iter().enumerate() {
            check(cancel)?;
            tracing::info!(image_index, width = source.width(), height = source.height(), "running enhanced pipeline");
            batch.push(run_enhanced_pipeline_with(source, params, toggles, cancel)?);
            std::thread::yield_now();
        }
        Ok(batch)
    }

    fn run_step(
        &self,
        step_index: usize,
        definition: &PipelineDefinition,
        instance: &AlgorithmInstance,
        input: &PixelBuffer,
    ) -> StepResult {
        let id = instance.algorithm_id.as_str();
        let display_name = self.registry.descriptor(id).map_or(id, |d| d.display_name);
        let label = definition.label(instance, display_name);

        let start = Instant::now();
        let outcome = guarded(id, || self.registry.dispatch(id, input, &instance.params));
        let elapsed = start.elapsed();

        let (label, buffer, status) = match outcome {
            Ok(buffer) => {
                tracing::debug!(step_index, algorithm = id, instance = %instance.id, ?elapsed, "step applied");
                (label, buffer, StepStatus::Applied)
            }
            Err(error) => {
                tracing::warn!(step_index, algorithm = id, instance = %instance.id, %error, "step failed, passing input through");
                (format!("{label} (FAILED)"), input.clone(), StepStatus::Failed)
            }
        };

        StepResult {
            step_index,
            label,
            buffer,
            algorithm_id: Some(instance.algorithm_id.clone()),
            instance_id: Some(instance.id),
            applied_params: Some(instance.params.clone()),
            status,
        }
    }
}
