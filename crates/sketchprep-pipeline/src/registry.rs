//! Algorithm lookup, parameter resolution and dispatch.

use crate::buffer::PixelBuffer;
use crate::catalog::{AlgorithmDescriptor, builtin};
use crate::params::{ParamSet, ParamSpec};
use crate::types::PipelineError;

/// The catalogue of dispatchable algorithms.
///
/// Parameter checking is advisory: [`Registry::dispatch`] hands values to
/// the kernel as they are, and only [`Registry::dispatch_strict`] rejects
/// values outside their schema.
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: Vec<AlgorithmDescriptor>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry holding every built-in algorithm.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: builtin(),
        }
    }

    /// Every registered algorithm, in display order.
    #[must_use]
    pub fn list_algorithms(&self) -> &[AlgorithmDescriptor] {
        &self.descriptors
    }

    /// Look up an algorithm.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownAlgorithm`] if `id` is not registered.
    pub fn descriptor(&self, id: &str) -> Result<&AlgorithmDescriptor, PipelineError> {
        self.descriptors
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| PipelineError::UnknownAlgorithm { id: id.to_owned() })
    }

    /// The parameter schema of an algorithm, in sampling order.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownAlgorithm`] if `id` is not registered.
    pub fn schema(&self, id: &str) -> Result<&[ParamSpec], PipelineError> {
        Ok(&self.descriptor(id)?.params)
    }

    /// Schema defaults for an algorithm.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownAlgorithm`] if `id` is not registered.
    pub fn default_params(&self, id: &str) -> Result<ParamSet, PipelineError> {
        Ok(self.descriptor(id)?.default_params())
    }

    /// Defaults with `overrides` merged on top.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownAlgorithm`] if `id` is not registered.
    pub fn resolve(&self, id: &str, overrides: &ParamSet) -> Result<ParamSet, PipelineError> {
        let mut params = self.default_params(id)?;
        params.merge(overrides);
        Ok(params)
    }

    /// Run an algorithm on `buf`. Missing parameters take their defaults;
    /// out-of-range values are passed to the kernel unchanged.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownAlgorithm`] for an unregistered id, or
    /// [`PipelineError::KernelExecution`] if a parameter cannot be read
    /// as its kind.
    pub fn dispatch(&self, id: &str, buf: &PixelBuffer, params: &ParamSet) -> Result<PixelBuffer, PipelineError> {
        let descriptor = self.descriptor(id)?;
        let mut resolved = descriptor.default_params();
        resolved.merge(params);
        (descriptor.kernel)(buf, &resolved)
    }

    /// Check `params` against the schema of `id`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownAlgorithm`] for an unregistered id, or
    /// [`PipelineError::InvalidParameter`] for the first parameter that is
    /// unknown to the schema or outside its range or options.
    pub fn validate(&self, id: &str, params: &ParamSet) -> Result<(), PipelineError> {
        let descriptor = self.descriptor(id)?;
        for (name, value) in params.iter() {
            let invalid = |reason: String| PipelineError::InvalidParameter {
                algorithm: id.to_owned(),
                param: name.to_owned(),
                reason,
            };
            let spec = descriptor
                .param(name)
                .ok_or_else(|| invalid("not a parameter of this algorithm".to_owned()))?;
            spec.check(value).map_err(invalid)?;
        }
        Ok(())
    }

    /// [`Registry::validate`], then [`Registry::dispatch`].
    ///
    /// # Errors
    ///
    /// Any error of either call.
    pub fn dispatch_strict(
        &self,
        id: &str,
        buf: &PixelBuffer,
        params: &ParamSet,
    ) -> Result<PixelBuffer, PipelineError> {
        self.validate(id, params)?;
        self.dispatch(id, buf, params)
    }
}
