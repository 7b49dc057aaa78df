//! Ordered, caller-owned pipeline definitions.
//!
//! A [`PipelineDefinition`] is an arena of [`AlgorithmInstance`]s in
//! execution order. Instances are addressed by a monotonically increasing
//! [`InstanceId`] that survives reordering; `ordinal` numbers the
//! instances of the same algorithm and is renumbered when a sibling is
//! removed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::params::{ParamSet, ParamValue};
use crate::registry::Registry;
use crate::types::PipelineError;

/// Stable handle of an instance within one definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One configured use of a registry algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmInstance {
    /// Handle, unique within the definition.
    pub id: InstanceId,
    /// Registry id.
    pub algorithm_id: String,
    /// 1-based position among instances of the same algorithm.
    pub ordinal: u32,
    /// Full parameter set (defaults resolved at creation).
    pub params: ParamSet,
}

/// One entry of a hand-written definition file: an algorithm id plus the
/// parameters that differ from its defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionStep {
    /// Registry id.
    pub algorithm: String,
    /// Overrides merged over the defaults.
    #[serde(default)]
    pub params: ParamSet,
}

#[derive(Deserialize)]
struct RawDefinition {
    instances: Vec<AlgorithmInstance>,
    #[serde(default)]
    next_id: u64,
}

/// Ordered list of algorithm instances. Empty is valid and runs as a
/// no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDefinition")]
pub struct PipelineDefinition {
    instances: Vec<AlgorithmInstance>,
    next_id: u64,
}

impl From<RawDefinition> for PipelineDefinition {
    fn from(raw: RawDefinition) -> Self {
        let floor = raw.instances.iter().map(|i| i.id.0 + 1).max().unwrap_or(0);
        Self {
            instances: raw.instances,
            next_id: raw.next_id.max(floor),
        }
    }
}

impl PipelineDefinition {
    /// An empty definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a definition from hand-written steps, in order.
    ///
    /// # Errors
    ///
    /// As [`PipelineDefinition::add_with_params`].
    pub fn from_steps(
        registry: &Registry,
        steps: impl IntoIterator<Item = DefinitionStep>,
    ) -> Result<Self, PipelineError> {
        let mut definition = Self::new();
        for step in steps {
            definition.add_with_params(registry, &step.algorithm, &step.params)?;
        }
        Ok(definition)
    }

    /// Append an instance with the algorithm's default parameters.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownAlgorithm`] for an unregistered id;
    /// [`PipelineError::DuplicateInstance`] if the algorithm allows one
    /// instance and the definition already has it.
    pub fn add(&mut self, registry: &Registry, algorithm_id: &str) -> Result<InstanceId, PipelineError> {
        self.add_with_params(registry, algorithm_id, &ParamSet::new())
    }

    /// Append an instance with `overrides` merged over the defaults.
    ///
    /// # Errors
    ///
    /// As [`PipelineDefinition::add`].
    pub fn add_with_params(
        &mut self,
        registry: &Registry,
        algorithm_id: &str,
        overrides: &ParamSet,
    ) -> Result<InstanceId, PipelineError> {
        let descriptor = registry.descriptor(algorithm_id)?;
        let siblings = self.siblings(algorithm_id);
        if siblings > 0 && !descriptor.allow_multiple {
            return Err(PipelineError::DuplicateInstance {
                id: algorithm_id.to_owned(),
            });
        }
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        self.instances.push(AlgorithmInstance {
            id,
            algorithm_id: algorithm_id.to_owned(),
            ordinal: siblings + 1,
            params: registry.resolve(algorithm_id, overrides)?,
        });
        Ok(id)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn siblings(&self, algorithm_id: &str) -> u32 {
        self.instances
            .iter()
            .filter(|i| i.algorithm_id == algorithm_id)
            .count() as u32
    }

    fn position(&self, id: InstanceId) -> Result<usize, PipelineError> {
        self.instances
            .iter()
            .position(|i| i.id == id)
            .ok_or(PipelineError::UnknownInstance(id))
    }

    fn get_mut(&mut self, id: InstanceId) -> Result<&mut AlgorithmInstance, PipelineError> {
        let index = self.position(id)?;
        Ok(&mut self.instances[index])
    }

    /// Remove an instance and renumber the remaining instances of the same
    /// algorithm `1..=n` in pipeline order.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownInstance`] if `id` is not present.
    pub fn remove(&mut self, id: InstanceId) -> Result<AlgorithmInstance, PipelineError> {
        let removed = self.instances.remove(self.position(id)?);
        let mut ordinal = 0;
        for instance in &mut self.instances {
            if instance.algorithm_id == removed.algorithm_id {
                ordinal += 1;
                instance.ordinal = ordinal;
            }
        }
        Ok(removed)
    }

    /// Swap an instance with its predecessor. Returns `false` if it is
    /// already first.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownInstance`] if `id` is not present.
    pub fn move_up(&mut self, id: InstanceId) -> Result<bool, PipelineError> {
        let index = self.position(id)?;
        if index == 0 {
            return Ok(false);
        }
        self.instances.swap(index, index - 1);
        Ok(true)
    }

    /// Swap an instance with its successor. Returns `false` if it is
    /// already last.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownInstance`] if `id` is not present.
    pub fn move_down(&mut self, id: InstanceId) -> Result<bool, PipelineError> {
        let index = self.position(id)?;
        if index + 1 >= self.instances.len() {
            return Ok(false);
        }
        self.instances.swap(index, index + 1);
        Ok(true)
    }

    /// Set one parameter on one instance.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownInstance`] if `id` is not present.
    pub fn set_param(&mut self, id: InstanceId, name: &str, value: impl Into<ParamValue>) -> Result<(), PipelineError> {
        self.get_mut(id)?.params.set(name, value);
        Ok(())
    }

    /// Merge a partial parameter set into one instance.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownInstance`] if `id` is not present.
    pub fn apply_overrides(&mut self, id: InstanceId, overrides: &ParamSet) -> Result<(), PipelineError> {
        self.get_mut(id)?.params.merge(overrides);
        Ok(())
    }

    /// Look up an instance.
    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&AlgorithmInstance> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// Instances in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &AlgorithmInstance> {
        self.instances.iter()
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns `true` if the definition has no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Display label of an instance: the algorithm's display name, with
    /// `#ordinal` appended when the definition holds several instances of
    /// that algorithm.
    #[must_use]
    pub fn label(&self, instance: &AlgorithmInstance, display_name: &str) -> String {
        if self.siblings(&instance.algorithm_id) > 1 {
            format!("{display_name} #{}", instance.ordinal)
        } else {
            display_name.to_owned()
        }
    }
}
