//! Ordered registry of step definitions.

use crate::error::{ProvisionerError, Result};
use crate::provision::step::{StepBuilder, StepDefinition};
use crate::util::wildcard_match;
use tracing::{debug, warn};

/// Ordered set of declared steps.
///
/// Declaration order is preserved across registration, replacement and
/// filtering - steps run in the sequence they were declared.
#[derive(Debug, Default)]
pub struct StepRegistry {
    steps: Vec<StepDefinition>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a step. Re-registering an existing id replaces the prior
    /// definition in place (last-write-wins), keeping its position.
    pub fn register<F>(&mut self, id: &str, configure: F)
    where
        F: FnOnce(&mut StepBuilder),
    {
        let mut builder = StepBuilder::new(id);
        configure(&mut builder);
        let definition = builder.build();

        if let Some(existing) = self.steps.iter_mut().find(|step| step.id == id) {
            warn!(step_id = %id, "Step re-registered, replacing prior definition");
            *existing = definition;
        } else {
            debug!(step_id = %id, "Step registered");
            self.steps.push(definition);
        }
    }

    /// Fail fast on definitions that cannot be executed or persisted.
    pub fn validate(&self) -> Result<()> {
        for step in &self.steps {
            if step.sync.is_none() {
                return Err(ProvisionerError::ValidationError(format!(
                    "Step '{}' has no sync action defined",
                    step.id
                )));
            }
            validate_id(&step.id)?;
        }
        Ok(())
    }

    /// Steps whose id matches the wildcard pattern, in registration order.
    pub fn filter(&self, pattern: &str) -> Vec<StepDefinition> {
        self.steps
            .iter()
            .filter(|step| wildcard_match(&step.id, pattern))
            .cloned()
            .collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Step ids become marker node names, so they are restricted to characters
/// safe in a repository path.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ProvisionerError::ValidationError(
            "Step id must not be empty".to_string(),
        ));
    }

    if id.starts_with('/') || id.ends_with('/') || id.contains("//") {
        return Err(ProvisionerError::ValidationError(format!(
            "Step id '{id}' contains empty path segments"
        )));
    }

    if let Some(invalid) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/')))
    {
        return Err(ProvisionerError::ValidationError(format!(
            "Step id '{id}' contains character '{invalid}' unsafe for the marker path"
        )));
    }

    Ok(())
}
