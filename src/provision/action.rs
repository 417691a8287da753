//! Provisioning outcome records.

use crate::instance::Instance;
use crate::provision::marker::Marker;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one step against one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The step was not performable and nothing was executed.
    Skipped,
    /// The sync action completed.
    Ended,
    /// The sync action failed and the step allowed continuing.
    Failed,
}

impl ActionStatus {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Ended => write!(f, "ended"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skipped" => Ok(Self::Skipped),
            "ended" => Ok(Self::Ended),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid action status: {s}")),
        }
    }
}

/// Ephemeral pairing of one step and one instance for a single evaluation,
/// carrying the marker observed at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStep {
    pub step_id: String,
    pub instance: Instance,
    pub marker: Option<Marker>,
}

impl fmt::Display for InstanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' at {}", self.step_id, self.instance)
    }
}

/// Immutable result record; exactly one is produced per (step, instance)
/// per provisioning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub step: InstanceStep,
    pub status: ActionStatus,
}

impl Action {
    pub fn new(step: InstanceStep, status: ActionStatus) -> Self {
        Self { step, status }
    }
}
