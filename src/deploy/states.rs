//! Package lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a deployable package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    /// Local file resolved, nothing on the remote yet.
    Resolved,
    /// Uploaded to the remote package manager; remote path known.
    Uploaded,
    /// Contents installed into the repository.
    Installed,
    /// Replicated to downstream instances.
    Activated,
    /// Removed from the remote package manager.
    Deleted,
}

impl PackageState {
    /// Whether a transition to `next` is legal. The lifecycle advances
    /// strictly forward; deletion is reachable from any state.
    pub fn can_transition_to(&self, next: PackageState) -> bool {
        if next == PackageState::Deleted {
            return true;
        }
        matches!(
            (self, next),
            (PackageState::Resolved, PackageState::Uploaded)
                | (PackageState::Uploaded, PackageState::Installed)
                | (PackageState::Installed, PackageState::Activated)
        )
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, PackageState::Resolved | PackageState::Deleted)
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::Uploaded => write!(f, "uploaded"),
            Self::Installed => write!(f, "installed"),
            Self::Activated => write!(f, "activated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for PackageState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolved" => Ok(Self::Resolved),
            "uploaded" => Ok(Self::Uploaded),
            "installed" => Ok(Self::Installed),
            "activated" => Ok(Self::Activated),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Invalid package state: {s}")),
        }
    }
}
