//! Response envelopes for the remote package-manager protocol.
//!
//! Each envelope is parsed once per HTTP call and never mutated. The install
//! status taxonomy is strict: any reported error fails the whole install,
//! regardless of the status field claiming success.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response to upload and replicate commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    /// Remote path of the uploaded package; some endpoint versions omit it.
    #[serde(default)]
    pub path: Option<String>,
}

/// Response to the install command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallResponse {
    pub status: InstallStatus,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl InstallResponse {
    /// An install only counts as clean when the status is success AND the
    /// error list is empty.
    pub fn is_clean_success(&self) -> bool {
        self.status == InstallStatus::Success && self.errors.is_empty()
    }
}

/// Install status taxonomy reported by the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    /// Reported success; may still carry errors.
    Success,
    /// Completed but with recorded errors.
    SuccessWithErrors,
    /// Installation did not complete.
    Fail,
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SuccessWithErrors => write!(f, "success_with_errors"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl std::str::FromStr for InstallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "success_with_errors" => Ok(Self::SuccessWithErrors),
            "fail" => Ok(Self::Fail),
            _ => Err(format!("Invalid install status: {s}")),
        }
    }
}

/// Response to the delete command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub msg: String,
}

/// Response to the list-packages query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub results: Vec<PackageDescriptor>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl ListResponse {
    /// Resolve the remote path of an uploaded package by content identity.
    pub fn resolve_path(&self, name: &str, group: &str, version: &str) -> Option<&str> {
        self.results
            .iter()
            .find(|pkg| pkg.name == name && pkg.group == group && pkg.version == version)
            .map(|pkg| pkg.path.as_str())
    }
}

/// One package entry reported by the list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub path: String,
}
