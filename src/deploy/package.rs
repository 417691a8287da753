//! Deployable package handle.

use crate::deploy::states::PackageState;
use crate::deploy::DeployError;
use std::path::{Path, PathBuf};

/// Content identity of a package: what the remote package manager lists it
/// under, independent of the local file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    pub name: String,
    pub group: String,
    pub version: String,
}

impl PackageIdentity {
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            version: version.into(),
        }
    }
}

/// A deployable artifact moving through the package lifecycle.
///
/// Tracks the local file, the remote path once known, and the current
/// lifecycle state; transitions are validated against [`PackageState`].
#[derive(Debug, Clone)]
pub struct PackageHandle {
    local_path: PathBuf,
    identity: PackageIdentity,
    remote_path: Option<String>,
    state: PackageState,
}

impl PackageHandle {
    pub fn new(local_path: impl Into<PathBuf>, identity: PackageIdentity) -> Self {
        Self {
            local_path: local_path.into(),
            identity,
            remote_path: None,
            state: PackageState::Resolved,
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    /// Remote path, available once uploaded.
    pub fn remote_path(&self) -> Option<&str> {
        self.remote_path.as_deref()
    }

    /// Remote path or an error when the package has not been uploaded yet.
    pub fn require_remote_path(&self) -> Result<&str, DeployError> {
        self.remote_path.as_deref().ok_or(DeployError::NotUploaded)
    }

    pub(crate) fn advance(&mut self, next: PackageState) -> Result<(), DeployError> {
        if !self.state.can_transition_to(next) {
            return Err(DeployError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn mark_uploaded(&mut self, remote_path: String) -> Result<(), DeployError> {
        self.advance(PackageState::Uploaded)?;
        self.remote_path = Some(remote_path);
        Ok(())
    }
}
