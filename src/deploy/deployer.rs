//! Package lifecycle driver.
//!
//! Drives upload → install → activate → delete against one instance's
//! package manager, interpreting response payloads into the strict status
//! model. Lifecycle HTTP calls are never retried; the only polling happens
//! after a successful install, when the driver waits for the instance to
//! report healthy again (installs can restart the instance's bundles).

use crate::client::{ClientError, InstallResponse, InstallStatus, InstanceClient, UploadResponse};
use crate::config::AwaitConfig;
use crate::deploy::package::PackageHandle;
use crate::deploy::states::PackageState;
use crate::error::ProvisionerError;
use crate::logging::log_deploy_operation;
use crate::resilience::{AwaitError, AwaitPolicy, CancelSignal};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Errors raised by package lifecycle phases.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("package file '{0}' not found")]
    FileNotFound(PathBuf),

    /// The remote endpoint refused the operation and said why.
    #[error("{0}")]
    Rejected(String),

    #[error("Installation completed with errors")]
    InstallCompletedWithErrors,

    #[error("Installation incomplete")]
    InstallIncomplete,

    #[error("Package activation failed")]
    ActivationFailed,

    #[error("package is not uploaded on the instance")]
    NotUploaded,

    #[error("invalid package state transition: {from} -> {to}")]
    InvalidTransition {
        from: PackageState,
        to: PackageState,
    },

    #[error(transparent)]
    Transport(#[from] ClientError),

    #[error(transparent)]
    AwaitUp(#[from] AwaitError),
}

impl From<DeployError> for ProvisionerError {
    fn from(error: DeployError) -> Self {
        match error {
            DeployError::FileNotFound(path) => {
                ProvisionerError::FileNotFound(path.display().to_string())
            }
            DeployError::AwaitUp(AwaitError::Cancelled { condition }) => {
                ProvisionerError::Cancelled(condition)
            }
            DeployError::AwaitUp(timeout) => ProvisionerError::TimeoutExceeded(timeout.to_string()),
            DeployError::Transport(transport) => ProvisionerError::IoError(transport.to_string()),
            other => ProvisionerError::DeployError(other.to_string()),
        }
    }
}

/// Access-control handling mode sent with install commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcHandling {
    Ignore,
    Overwrite,
    Merge,
    #[default]
    MergePreserve,
    Clear,
}

impl AcHandling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Overwrite => "overwrite",
            Self::Merge => "merge",
            Self::MergePreserve => "merge_preserve",
            Self::Clear => "clear",
        }
    }
}

impl fmt::Display for AcHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options applied to every lifecycle phase.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Overwrite an already-uploaded package with the same content identity.
    pub force: bool,
    /// Install subpackages recursively.
    pub recursive: bool,
    pub ac_handling: AcHandling,
    /// Budget for the post-install health poll.
    pub await_up: AwaitConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            force: true,
            recursive: true,
            ac_handling: AcHandling::default(),
            await_up: AwaitConfig::default(),
        }
    }
}

/// Drives the package lifecycle against one instance.
pub struct PackageDeployer {
    client: Arc<InstanceClient>,
    config: DeployConfig,
}

impl PackageDeployer {
    pub fn new(client: Arc<InstanceClient>) -> Self {
        Self::with_config(client, DeployConfig::default())
    }

    pub fn with_config(client: Arc<InstanceClient>, config: DeployConfig) -> Self {
        Self { client, config }
    }

    /// Upload → install → await the instance back up.
    ///
    /// Activation stays a separate, explicit call - deploying to an author
    /// instance must not replicate content as a side effect.
    pub async fn deploy(
        &self,
        package: &mut PackageHandle,
        cancel: &CancelSignal,
    ) -> Result<(), DeployError> {
        self.upload(package).await?;
        self.install(package).await?;

        let policy = AwaitPolicy::from(&self.config.await_up);
        self.client.await_up(&policy, cancel).await?;

        log_deploy_operation(
            "deploy",
            &self.client.instance().to_string(),
            Some(package.identity().name.as_str()),
            "ended",
            package.remote_path(),
        );
        Ok(())
    }

    /// Upload the local package file.
    pub async fn upload(&self, package: &mut PackageHandle) -> Result<UploadResponse, DeployError> {
        let file = package.local_path();
        if !file.exists() {
            return Err(DeployError::FileNotFound(file.to_path_buf()));
        }

        info!(
            file = %file.display(),
            instance = %self.client.instance(),
            force = self.config.force,
            "Uploading package"
        );

        let response = self.client.upload_package(file, self.config.force).await?;

        if !response.success {
            error!(instance = %self.client.instance(), msg = %response.msg, "Package upload refused");
            return Err(DeployError::Rejected(response.msg));
        }
        info!(msg = %response.msg, "Package uploaded");

        // Older endpoint versions omit the path; fall back to the package
        // listing to find where the upload landed.
        let remote_path = match &response.path {
            Some(path) => path.clone(),
            None => self.resolve_remote_path(package).await?,
        };
        package.mark_uploaded(remote_path)?;

        log_deploy_operation(
            "upload",
            &self.client.instance().to_string(),
            Some(package.identity().name.as_str()),
            "ended",
            package.remote_path(),
        );
        Ok(response)
    }

    /// Install an uploaded package. Any reported error fails the install,
    /// even under a success status - partial installs can leave the remote
    /// content inconsistent.
    pub async fn install(
        &self,
        package: &mut PackageHandle,
    ) -> Result<InstallResponse, DeployError> {
        let remote_path = package.require_remote_path()?.to_string();

        info!(
            path = %remote_path,
            instance = %self.client.instance(),
            recursive = self.config.recursive,
            ac_handling = %self.config.ac_handling,
            "Installing package"
        );

        let response = self
            .client
            .install_package(
                &remote_path,
                self.config.recursive,
                self.config.ac_handling.as_str(),
            )
            .await?;

        match response.status {
            InstallStatus::Success if response.errors.is_empty() => {
                info!("Package successfully installed");
            }
            InstallStatus::Success => {
                warn!("Package installed with errors under a success status");
                for message in &response.errors {
                    error!(instance = %self.client.instance(), "{message}");
                }
                return Err(DeployError::InstallCompletedWithErrors);
            }
            InstallStatus::SuccessWithErrors => {
                error!("Package installed with errors");
                for message in &response.errors {
                    error!(instance = %self.client.instance(), "{message}");
                }
                return Err(DeployError::InstallCompletedWithErrors);
            }
            InstallStatus::Fail => {
                error!("Installation failed");
                for message in &response.errors {
                    error!(instance = %self.client.instance(), "{message}");
                }
                return Err(DeployError::InstallIncomplete);
            }
        }

        package.advance(PackageState::Installed)?;
        log_deploy_operation(
            "install",
            &self.client.instance().to_string(),
            Some(package.identity().name.as_str()),
            "ended",
            Some(remote_path.as_str()),
        );
        Ok(response)
    }

    /// Activate (replicate) an installed package.
    pub async fn activate(
        &self,
        package: &mut PackageHandle,
    ) -> Result<UploadResponse, DeployError> {
        let remote_path = package.require_remote_path()?.to_string();

        info!(path = %remote_path, instance = %self.client.instance(), "Activating package");

        let response = match self.client.activate_package(&remote_path).await {
            Ok(response) => response,
            Err(e) if e.is_malformed_response() => {
                error!(instance = %self.client.instance(), error = %e, "Malformed activation response");
                return Err(DeployError::ActivationFailed);
            }
            Err(e) => return Err(DeployError::Transport(e)),
        };

        if !response.success {
            error!(instance = %self.client.instance(), msg = %response.msg, "Package activation refused");
            return Err(DeployError::Rejected(response.msg));
        }

        info!("Package activated");
        package.advance(PackageState::Activated)?;
        log_deploy_operation(
            "activate",
            &self.client.instance().to_string(),
            Some(package.identity().name.as_str()),
            "ended",
            Some(remote_path.as_str()),
        );
        Ok(response)
    }

    /// Delete an uploaded package. Fire-and-forget: a refusal is logged, not
    /// escalated; only transport failures propagate.
    pub async fn delete(&self, package: &mut PackageHandle) -> Result<(), DeployError> {
        let remote_path = package.require_remote_path()?.to_string();

        info!(path = %remote_path, instance = %self.client.instance(), "Deleting package");

        let response = self.client.delete_package(&remote_path).await?;
        if !response.success {
            warn!(
                instance = %self.client.instance(),
                msg = %response.msg,
                "Package delete refused"
            );
        }

        package.advance(PackageState::Deleted)?;
        log_deploy_operation(
            "delete",
            &self.client.instance().to_string(),
            Some(package.identity().name.as_str()),
            "ended",
            Some(remote_path.as_str()),
        );
        Ok(())
    }

    /// Find the remote path of this package in the package listing.
    async fn resolve_remote_path(&self, package: &PackageHandle) -> Result<String, DeployError> {
        let identity = package.identity();

        info!(
            instance = %self.client.instance(),
            name = %identity.name,
            "Resolving remote package path from listing"
        );

        let list = self.client.list_packages().await?;
        list.resolve_path(&identity.name, &identity.group, &identity.version)
            .map(str::to_string)
            .ok_or(DeployError::NotUploaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ac_handling_wire_values() {
        assert_eq!(AcHandling::Ignore.as_str(), "ignore");
        assert_eq!(AcHandling::MergePreserve.as_str(), "merge_preserve");
        assert_eq!(AcHandling::default(), AcHandling::MergePreserve);
    }

    #[test]
    fn test_deploy_config_defaults() {
        let config = DeployConfig::default();
        assert!(config.force);
        assert!(config.recursive);
        assert_eq!(config.ac_handling, AcHandling::MergePreserve);
    }

    #[test]
    fn test_deploy_error_conversion() {
        let error: ProvisionerError = DeployError::InstallIncomplete.into();
        assert_eq!(
            error,
            ProvisionerError::DeployError("Installation incomplete".to_string())
        );

        let error: ProvisionerError = DeployError::FileNotFound(PathBuf::from("/tmp/x.zip")).into();
        assert_eq!(error, ProvisionerError::FileNotFound("/tmp/x.zip".to_string()));
    }
}
