//! Authenticated HTTP access to one remote instance.
//!
//! `InstanceClient` wraps a shared `reqwest::Client` with the instance's
//! base URL and credentials, and exposes the package-manager commands,
//! repository node access, and health probes the rest of the crate builds on.

use crate::client::responses::{DeleteResponse, InstallResponse, ListResponse, UploadResponse};
use crate::instance::Instance;
use crate::resilience::{await_until, AwaitError, AwaitPolicy, CancelSignal};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Package-manager service endpoint; package paths are appended to it.
pub const PACKAGE_SERVICE_PATH: &str = "/crx/packmgr/service.jsp";

/// Package listing endpoint.
pub const PACKAGE_LIST_PATH: &str = "/crx/packmgr/list.jsp";

/// Errors raised by remote HTTP calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP transport error calling {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("cannot read package file '{path}': {reason}")]
    FileRead { path: String, reason: String },
}

impl ClientError {
    /// True when the failure is a JSON body that could not be parsed, as
    /// opposed to a transport or status failure.
    pub fn is_malformed_response(&self) -> bool {
        matches!(self, ClientError::MalformedResponse { .. })
    }
}

impl From<ClientError> for crate::error::ProvisionerError {
    fn from(error: ClientError) -> Self {
        crate::error::ProvisionerError::IoError(error.to_string())
    }
}

/// Authenticated HTTP client bound to one instance.
#[derive(Debug, Clone)]
pub struct InstanceClient {
    http: reqwest::Client,
    instance: Instance,
}

impl InstanceClient {
    pub fn new(http: reqwest::Client, instance: Instance) -> Self {
        Self { http, instance }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Upload a package archive via multipart form.
    pub async fn upload_package(
        &self,
        file: &Path,
        force: bool,
    ) -> Result<UploadResponse, ClientError> {
        let url = self
            .instance
            .url(&format!("{PACKAGE_SERVICE_PATH}?cmd=upload"));

        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| ClientError::FileRead {
                path: file.display().to_string(),
                reason: e.to_string(),
            })?;

        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.zip".to_string());

        let form = reqwest::multipart::Form::new()
            .part(
                "package",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("force", force.to_string());

        debug!(url = %url, instance = %self.instance, "Uploading package");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.instance.user, Some(&self.instance.password))
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        parse_json(&url, response).await
    }

    /// Install an uploaded package.
    pub async fn install_package(
        &self,
        package_path: &str,
        recursive: bool,
        ac_handling: &str,
    ) -> Result<InstallResponse, ClientError> {
        let url = self.instance.url(&format!(
            "{PACKAGE_SERVICE_PATH}{package_path}?cmd=install&recursive={recursive}&acHandling={ac_handling}"
        ));

        debug!(url = %url, instance = %self.instance, "Installing package");
        let response = self.post(&url).await?;
        parse_json(&url, response).await
    }

    /// Activate (replicate) an installed package.
    pub async fn activate_package(
        &self,
        package_path: &str,
    ) -> Result<UploadResponse, ClientError> {
        let url = self
            .instance
            .url(&format!("{PACKAGE_SERVICE_PATH}{package_path}?cmd=replicate"));

        debug!(url = %url, instance = %self.instance, "Activating package");
        let response = self.post(&url).await?;
        parse_json(&url, response).await
    }

    /// Delete an uploaded package.
    pub async fn delete_package(&self, package_path: &str) -> Result<DeleteResponse, ClientError> {
        let url = self
            .instance
            .url(&format!("{PACKAGE_SERVICE_PATH}{package_path}?cmd=delete"));

        debug!(url = %url, instance = %self.instance, "Deleting package");
        let response = self.post(&url).await?;
        parse_json(&url, response).await
    }

    /// List packages known to the remote package manager.
    pub async fn list_packages(&self) -> Result<ListResponse, ClientError> {
        let url = self.instance.url(PACKAGE_LIST_PATH);
        let response = self.post(&url).await?;
        parse_json(&url, response).await
    }

    /// Read a repository node's properties; `None` when the node does not
    /// exist yet.
    pub async fn node_read(
        &self,
        node_path: &str,
    ) -> Result<Option<BTreeMap<String, serde_json::Value>>, ClientError> {
        let url = self.instance.url(&format!("{node_path}.json"));

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.instance.user, Some(&self.instance.password))
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        parse_json(&url, response).await.map(Some)
    }

    /// Write properties onto a repository node, creating it when absent.
    pub async fn node_save(
        &self,
        node_path: &str,
        properties: &[(&str, String)],
    ) -> Result<(), ClientError> {
        let url = self.instance.url(node_path);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.instance.user, Some(&self.instance.password))
            .form(properties)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }

    /// Health probe: any successful response from the base URL counts as up.
    pub async fn is_up(&self) -> bool {
        let url = self.instance.url("/");
        match self
            .http
            .get(&url)
            .basic_auth(&self.instance.user, Some(&self.instance.password))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(instance = %self.instance, error = %e, "Health probe failed");
                false
            }
        }
    }

    /// Poll until the instance responds healthy.
    pub async fn await_up(
        &self,
        policy: &AwaitPolicy,
        cancel: &CancelSignal,
    ) -> Result<(), AwaitError> {
        let condition = format!("instance {} up", self.instance.name);
        await_until(policy, &condition, cancel, |attempt| async move {
            let up = self.is_up().await;
            if !up {
                warn!(
                    instance = %self.instance,
                    attempt = attempt,
                    "Instance not up yet"
                );
            }
            !up
        })
        .await
    }

    /// Poll until the instance stops responding.
    pub async fn await_down(
        &self,
        policy: &AwaitPolicy,
        cancel: &CancelSignal,
    ) -> Result<(), AwaitError> {
        let condition = format!("instance {} down", self.instance.name);
        await_until(policy, &condition, cancel, |attempt| async move {
            let up = self.is_up().await;
            if up {
                warn!(
                    instance = %self.instance,
                    attempt = attempt,
                    "Instance still responding"
                );
            }
            up
        })
        .await
    }

    async fn post(&self, url: &str) -> Result<reqwest::Response, ClientError> {
        self.http
            .post(url)
            .basic_auth(&self.instance.user, Some(&self.instance.password))
            .send()
            .await
            .map_err(|e| transport(url, e))
    }
}

fn transport(url: &str, error: reqwest::Error) -> ClientError {
    ClientError::Transport {
        url: url.to_string(),
        reason: error.to_string(),
    }
}

async fn parse_json<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let body = response.text().await.map_err(|e| transport(url, e))?;
    serde_json::from_str(&body).map_err(|e| ClientError::MalformedResponse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
