//! Step markers and the marker store.
//!
//! A marker records that a step ran against one instance: at which version,
//! how many times, and when last. Markers live in the remote repository under
//! a configurable root path, one node per step id, and are the single source
//! of truth for "has this step run" - the orchestrator never caches them
//! across runs.

use crate::client::ClientPool;
use crate::error::ProvisionerError;
use crate::instance::Instance;
use crate::provision::step::{ConditionContext, StepDefinition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Persisted record of a step's execution history on one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub step_id: String,
    pub version: String,
    pub count: u64,
    pub last_run: DateTime<Utc>,
}

/// Errors raised by marker persistence.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MarkerStoreError {
    #[error("marker read failed for step '{step_id}' at {instance}: {reason}")]
    ReadFailed {
        step_id: String,
        instance: String,
        reason: String,
    },

    #[error("marker write failed for step '{step_id}' at {instance}: {reason}")]
    WriteFailed {
        step_id: String,
        instance: String,
        reason: String,
    },

    #[error("malformed marker for step '{step_id}' at {instance}: {reason}")]
    Malformed {
        step_id: String,
        instance: String,
        reason: String,
    },
}

impl From<MarkerStoreError> for ProvisionerError {
    fn from(error: MarkerStoreError) -> Self {
        ProvisionerError::MarkerStoreError(error.to_string())
    }
}

/// Result of a performability evaluation: the verdict plus the marker
/// observed while deciding it.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub performable: bool,
    pub marker: Option<Marker>,
}

/// Persistence seam for step markers.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    async fn read(
        &self,
        step_id: &str,
        instance: &Instance,
    ) -> Result<Option<Marker>, MarkerStoreError>;

    /// Idempotently write the marker with an incremented run count and the
    /// current timestamp, creating the backing node when absent.
    async fn update(
        &self,
        step_id: &str,
        instance: &Instance,
        version: &str,
    ) -> Result<Marker, MarkerStoreError>;

    /// Decide whether a step should be performed on an instance.
    ///
    /// Performable when no marker exists; when `greedy` forces re-execution;
    /// when the stored version differs from the step's current version; or
    /// when `countable` and the step's condition holds for the recorded run
    /// count. Otherwise the step is skipped.
    async fn evaluate(
        &self,
        step: &StepDefinition,
        instance: &Instance,
        greedy: bool,
        countable: bool,
    ) -> Result<Evaluation, MarkerStoreError> {
        let marker = self.read(&step.id, instance).await?;

        let performable = match &marker {
            None => true,
            Some(marker) if greedy => {
                debug!(step_id = %step.id, instance = %instance, count = marker.count,
                       "Greedy mode forces re-execution");
                true
            }
            Some(marker) if marker.version != step.version => {
                debug!(step_id = %step.id, instance = %instance,
                       stored = %marker.version, current = %step.version,
                       "Step version changed since last run");
                true
            }
            Some(marker) if countable => (step.condition)(&ConditionContext {
                instance,
                has_run: true,
                run_count: marker.count,
                last_run_version: Some(&marker.version),
            }),
            Some(_) => false,
        };

        Ok(Evaluation { performable, marker })
    }
}

/// Marker store persisting to the remote content repository.
///
/// Layout: one node per step id under the configured root, with properties
/// `version` (string), `count` (integer) and `lastRun` (timestamp).
pub struct RepositoryMarkerStore {
    pool: Arc<ClientPool>,
    root: String,
}

impl RepositoryMarkerStore {
    pub fn new(pool: Arc<ClientPool>, root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            pool,
            root: root.trim_end_matches('/').to_string(),
        }
    }

    fn node_path(&self, step_id: &str) -> String {
        format!("{}/{}", self.root, step_id)
    }
}

#[async_trait]
impl MarkerStore for RepositoryMarkerStore {
    async fn read(
        &self,
        step_id: &str,
        instance: &Instance,
    ) -> Result<Option<Marker>, MarkerStoreError> {
        let client = self.pool.client_for(instance);
        let properties = client
            .node_read(&self.node_path(step_id))
            .await
            .map_err(|e| MarkerStoreError::ReadFailed {
                step_id: step_id.to_string(),
                instance: instance.to_string(),
                reason: e.to_string(),
            })?;

        let Some(properties) = properties else {
            return Ok(None);
        };

        let malformed = |reason: &str| MarkerStoreError::Malformed {
            step_id: step_id.to_string(),
            instance: instance.to_string(),
            reason: reason.to_string(),
        };

        let version = properties
            .get("version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| malformed("missing 'version' property"))?
            .to_string();

        // Repositories report typed integers or strings depending on how the
        // property was written; accept both.
        let count = match properties.get("count") {
            Some(value) => value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| malformed("invalid 'count' property"))?,
            None => return Err(malformed("missing 'count' property")),
        };

        let last_run = properties
            .get("lastRun")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| malformed("invalid 'lastRun' property"))?;

        Ok(Some(Marker {
            step_id: step_id.to_string(),
            version,
            count,
            last_run,
        }))
    }

    async fn update(
        &self,
        step_id: &str,
        instance: &Instance,
        version: &str,
    ) -> Result<Marker, MarkerStoreError> {
        let count = self
            .read(step_id, instance)
            .await?
            .map(|marker| marker.count)
            .unwrap_or(0)
            + 1;

        let marker = Marker {
            step_id: step_id.to_string(),
            version: version.to_string(),
            count,
            last_run: Utc::now(),
        };

        let client = self.pool.client_for(instance);
        client
            .node_save(
                &self.node_path(step_id),
                &[
                    ("version", marker.version.clone()),
                    ("count", marker.count.to_string()),
                    ("lastRun", marker.last_run.to_rfc3339()),
                ],
            )
            .await
            .map_err(|e| MarkerStoreError::WriteFailed {
                step_id: step_id.to_string(),
                instance: instance.to_string(),
                reason: e.to_string(),
            })?;

        debug!(step_id = %step_id, instance = %instance, count = marker.count,
               "Marker updated");
        Ok(marker)
    }
}

/// In-memory marker store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    markers: Mutex<HashMap<(String, String), Marker>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(step_id: &str, instance: &Instance) -> (String, String) {
        (instance.name.clone(), step_id.to_string())
    }
}

#[async_trait]
impl MarkerStore for MemoryMarkerStore {
    async fn read(
        &self,
        step_id: &str,
        instance: &Instance,
    ) -> Result<Option<Marker>, MarkerStoreError> {
        Ok(self
            .markers
            .lock()
            .get(&Self::key(step_id, instance))
            .cloned())
    }

    async fn update(
        &self,
        step_id: &str,
        instance: &Instance,
        version: &str,
    ) -> Result<Marker, MarkerStoreError> {
        let mut markers = self.markers.lock();
        let key = Self::key(step_id, instance);
        let count = markers.get(&key).map(|marker| marker.count).unwrap_or(0) + 1;
        let marker = Marker {
            step_id: step_id.to_string(),
            version: version.to_string(),
            count,
            last_run: Utc::now(),
        };
        markers.insert(key, marker.clone());
        Ok(marker)
    }
}
