use crate::error::{ProvisionerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default repository path under which step markers are persisted.
pub const DEFAULT_MARKER_PATH: &str = "/var/gap/provision";

/// Top-level provisioner configuration.
///
/// The flag fields mirror the external invocation surface (`enabled`,
/// `greedy`, `step_name`, `countable`, `path`); the core treats them as
/// opaque inputs supplied by the embedding CLI/config layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Disables the provisioner entirely when false.
    pub enabled: bool,
    /// Forces re-execution of steps regardless of their markers.
    pub greedy: bool,
    /// Wildcard filter selecting which steps run.
    pub step_name: String,
    /// Enables count-based step conditions.
    pub countable: bool,
    /// Repository path under which step markers are stored.
    pub path: String,
    /// Upper bound on per-instance actions running concurrently within a step.
    pub max_concurrent_instances: usize,
    pub http: HttpConfig,
    pub await_up: AwaitConfig,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            greedy: false,
            step_name: "*".to_string(),
            countable: false,
            path: DEFAULT_MARKER_PATH.to_string(),
            max_concurrent_instances: 10,
            http: HttpConfig::default(),
            await_up: AwaitConfig::default(),
        }
    }
}

/// HTTP client settings applied to every instance connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 60_000,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Await/retry budget for health polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwaitConfig {
    pub delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for AwaitConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1_000,
            max_attempts: 30,
        }
    }
}

impl AwaitConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl ProvisionerConfig {
    /// Build configuration from defaults with environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(enabled) = std::env::var("PROVISION_ENABLED") {
            config.enabled = enabled.parse().map_err(|e| {
                ProvisionerError::ConfigurationError(format!("Invalid enabled flag: {e}"))
            })?;
        }

        if let Ok(greedy) = std::env::var("PROVISION_GREEDY") {
            config.greedy = greedy.parse().map_err(|e| {
                ProvisionerError::ConfigurationError(format!("Invalid greedy flag: {e}"))
            })?;
        }

        if let Ok(step_name) = std::env::var("PROVISION_STEP_NAME") {
            config.step_name = step_name;
        }

        if let Ok(countable) = std::env::var("PROVISION_COUNTABLE") {
            config.countable = countable.parse().map_err(|e| {
                ProvisionerError::ConfigurationError(format!("Invalid countable flag: {e}"))
            })?;
        }

        if let Ok(path) = std::env::var("PROVISION_PATH") {
            config.path = path;
        }

        if let Ok(max_concurrent) = std::env::var("PROVISION_MAX_CONCURRENT_INSTANCES") {
            config.max_concurrent_instances = max_concurrent.parse().map_err(|e| {
                ProvisionerError::ConfigurationError(format!(
                    "Invalid max_concurrent_instances: {e}"
                ))
            })?;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file layered with `PROVISION_*`
    /// environment overrides.
    pub fn load(file: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name(file))
            .add_source(config::Environment::with_prefix("PROVISION").separator("__"))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ProvisionerError::ConfigurationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProvisionerConfig::default();
        assert!(config.enabled);
        assert!(!config.greedy);
        assert_eq!(config.step_name, "*");
        assert!(!config.countable);
        assert_eq!(config.path, DEFAULT_MARKER_PATH);
        assert_eq!(config.max_concurrent_instances, 10);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("PROVISION_GREEDY", "true");
        std::env::set_var("PROVISION_STEP_NAME", "deployPackage/*");
        let config = ProvisionerConfig::from_env().unwrap();
        assert!(config.greedy);
        assert_eq!(config.step_name, "deployPackage/*");

        std::env::set_var("PROVISION_MAX_CONCURRENT_INSTANCES", "lots");
        let result = ProvisionerConfig::from_env();
        assert!(matches!(
            result,
            Err(ProvisionerError::ConfigurationError(_))
        ));

        std::env::remove_var("PROVISION_GREEDY");
        std::env::remove_var("PROVISION_STEP_NAME");
        std::env::remove_var("PROVISION_MAX_CONCURRENT_INSTANCES");
    }
}
