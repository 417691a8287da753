//! Remote instance identity.
//!
//! An [`Instance`] names one remote content-management endpoint: where it
//! lives, how to authenticate against it, and which environment it belongs
//! to. Instances are owned by the embedding layer and referenced by the core
//! for the duration of a provisioning run.

use crate::util::wildcard_match;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    /// Short handle used in logs and reports, e.g. `author-prod`.
    pub name: String,
    /// Base URL of the instance, without a trailing slash.
    pub base_url: String,
    pub user: String,
    pub password: String,
    /// Environment tag, e.g. `prod` or `stage`.
    pub env: String,
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.into(),
            password: password.into(),
            env: env.into(),
        }
    }

    /// Absolute URL for a path on this instance.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn is_env(&self, env: &str) -> bool {
        self.env.eq_ignore_ascii_case(env)
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.base_url)
    }
}

/// Filter a fleet by environment tag using a case-insensitive wildcard.
pub fn filter_by_env<'a>(instances: &'a [Instance], pattern: &str) -> Vec<&'a Instance> {
    instances
        .iter()
        .filter(|instance| wildcard_match(&instance.env, pattern))
        .collect()
}
