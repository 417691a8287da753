//! Shared client pool for a fleet of instances.
//!
//! One `reqwest::Client` (connection pool, timeouts) is shared across the
//! whole run; per-instance `InstanceClient`s are created on first use and
//! cached so concurrent workers hitting the same instance reuse connections.

use crate::client::http::InstanceClient;
use crate::config::HttpConfig;
use crate::error::{ProvisionerError, Result};
use crate::instance::Instance;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct ClientPool {
    http: reqwest::Client,
    clients: DashMap<String, Arc<InstanceClient>>,
}

impl ClientPool {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProvisionerError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            http,
            clients: DashMap::new(),
        })
    }

    /// Client for one instance, created on first request.
    pub fn client_for(&self, instance: &Instance) -> Arc<InstanceClient> {
        let key = format!("{}@{}", instance.user, instance.base_url);
        self.clients
            .entry(key)
            .or_insert_with(|| Arc::new(InstanceClient::new(self.http.clone(), instance.clone())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_are_cached_per_instance() {
        let pool = ClientPool::new(&HttpConfig::default()).unwrap();
        let author = Instance::new("author", "http://author:4502", "admin", "admin", "stage");
        let publish = Instance::new("publish", "http://publish:4503", "admin", "admin", "stage");

        let first = pool.client_for(&author);
        let second = pool.client_for(&author);
        let other = pool.client_for(&publish);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }
}
