//! Shared fixtures for integration tests.

#![allow(dead_code)]

use provision_core::instance::Instance;
use wiremock::MockServer;

/// Start a mock instance endpoint and the `Instance` pointing at it.
pub async fn mock_instance(name: &str) -> (MockServer, Instance) {
    let server = MockServer::start().await;
    let instance = Instance::new(name, server.uri(), "admin", "admin", "test");
    (server, instance)
}

/// An instance that is never contacted (reserved discard port).
pub fn offline_instance(name: &str) -> Instance {
    Instance::new(name, "http://127.0.0.1:9", "admin", "admin", "test")
}
