#![allow(clippy::doc_markdown)] // Allow technical terms like CRX, OSGi in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Provision Core
//!
//! Rust core for orchestrating idempotent provisioning steps and package
//! deployment across fleets of remote content-management instances.
//!
//! ## Overview
//!
//! A provisioning run executes declared steps - each an idempotent unit of
//! remote configuration work with a condition and a persisted completion
//! marker - against many instances in parallel, tolerating partial failure
//! without aborting the whole run. A separate package lifecycle driver ships
//! deployable archives through upload → install → activate → delete over the
//! instances' package-manager HTTP protocol.
//!
//! ## Architecture
//!
//! - **Steps are data plus callbacks**: scalar metadata with function-valued
//!   condition, init and sync fields, declared through a builder
//! - **Markers decide performability**: the remote repository records
//!   whether/when/how often a step ran; the orchestrator never caches this
//! - **Steps are sequential, instances are parallel**: a bounded worker pool
//!   fans each step across the fleet, and continue-on-fail decides whether a
//!   per-instance failure is recorded or aborts the run
//! - **Strict install taxonomy**: any reported error fails an install, even
//!   under a success status
//!
//! ## Module Organization
//!
//! - [`provision`] - Step definitions, markers, and the orchestrator
//! - [`deploy`] - Package lifecycle state machine and driver
//! - [`client`] - Authenticated HTTP access to remote instances
//! - [`registry`] - Ordered step registry with wildcard filtering
//! - [`resilience`] - Await/retry primitives with cancellation
//! - [`instance`] - Instance identity and fleet filtering
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Environment-aware structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use provision_core::config::ProvisionerConfig;
//! use provision_core::deploy::PackageIdentity;
//! use provision_core::instance::Instance;
//! use provision_core::provision::Provisioner;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut provisioner = Provisioner::new(ProvisionerConfig::from_env()?)?;
//!
//! provisioner.deploy_package(
//!     "site-content",
//!     "build/distributions/site-content-1.0.0.zip",
//!     PackageIdentity::new("site-content", "my-company", "1.0.0"),
//! );
//!
//! let fleet = vec![
//!     Instance::new("author", "http://author:4502", "admin", "admin", "stage"),
//!     Instance::new("publish", "http://publish:4503", "admin", "admin", "stage"),
//! ];
//!
//! for action in provisioner.provision(&fleet).await? {
//!     println!("{}: {}", action.step, action.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod deploy;
pub mod error;
pub mod instance;
pub mod logging;
pub mod provision;
pub mod registry;
pub mod resilience;
pub mod util;

pub use client::{
    ClientError, ClientPool, InstallResponse, InstallStatus, InstanceClient, ListResponse,
    UploadResponse,
};
pub use config::{AwaitConfig, HttpConfig, ProvisionerConfig};
pub use deploy::{
    AcHandling, DeployConfig, DeployError, PackageDeployer, PackageHandle, PackageIdentity,
    PackageState,
};
pub use error::{ProvisionerError, Result};
pub use instance::{filter_by_env, Instance};
pub use provision::{
    Action, ActionStatus, InstanceStep, Marker, MarkerStore, MemoryMarkerStore, Provisioner,
    StepBuilder, StepContext, StepDefinition,
};
pub use registry::StepRegistry;
pub use resilience::{await_until, AwaitError, AwaitPolicy, CancelSignal};
