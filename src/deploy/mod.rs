//! # Package Lifecycle
//!
//! State machine and driver for shipping a deployable package to a remote
//! instance: upload → install → activate, with delete reachable from any
//! state. Response payloads are interpreted into a strict status model - any
//! reported install error fails the phase, and no lifecycle HTTP call is ever
//! auto-retried. The only polling is the post-install await-up, which gives
//! the instance time to restart its bundles.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provision_core::client::ClientPool;
//! use provision_core::config::HttpConfig;
//! use provision_core::deploy::{PackageDeployer, PackageHandle, PackageIdentity};
//! use provision_core::instance::Instance;
//! use provision_core::resilience::CancelSignal;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ClientPool::new(&HttpConfig::default())?;
//! let instance = Instance::new("author", "http://localhost:4502", "admin", "admin", "local");
//!
//! let deployer = PackageDeployer::new(pool.client_for(&instance));
//! let mut package = PackageHandle::new(
//!     "build/distributions/site-1.0.0.zip",
//!     PackageIdentity::new("site", "my", "1.0.0"),
//! );
//!
//! deployer.deploy(&mut package, &CancelSignal::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod deployer;
pub mod package;
pub mod states;

pub use deployer::{AcHandling, DeployConfig, DeployError, PackageDeployer};
pub use package::{PackageHandle, PackageIdentity};
pub use states::PackageState;
