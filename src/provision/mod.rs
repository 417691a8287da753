//! # Provisioning Engine
//!
//! Configures remote instances only in concrete circumstances - once, after a
//! step definition changed, or periodically by run count.
//!
//! ## Core Components
//!
//! - **StepDefinition / StepBuilder**: declared idempotent units of remote
//!   work, with condition, init callback and per-instance sync action
//! - **MarkerStore**: persisted completion markers, the single source of
//!   truth for "has this step run on this instance"
//! - **Provisioner**: the orchestrator fanning filtered steps across the
//!   fleet in parallel and collecting one [`Action`] per (step, instance)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provision_core::config::ProvisionerConfig;
//! use provision_core::instance::Instance;
//! use provision_core::provision::Provisioner;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut provisioner = Provisioner::new(ProvisionerConfig::default())?;
//!
//! provisioner.step("enableCrxDe", |step| {
//!     step.description("Enabling CRX DE").sync(|ctx| async move {
//!         ctx.client
//!             .node_save("/apps/system/config/davex", &[("alias", "/crx/server".to_string())])
//!             .await?;
//!         Ok(())
//!     });
//! });
//!
//! let fleet = vec![Instance::new(
//!     "author", "http://localhost:4502", "admin", "admin", "local",
//! )];
//! let actions = provisioner.provision(&fleet).await?;
//! println!("{} actions", actions.len());
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod marker;
pub mod provisioner;
pub mod step;
pub mod steps;

pub use action::{Action, ActionStatus, InstanceStep};
pub use marker::{Evaluation, Marker, MarkerStore, MarkerStoreError, MemoryMarkerStore, RepositoryMarkerStore};
pub use provisioner::Provisioner;
pub use step::{
    conditions, slug, ConditionContext, StepBuilder, StepContext, StepDefinition,
    DEFAULT_STEP_VERSION,
};
