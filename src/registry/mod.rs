//! # Registry Infrastructure
//!
//! Holds the ordered set of declared provisioning steps.
//!
//! ## Overview
//!
//! Steps are registered with a builder closure and kept in declaration order;
//! order is significant because steps intentionally run in declared sequence
//! within a phase. Registration is last-write-wins per id, validation runs
//! before any execution, and wildcard filtering selects the steps for a run.
//!
//! ## Usage
//!
//! ```rust
//! use provision_core::registry::StepRegistry;
//!
//! let mut registry = StepRegistry::new();
//! registry.register("enableCrxDe", |step| {
//!     step.description("Enabling CRX DE").sync(|_ctx| async { Ok(()) });
//! });
//!
//! registry.validate().unwrap();
//! let steps = registry.filter("enable*");
//! assert_eq!(steps.len(), 1);
//! ```

pub mod step_registry;

pub use step_registry::StepRegistry;
