//! # Resilience Module
//!
//! Await/retry primitives for eventually-consistent remote state. Remote
//! instances restart bundles after package installs and take time to come
//! back; this module provides the polling loop the rest of the crate uses to
//! wait that out, with a bounded attempt budget and run-level cancellation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provision_core::resilience::{await_until, AwaitPolicy, CancelSignal};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = AwaitPolicy::new(Duration::from_secs(1), 30);
//! let cancel = CancelSignal::new();
//!
//! // The predicate answers "are we still waiting?" - returning false stops
//! // the loop successfully.
//! await_until(&policy, "instance up", &cancel, |attempt| async move {
//!     attempt < 3 // pretend the instance responds on the third check
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod awaiter;

pub use awaiter::{await_until, AwaitError, AwaitPolicy, CancelSignal};
