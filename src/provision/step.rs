//! Step definitions.
//!
//! A step is a declared idempotent unit of remote configuration work. Its
//! dynamic behavior lives in three function-valued fields - condition, init
//! callback, and per-instance sync action - configured through
//! [`StepBuilder`]; everything else is scalar metadata.

use crate::client::InstanceClient;
use crate::config::ProvisionerConfig;
use crate::error::Result;
use crate::instance::Instance;
use crate::resilience::CancelSignal;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Version tag assigned to steps that do not declare one.
pub const DEFAULT_STEP_VERSION: &str = "default";

/// Context handed to a step's sync action for one instance.
#[derive(Clone)]
pub struct StepContext {
    pub instance: Instance,
    pub client: Arc<InstanceClient>,
    pub config: Arc<ProvisionerConfig>,
    pub cancel: CancelSignal,
}

/// Inputs available to a step condition.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub instance: &'a Instance,
    /// Whether a marker exists for this (step, instance).
    pub has_run: bool,
    /// How many times the step has been performed on this instance.
    pub run_count: u64,
    /// Version recorded by the last run, if any.
    pub last_run_version: Option<&'a str>,
}

pub type Condition = Arc<dyn Fn(&ConditionContext<'_>) -> bool + Send + Sync>;
pub type InitCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;
pub type SyncAction = Arc<dyn Fn(StepContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A declared provisioning step.
#[derive(Clone)]
pub struct StepDefinition {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    /// Changing the version re-triggers the step on instances that already
    /// ran an older one.
    pub version: String,
    pub continue_on_fail: bool,
    pub condition: Condition,
    pub init: Option<InitCallback>,
    pub sync: Option<SyncAction>,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("description", &self.description)
            .field("version", &self.version)
            .field("continue_on_fail", &self.continue_on_fail)
            .field("has_init", &self.init.is_some())
            .field("has_sync", &self.sync.is_some())
            .finish()
    }
}

/// Builder used inside `registry.register(id, |step| { ... })`.
pub struct StepBuilder {
    definition: StepDefinition,
}

impl StepBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            definition: StepDefinition {
                id: id.to_string(),
                label: id.to_string(),
                description: None,
                version: DEFAULT_STEP_VERSION.to_string(),
                continue_on_fail: false,
                condition: conditions::once(),
                init: None,
                sync: None,
            },
        }
    }

    pub fn label(&mut self, label: impl Into<String>) -> &mut Self {
        self.definition.label = label.into();
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.definition.description = Some(description.into());
        self
    }

    pub fn version(&mut self, version: impl Into<String>) -> &mut Self {
        self.definition.version = version.into();
        self
    }

    pub fn continue_on_fail(&mut self, continue_on_fail: bool) -> &mut Self {
        self.definition.continue_on_fail = continue_on_fail;
        self
    }

    pub fn condition<F>(&mut self, condition: F) -> &mut Self
    where
        F: Fn(&ConditionContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.definition.condition = Arc::new(condition);
        self
    }

    /// Callback run exactly once per provisioning run, before any instance
    /// work starts. Used to set up shared state such as verifying a local
    /// package file.
    pub fn init<F, Fut>(&mut self, init: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.definition.init = Some(Arc::new(move || Box::pin(init())));
        self
    }

    /// The per-instance action.
    pub fn sync<F, Fut>(&mut self, sync: F) -> &mut Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.definition.sync = Some(Arc::new(move |ctx| Box::pin(sync(ctx))));
        self
    }

    pub fn build(self) -> StepDefinition {
        self.definition
    }
}

/// Make a name safe for use inside a step id and marker path.
pub fn slug(name: &str) -> String {
    name.replace('.', "-").replace(':', "_")
}

/// Reusable step conditions.
pub mod conditions {
    use super::{Condition, ConditionContext};
    use std::sync::Arc;

    /// Run only while the step has never been performed.
    pub fn once() -> Condition {
        Arc::new(|ctx: &ConditionContext<'_>| !ctx.has_run)
    }

    /// Run on every n-th evaluation (count-based periodic re-execution).
    pub fn every(n: u64) -> Condition {
        Arc::new(move |ctx: &ConditionContext<'_>| n > 0 && ctx.run_count % n == 0)
    }

    /// Always re-run.
    pub fn always() -> Condition {
        Arc::new(|_: &ConditionContext<'_>| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Instance {
        Instance::new("author", "http://author:4502", "admin", "admin", "stage")
    }

    #[test]
    fn test_builder_defaults() {
        let step = StepBuilder::new("enableCrxDe").build();
        assert_eq!(step.id, "enableCrxDe");
        assert_eq!(step.label, "enableCrxDe");
        assert_eq!(step.version, DEFAULT_STEP_VERSION);
        assert!(!step.continue_on_fail);
        assert!(step.description.is_none());
        assert!(step.init.is_none());
        assert!(step.sync.is_none());
    }

    #[test]
    fn test_builder_configures_metadata() {
        let mut builder = StepBuilder::new("deployPackage/site");
        builder
            .label("Deploy site package")
            .description("Deploying package 'site'")
            .version("1.2.0")
            .continue_on_fail(true)
            .sync(|_ctx| async { Ok(()) });
        let step = builder.build();

        assert_eq!(step.label, "Deploy site package");
        assert_eq!(step.description.as_deref(), Some("Deploying package 'site'"));
        assert_eq!(step.version, "1.2.0");
        assert!(step.continue_on_fail);
        assert!(step.sync.is_some());
    }

    #[test]
    fn test_once_condition() {
        let instance = instance();
        let once = conditions::once();

        assert!(once(&ConditionContext {
            instance: &instance,
            has_run: false,
            run_count: 0,
            last_run_version: None,
        }));
        assert!(!once(&ConditionContext {
            instance: &instance,
            has_run: true,
            run_count: 1,
            last_run_version: Some("default"),
        }));
    }

    #[test]
    fn test_every_condition() {
        let instance = instance();
        let every_third = conditions::every(3);

        let count_matches = |run_count: u64| {
            every_third(&ConditionContext {
                instance: &instance,
                has_run: true,
                run_count,
                last_run_version: Some("default"),
            })
        };

        assert!(count_matches(0));
        assert!(!count_matches(1));
        assert!(!count_matches(2));
        assert!(count_matches(3));
        assert!(count_matches(6));
    }

    #[test]
    fn test_slug_replaces_unsafe_characters() {
        assert_eq!(slug("com.acme.site:1.0"), "com-acme-site_1-0");
        assert_eq!(slug("plain"), "plain");
    }
}
