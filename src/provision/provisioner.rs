//! # Provisioning Orchestrator
//!
//! Fans a filtered set of step definitions out across a fleet of instances.
//!
//! ## Execution model
//!
//! A run has two phases. The init phase executes each step's init callback
//! exactly once, sequentially, in registration order - a failure there aborts
//! the whole run before any instance is touched. The execution phase then
//! walks the steps in order and, for each step, runs the per-instance actions
//! in parallel under a bounded semaphore. Steps are strictly sequential;
//! instances within a step are not ordered.
//!
//! Failures on one instance abort the entire run unless the step declares
//! continue-on-fail, in which case they are downgraded to a recorded FAILED
//! action. Workers already in flight for the failing step finish either way;
//! later steps never start.

use crate::client::ClientPool;
use crate::config::ProvisionerConfig;
use crate::error::{ProvisionerError, Result};
use crate::instance::Instance;
use crate::logging::log_step_operation;
use crate::provision::action::{Action, ActionStatus, InstanceStep};
use crate::provision::marker::{MarkerStore, RepositoryMarkerStore};
use crate::provision::step::{StepBuilder, StepContext, StepDefinition};
use crate::registry::StepRegistry;
use crate::resilience::CancelSignal;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Orchestrates provisioning steps across a fleet of instances.
pub struct Provisioner {
    config: Arc<ProvisionerConfig>,
    registry: StepRegistry,
    pool: Arc<ClientPool>,
    marker_store: Arc<dyn MarkerStore>,
    cancel: CancelSignal,
    progress: Arc<AtomicU64>,
}

impl Provisioner {
    /// Create a provisioner with markers persisted to the remote repository
    /// under the configured path.
    pub fn new(config: ProvisionerConfig) -> Result<Self> {
        let config = Arc::new(config);
        let pool = Arc::new(ClientPool::new(&config.http)?);
        let marker_store: Arc<dyn MarkerStore> = Arc::new(RepositoryMarkerStore::new(
            pool.clone(),
            config.path.clone(),
        ));

        Ok(Self {
            config,
            registry: StepRegistry::new(),
            pool,
            marker_store,
            cancel: CancelSignal::new(),
            progress: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Replace the marker store (tests, dry runs).
    pub fn with_marker_store(mut self, marker_store: Arc<dyn MarkerStore>) -> Self {
        self.marker_store = marker_store;
        self
    }

    /// Declare a provisioning step.
    pub fn step<F>(&mut self, id: &str, configure: F)
    where
        F: FnOnce(&mut StepBuilder),
    {
        self.registry.register(id, configure);
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Signal observed by dispatch loops and await ticks; cancelling stops
    /// new per-instance actions from starting while in-flight HTTP calls
    /// complete.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Perform all provision steps for one instance.
    pub async fn provision_one(&self, instance: &Instance) -> Result<Vec<Action>> {
        self.provision(std::slice::from_ref(instance)).await
    }

    /// Perform all provision steps for all instances in parallel.
    pub async fn provision(&self, instances: &[Instance]) -> Result<Vec<Action>> {
        if !self.config.enabled {
            info!("No steps performed / instance provisioner is disabled");
            return Ok(Vec::new());
        }

        self.registry.validate()?;

        let steps = self.registry.filter(&self.config.step_name);
        if steps.is_empty() {
            return Ok(Vec::new());
        }

        let run_id = Uuid::new_v4();
        self.progress.store(0, Ordering::SeqCst);
        info!(
            run_id = %run_id,
            steps = steps.len(),
            instances = instances.len(),
            pattern = %self.config.step_name,
            greedy = self.config.greedy,
            "Provisioning run starting"
        );

        self.run_init_phase(&steps).await?;
        let actions = self.run_execution_phase(&steps, instances).await?;

        if actions.iter().all(|action| action.status.is_skipped()) {
            info!("No steps to perform / all instances provisioned");
        }

        Ok(actions)
    }

    /// Init callbacks run once per run, never per instance, in registration
    /// order. They set up shared state, so any failure is fatal.
    async fn run_init_phase(&self, steps: &[StepDefinition]) -> Result<()> {
        for step in steps {
            if let Some(init) = &step.init {
                debug!(step_id = %step.id, "Running init callback");
                init().await.map_err(|e| {
                    ProvisionerError::ProvisionError(format!(
                        "Init callback of step '{}' failed: {e}",
                        step.id
                    ))
                })?;
            }
        }
        Ok(())
    }

    async fn run_execution_phase(
        &self,
        steps: &[StepDefinition],
        instances: &[Instance],
    ) -> Result<Vec<Action>> {
        let actions: Arc<Mutex<Vec<Action>>> = Arc::new(Mutex::new(Vec::new()));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_instances));

        for step in steps {
            if self.cancel.is_cancelled() {
                return Err(ProvisionerError::Cancelled(format!(
                    "run cancelled before step '{}'",
                    step.id
                )));
            }

            match &step.description {
                Some(description) => {
                    info!(step_id = %step.id, "Provision step '{}' / {description}", step.id)
                }
                None => info!(step_id = %step.id, "Provision step '{}'", step.id),
            }

            let mut handles = Vec::with_capacity(instances.len());
            for instance in instances {
                if self.cancel.is_cancelled() {
                    break;
                }

                let worker = Worker {
                    step: step.clone(),
                    instance: instance.clone(),
                    config: self.config.clone(),
                    pool: self.pool.clone(),
                    marker_store: self.marker_store.clone(),
                    cancel: self.cancel.clone(),
                    actions: actions.clone(),
                    progress: self.progress.clone(),
                };
                let semaphore = semaphore.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return Ok(()), // semaphore closed, run is over
                    };
                    worker.perform().await
                }));
            }

            // Workers already in flight for this step are allowed to finish
            // before an abort propagates; no later step ever starts.
            let mut fatal: Option<ProvisionerError> = None;
            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        if fatal.is_none() {
                            fatal = Some(e);
                        }
                    }
                    Err(e) => {
                        error!(step_id = %step.id, error = %e, "Provision worker panicked");
                        if fatal.is_none() {
                            fatal = Some(ProvisionerError::ProvisionError(format!(
                                "Worker for step '{}' panicked: {e}",
                                step.id
                            )));
                        }
                    }
                }
            }

            if let Some(e) = fatal {
                error!(step_id = %step.id, error = %e, "Aborting provisioning run");
                return Err(e);
            }

            if self.cancel.is_cancelled() {
                return Err(ProvisionerError::Cancelled(format!(
                    "run cancelled during step '{}'",
                    step.id
                )));
            }
        }

        Ok(Arc::try_unwrap(actions)
            .map(Mutex::into_inner)
            .unwrap_or_else(|shared| shared.lock().clone()))
    }
}

/// One per-instance execution of one step.
struct Worker {
    step: StepDefinition,
    instance: Instance,
    config: Arc<ProvisionerConfig>,
    pool: Arc<ClientPool>,
    marker_store: Arc<dyn MarkerStore>,
    cancel: CancelSignal,
    actions: Arc<Mutex<Vec<Action>>>,
    progress: Arc<AtomicU64>,
}

impl Worker {
    /// Evaluate performability and execute the sync action, emitting exactly
    /// one action. Returns an error only when the failure must abort the run.
    async fn perform(self) -> Result<()> {
        let evaluation = match self
            .marker_store
            .evaluate(
                &self.step,
                &self.instance,
                self.config.greedy,
                self.config.countable,
            )
            .await
        {
            Ok(evaluation) => evaluation,
            Err(e) => return self.handle_failure(None, e.into(), None),
        };

        let instance_step = InstanceStep {
            step_id: self.step.id.clone(),
            instance: self.instance.clone(),
            marker: evaluation.marker,
        };

        if !evaluation.performable {
            info!(
                step_id = %self.step.id,
                instance = %self.instance,
                "Provision step '{}' skipped for {}",
                self.step.id,
                self.instance
            );
            log_step_operation(
                "provision",
                &self.step.id,
                &self.instance.name,
                "skipped",
                None,
                None,
            );
            self.record(instance_step, ActionStatus::Skipped);
            return Ok(());
        }

        let Some(sync) = self.step.sync.clone() else {
            // validate() rejects definitions without a sync action before any
            // worker is spawned.
            return Err(ProvisionerError::ValidationError(format!(
                "Step '{}' has no sync action defined",
                self.step.id
            )));
        };

        info!(
            step_id = %self.step.id,
            instance = %self.instance,
            "Provision step '{}' started at {}",
            self.step.id,
            self.instance
        );
        let started = Instant::now();

        let context = StepContext {
            instance: self.instance.clone(),
            client: self.pool.client_for(&self.instance),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        };

        match sync(context).await {
            Ok(()) => {
                if let Err(e) = self
                    .marker_store
                    .update(&self.step.id, &self.instance, &self.step.version)
                    .await
                {
                    return self.handle_failure(Some(instance_step), e.into(), Some(started));
                }

                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    step_id = %self.step.id,
                    instance = %self.instance,
                    duration_ms = duration_ms,
                    "Provision step '{}' ended at {}",
                    self.step.id,
                    self.instance
                );
                log_step_operation(
                    "provision",
                    &self.step.id,
                    &self.instance.name,
                    "ended",
                    Some(duration_ms),
                    None,
                );
                self.record(instance_step, ActionStatus::Ended);
                Ok(())
            }
            Err(e) => self.handle_failure(Some(instance_step), e, Some(started)),
        }
    }

    /// Downgrade a failure into a recorded action when the step allows
    /// continuing; escalate it into a run abort otherwise.
    fn handle_failure(
        &self,
        instance_step: Option<InstanceStep>,
        error: ProvisionerError,
        started: Option<Instant>,
    ) -> Result<()> {
        let duration_ms = started.map(|instant| instant.elapsed().as_millis() as u64);
        error!(
            step_id = %self.step.id,
            instance = %self.instance,
            duration_ms = duration_ms,
            error = %error,
            "Provision step '{}' failed at {}",
            self.step.id,
            self.instance
        );

        if !self.step.continue_on_fail {
            // Cancellation keeps its own kind so callers can distinguish an
            // operator stop from a remote failure.
            if let ProvisionerError::Cancelled(_) = error {
                return Err(error);
            }
            return Err(ProvisionerError::ProvisionError(format!(
                "Step '{}' failed at {}: {error}",
                self.step.id, self.instance
            )));
        }

        let detail = error.to_string();
        log_step_operation(
            "provision",
            &self.step.id,
            &self.instance.name,
            "failed",
            duration_ms,
            Some(detail.as_str()),
        );
        let instance_step = instance_step.unwrap_or_else(|| InstanceStep {
            step_id: self.step.id.clone(),
            instance: self.instance.clone(),
            marker: None,
        });
        self.record(instance_step, ActionStatus::Failed);
        Ok(())
    }

    fn record(&self, instance_step: InstanceStep, status: ActionStatus) {
        self.actions.lock().push(Action::new(instance_step, status));
        let done = self.progress.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(progress = done, "Instance action recorded");
    }
}
