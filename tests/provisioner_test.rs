//! Orchestration semantics: idempotence, parallel fan-out, partial failure
//! isolation, filtering and degenerate cases. Instances here are never
//! contacted - sync actions are local and markers live in memory.

mod common;

use common::offline_instance;
use provision_core::config::ProvisionerConfig;
use provision_core::error::ProvisionerError;
use provision_core::provision::{ActionStatus, MarkerStore, MemoryMarkerStore, Provisioner};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn provisioner_with(config: ProvisionerConfig, store: Arc<MemoryMarkerStore>) -> Provisioner {
    Provisioner::new(config).unwrap().with_marker_store(store)
}

fn counting_step(provisioner: &mut Provisioner, id: &str, counter: Arc<AtomicUsize>) {
    provisioner.step(id, move |step| {
        step.sync(move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    });
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let store = Arc::new(MemoryMarkerStore::new());
    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store.clone());
    let runs = Arc::new(AtomicUsize::new(0));
    counting_step(&mut provisioner, "setup", runs.clone());

    let fleet = vec![offline_instance("author")];

    let first = provisioner.provision(&fleet).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].status, ActionStatus::Ended);

    let second = provisioner.provision(&fleet).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].status, ActionStatus::Skipped);

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let marker = store.read("setup", &fleet[0]).await.unwrap().unwrap();
    assert_eq!(marker.count, 1);
}

#[tokio::test]
async fn test_step_fans_out_across_fleet() {
    let store = Arc::new(MemoryMarkerStore::new());
    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store);
    let runs = Arc::new(AtomicUsize::new(0));
    counting_step(&mut provisioner, "setup", runs.clone());

    let fleet = vec![
        offline_instance("author"),
        offline_instance("publish"),
        offline_instance("dispatcher"),
    ];

    let actions = provisioner.provision(&fleet).await.unwrap();
    assert_eq!(actions.len(), 3);
    assert!(actions.iter().all(|action| action.status.is_ended()));

    // Cross-instance ordering is unspecified; compare as a set.
    let names: HashSet<&str> = actions
        .iter()
        .map(|action| action.step.instance.name.as_str())
        .collect();
    assert_eq!(names, HashSet::from(["author", "publish", "dispatcher"]));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failure_aborts_run_before_later_steps() {
    let store = Arc::new(MemoryMarkerStore::new());
    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store);

    let later_runs = Arc::new(AtomicUsize::new(0));
    provisioner.step("breaks", |step| {
        step.sync(|ctx| async move {
            Err(ProvisionerError::ProvisionError(format!(
                "refused by {}",
                ctx.instance.name
            )))
        });
    });
    counting_step(&mut provisioner, "never-reached", later_runs.clone());

    let error = provisioner
        .provision(&[offline_instance("author")])
        .await
        .unwrap_err();

    match error {
        ProvisionerError::ProvisionError(message) => {
            assert!(message.contains("breaks"), "message: {message}");
            assert!(message.contains("author"), "message: {message}");
        }
        other => panic!("expected ProvisionError, got {other:?}"),
    }
    assert_eq!(later_runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_in_flight_workers_of_failing_step_complete() {
    let store = Arc::new(MemoryMarkerStore::new());
    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store);

    let slow_runs = Arc::new(AtomicUsize::new(0));
    let later_runs = Arc::new(AtomicUsize::new(0));

    let slow_runs_step = slow_runs.clone();
    provisioner.step("mixed", move |step| {
        let slow_runs = slow_runs_step.clone();
        step.sync(move |ctx| {
            let slow_runs = slow_runs.clone();
            async move {
                if ctx.instance.name == "author" {
                    Err(ProvisionerError::ProvisionError("boom".to_string()))
                } else {
                    // Still in flight when the author worker fails.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    slow_runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        });
    });
    counting_step(&mut provisioner, "later", later_runs.clone());

    let fleet = vec![offline_instance("author"), offline_instance("publish")];
    let result = provisioner.provision(&fleet).await;

    assert!(result.is_err());
    // The publish worker was already running and finished its action.
    assert_eq!(slow_runs.load(Ordering::SeqCst), 1);
    // The later step never started.
    assert_eq!(later_runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_continue_on_fail_records_failed_and_continues() {
    let store = Arc::new(MemoryMarkerStore::new());
    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store);

    let later_runs = Arc::new(AtomicUsize::new(0));
    provisioner.step("tolerated", |step| {
        step.continue_on_fail(true).sync(|_ctx| async {
            Err(ProvisionerError::ProvisionError("flaky backend".to_string()))
        });
    });
    counting_step(&mut provisioner, "still-runs", later_runs.clone());

    let actions = provisioner
        .provision(&[offline_instance("author")])
        .await
        .unwrap();

    assert_eq!(actions.len(), 2);
    let by_step = |id: &str| {
        actions
            .iter()
            .find(|action| action.step.step_id == id)
            .unwrap()
    };
    assert_eq!(by_step("tolerated").status, ActionStatus::Failed);
    assert_eq!(by_step("still-runs").status, ActionStatus::Ended);
    assert_eq!(later_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_step_leaves_no_marker_and_reruns() {
    let store = Arc::new(MemoryMarkerStore::new());
    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store.clone());

    provisioner.step("tolerated", |step| {
        step.continue_on_fail(true).sync(|_ctx| async {
            Err(ProvisionerError::ProvisionError("flaky backend".to_string()))
        });
    });

    let fleet = vec![offline_instance("author")];
    provisioner.provision(&fleet).await.unwrap();

    assert!(store.read("tolerated", &fleet[0]).await.unwrap().is_none());

    // The step stays performable for the next run.
    let actions = provisioner.provision(&fleet).await.unwrap();
    assert_eq!(actions[0].status, ActionStatus::Failed);
}

#[tokio::test]
async fn test_disabled_provisioner_short_circuits() {
    let store = Arc::new(MemoryMarkerStore::new());
    let config = ProvisionerConfig {
        enabled: false,
        ..ProvisionerConfig::default()
    };
    let mut provisioner = provisioner_with(config, store);
    let runs = Arc::new(AtomicUsize::new(0));
    counting_step(&mut provisioner, "setup", runs.clone());

    let actions = provisioner
        .provision(&[offline_instance("author")])
        .await
        .unwrap();

    assert!(actions.is_empty());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_step_pattern_filters_and_preserves_order() {
    let store = Arc::new(MemoryMarkerStore::new());
    let config = ProvisionerConfig {
        step_name: "deployPackage/*".to_string(),
        ..ProvisionerConfig::default()
    };
    let mut provisioner = provisioner_with(config, store);

    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for id in ["enableCrxDe", "deployPackage/foo", "deployPackage/bar"] {
        let order = order.clone();
        provisioner.step(id, move |step| {
            step.sync(move |_ctx| {
                let order = order.clone();
                async move {
                    order.lock().push(id);
                    Ok(())
                }
            });
        });
    }

    let actions = provisioner
        .provision(&[offline_instance("author")])
        .await
        .unwrap();

    assert_eq!(actions.len(), 2);
    let executed: HashSet<&str> = actions
        .iter()
        .map(|action| action.step.step_id.as_str())
        .collect();
    assert_eq!(
        executed,
        HashSet::from(["deployPackage/foo", "deployPackage/bar"])
    );
    // Steps execute sequentially in registration order.
    assert_eq!(*order.lock(), vec!["deployPackage/foo", "deployPackage/bar"]);
}

#[tokio::test]
async fn test_greedy_reruns_completed_steps() {
    let store = Arc::new(MemoryMarkerStore::new());
    let runs = Arc::new(AtomicUsize::new(0));

    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store.clone());
    counting_step(&mut provisioner, "setup", runs.clone());
    let fleet = vec![offline_instance("author")];
    provisioner.provision(&fleet).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let greedy_config = ProvisionerConfig {
        greedy: true,
        ..ProvisionerConfig::default()
    };
    let mut greedy = provisioner_with(greedy_config, store.clone());
    counting_step(&mut greedy, "setup", runs.clone());

    let actions = greedy.provision(&fleet).await.unwrap();
    assert_eq!(actions[0].status, ActionStatus::Ended);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let marker = store.read("setup", &fleet[0]).await.unwrap().unwrap();
    assert_eq!(marker.count, 2);
}

#[tokio::test]
async fn test_changed_version_reruns_step() {
    let store = Arc::new(MemoryMarkerStore::new());
    let fleet = vec![offline_instance("author")];
    let runs = Arc::new(AtomicUsize::new(0));

    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store.clone());
    let first_runs = runs.clone();
    provisioner.step("setup", move |step| {
        let runs = first_runs.clone();
        step.version("1.0.0").sync(move |_ctx| {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    });
    provisioner.provision(&fleet).await.unwrap();

    // Same id, bumped version: the marker no longer matches.
    let mut updated = provisioner_with(ProvisionerConfig::default(), store.clone());
    let second_runs = runs.clone();
    updated.step("setup", move |step| {
        let runs = second_runs.clone();
        step.version("2.0.0").sync(move |_ctx| {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    });

    let actions = updated.provision(&fleet).await.unwrap();
    assert_eq!(actions[0].status, ActionStatus::Ended);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let marker = store.read("setup", &fleet[0]).await.unwrap().unwrap();
    assert_eq!(marker.version, "2.0.0");
    assert_eq!(marker.count, 2);
}

#[tokio::test]
async fn test_init_runs_once_per_run_and_failure_is_fatal() {
    let store = Arc::new(MemoryMarkerStore::new());
    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store.clone());

    let inits = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let init_counter = inits.clone();
    let run_counter = runs.clone();
    provisioner.step("setup", move |step| {
        let init_counter = init_counter.clone();
        let run_counter = run_counter.clone();
        step.init(move || {
            let init_counter = init_counter.clone();
            async move {
                init_counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .sync(move |_ctx| {
            let run_counter = run_counter.clone();
            async move {
                run_counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    });

    let fleet = vec![
        offline_instance("author"),
        offline_instance("publish"),
        offline_instance("dispatcher"),
    ];
    provisioner.provision(&fleet).await.unwrap();

    // Once per run, not per instance.
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    // A failing init callback in any step aborts before any sync action.
    let store = Arc::new(MemoryMarkerStore::new());
    let mut failing = provisioner_with(ProvisionerConfig::default(), store);
    let untouched = Arc::new(AtomicUsize::new(0));
    counting_step(&mut failing, "fine", untouched.clone());
    failing.step("brokenInit", |step| {
        step.init(|| async {
            Err(ProvisionerError::FileNotFound(
                "/dist/missing.zip".to_string(),
            ))
        })
        .sync(|_ctx| async { Ok(()) });
    });

    let error = failing
        .provision(&[offline_instance("author")])
        .await
        .unwrap_err();
    assert!(matches!(error, ProvisionerError::ProvisionError(_)));
    assert_eq!(untouched.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_validation_failure_is_fatal_before_execution() {
    let store = Arc::new(MemoryMarkerStore::new());
    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store);
    provisioner.step("noSync", |step| {
        step.description("forgot the sync action");
    });

    let error = provisioner
        .provision(&[offline_instance("author")])
        .await
        .unwrap_err();
    assert!(matches!(error, ProvisionerError::ValidationError(_)));
}

#[tokio::test]
async fn test_cancelled_run_starts_no_steps() {
    let store = Arc::new(MemoryMarkerStore::new());
    let mut provisioner = provisioner_with(ProvisionerConfig::default(), store);
    let runs = Arc::new(AtomicUsize::new(0));
    counting_step(&mut provisioner, "setup", runs.clone());

    provisioner.cancel_signal().cancel();
    let error = provisioner
        .provision(&[offline_instance("author")])
        .await
        .unwrap_err();

    assert!(matches!(error, ProvisionerError::Cancelled(_)));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}
