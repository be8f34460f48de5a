//! Descent scenarios: reverse-activation teardown order, the
//! destruction-before-decrement rule, destruction-failure votes, and
//! support dependencies.

mod common;

use std::sync::{Arc, Mutex, OnceLock};

use common::{entries, new_log, orchestrator, svc, Recorder};
use levelvisor::{
    Config, ErrorAction, Locator, Orchestrator, Registry, ServiceError, ServiceFn, ServiceSpec,
    WaitOutcome,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn teardown_runs_in_reverse_activation_order() {
    let log = new_log();
    let registry = Registry::new();
    registry.register(ServiceSpec::new(svc(&log, "a"), 1)).unwrap();
    registry.register(ServiceSpec::new(svc(&log, "b"), 2)).unwrap();
    registry.register(ServiceSpec::new(svc(&log, "c"), 2)).unwrap();
    registry.register(ServiceSpec::new(svc(&log, "d"), 3)).unwrap();

    // One worker keeps the activation order deterministic.
    let cfg = Config {
        max_workers: 1,
        ..Config::default()
    };
    let (orchestrator, recorder) = orchestrator(&registry, cfg);
    orchestrator.proceed_to(3).await.unwrap();
    assert_eq!(entries(&log), ["up:a", "up:b", "up:c", "up:d"]);

    orchestrator.proceed_to(0).await.unwrap();
    assert_eq!(orchestrator.current(), 0);
    assert_eq!(
        entries(&log)[4..],
        ["down:d", "down:c", "down:b", "down:a"]
    );
    for name in ["a", "b", "c", "d"] {
        assert!(!registry.lookup(name).unwrap().is_active());
    }
    assert_eq!(
        recorder.events()[4..],
        ["start(3)", "progress(2)", "progress(1)", "progress(0)"]
    );
}

#[tokio::test]
async fn destruction_observes_the_already_decremented_level() {
    static ORCH: OnceLock<Arc<Orchestrator>> = OnceLock::new();
    static SEEN: Mutex<Option<i32>> = Mutex::new(None);

    let registry = Registry::new();
    let probe = Arc::new(
        ServiceFn::new("probe", |_ctx: CancellationToken| async { Ok(()) }).with_stop(|| async {
            let current = ORCH.get().expect("orchestrator installed").current();
            *SEEN.lock().unwrap() = Some(current);
            Ok(())
        }),
    );
    registry.register(ServiceSpec::new(probe, 2)).unwrap();

    let orchestrator = Arc::new(Orchestrator::new(registry.clone(), Config::default()));
    ORCH.set(orchestrator.clone()).ok().expect("fresh cell");

    orchestrator.proceed_to(2).await.unwrap();
    orchestrator.proceed_to(1).await.unwrap();

    // The level was given up before the service at it was destroyed.
    assert_eq!(*SEEN.lock().unwrap(), Some(1));
}

fn failing_stop_svc(name: &'static str) -> levelvisor::ServiceRef {
    Arc::new(
        ServiceFn::new(name, |_ctx: CancellationToken| async { Ok(()) })
            .with_stop(|| async { Err(ServiceError::failed("refused to stop")) }),
    )
}

#[tokio::test]
async fn destruction_failure_with_stop_vote_clamps_the_floor() {
    let log = new_log();
    let registry = Registry::new();
    registry.register(ServiceSpec::new(svc(&log, "a"), 1)).unwrap();
    registry.register(ServiceSpec::new(failing_stop_svc("bad"), 2)).unwrap();
    registry.register(ServiceSpec::new(svc(&log, "c"), 3)).unwrap();

    let orchestrator = Arc::new(Orchestrator::new(registry.clone(), Config::default()));
    let strict = Recorder::with_action(ErrorAction::GoToNextLowerLevelAndStop);
    orchestrator.register_listener(strict.clone());

    orchestrator.proceed_to(3).await.unwrap();
    let job = orchestrator.submit(0).await.unwrap();
    // Destruction failures do not fail the job; they only cap the floor.
    assert_eq!(job.wait().await.unwrap(), WaitOutcome::Done);

    assert_eq!(orchestrator.current(), 1);
    assert!(registry.lookup("a").unwrap().is_active());
    assert!(!registry.lookup("c").unwrap().is_active());
    assert_eq!(
        strict.events(),
        [
            "progress(1)",
            "progress(2)",
            "progress(3)",
            "progress(2)",
            "error(bad)",
            "progress(1)"
        ]
    );
}

#[tokio::test]
async fn destruction_failure_by_default_keeps_descending() {
    let log = new_log();
    let registry = Registry::new();
    registry.register(ServiceSpec::new(svc(&log, "a"), 1)).unwrap();
    registry.register(ServiceSpec::new(failing_stop_svc("bad"), 2)).unwrap();

    let (orchestrator, recorder) = orchestrator(&registry, Config::default());
    orchestrator.proceed_to(2).await.unwrap();
    orchestrator.proceed_to(0).await.unwrap();

    assert_eq!(orchestrator.current(), 0);
    assert!(!registry.lookup("a").unwrap().is_active());
    assert!(recorder.events().contains(&"error(bad)".to_string()));
}

#[tokio::test]
async fn support_dependencies_start_on_demand_and_survive_descents() {
    let log = new_log();
    let registry = Registry::new();
    registry.register(ServiceSpec::support(svc(&log, "db"))).unwrap();
    registry
        .register(ServiceSpec::new(svc(&log, "app"), 1).with_dependencies(["db"]))
        .unwrap();

    let (orchestrator, _recorder) = orchestrator(&registry, Config::default());
    orchestrator.proceed_to(1).await.unwrap();
    assert_eq!(entries(&log), ["up:db", "up:app"]);

    orchestrator.proceed_to(0).await.unwrap();
    // Levelled services are torn down; the support dependency is not.
    assert!(!registry.lookup("app").unwrap().is_active());
    assert!(registry.lookup("db").unwrap().is_active());
    assert_eq!(entries(&log), ["up:db", "up:app", "down:app"]);
}
