//! Cancellation scenarios: mid-ascent cancel with rollback and
//! re-activation, cancel idempotence, and the stuck-destruction watchdog.

mod common;

use std::time::Duration;

use common::{new_log, orchestrator, slow_svc, stuck_stop_svc, svc};
use levelvisor::{Config, Locator, Registry, ServiceSpec, WaitOutcome};

fn short_cancel() -> Config {
    Config {
        cancel_timeout: Duration::from_millis(100),
        ..Config::default()
    }
}

#[tokio::test]
async fn cancelled_ascent_descends_and_can_be_resubmitted() {
    let log = new_log();
    let registry = Registry::new();
    registry.register(ServiceSpec::new(svc(&log, "a"), 1)).unwrap();
    registry
        .register(ServiceSpec::new(
            slow_svc(&log, "slow", Duration::from_millis(300)),
            2,
        ))
        .unwrap();
    registry.register(ServiceSpec::new(svc(&log, "c"), 3)).unwrap();

    let (orchestrator, recorder) = orchestrator(&registry, short_cancel());
    let job = orchestrator.submit(3).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(job.cancel());
    assert!(!job.cancel(), "cancel is not idempotent");

    assert_eq!(job.wait().await.unwrap(), WaitOutcome::Done);
    assert!(job.is_cancelled());
    assert_eq!(orchestrator.current(), 1);
    assert!(registry.lookup("a").unwrap().is_active());
    assert!(!registry.lookup("slow").unwrap().is_active());
    assert!(!registry.lookup("c").unwrap().is_active());

    let events = recorder.events();
    assert_eq!(
        events.iter().filter(|e| e.starts_with("cancelled")).count(),
        1
    );
    assert!(events.contains(&"cancelled(1)".to_string()), "{events:?}");

    // Everything torn down by the cancel comes back on the next ascent.
    orchestrator.proceed_to(3).await.unwrap();
    assert_eq!(orchestrator.current(), 3);
    for name in ["a", "slow", "c"] {
        assert!(registry.lookup(name).unwrap().is_active(), "{name} not active");
    }
}

#[tokio::test]
async fn concurrent_cancels_produce_one_cancelled_dispatch() {
    let log = new_log();
    let registry = Registry::new();
    registry
        .register(ServiceSpec::new(
            slow_svc(&log, "slow", Duration::from_millis(200)),
            1,
        ))
        .unwrap();

    let (orchestrator, recorder) = orchestrator(&registry, short_cancel());
    let job = orchestrator.submit(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let first = {
        let job = job.clone();
        tokio::spawn(async move { job.cancel() })
    };
    let second = {
        let job = job.clone();
        tokio::spawn(async move { job.cancel() })
    };
    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert!(first ^ second, "exactly one cancel must win");

    assert_eq!(job.wait().await.unwrap(), WaitOutcome::Done);
    assert!(job.is_cancelled());
    assert_eq!(
        recorder
            .events()
            .iter()
            .filter(|e| e.starts_with("cancelled"))
            .count(),
        1
    );
}

#[tokio::test]
async fn stuck_destruction_is_hard_cancelled_by_the_watchdog() {
    let log = new_log();
    let registry = Registry::new();
    registry.register(ServiceSpec::new(svc(&log, "a"), 1)).unwrap();
    registry
        .register(ServiceSpec::new(stuck_stop_svc(&log, "stuck"), 2))
        .unwrap();

    let (orchestrator, recorder) = orchestrator(&registry, short_cancel());
    orchestrator.proceed_to(2).await.unwrap();

    // Descend into the hanging stop, then cancel.
    let job = orchestrator.submit(0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(job.cancel());

    assert_eq!(job.wait().await.unwrap(), WaitOutcome::Done);
    assert!(job.is_cancelled());
    assert_eq!(orchestrator.current(), 1);
    // The descent never reached level 1.
    assert!(registry.lookup("a").unwrap().is_active());
    assert!(!registry.lookup("stuck").unwrap().is_active());
    assert!(
        recorder.events().contains(&"cancelled(1)".to_string()),
        "{:?}",
        recorder.events()
    );
}

#[tokio::test]
async fn cancelling_a_finished_job_is_a_no_op() {
    let log = new_log();
    let registry = Registry::new();
    registry.register(ServiceSpec::new(svc(&log, "a"), 1)).unwrap();

    let (orchestrator, _recorder) = orchestrator(&registry, Config::default());
    let job = orchestrator.submit(1).await.unwrap();
    assert_eq!(job.wait().await.unwrap(), WaitOutcome::Done);

    assert!(!job.cancel());
    assert!(!job.is_cancelled());
    assert_eq!(orchestrator.current(), 1);
}
