//! Mid-flight retargeting: same-direction retargets, direction reversal
//! with the `Repurposed` wait outcome, and the callback-only rule.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{entries, new_log, orchestrator, slow_svc, svc};
use levelvisor::{Config, Job, Registry, RunLevelListener, ServiceSpec, WaitOutcome};

/// Retargets the job once, the first time `at` is reached.
struct Retarget {
    at: i32,
    to: i32,
    fired: AtomicBool,
}

impl Retarget {
    fn once(at: i32, to: i32) -> Arc<Self> {
        Arc::new(Self {
            at,
            to,
            fired: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RunLevelListener for Retarget {
    async fn on_progress(&self, job: &Arc<Job>, level: i32) {
        if level == self.at && !self.fired.swap(true, Ordering::SeqCst) {
            job.change_proposed_level(self.to).await.unwrap();
        }
    }
}

#[tokio::test]
async fn reversal_surfaces_repurposed_then_done() {
    let log = new_log();
    let registry = Registry::new();
    for (name, level) in [("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)] {
        registry
            .register(ServiceSpec::new(
                slow_svc(&log, name, Duration::from_millis(20)),
                level,
            ))
            .unwrap();
    }

    let (orchestrator, recorder) = orchestrator(&registry, Config::default());
    orchestrator.register_listener(Retarget::once(2, 0));

    let job = orchestrator.submit(5).await.unwrap();
    let mut outcomes = Vec::new();
    loop {
        match job.wait().await.unwrap() {
            WaitOutcome::Repurposed => outcomes.push(WaitOutcome::Repurposed),
            outcome => {
                outcomes.push(outcome);
                break;
            }
        }
    }
    assert_eq!(outcomes, [WaitOutcome::Repurposed, WaitOutcome::Done]);

    assert_eq!(orchestrator.current(), 0);
    assert!(job.is_done());
    assert!(!job.is_cancelled());

    let events = recorder.events();
    assert_eq!(
        events,
        [
            "start(0)",
            "progress(1)",
            "progress(2)",
            "progress(1)",
            "progress(0)"
        ],
        "old-direction progress leaked after the reversal"
    );
    // Everything that was started has been torn down again.
    let log = entries(&log);
    assert_eq!(log, ["up:a", "up:b", "down:b", "down:a"]);
}

#[tokio::test]
async fn cooperative_reversal_matches_threaded_callbacks() {
    let log = new_log();
    let registry = Registry::new();
    for (name, level) in [("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)] {
        registry.register(ServiceSpec::new(svc(&log, name), level)).unwrap();
    }

    let cfg = Config {
        use_workers: false,
        ..Config::default()
    };
    let (orchestrator, recorder) = orchestrator(&registry, cfg);
    orchestrator.register_listener(Retarget::once(2, 0));

    let job = orchestrator.submit(5).await.unwrap();
    assert!(job.is_done());
    assert_eq!(orchestrator.current(), 0);
    assert_eq!(
        recorder.events(),
        [
            "start(0)",
            "progress(1)",
            "progress(2)",
            "progress(1)",
            "progress(0)"
        ]
    );
}

#[tokio::test]
async fn same_direction_retarget_extends_the_ascent() {
    let log = new_log();
    let registry = Registry::new();
    for (name, level) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
        registry.register(ServiceSpec::new(svc(&log, name), level)).unwrap();
    }

    let (orchestrator, recorder) = orchestrator(&registry, Config::default());
    orchestrator.register_listener(Retarget::once(1, 4));

    let job = orchestrator.submit(2).await.unwrap();
    let mut outcome = job.wait().await.unwrap();
    while outcome == WaitOutcome::Repurposed {
        outcome = job.wait().await.unwrap();
    }
    assert_eq!(outcome, WaitOutcome::Done);

    assert_eq!(job.proposed_level(), 4);
    assert_eq!(orchestrator.current(), 4);
    assert_eq!(
        recorder.events(),
        [
            "start(0)",
            "progress(1)",
            "progress(2)",
            "progress(3)",
            "progress(4)"
        ]
    );
}

#[tokio::test]
async fn retargeting_outside_a_callback_is_rejected() {
    let log = new_log();
    let registry = Registry::new();
    registry
        .register(ServiceSpec::new(
            slow_svc(&log, "slow", Duration::from_millis(100)),
            1,
        ))
        .unwrap();

    let (orchestrator, _recorder) = orchestrator(&registry, Config::default());
    let job = orchestrator.submit(1).await.unwrap();

    let err = job.change_proposed_level(0).await.unwrap_err();
    assert_eq!(err.as_label(), "orchestrator_illegal_state");

    assert_eq!(job.wait().await.unwrap(), WaitOutcome::Done);

    // A completed job cannot be retargeted either.
    let err = job.change_proposed_level(0).await.unwrap_err();
    assert_eq!(err.as_label(), "orchestrator_illegal_state");
}
