//! Shared fixtures for the scenario tests: a recording listener and
//! closure-backed probe services that log their lifecycle into a shared
//! vector.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use levelvisor::{
    Config, ErrorAction, ErrorInfo, Job, Orchestrator, ProgressStartedListener, Registry,
    RunLevelListener, ServiceError, ServiceFn, ServiceRef,
};
use tokio_util::sync::CancellationToken;

/// Shared lifecycle log: `up:<name>` / `down:<name>` / listener markers.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Records listener callbacks in order; optionally votes on errors.
pub struct Recorder {
    events: Mutex<Vec<String>>,
    action: Option<ErrorAction>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            action: None,
        })
    }

    pub fn with_action(action: ErrorAction) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            action: Some(action),
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl RunLevelListener for Recorder {
    async fn on_progress(&self, _job: &Arc<Job>, level: i32) {
        self.record(format!("progress({level})"));
    }

    async fn on_cancelled(&self, _job: &Arc<Job>, level: i32) {
        self.record(format!("cancelled({level})"));
    }

    async fn on_error(&self, _job: &Arc<Job>, info: &ErrorInfo) -> Option<ErrorAction> {
        self.record(format!("error({})", info.failed_descriptor().name()));
        self.action
    }
}

#[async_trait]
impl ProgressStartedListener for Recorder {
    async fn on_progress_starting(&self, _job: &Arc<Job>, current_level: i32) {
        self.record(format!("start({current_level})"));
    }
}

/// Mirrors progress markers into the shared service log, for tests that
/// assert ordering between service lifecycle and callbacks.
pub struct SharedRecorder {
    log: Log,
}

impl SharedRecorder {
    pub fn new(log: &Log) -> Arc<Self> {
        Arc::new(Self { log: log.clone() })
    }
}

#[async_trait]
impl RunLevelListener for SharedRecorder {
    async fn on_progress(&self, _job: &Arc<Job>, level: i32) {
        push(&self.log, format!("progress({level})"));
    }
}

/// Instant service logging `up:`/`down:`.
pub fn svc(log: &Log, name: &'static str) -> ServiceRef {
    let up = log.clone();
    let down = log.clone();
    Arc::new(
        ServiceFn::new(name, move |_ctx: CancellationToken| {
            let up = up.clone();
            async move {
                push(&up, format!("up:{name}"));
                Ok(())
            }
        })
        .with_stop(move || {
            let down = down.clone();
            async move {
                push(&down, format!("down:{name}"));
                Ok(())
            }
        }),
    )
}

/// Service whose start takes `delay` before logging `up:`.
pub fn slow_svc(log: &Log, name: &'static str, delay: Duration) -> ServiceRef {
    let up = log.clone();
    let down = log.clone();
    Arc::new(
        ServiceFn::new(name, move |_ctx: CancellationToken| {
            let up = up.clone();
            async move {
                tokio::time::sleep(delay).await;
                push(&up, format!("up:{name}"));
                Ok(())
            }
        })
        .with_stop(move || {
            let down = down.clone();
            async move {
                push(&down, format!("down:{name}"));
                Ok(())
            }
        }),
    )
}

/// Service whose start always fails.
pub fn failing_svc(name: &'static str) -> ServiceRef {
    ServiceFn::arc(name, move |_ctx: CancellationToken| async move {
        Err(ServiceError::failed("refused to start"))
    })
}

/// Service that starts fine but hangs forever in stop.
pub fn stuck_stop_svc(log: &Log, name: &'static str) -> ServiceRef {
    let up = log.clone();
    Arc::new(
        ServiceFn::new(name, move |_ctx: CancellationToken| {
            let up = up.clone();
            async move {
                push(&up, format!("up:{name}"));
                Ok(())
            }
        })
        .with_stop(|| async {
            futures::future::pending::<()>().await;
            Ok(())
        }),
    )
}

/// Orchestrator over `registry` with a fresh [`Recorder`] wired as both
/// listener kinds.
pub fn orchestrator(registry: &Arc<Registry>, cfg: Config) -> (Arc<Orchestrator>, Arc<Recorder>) {
    let orchestrator = Arc::new(Orchestrator::new(registry.clone(), cfg));
    let recorder = Recorder::new();
    orchestrator.register_listener(recorder.clone());
    orchestrator.register_progress_listener(recorder.clone());
    (orchestrator, recorder)
}
