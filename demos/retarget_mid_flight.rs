//! # Demo: retarget_mid_flight
//!
//! A listener watches the ascent and, upon reaching level 2, sends the
//! container back to level 0. Waiters observe the `Repurposed` outcome
//! once and then wait out the descent.
//!
//! ## Run
//! ```bash
//! cargo run --example retarget_mid_flight
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use levelvisor::{
    Config, Job, Orchestrator, Registry, RunLevelListener, ServiceFn, ServiceSpec, WaitOutcome,
};
use tokio_util::sync::CancellationToken;

struct TurnBackAtTwo;

#[async_trait]
impl RunLevelListener for TurnBackAtTwo {
    async fn on_progress(&self, job: &Arc<Job>, level: i32) {
        println!("reached level {level}");
        if level == 2 && job.is_up() {
            println!("turning back");
            job.change_proposed_level(0).await.expect("inside a callback");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::new();
    for (name, level) in [("one", 1), ("two", 2), ("three", 3)] {
        let service = ServiceFn::arc(name, move |_ctx: CancellationToken| async move {
            println!("[{name}] started");
            Ok(())
        });
        registry.register(ServiceSpec::new(service, level))?;
    }

    let orchestrator = Orchestrator::new(registry, Config::default());
    orchestrator.register_listener(Arc::new(TurnBackAtTwo));

    let job = orchestrator.submit(5).await?;
    loop {
        match job.wait().await? {
            WaitOutcome::Repurposed => println!("job reversed direction"),
            outcome => {
                println!("finished: {outcome:?}");
                break;
            }
        }
    }
    println!("settled at level {}", orchestrator.current());
    Ok(())
}
