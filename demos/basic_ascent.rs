//! # Demo: basic_ascent
//!
//! Minimal walkthrough: three services on three levels, brought up in
//! order and torn back down in reverse.
//!
//! ## Flow
//! ```text
//! register db@1, cache@2, api@3
//!   └─► proceed_to(3)   starts db, then cache, then api
//!   └─► proceed_to(0)   stops api, then cache, then db
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example basic_ascent
//! ```

use levelvisor::{Config, Orchestrator, Registry, ServiceFn, ServiceRef, ServiceSpec};
use tokio_util::sync::CancellationToken;

fn noisy(name: &'static str) -> ServiceRef {
    std::sync::Arc::new(
        ServiceFn::new(name, move |_ctx: CancellationToken| async move {
            println!("[{name}] started");
            Ok(())
        })
        .with_stop(move || async move {
            println!("[{name}] stopped");
            Ok(())
        }),
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::new();
    registry.register(ServiceSpec::new(noisy("db"), 1))?;
    registry.register(ServiceSpec::new(noisy("cache"), 2).with_dependencies(["db"]))?;
    registry.register(ServiceSpec::new(noisy("api"), 3).with_dependencies(["cache"]))?;

    let orchestrator = Orchestrator::new(registry, Config::default());

    orchestrator.proceed_to(3).await?;
    println!("up: current level = {}", orchestrator.current());

    orchestrator.proceed_to(0).await?;
    println!("down: current level = {}", orchestrator.current());
    Ok(())
}
