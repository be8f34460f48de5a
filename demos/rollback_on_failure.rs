//! # Demo: rollback_on_failure
//!
//! A service on level 2 refuses to start. The built-in [`LogListener`]
//! shows the error surfacing, and the orchestrator falls back to the last
//! fully-achieved level.
//!
//! ## Run
//! ```bash
//! cargo run --example rollback_on_failure --features logging
//! ```

use std::sync::Arc;

use levelvisor::{
    Config, LogListener, Orchestrator, Registry, ServiceError, ServiceFn, ServiceSpec,
};
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::new();

    let db = ServiceFn::arc("db", |_ctx: CancellationToken| async {
        println!("[db] started");
        Ok(())
    });
    let broken = ServiceFn::arc("broken", |_ctx: CancellationToken| async {
        Err(ServiceError::failed("listen address already in use"))
    });

    registry.register(ServiceSpec::new(db, 1))?;
    registry.register(ServiceSpec::new(broken, 2))?;

    let orchestrator = Orchestrator::new(registry, Config::default());
    orchestrator.register_listener(Arc::new(LogListener));
    orchestrator.register_progress_listener(Arc::new(LogListener));

    match orchestrator.proceed_to(2).await {
        Ok(()) => println!("unexpectedly reached level 2"),
        Err(err) => println!("transition failed as expected: {err}"),
    }
    println!("settled at level {}", orchestrator.current());
    Ok(())
}
