//! # ServiceHandle: a descriptor bound to its lazy instance slot.
//!
//! The handle is what level snapshots hand to the engine: the descriptor
//! for identity/scheduling plus a slot tracking whether the instance is
//! up. The slot is the per-descriptor activation status the context
//! consults for would-block detection and error bookkeeping.
//!
//! ## Slot transitions
//! ```text
//! Idle ──activate──► Activating ──ok──────► Active ──destroy──► Idle
//!                        │ └──hard-cancel──► Idle
//!                        └──error──────────► Failed ──clear_errors──► Idle
//! ```
//!
//! ## Rules
//! - `Activating` is entered by exactly one worker; concurrent blocking
//!   activators wait on the transition notify, non-blocking ones observe a
//!   would-block.
//! - `Failed` is sticky until the level completes (`clear_errors`), so a
//!   dependent activated in the same level fails fast instead of retrying
//!   the broken dependency.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::core::lock;
use crate::error::ServiceError;
use crate::service::descriptor::Descriptor;
use crate::service::service::ServiceRef;

/// Lazy instance state of one service.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    /// No instance; activation may begin.
    Idle,
    /// An activation is in progress on some worker.
    Activating,
    /// The instance is up.
    Active,
    /// The last activation failed; held until the level completes.
    Failed(ServiceError),
}

/// A bound pair of descriptor and lazy instance slot.
pub struct ServiceHandle {
    descriptor: Arc<Descriptor>,
    service: ServiceRef,
    pub(crate) slot: Mutex<Slot>,
    /// Signalled on every slot transition.
    pub(crate) changed: Notify,
}

impl ServiceHandle {
    pub(crate) fn new(descriptor: Arc<Descriptor>, service: ServiceRef) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            service,
            slot: Mutex::new(Slot::Idle),
            changed: Notify::new(),
        })
    }

    /// The identity/scheduling token of this service.
    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    /// The service name (shorthand for `descriptor().name()`).
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub(crate) fn service(&self) -> &ServiceRef {
        &self.service
    }

    /// True while the service instance is up.
    pub fn is_active(&self) -> bool {
        matches!(*lock(&self.slot), Slot::Active)
    }
}
