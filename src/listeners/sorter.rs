//! # Sorter: pluggable reordering of a level's service list.
//!
//! Before a level is scheduled, its snapshot runs through every registered
//! sorter in registration order. Each sorter either returns a new ordering
//! or `None` for "no change"; the final ordering is the scheduling order.
//!
//! A panicking sorter is treated as "no change" for that sorter.

use std::sync::Arc;

use crate::service::ServiceHandle;

/// Strategy that may reorder the services of one level before scheduling.
pub trait Sorter: Send + Sync + 'static {
    /// Returns the new ordering, or `None` to leave the list unchanged.
    fn sort(&self, services: &[Arc<ServiceHandle>]) -> Option<Vec<Arc<ServiceHandle>>>;

    /// Human-readable name (for panic warnings).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
