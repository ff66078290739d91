mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod slots;

pub use availability::{booked_cells, compile};
pub use conflict::conflicts;
pub use error::BookingError;
pub use slots::{SlotGrid, SlotMinutes, day_slots, is_slot_aligned, slot_key};

use std::sync::Arc;

use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Length of every meeting and of every availability cell.
    pub slot: SlotMinutes,
    /// Deleting an unknown meeting or room fails instead of succeeding silently.
    pub strict_deletes: bool,
}

/// Booking lifecycle and room catalog on top of a [`Store`].
///
/// Stateless apart from its configuration; all state lives in the store.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn Store>,
    config: ScheduleConfig,
}

impl BookingService {
    pub fn new(store: Arc<dyn Store>, config: ScheduleConfig) -> Self {
        Self { store, config }
    }
}
