//! Port traits — the boundary between fulfillment logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ FulfillmentOrchestrator (domain)
//! ```
//!
//! The dispenser itself sits behind [`Link`](crate::link::Link); the
//! patient/inventory store and the event stream sit behind the traits
//! here.  The orchestrator consumes them via generics, so every test runs
//! against in-memory adapters.

use crate::error::StoreError;
use crate::model::{PatientId, PatientRecord, StockEntry};

// ───────────────────────────────────────────────────────────────
// Patient / inventory store (driven adapter: domain ↔ spreadsheet, file, …)
// ───────────────────────────────────────────────────────────────

/// External patient and inventory records.
///
/// # Consistency
///
/// A value written by [`commit`](Self::commit) must be visible to the next
/// lookup in the same session.  Implementations must not retry a failed
/// commit on their own: after an ambiguous failure the write may already
/// have landed, and a second attempt would charge twice.
pub trait PatientStore {
    fn lookup_patient(&self, id: &PatientId) -> Result<PatientRecord, StoreError>;

    fn lookup_stock(&self, slot: u16) -> Result<StockEntry, StoreError>;

    /// Apply signed deltas to a patient's balance and a slot's stock.
    fn commit(
        &mut self,
        patient: &PatientId,
        balance_delta_cents: i64,
        slot: u16,
        stock_delta: i64,
    ) -> Result<(), StoreError>;
}

impl<S: PatientStore + ?Sized> PatientStore for Box<S> {
    fn lookup_patient(&self, id: &PatientId) -> Result<PatientRecord, StoreError> {
        (**self).lookup_patient(id)
    }

    fn lookup_stock(&self, slot: u16) -> Result<StockEntry, StoreError> {
        (**self).lookup_stock(slot)
    }

    fn commit(
        &mut self,
        patient: &PatientId,
        balance_delta_cents: i64,
        slot: u16,
        stock_delta: i64,
    ) -> Result<(), StoreError> {
        (**self).commit(patient, balance_delta_cents, slot, stock_delta)
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink (driven adapter: domain → logging / UI)
// ───────────────────────────────────────────────────────────────

/// The orchestrator emits [`FulfillmentEvent`](super::events::FulfillmentEvent)s
/// through this port.  Adapters decide where they go (log, UI channel, …).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::FulfillmentEvent);
}

/// Discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &super::events::FulfillmentEvent) {}
}
