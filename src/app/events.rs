//! Outbound fulfillment events.
//!
//! The [`FulfillmentOrchestrator`](super::orchestrator::FulfillmentOrchestrator)
//! emits these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them: log them,
//! forward them to a UI thread, and so on.

use crate::model::{DispenseOutcome, PatientId, ReconciliationAlert};

use super::stage::MedicineStage;

/// Structured events emitted by the fulfillment core.
#[derive(Debug, Clone)]
pub enum FulfillmentEvent {
    /// A session began for `patient` with `medicines` prescriptions.
    SessionStarted { patient: PatientId, medicines: usize },

    /// One medicine moved through its pipeline.
    StageChanged {
        medicine: String,
        from: MedicineStage,
        to: MedicineStage,
    },

    /// A medicine reached `Done` with this outcome.
    OutcomeRecorded(DispenseOutcome),

    /// The ledger write after a physical dispense failed.
    ReconciliationRequired(ReconciliationAlert),

    /// Cancellation was observed between medicines.
    Cancelled { patient: PatientId, skipped: usize },

    /// The session ran to the end of its list.
    SessionFinished {
        patient: PatientId,
        complete: usize,
        total: usize,
    },
}
