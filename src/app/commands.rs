//! Inbound commands to the dispenser worker.
//!
//! These represent requests from the outside world (CLI, a kiosk UI) that
//! the [`DispenserWorker`](super::worker::DispenserWorker) runs against its
//! orchestrator, one at a time.  Each carries the sender half of its reply
//! channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use crate::error::{OrchestrationError, ProtocolError};
use crate::model::Prescription;

use super::orchestrator::FulfillmentReport;

/// Shared cancellation flag for one fulfillment request.
///
/// Observed only between medicines: a chunk sequence already at the
/// hardware always completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub type FulfillmentReply = Result<FulfillmentReport, OrchestrationError>;

/// Requests the worker accepts.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Fulfill for `patient_id`.  `prescriptions` overrides the list stored
    /// for the patient when present.
    Fulfill {
        patient_id: String,
        prescriptions: Option<Vec<Prescription>>,
        cancel: CancelToken,
        reply: Sender<FulfillmentReply>,
    },

    /// Read a patient card.
    Scan {
        reply: Sender<Result<Option<String>, ProtocolError>>,
    },

    /// Home the mechanism.
    Home {
        reply: Sender<Result<(), ProtocolError>>,
    },
}
