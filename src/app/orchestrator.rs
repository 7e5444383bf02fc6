//! Fulfillment orchestrator — the hexagonal core.
//!
//! [`FulfillmentOrchestrator`] owns one dispenser protocol and one ledger
//! and runs a patient's prescriptions through them, one medicine at a time:
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!  Prescription ─▶│ reserve ─▶ dispense ─▶ commit │─▶ DispenseOutcome
//!                 └──────────────────────────────┘
//!                     │            │          │
//!                  Ledger       Protocol    Ledger
//! ```
//!
//! A medicine that cannot be dispensed never blocks the next one.  The
//! session stops early only when the store is gone or a ledger write
//! failed after the hardware had already moved.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::error::{LedgerError, OrchestrationError, ProtocolError};
use crate::ledger::InventoryLedger;
use crate::link::Link;
use crate::model::{DispenseOutcome, DispenseStatus, PatientId, Prescription, ReconciliationAlert};
use crate::protocol::DispenserProtocol;

use super::commands::CancelToken;
use super::events::FulfillmentEvent;
use super::ports::{EventSink, PatientStore};
use super::stage::{MedicineStage, StageTracker};

/// What one session produced.
#[derive(Debug, Clone)]
pub struct FulfillmentReport {
    pub patient: PatientId,
    /// One outcome per medicine that reached `Done`, in prescription order.
    pub outcomes: Vec<DispenseOutcome>,
    /// Medicines skipped because the session was cancelled.
    pub skipped: Vec<String>,
}

impl FulfillmentReport {
    pub fn cancelled(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Every medicine ran and every one came back `Complete`.
    pub fn is_fully_delivered(&self) -> bool {
        !self.cancelled()
            && self
                .outcomes
                .iter()
                .all(|o| o.status() == DispenseStatus::Complete)
    }

    pub fn units_dispensed(&self) -> u32 {
        self.outcomes.iter().map(DispenseOutcome::units_dispensed).sum()
    }
}

pub struct FulfillmentOrchestrator<L, D, S> {
    protocol: DispenserProtocol<L, D>,
    ledger: InventoryLedger<S>,
}

impl<L: Link, D: DelayNs, S: PatientStore> FulfillmentOrchestrator<L, D, S> {
    pub fn new(protocol: DispenserProtocol<L, D>, ledger: InventoryLedger<S>) -> Self {
        Self { protocol, ledger }
    }

    pub fn protocol(&self) -> &DispenserProtocol<L, D> {
        &self.protocol
    }

    pub fn ledger(&self) -> &InventoryLedger<S> {
        &self.ledger
    }

    // ── Sessions ──────────────────────────────────────────────

    /// Validate `raw_id`, load the patient's prescriptions and fulfill them.
    pub fn fulfill_patient(
        &mut self,
        raw_id: &str,
        cancel: &CancelToken,
        sink: &mut impl EventSink,
    ) -> Result<FulfillmentReport, OrchestrationError> {
        let id = PatientId::parse(raw_id)?;
        let record = self
            .ledger
            .load_patient(&id)
            .map_err(OrchestrationError::PatientLookup)?;
        info!(
            "orchestrator: {} has {} prescription(s)",
            id,
            record.prescriptions.len()
        );
        self.run_session(&id, &record.prescriptions, cancel, sink)
    }

    /// Run `prescriptions` for `patient` in order.
    ///
    /// The patient must exist in the store; nothing moves otherwise.
    /// Cancellation is checked before each medicine; a medicine already at
    /// the hardware always runs to its outcome.
    pub fn fulfill(
        &mut self,
        patient: &PatientId,
        prescriptions: &[Prescription],
        cancel: &CancelToken,
        sink: &mut impl EventSink,
    ) -> Result<FulfillmentReport, OrchestrationError> {
        self.ledger.load_patient(patient).map_err(|e| {
            warn!("orchestrator: refusing session for {}: {}", patient, e);
            OrchestrationError::PatientLookup(e)
        })?;
        self.run_session(patient, prescriptions, cancel, sink)
    }

    fn run_session(
        &mut self,
        patient: &PatientId,
        prescriptions: &[Prescription],
        cancel: &CancelToken,
        sink: &mut impl EventSink,
    ) -> Result<FulfillmentReport, OrchestrationError> {
        sink.emit(&FulfillmentEvent::SessionStarted {
            patient: patient.clone(),
            medicines: prescriptions.len(),
        });

        let mut outcomes = Vec::with_capacity(prescriptions.len());
        for (index, rx) in prescriptions.iter().enumerate() {
            if cancel.is_cancelled() {
                let skipped: Vec<String> = prescriptions[index..]
                    .iter()
                    .map(|p| p.medicine().to_owned())
                    .collect();
                warn!(
                    "orchestrator: cancelled for {}, {} medicine(s) skipped",
                    patient,
                    skipped.len()
                );
                sink.emit(&FulfillmentEvent::Cancelled {
                    patient: patient.clone(),
                    skipped: skipped.len(),
                });
                return Ok(FulfillmentReport {
                    patient: patient.clone(),
                    outcomes,
                    skipped,
                });
            }
            self.run_medicine(patient, rx, &mut outcomes, sink)?;
        }

        let complete = outcomes
            .iter()
            .filter(|o| o.status() == DispenseStatus::Complete)
            .count();
        sink.emit(&FulfillmentEvent::SessionFinished {
            patient: patient.clone(),
            complete,
            total: outcomes.len(),
        });
        Ok(FulfillmentReport {
            patient: patient.clone(),
            outcomes,
            skipped: Vec::new(),
        })
    }

    /// One medicine through `Reserving → Dispensing → Committing → Done`.
    ///
    /// On success the outcome is appended to `outcomes`.  On a halting
    /// error the accumulated outcomes move into the error.
    fn run_medicine(
        &mut self,
        patient: &PatientId,
        rx: &Prescription,
        outcomes: &mut Vec<DispenseOutcome>,
        sink: &mut impl EventSink,
    ) -> Result<(), OrchestrationError> {
        let mut stage = StageTracker::new(rx.medicine());
        let chunk_size = self.protocol.chunk_size();

        stage.advance(MedicineStage::Reserving, sink);
        let outcome = match self.ledger.reserve(rx.slot(), rx.medicine(), rx.quantity()) {
            Ok(_) => {
                stage.advance(MedicineStage::Dispensing, sink);
                self.protocol.dispense(rx)
            }
            Err(LedgerError::InsufficientStock { .. }) => {
                DispenseOutcome::not_attempted(rx, chunk_size, DispenseStatus::InsufficientStock)
            }
            Err(LedgerError::UnknownSlot(slot)) => {
                warn!("orchestrator: {} names unstocked slot {}", rx.medicine(), slot);
                DispenseOutcome::not_attempted(rx, chunk_size, DispenseStatus::Rejected)
            }
            Err(LedgerError::MedicineMismatch { slot, found, .. }) => {
                warn!(
                    "orchestrator: {} refused, slot {} holds {}",
                    rx.medicine(),
                    slot,
                    found
                );
                DispenseOutcome::not_attempted(rx, chunk_size, DispenseStatus::Rejected)
            }
            Err(source) => {
                error!("orchestrator: store unavailable before {}: {}", rx.medicine(), source);
                return Err(OrchestrationError::StoreUnavailable {
                    outcomes: std::mem::take(outcomes),
                    source,
                });
            }
        };

        stage.advance(MedicineStage::Committing, sink);
        if let Err(e) = self.ledger.commit(patient, &outcome) {
            let unit_cost = self.ledger.unit_cost(outcome.slot()).unwrap_or(0);
            let alert = ReconciliationAlert::new(patient, &outcome, unit_cost, &e);
            error!("orchestrator: {}", alert);
            sink.emit(&FulfillmentEvent::ReconciliationRequired(alert.clone()));
            outcomes.push(outcome);
            return Err(OrchestrationError::Reconciliation {
                outcomes: std::mem::take(outcomes),
                alert,
            });
        }

        stage.advance(MedicineStage::Done, sink);
        sink.emit(&FulfillmentEvent::OutcomeRecorded(outcome.clone()));
        outcomes.push(outcome);
        Ok(())
    }

    // ── Identity / maintenance ────────────────────────────────

    /// Read a patient card through the dispenser's reader.
    pub fn scan_patient(&mut self) -> Result<Option<String>, ProtocolError> {
        self.protocol.scan_patient()
    }

    pub fn home(&mut self) -> Result<(), ProtocolError> {
        self.protocol.home()
    }
}
