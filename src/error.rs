//! Error taxonomy for the dispensing core.
//!
//! Each layer owns one enum and converts into the layer above:
//!
//! ```text
//!   LinkError ──▶ ProtocolError ──▶ DispenseOutcome (terminal status)
//!   LedgerError ─────────────────▶ OrchestrationError / ReconciliationAlert
//! ```
//!
//! Transport and protocol errors never escape the protocol layer; they are
//! folded into the outcome of the medicine being dispensed.  Ledger errors
//! after a physical dispense are the only ones that stop a session.

use thiserror::Error;

use crate::model::{DispenseOutcome, ReconciliationAlert};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Failures of the byte transport to the dispenser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The port was never opened, or has been released.
    #[error("dispenser not connected")]
    NotConnected,
    /// No complete response line arrived before the deadline.
    #[error("timed out waiting for dispenser response")]
    Timeout,
    /// Bytes arrived but did not form a decodable line.
    #[error("garbled response from dispenser")]
    Garbled,
    /// The OS reported an I/O failure on the port.
    #[error("serial I/O failure: {0}")]
    Io(String),
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            std::io::ErrorKind::NotConnected | std::io::ErrorKind::BrokenPipe => {
                Self::NotConnected
            }
            _ => Self::Io(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// A chunk (or scan/home exchange) that did not end in an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Link(#[from] LinkError),
    /// The dispenser answered with the configured busy token.
    #[error("dispenser busy")]
    Busy,
    /// The dispenser acknowledged a different slot than the one commanded.
    #[error("acknowledgement for slot {got}, expected slot {expected}")]
    SlotMismatch { expected: u16, got: String },
    /// Any other decodable line.
    #[error("unexpected response {0:?}")]
    Unexpected(String),
}

impl ProtocolError {
    /// Whether the link was down, as opposed to a live link misbehaving.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Link(LinkError::NotConnected))
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrescriptionError {
    #[error("medicine name is empty")]
    EmptyMedicine,
    #[error("quantity for {0} must be positive")]
    ZeroQuantity(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("patient identifier is empty")]
    Empty,
    #[error("patient identifier longer than {max} characters")]
    TooLong { max: usize },
    #[error("patient identifier contains {0:?}")]
    InvalidCharacter(char),
}

// ---------------------------------------------------------------------------
// Store / ledger
// ---------------------------------------------------------------------------

/// Errors reported by a [`PatientStore`](crate::app::ports::PatientStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("patient {0} not found")]
    PatientNotFound(String),
    #[error("slot {0} not found")]
    SlotNotFound(u16),
    #[error("store unreachable: {0}")]
    Unreachable(String),
    /// A delta that would overflow a stored value.
    #[error("commit refused: {0}")]
    InvalidDelta(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("slot {slot} holds {available}, {requested} requested")]
    InsufficientStock {
        slot: u16,
        requested: u32,
        available: u32,
    },
    #[error("slot {0} is not stocked")]
    UnknownSlot(u16),
    #[error("slot {slot} holds {found}, prescription names {expected}")]
    MedicineMismatch {
        slot: u16,
        expected: String,
        found: String,
    },
    #[error("patient {0} not found")]
    PatientNotFound(String),
    #[error("store sync failed: {0}")]
    SyncFailure(String),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PatientNotFound(id) => Self::PatientNotFound(id),
            StoreError::SlotNotFound(slot) => Self::UnknownSlot(slot),
            StoreError::Unreachable(msg) | StoreError::InvalidDelta(msg) => Self::SyncFailure(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// A fulfillment session that could not run to the end of its list.
///
/// Every variant raised after the first medicine carries the outcomes
/// produced so far, so the caller can still show what was delivered.
#[derive(Debug, Clone, Error)]
pub enum OrchestrationError {
    #[error("invalid patient identifier: {0}")]
    InvalidPatient(#[from] IdentityError),
    #[error("patient lookup failed: {0}")]
    PatientLookup(LedgerError),
    /// The store failed before any motion for the current medicine.
    #[error("store unavailable after {} medicine(s): {source}", .outcomes.len())]
    StoreUnavailable {
        outcomes: Vec<DispenseOutcome>,
        source: LedgerError,
    },
    /// Hardware moved but the ledger write failed; needs manual correction.
    #[error("reconciliation required: {alert}")]
    Reconciliation {
        outcomes: Vec<DispenseOutcome>,
        alert: ReconciliationAlert,
    },
}

impl OrchestrationError {
    /// Outcomes produced before the session stopped.
    pub fn outcomes(&self) -> &[DispenseOutcome] {
        match self {
            Self::StoreUnavailable { outcomes, .. } | Self::Reconciliation { outcomes, .. } => {
                outcomes
            }
            Self::InvalidPatient(_) | Self::PatientLookup(_) => &[],
        }
    }

    pub fn alert(&self) -> Option<&ReconciliationAlert> {
        match self {
            Self::Reconciliation { alert, .. } => Some(alert),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration / worker
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("config is not valid JSON: {0}")]
    Corrupted(#[from] serde_json::Error),
    /// A field failed range validation; the message names the field.
    #[error("validation failed: {0}")]
    ValidationFailed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// The worker thread has exited; no further requests can be served.
    #[error("dispenser worker stopped")]
    Stopped,
    #[error("timed out waiting for dispenser worker")]
    Timeout,
}

/// Reconciliation journal I/O.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal line {line} is corrupt: {source}")]
    Corrupted {
        line: usize,
        source: serde_json::Error,
    },
}
