//! Domain data: prescriptions, stock, and dispense outcomes.
//!
//! [`Prescription`] is the read-only input to a dispensing attempt and
//! [`DispenseOutcome`] its single, immutable result.  Ledger mutations are
//! computed from the outcome alone, never from the prescription that
//! produced it.

use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, LedgerError, PrescriptionError, ProtocolError};

/// Longest patient identifier accepted from RFID or manual entry.
pub const MAX_PATIENT_ID_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Patient identity
// ---------------------------------------------------------------------------

/// A validated patient identifier.
///
/// Only the shape is checked here; whether the patient exists is up to the
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatientId(String);

impl PatientId {
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(IdentityError::Empty);
        }
        if id.len() > MAX_PATIENT_ID_LEN {
            return Err(IdentityError::TooLong {
                max: MAX_PATIENT_ID_LEN,
            });
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        {
            return Err(IdentityError::InvalidCharacter(c));
        }
        Ok(Self(id.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PatientId {
    type Error = IdentityError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<PatientId> for String {
    fn from(id: PatientId) -> Self {
        id.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Prescription
// ---------------------------------------------------------------------------

/// One medicine to dispense: name, unit count, and dispenser slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PrescriptionFields")]
pub struct Prescription {
    medicine: String,
    quantity: u32,
    slot: u16,
}

#[derive(Deserialize)]
struct PrescriptionFields {
    medicine: String,
    quantity: u32,
    slot: u16,
}

impl TryFrom<PrescriptionFields> for Prescription {
    type Error = PrescriptionError;

    fn try_from(f: PrescriptionFields) -> Result<Self, Self::Error> {
        Self::new(f.medicine, f.quantity, f.slot)
    }
}

impl Prescription {
    pub fn new(
        medicine: impl Into<String>,
        quantity: u32,
        slot: u16,
    ) -> Result<Self, PrescriptionError> {
        let medicine = medicine.into().trim().to_owned();
        if medicine.is_empty() {
            return Err(PrescriptionError::EmptyMedicine);
        }
        if quantity == 0 {
            return Err(PrescriptionError::ZeroQuantity(medicine));
        }
        Ok(Self {
            medicine,
            quantity,
            slot,
        })
    }

    pub fn medicine(&self) -> &str {
        &self.medicine
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn slot(&self) -> u16 {
        self.slot
    }
}

// ---------------------------------------------------------------------------
// Store records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: PatientId,
    pub name: String,
    pub balance_cents: i64,
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
}

/// Stock held in one dispenser slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub slot: u16,
    pub medicine: String,
    pub available_count: u32,
    pub unit_cost_cents: i64,
}

// ---------------------------------------------------------------------------
// Chunk planning
// ---------------------------------------------------------------------------

/// How a requested quantity splits into whole hardware chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_size: u32,
    pub chunks: u32,
    /// Units below one chunk that will not be dispensed.
    pub remainder: u32,
}

impl ChunkPlan {
    pub fn new(quantity: u32, chunk_size: u32) -> Self {
        debug_assert!(chunk_size > 0, "chunk size must be positive");
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunks: quantity / chunk_size,
            remainder: quantity % chunk_size,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenseStatus {
    /// Every planned chunk was acknowledged.
    Complete,
    /// Some chunks were acknowledged before a failure.
    Partial,
    /// The link was live but no chunk was acknowledged.
    Failed,
    /// The link was down before any chunk was acknowledged.
    HardwareUnavailable,
    /// The stock check refused the request; nothing was attempted.
    InsufficientStock,
    /// Nothing to dispense: unknown slot or quantity refused by policy.
    Rejected,
}

impl DispenseStatus {
    /// Status of a chunk sequence that stopped after `completed` acks.
    pub fn from_progress(
        requested: u32,
        completed: u32,
        failure: Option<&ProtocolError>,
    ) -> Self {
        debug_assert!(completed <= requested);
        match failure {
            None => Self::Complete,
            Some(_) if completed > 0 => Self::Partial,
            Some(e) if e.is_disconnect() => Self::HardwareUnavailable,
            Some(_) => Self::Failed,
        }
    }
}

impl fmt::Display for DispenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::HardwareUnavailable => "hardware unavailable",
            Self::InsufficientStock => "insufficient stock",
            Self::Rejected => "rejected",
        })
    }
}

/// The result of one dispensing attempt for one medicine.
///
/// Created exactly once and never mutated; `chunks_completed` never
/// exceeds `chunks_requested`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispenseOutcome {
    medicine: String,
    slot: u16,
    chunk_size: u32,
    chunks_requested: u32,
    chunks_completed: u32,
    remainder: u32,
    status: DispenseStatus,
    failure: Option<ProtocolError>,
}

impl DispenseOutcome {
    pub(crate) fn new(
        rx: &Prescription,
        plan: ChunkPlan,
        chunks_completed: u32,
        status: DispenseStatus,
        failure: Option<ProtocolError>,
    ) -> Self {
        debug_assert!(chunks_completed <= plan.chunks);
        Self {
            medicine: rx.medicine.clone(),
            slot: rx.slot,
            chunk_size: plan.chunk_size,
            chunks_requested: plan.chunks,
            chunks_completed: chunks_completed.min(plan.chunks),
            remainder: plan.remainder,
            status,
            failure,
        }
    }

    /// An outcome for a medicine that never reached the hardware.
    pub fn not_attempted(rx: &Prescription, chunk_size: u32, status: DispenseStatus) -> Self {
        let plan = ChunkPlan::new(rx.quantity, chunk_size);
        Self::new(rx, plan, 0, status, None)
    }

    pub fn medicine(&self) -> &str {
        &self.medicine
    }

    pub fn slot(&self) -> u16 {
        self.slot
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn chunks_requested(&self) -> u32 {
        self.chunks_requested
    }

    pub fn chunks_completed(&self) -> u32 {
        self.chunks_completed
    }

    pub fn remainder(&self) -> u32 {
        self.remainder
    }

    pub fn status(&self) -> DispenseStatus {
        self.status
    }

    /// The error that stopped the chunk sequence, if any.
    pub fn failure(&self) -> Option<&ProtocolError> {
        self.failure.as_ref()
    }

    /// Units physically delivered; the only quantity the ledger sees.
    pub fn units_dispensed(&self) -> u32 {
        self.chunks_completed * self.chunk_size
    }
}

impl fmt::Display for DispenseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (slot {}): {}, {}/{} chunks, {} units",
            self.medicine,
            self.slot,
            self.status,
            self.chunks_completed,
            self.chunks_requested,
            self.units_dispensed(),
        )?;
        if self.remainder > 0 {
            write!(f, ", {} units below one chunk not dispensed", self.remainder)?;
        }
        if let Some(e) = &self.failure {
            write!(f, " ({e})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Physical and recorded state may have diverged; an operator must fix the
/// store by hand.  Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationAlert {
    pub patient: PatientId,
    pub medicine: String,
    pub slot: u16,
    pub status: DispenseStatus,
    /// Units that left the dispenser but are not recorded in the store.
    pub units_unrecorded: u32,
    /// Charge that was not applied to the patient's balance.
    pub cost_cents_unrecorded: i64,
    pub raised_at_unix_secs: u64,
    pub reason: String,
}

impl ReconciliationAlert {
    pub fn new(
        patient: &PatientId,
        outcome: &DispenseOutcome,
        unit_cost_cents: i64,
        error: &LedgerError,
    ) -> Self {
        let raised_at_unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            patient: patient.clone(),
            medicine: outcome.medicine.clone(),
            slot: outcome.slot,
            status: outcome.status,
            units_unrecorded: outcome.units_dispensed(),
            cost_cents_unrecorded: i64::from(outcome.units_dispensed())
                .saturating_mul(unit_cost_cents),
            raised_at_unix_secs,
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for ReconciliationAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "patient {} received {} unit(s) of {} from slot {} that are not recorded, {} cents not charged ({})",
            self.patient,
            self.units_unrecorded,
            self.medicine,
            self.slot,
            self.cost_cents_unrecorded,
            self.reason,
        )
    }
}
