//! Inventory ledger.
//!
//! The ledger's view of per-slot stock and patient balances, backed by a
//! [`PatientStore`].  Two operations matter:
//!
//! - [`reserve`](InventoryLedger::reserve) is a pessimistic availability
//!   check.  It reads, never writes, and holds nothing.
//! - [`commit`](InventoryLedger::commit) applies what an outcome says was
//!   physically delivered: `units_dispensed` of stock and
//!   `units_dispensed × unit cost` of balance.  The requested quantity is
//!   not an input, so undelivered medicine is never charged.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::app::ports::PatientStore;
use crate::error::LedgerError;
use crate::model::{DispenseOutcome, PatientId, PatientRecord, StockEntry};

/// Result of a successful availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub slot: u16,
    pub requested: u32,
    pub available: u32,
    pub unit_cost_cents: i64,
}

/// What a commit wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    pub slot: u16,
    pub units: u32,
    pub cost_cents: i64,
    /// `false` for zero-delta commits, which do not touch the store.
    pub written: bool,
}

pub struct InventoryLedger<S> {
    store: S,
    stock: HashMap<u16, StockEntry>,
    balances: HashMap<PatientId, i64>,
}

impl<S: PatientStore> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            stock: HashMap::new(),
            balances: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read a patient's record and remember their balance.
    pub fn load_patient(&mut self, id: &PatientId) -> Result<PatientRecord, LedgerError> {
        let record = self.store.lookup_patient(id)?;
        self.balances.insert(id.clone(), record.balance_cents);
        Ok(record)
    }

    /// Check that `slot` holds `medicine` and at least `quantity` units of it.
    ///
    /// Names are compared ignoring ASCII case and surrounding whitespace.
    pub fn reserve(
        &mut self,
        slot: u16,
        medicine: &str,
        quantity: u32,
    ) -> Result<Reservation, LedgerError> {
        let entry = self.store.lookup_stock(slot)?;
        if !entry.medicine.trim().eq_ignore_ascii_case(medicine.trim()) {
            warn!(
                "ledger: slot {} holds {}, not {}",
                slot, entry.medicine, medicine
            );
            return Err(LedgerError::MedicineMismatch {
                slot,
                expected: medicine.to_owned(),
                found: entry.medicine,
            });
        }
        let reservation = Reservation {
            slot,
            requested: quantity,
            available: entry.available_count,
            unit_cost_cents: entry.unit_cost_cents,
        };
        self.stock.insert(slot, entry);

        if reservation.available < quantity {
            warn!(
                "ledger: slot {} holds {}, {} requested",
                slot, reservation.available, quantity
            );
            return Err(LedgerError::InsufficientStock {
                slot,
                requested: quantity,
                available: reservation.available,
            });
        }
        debug!("ledger: slot {} ok for {}", slot, quantity);
        Ok(reservation)
    }

    /// Record what `outcome` delivered to `patient`.
    ///
    /// Errors here mean the hardware has already moved; the caller must
    /// raise a reconciliation alert and must not call `commit` again for
    /// the same outcome.
    pub fn commit(
        &mut self,
        patient: &PatientId,
        outcome: &DispenseOutcome,
    ) -> Result<CommitReceipt, LedgerError> {
        let slot = outcome.slot();
        let units = outcome.units_dispensed();
        if units == 0 {
            debug!("ledger: zero-delta commit for {}", outcome.medicine());
            return Ok(CommitReceipt {
                slot,
                units: 0,
                cost_cents: 0,
                written: false,
            });
        }

        let unit_cost = match self.stock.get(&slot) {
            Some(entry) => entry.unit_cost_cents,
            None => self.store.lookup_stock(slot)?.unit_cost_cents,
        };
        let cost = i64::from(units)
            .checked_mul(unit_cost)
            .filter(|c| *c != i64::MIN)
            .ok_or_else(|| {
                LedgerError::SyncFailure(format!(
                    "cost of {units} unit(s) at {unit_cost} cents overflows"
                ))
            })?;

        self.store
            .commit(patient, -cost, slot, -i64::from(units))?;

        if let Some(entry) = self.stock.get_mut(&slot) {
            entry.available_count = entry.available_count.saturating_sub(units);
        }
        if let Some(balance) = self.balances.get_mut(patient) {
            *balance = balance.saturating_sub(cost);
        }
        info!(
            "ledger: {} x{} from slot {} charged {} cents to {}",
            outcome.medicine(),
            units,
            slot,
            cost,
            patient
        );
        Ok(CommitReceipt {
            slot,
            units,
            cost_cents: cost,
            written: true,
        })
    }

    /// Last known balance for `patient`, if loaded this session.
    pub fn balance(&self, patient: &PatientId) -> Option<i64> {
        self.balances.get(patient).copied()
    }

    /// Last known stock for `slot`, if read this session.
    pub fn available(&self, slot: u16) -> Option<u32> {
        self.stock.get(&slot).map(|e| e.available_count)
    }

    /// Cached unit cost for `slot`, if read this session.
    pub fn unit_cost(&self, slot: u16) -> Option<i64> {
        self.stock.get(&slot).map(|e| e.unit_cost_cents)
    }
}
