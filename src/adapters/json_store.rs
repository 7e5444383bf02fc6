//! JSON document store adapter.
//!
//! Implements [`PatientStore`] over a single JSON document holding patients
//! and per-slot stock.  Two backends:
//!
//! - **in memory**: for tests and `--simulate` runs.
//! - **file**: every commit rewrites the document through a temp file and a
//!   rename, so a crash mid-write leaves the previous version intact.
//!
//! A commit is validated in full before anything changes, and rolled back
//! in memory if the file write fails, so reads always match what is on disk.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::PatientStore;
use crate::error::StoreError;
use crate::model::{PatientId, PatientRecord, StockEntry};

/// On-disk document layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub patients: Vec<PatientRecord>,
    #[serde(default)]
    pub stock: Vec<StockEntry>,
}

pub struct JsonStore {
    doc: StoreDocument,
    path: Option<PathBuf>,
}

impl JsonStore {
    pub fn in_memory(doc: StoreDocument) -> Self {
        info!(
            "JsonStore: in-memory backend ({} patients, {} slots)",
            doc.patients.len(),
            doc.stock.len()
        );
        Self { doc, path: None }
    }

    /// Load the document at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let text = fs::read_to_string(path)
            .map_err(|e| StoreError::Unreachable(format!("{}: {e}", path.display())))?;
        let doc: StoreDocument = serde_json::from_str(&text)
            .map_err(|e| StoreError::Unreachable(format!("{}: {e}", path.display())))?;
        info!(
            "JsonStore: loaded {} ({} patients, {} slots)",
            path.display(),
            doc.patients.len(),
            doc.stock.len()
        );
        Ok(Self {
            doc,
            path: Some(path.to_owned()),
        })
    }

    pub fn document(&self) -> &StoreDocument {
        &self.doc
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&self.doc)
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)
            .and_then(|()| fs::rename(&tmp, path))
            .map_err(|e| StoreError::Unreachable(format!("{}: {e}", path.display())))
    }
}

impl PatientStore for JsonStore {
    fn lookup_patient(&self, id: &PatientId) -> Result<PatientRecord, StoreError> {
        self.doc
            .patients
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::PatientNotFound(id.to_string()))
    }

    fn lookup_stock(&self, slot: u16) -> Result<StockEntry, StoreError> {
        self.doc
            .stock
            .iter()
            .find(|s| s.slot == slot)
            .cloned()
            .ok_or(StoreError::SlotNotFound(slot))
    }

    fn commit(
        &mut self,
        patient: &PatientId,
        balance_delta_cents: i64,
        slot: u16,
        stock_delta: i64,
    ) -> Result<(), StoreError> {
        let p = self
            .doc
            .patients
            .iter()
            .position(|p| &p.id == patient)
            .ok_or_else(|| StoreError::PatientNotFound(patient.to_string()))?;
        let s = self
            .doc
            .stock
            .iter()
            .position(|s| s.slot == slot)
            .ok_or(StoreError::SlotNotFound(slot))?;

        let old_balance = self.doc.patients[p].balance_cents;
        let old_count = self.doc.stock[s].available_count;

        let new_balance = old_balance.checked_add(balance_delta_cents).ok_or_else(|| {
            StoreError::InvalidDelta(format!(
                "balance {old_balance} {balance_delta_cents:+} cents overflows for {patient}"
            ))
        })?;
        let new_count = i64::from(old_count).checked_add(stock_delta).ok_or_else(|| {
            StoreError::InvalidDelta(format!("slot {slot} count {old_count} {stock_delta:+} overflows"))
        })?;
        if new_count < 0 {
            warn!(
                "JsonStore: slot {} would go to {}, recording 0",
                slot, new_count
            );
        }
        self.doc.patients[p].balance_cents = new_balance;
        self.doc.stock[s].available_count = new_count.clamp(0, i64::from(u32::MAX)) as u32;

        if let Err(e) = self.persist() {
            self.doc.patients[p].balance_cents = old_balance;
            self.doc.stock[s].available_count = old_count;
            return Err(e);
        }
        Ok(())
    }
}
