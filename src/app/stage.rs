//! Per-medicine pipeline stages.
//!
//! ```text
//!  Pending ─▶ Reserving ─▶ Dispensing ─▶ Committing ─▶ Done
//!                 │                          ▲
//!                 └──── (stock refused) ─────┘
//! ```
//!
//! Every medicine passes through `Committing` before `Done`, including
//! medicines that never reached the hardware, so the ledger always sees
//! one outcome per medicine.

use log::error;

use super::events::FulfillmentEvent;
use super::ports::EventSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MedicineStage {
    Pending,
    Reserving,
    Dispensing,
    Committing,
    Done,
}

impl MedicineStage {
    /// Whether `self → to` is an edge of the pipeline.
    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Reserving)
                | (Self::Reserving, Self::Dispensing | Self::Committing)
                | (Self::Dispensing, Self::Committing)
                | (Self::Committing, Self::Done)
        )
    }
}

/// Tracks one medicine's stage and reports every move.
pub struct StageTracker {
    medicine: String,
    stage: MedicineStage,
}

impl StageTracker {
    pub fn new(medicine: &str) -> Self {
        Self {
            medicine: medicine.to_owned(),
            stage: MedicineStage::Pending,
        }
    }

    pub fn stage(&self) -> MedicineStage {
        self.stage
    }

    /// Move to `to` and emit a [`FulfillmentEvent::StageChanged`].
    pub fn advance(&mut self, to: MedicineStage, sink: &mut impl EventSink) {
        let from = self.stage;
        if !from.can_transition(to) {
            error!("stage: illegal {:?} -> {:?} for {}", from, to, self.medicine);
            debug_assert!(false, "illegal stage transition {from:?} -> {to:?}");
        }
        self.stage = to;
        sink.emit(&FulfillmentEvent::StageChanged {
            medicine: self.medicine.clone(),
            from,
            to,
        });
    }
}
