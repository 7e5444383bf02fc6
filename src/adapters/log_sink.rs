//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing fulfillment events through the `log`
//! facade.  The binary routes those records to `tracing-subscriber`.

use log::{debug, error, info, warn};

use crate::app::events::FulfillmentEvent;
use crate::app::ports::EventSink;
use crate::model::DispenseStatus;

/// Adapter that logs every [`FulfillmentEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &FulfillmentEvent) {
        match event {
            FulfillmentEvent::SessionStarted { patient, medicines } => {
                info!("SESSION | start patient={} medicines={}", patient, medicines);
            }
            FulfillmentEvent::StageChanged { medicine, from, to } => {
                debug!("STAGE | {} {:?} -> {:?}", medicine, from, to);
            }
            FulfillmentEvent::OutcomeRecorded(outcome) => match outcome.status() {
                DispenseStatus::Complete => info!("OUTCOME | {}", outcome),
                _ => warn!("OUTCOME | {}", outcome),
            },
            FulfillmentEvent::ReconciliationRequired(alert) => {
                error!("RECONCILE | {}", alert);
            }
            FulfillmentEvent::Cancelled { patient, skipped } => {
                warn!("SESSION | cancelled patient={} skipped={}", patient, skipped);
            }
            FulfillmentEvent::SessionFinished {
                patient,
                complete,
                total,
            } => {
                info!(
                    "SESSION | done patient={} complete={}/{}",
                    patient, complete, total
                );
            }
        }
    }
}
