//! Dispenser protocol — chunk sequencing over a [`Link`].
//!
//! A requested quantity is split into whole chunks (the unit the mechanism
//! releases per command).  Chunks are issued strictly one after another:
//!
//! ```text
//!  ┌─────────────┐  clear   ┌──────┐  DISPENSE:n  ┌──────────┐  ack  ┌────────┐
//!  │ next chunk  │────────▶│ send │─────────────▶│ receive  │──────▶│ settle │──┐
//!  └─────────────┘          └──────┘              └──────────┘       └────────┘  │
//!         ▲                                            │ other / timeout         │
//!         │                                            ▼                         │
//!         │                                      stop, record failure            │
//!         └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed chunk is never re-issued: without an acknowledgement the
//! hardware may or may not have moved, and a blind retry could double the
//! dose.  Retrying a whole medicine is the caller's decision.

use core::time::Duration;
use std::time::Instant;

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::config::{DispenserConfig, RemainderPolicy};
use crate::error::{LinkError, ProtocolError};
use crate::link::Link;
use crate::link::codec::{Frame, encode_command, encode_slot_command};
use crate::model::{ChunkPlan, DispenseOutcome, DispenseStatus, Prescription};

/// Banner the controller prints while waiting for a card.
pub const SCAN_STARTED: &str = "SCANNING_STARTED";
/// Prefix of a successful card read; the patient id follows.
pub const SCAN_DETECTED_PREFIX: &str = "RFID_DETECTED:";
/// No card presented before the controller's own deadline.
pub const SCAN_TIMEOUT: &str = "SCAN_TIMEOUT";
/// Homing finished.
pub const HOMING_COMPLETE: &str = "HOMING_COMPLETE";
/// Printed once after the controller boots and homes.
pub const SYSTEM_READY: &str = "SYSTEM_READY";

/// The subset of [`DispenserConfig`] the protocol needs.
#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    pub chunk_size: u32,
    pub remainder_policy: RemainderPolicy,
    pub min_slot: u16,
    pub max_slot: u16,
    pub response_timeout: Duration,
    pub settle_delay_ms: u32,
    pub long_operation_timeout: Duration,
    pub dispense_directive: String,
    pub ack_token: String,
    pub busy_token: String,
    pub scan_directive: String,
    pub home_directive: String,
}

impl From<&DispenserConfig> for ProtocolSettings {
    fn from(c: &DispenserConfig) -> Self {
        Self {
            chunk_size: c.chunk_size,
            remainder_policy: c.remainder_policy,
            min_slot: c.min_slot,
            max_slot: c.max_slot,
            response_timeout: c.response_timeout(),
            settle_delay_ms: c.settle_delay_ms,
            long_operation_timeout: c.long_operation_timeout(),
            dispense_directive: c.dispense_directive.clone(),
            ack_token: c.ack_token.clone(),
            busy_token: c.busy_token.clone(),
            scan_directive: c.scan_directive.clone(),
            home_directive: c.home_directive.clone(),
        }
    }
}

/// Drives one dispenser through its link.
///
/// Owns the link exclusively; there is one protocol instance per physical
/// dispenser and it is not shared between threads.
pub struct DispenserProtocol<L, D> {
    link: L,
    delay: D,
    settings: ProtocolSettings,
}

impl<L: Link, D: DelayNs> DispenserProtocol<L, D> {
    pub fn new(link: L, delay: D, settings: ProtocolSettings) -> Self {
        Self {
            link,
            delay,
            settings,
        }
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn chunk_size(&self) -> u32 {
        self.settings.chunk_size
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Give the link back, e.g. to release the port explicitly.
    pub fn into_link(self) -> L {
        self.link
    }

    // ── Dispensing ────────────────────────────────────────────

    /// Dispense one prescription as a sequence of chunk commands.
    ///
    /// Never fails: every transport or protocol error ends up in the
    /// returned outcome's status and `failure`.
    pub fn dispense(&mut self, rx: &Prescription) -> DispenseOutcome {
        let s = &self.settings;
        let slot = rx.slot();
        let plan = ChunkPlan::new(rx.quantity(), s.chunk_size);

        if !(s.min_slot..=s.max_slot).contains(&slot) {
            warn!(
                "dispense: slot {} for {} outside {}..={}",
                slot,
                rx.medicine(),
                s.min_slot,
                s.max_slot
            );
            return DispenseOutcome::new(rx, plan, 0, DispenseStatus::Rejected, None);
        }

        if plan.chunks == 0
            || (plan.remainder > 0 && s.remainder_policy == RemainderPolicy::Reject)
        {
            warn!(
                "dispense: {} x{} refused (chunk size {}, remainder {})",
                rx.medicine(),
                rx.quantity(),
                plan.chunk_size,
                plan.remainder
            );
            return DispenseOutcome::new(rx, plan, 0, DispenseStatus::Rejected, None);
        }

        if plan.remainder > 0 {
            warn!(
                "dispense: {} unit(s) of {} are below one chunk and will not be dispensed",
                plan.remainder,
                rx.medicine()
            );
        }

        if !self.link.is_connected() {
            warn!("dispense: link down, {} not attempted", rx.medicine());
            return DispenseOutcome::new(
                rx,
                plan,
                0,
                DispenseStatus::HardwareUnavailable,
                Some(ProtocolError::Link(LinkError::NotConnected)),
            );
        }

        let Some(frame) = encode_slot_command(&s.dispense_directive, slot) else {
            error!("dispense: directive {:?} does not fit a frame", s.dispense_directive);
            return DispenseOutcome::new(rx, plan, 0, DispenseStatus::Rejected, None);
        };

        info!(
            "dispense: {} slot {} -> {} chunk(s) of {}",
            rx.medicine(),
            slot,
            plan.chunks,
            plan.chunk_size
        );

        let mut completed = 0;
        let mut failure = None;
        for index in 0..plan.chunks {
            match self.run_chunk(&frame, slot) {
                Ok(()) => {
                    completed += 1;
                    debug!("dispense: slot {} chunk {}/{} acked", slot, index + 1, plan.chunks);
                    self.delay.delay_ms(self.settings.settle_delay_ms);
                }
                Err(e) => {
                    warn!(
                        "dispense: slot {} chunk {}/{} failed: {}",
                        slot,
                        index + 1,
                        plan.chunks,
                        e
                    );
                    failure = Some(e);
                    break;
                }
            }
        }

        let status = DispenseStatus::from_progress(plan.chunks, completed, failure.as_ref());
        DispenseOutcome::new(rx, plan, completed, status, failure)
    }

    /// One request/acknowledge exchange.
    fn run_chunk(&mut self, frame: &Frame, slot: u16) -> Result<(), ProtocolError> {
        self.link.clear_input()?;
        self.link.send(frame.as_bytes())?;
        let line = self.link.receive(self.settings.response_timeout)?;
        self.check_ack(&line, slot)
    }

    /// Classify a chunk response.
    ///
    /// The ack token is accepted bare or as `<ack>:<slot>`; an ack naming
    /// another slot is a failure.
    fn check_ack(&self, line: &str, slot: u16) -> Result<(), ProtocolError> {
        let s = &self.settings;
        if line == s.ack_token {
            return Ok(());
        }
        if let Some(arg) = line
            .strip_prefix(s.ack_token.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
        {
            return if arg.parse::<u16>() == Ok(slot) {
                Ok(())
            } else {
                Err(ProtocolError::SlotMismatch {
                    expected: slot,
                    got: arg.to_owned(),
                })
            };
        }
        if line == s.busy_token {
            return Err(ProtocolError::Busy);
        }
        Err(ProtocolError::Unexpected(line.to_owned()))
    }

    // ── Identity / maintenance ────────────────────────────────

    /// Ask the controller to read an RFID card.
    ///
    /// Returns the raw (still untrusted) identifier, or `None` when no card
    /// was presented in time.
    pub fn scan_patient(&mut self) -> Result<Option<String>, ProtocolError> {
        let directive = self.settings.scan_directive.clone();
        self.issue(&directive)?;
        let deadline = Instant::now() + self.settings.long_operation_timeout;
        loop {
            let line = self.receive_until(deadline)?;
            match line.as_str() {
                SCAN_STARTED | SYSTEM_READY => continue,
                SCAN_TIMEOUT => {
                    info!("scan: no card presented");
                    return Ok(None);
                }
                other => {
                    return match other.strip_prefix(SCAN_DETECTED_PREFIX) {
                        Some(id) => {
                            info!("scan: card read");
                            Ok(Some(id.to_owned()))
                        }
                        None => Err(ProtocolError::Unexpected(other.to_owned())),
                    };
                }
            }
        }
    }

    /// Drive both axes back to their limit switches.
    pub fn home(&mut self) -> Result<(), ProtocolError> {
        let directive = self.settings.home_directive.clone();
        self.issue(&directive)?;
        let deadline = Instant::now() + self.settings.long_operation_timeout;
        loop {
            let line = self.receive_until(deadline)?;
            match line.as_str() {
                HOMING_COMPLETE => {
                    info!("home: complete");
                    return Ok(());
                }
                SYSTEM_READY => continue,
                other => return Err(ProtocolError::Unexpected(other.to_owned())),
            }
        }
    }

    fn issue(&mut self, directive: &str) -> Result<(), ProtocolError> {
        let frame = encode_command(directive)
            .ok_or_else(|| ProtocolError::Unexpected(format!("directive {directive:?} too long")))?;
        self.link.clear_input()?;
        self.link.send(frame.as_bytes())?;
        Ok(())
    }

    fn receive_until(&mut self, deadline: Instant) -> Result<crate::link::Line, ProtocolError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(LinkError::Timeout.into());
        }
        Ok(self.link.receive(remaining)?)
    }
}
