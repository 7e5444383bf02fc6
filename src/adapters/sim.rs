//! Simulated dispenser controller.
//!
//! Speaks the same line protocol as the controller firmware so the CLI and
//! the test suite can run the full stack without a serial port.  Responses
//! are queued at `send` time and handed out by `receive`; an empty queue
//! reports a timeout immediately instead of sleeping.

use core::time::Duration;
use std::collections::{HashSet, VecDeque};

use log::debug;

use crate::error::LinkError;
use crate::link::{Line, Link};
use crate::protocol::{HOMING_COMPLETE, SCAN_DETECTED_PREFIX, SCAN_STARTED, SCAN_TIMEOUT};

pub struct SimulatedDispenser {
    connected: bool,
    pending: VecDeque<Line>,
    jammed: HashSet<u16>,
    card: Option<String>,
    frames: u32,
}

impl SimulatedDispenser {
    pub fn new() -> Self {
        Self {
            connected: true,
            pending: VecDeque::new(),
            jammed: HashSet::new(),
            card: None,
            frames: 0,
        }
    }

    /// Make `slot` swallow dispense commands without answering.
    pub fn jam_slot(&mut self, slot: u16) {
        self.jammed.insert(slot);
    }

    /// Hold a card on the reader until the next scan.
    pub fn present_card(&mut self, id: &str) {
        self.card = Some(id.to_owned());
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
        self.pending.clear();
    }

    /// Frames received since construction.
    pub fn commands_received(&self) -> u32 {
        self.frames
    }

    fn reply(&mut self, text: &str) {
        let mut line = Line::new();
        if line.push_str(text).is_ok() {
            self.pending.push_back(line);
        }
    }
}

impl Default for SimulatedDispenser {
    fn default() -> Self {
        Self::new()
    }
}

impl Link for SimulatedDispenser {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        self.frames += 1;
        let command = core::str::from_utf8(frame)
            .map_err(|e| LinkError::Io(e.to_string()))?
            .trim_end();
        debug!("sim: <- {command}");

        if let Some(arg) = command.strip_prefix("DISPENSE:") {
            match arg.parse::<u16>() {
                Ok(slot) if !self.jammed.contains(&slot) => {
                    self.reply(&format!("DISPENSE_COMPLETE:{slot}"));
                }
                _ => {}
            }
        } else if command == "SCAN" {
            self.reply(SCAN_STARTED);
            match self.card.take() {
                Some(id) => self.reply(&format!("{SCAN_DETECTED_PREFIX}{id}")),
                None => self.reply(SCAN_TIMEOUT),
            }
        } else if command == "HOME" {
            self.reply(HOMING_COMPLETE);
        }
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Line, LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        self.pending.pop_front().ok_or(LinkError::Timeout)
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
