//! Link abstraction — the byte channel to the dispenser.
//!
//! Concrete implementations:
//! - [`SerialLink`](crate::adapters::serial::SerialLink) over a USB/UART port
//! - [`SimulatedDispenser`](crate::adapters::sim::SimulatedDispenser) for
//!   bench runs without hardware
//!
//! The protocol layer is generic over `Link`, so a new transport needs no
//! changes to chunk sequencing.  Every call is blocking and bounded: a
//! `receive` never waits past its timeout.

pub mod codec;

use core::time::Duration;

use crate::error::LinkError;

pub use codec::Line;

/// Line-oriented transport channel to one dispenser.
pub trait Link {
    /// Write one encoded command frame.
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Wait up to `timeout` for one complete response line.
    fn receive(&mut self, timeout: Duration) -> Result<Line, LinkError>;

    /// Discard any buffered input, including partially decoded lines.
    fn clear_input(&mut self) -> Result<(), LinkError>;

    /// Whether the port is currently held open.
    fn is_connected(&self) -> bool;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        (**self).send(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Line, LinkError> {
        (**self).receive(timeout)
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        (**self).clear_input()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// A link with nothing attached.  Every operation reports `NotConnected`.
pub struct DisconnectedLink;

impl Link for DisconnectedLink {
    fn send(&mut self, _frame: &[u8]) -> Result<(), LinkError> {
        Err(LinkError::NotConnected)
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Line, LinkError> {
        Err(LinkError::NotConnected)
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        Err(LinkError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}
