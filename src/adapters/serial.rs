//! Serial link adapter.
//!
//! Implements [`Link`] over a `serialport` handle.  Opening the port resets
//! most controller boards, so [`SerialLink::connect`] waits out the boot
//! settle time and discards the boot banner before returning; callers must
//! not send anything until it has returned.
//!
//! The handle is exclusively owned.  Dropping it (or calling
//! [`SerialLink::disconnect`]) releases the port, after which every
//! operation reports [`LinkError::NotConnected`].

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serialport::{ClearBuffer, SerialPort};

use crate::config::DispenserConfig;
use crate::error::LinkError;
use crate::link::codec::LineDecoder;
use crate::link::{Line, Link};

/// Read timeout used while polling for the next byte.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    decoder: LineDecoder,
}

impl SerialLink {
    /// Open `name` at `baud`, then wait `boot_settle` for the controller.
    pub fn connect(name: &str, baud: u32, boot_settle: Duration) -> Result<Self, LinkError> {
        let port = serialport::new(name, baud)
            .timeout(POLL_TIMEOUT)
            .open()
            .map_err(map_serial_error)?;
        info!(
            "serial: opened {} @ {} baud, settling {} ms",
            name,
            baud,
            boot_settle.as_millis()
        );
        thread::sleep(boot_settle);

        let mut link = Self {
            port: Some(port),
            name: name.to_owned(),
            decoder: LineDecoder::new(),
        };
        link.clear_input()?;
        Ok(link)
    }

    pub fn from_config(cfg: &DispenserConfig) -> Result<Self, LinkError> {
        Self::connect(&cfg.port, cfg.baud_rate, cfg.boot_settle())
    }

    /// Release the port.  Idempotent.
    pub fn disconnect(&mut self) {
        if self.port.take().is_some() {
            self.decoder.reset();
            info!("serial: released {}", self.name);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the serial ports the OS currently reports.
    pub fn available_ports() -> Result<Vec<String>, LinkError> {
        let ports = serialport::available_ports().map_err(map_serial_error)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn map_serial_error(e: serialport::Error) -> LinkError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => LinkError::NotConnected,
        serialport::ErrorKind::Io(kind) => LinkError::from(std::io::Error::from(kind)),
        _ => LinkError::Io(e.to_string()),
    }
}

impl Link for SerialLink {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::NotConnected)?;
        port.write_all(frame)?;
        port.flush()?;
        debug!("serial: -> {:?}", String::from_utf8_lossy(frame).trim_end());
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Line, LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::NotConnected)?;
        let deadline = Instant::now() + timeout;
        let mut byte = [0u8; 1];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout);
            }
            port.set_timeout(remaining.min(POLL_TIMEOUT))
                .map_err(map_serial_error)?;
            match port.read(&mut byte) {
                Ok(0) => {}
                Ok(_) => {
                    if let Some(decoded) = self.decoder.push(byte[0]) {
                        if let Ok(line) = &decoded {
                            debug!("serial: <- {:?}", line.as_str());
                        } else {
                            warn!("serial: garbled line on {}", self.name);
                        }
                        return decoded;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::NotConnected)?;
        port.clear(ClearBuffer::Input).map_err(map_serial_error)?;
        self.decoder.reset();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}
