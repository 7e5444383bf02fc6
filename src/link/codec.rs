//! Newline frame codec.
//!
//! Wire format, both directions:
//! ```text
//! ┌──────────────────────────────┬────────┐
//! │ ASCII token [":" argument]   │ "\n"   │
//! └──────────────────────────────┴────────┘
//! ```
//!
//! Commands are `DISPENSE:<slot>`, `SCAN`, `HOME`.  Responses are a single
//! token such as `DISPENSE_COMPLETE:<slot>`.  The decoder is fed one byte
//! at a time and yields a line when the terminator arrives.  A trailing
//! `\r` is dropped and blank lines are skipped, so CRLF firmware works too.

use core::fmt::Write as _;

use crate::error::LinkError;

/// Longest response line accepted (excluding the terminator).
pub const MAX_LINE_LEN: usize = 64;

/// Longest encoded command frame (including the terminator).
pub const MAX_FRAME_LEN: usize = 32;

/// One decoded response line.
pub type Line = heapless::String<MAX_LINE_LEN>;

/// One encoded command frame, terminator included.
pub type Frame = heapless::String<MAX_FRAME_LEN>;

/// Streaming line decoder.
pub struct LineDecoder {
    buf: heapless::Vec<u8, MAX_LINE_LEN>,
    /// Set once the current line exceeded `MAX_LINE_LEN`; the rest of the
    /// line is discarded and reported as garbled at the terminator.
    overflowed: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte.
    ///
    /// Returns `Some(Ok(line))` on a complete line, `Some(Err(Garbled))` if
    /// the completed line was not printable ASCII or too long, and `None`
    /// while a line is still in progress.
    pub fn push(&mut self, byte: u8) -> Option<Result<Line, LinkError>> {
        if byte != b'\n' {
            if !self.overflowed && self.buf.push(byte).is_err() {
                self.overflowed = true;
            }
            return None;
        }

        let overflowed = core::mem::replace(&mut self.overflowed, false);
        let mut raw = core::mem::take(&mut self.buf);
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        if overflowed {
            return Some(Err(LinkError::Garbled));
        }
        match decode_line(&raw) {
            Ok(line) if line.is_empty() => None,
            decoded => Some(decoded),
        }
    }

    /// Drop any partial line (e.g. before issuing a new command).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.overflowed = false;
    }

    /// Whether a line is partially buffered.
    pub fn is_mid_line(&self) -> bool {
        !self.buf.is_empty() || self.overflowed
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(raw: &[u8]) -> Result<Line, LinkError> {
    if raw.iter().any(|b| !(0x20..0x7f).contains(b)) {
        return Err(LinkError::Garbled);
    }
    let text = core::str::from_utf8(raw).map_err(|_| LinkError::Garbled)?;
    let mut line = Line::new();
    line.push_str(text.trim())
        .map_err(|()| LinkError::Garbled)?;
    Ok(line)
}

/// Encode `<directive>:<slot>\n`.
///
/// Returns `None` if the directive does not fit in a frame.
pub fn encode_slot_command(directive: &str, slot: u16) -> Option<Frame> {
    let mut frame = Frame::new();
    writeln!(frame, "{directive}:{slot}").ok()?;
    Some(frame)
}

/// Encode a bare `<directive>\n`.
pub fn encode_command(directive: &str) -> Option<Frame> {
    let mut frame = Frame::new();
    writeln!(frame, "{directive}").ok()?;
    Some(frame)
}
