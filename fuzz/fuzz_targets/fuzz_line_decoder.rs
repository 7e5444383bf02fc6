//! Fuzz target: `LineDecoder::push` (controller response path)
//!
//! Feeds arbitrary bytes through the decoder, one at a time, as the serial
//! link does.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Every decoded line is non-empty, printable and within `MAX_LINE_LEN`
//! - After `reset` no partial line is buffered
//!
//! cargo fuzz run fuzz_line_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use medvend::link::codec::{LineDecoder, MAX_LINE_LEN};

fuzz_target!(|data: &[u8]| {
    let mut dec = LineDecoder::new();
    for &b in data {
        if let Some(Ok(line)) = dec.push(b) {
            assert!(!line.is_empty());
            assert!(line.len() <= MAX_LINE_LEN);
            assert!(line.bytes().all(|c| (0x20..0x7f).contains(&c)));
        }
    }
    dec.reset();
    assert!(!dec.is_mid_line());
});
