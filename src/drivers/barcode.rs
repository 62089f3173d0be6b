//! Barcode scanner HID decoder.
//!
//! The scanner enumerates as a keyboard.  Each 8-byte report carries USB
//! HID usage codes; `0` means "no key".  A scan is a run of printable
//! codes terminated by Enter (`40`).  Usage code `2` arms shift for the
//! next printable code only.
//!
//! ```text
//!   [30, 44, 4, 40]        → "1 a"
//!   [30, 44, 2, 4, 40]     → "1 A"
//! ```
//!
//! [`decode`] is a fresh session every call: no state survives between
//! scans.

use std::time::Duration;

use log::{debug, trace};

use crate::app::ports::ByteStreamReader;
use crate::error::DeviceError;

/// Bytes per HID report.
pub const REPORT_LEN: usize = 8;

/// Longest code kept.  Further characters are dropped.
pub const MAX_CODE_LEN: usize = 64;

/// Usage code that arms shift.
pub const SHIFT: u8 = 2;

/// Usage code that ends a scan.
pub const ENTER: u8 = 40;

/// A decoded scan.  Empty = nothing scanned.
pub type Barcode = heapless::String<MAX_CODE_LEN>;

/// Default wait for the first report.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

// ═══════════════════════════════════════════════════════════════════════════
//  Usage code tables
// ═══════════════════════════════════════════════════════════════════════════

/// Unshifted alphabet.
pub fn lower(code: u8) -> Option<char> {
    Some(match code {
        4..=29 => (b'a' + (code - 4)) as char,
        30..=38 => (b'1' + (code - 30)) as char,
        39 => '0',
        44 => ' ',
        45 => '-',
        46 => '=',
        47 => '[',
        48 => ']',
        49 => '\\',
        51 => ';',
        52 => '\'',
        53 => '~',
        54 => ',',
        55 => '.',
        56 => '/',
        _ => return None,
    })
}

/// Shifted alphabet.
pub fn upper(code: u8) -> Option<char> {
    const DIGIT_ROW: [char; 10] = ['!', '@', '#', '$', '%', '^', '&', '*', '(', ')'];
    Some(match code {
        4..=29 => (b'A' + (code - 4)) as char,
        30..=39 => DIGIT_ROW[(code - 30) as usize],
        44 => ' ',
        45 => '_',
        46 => '+',
        47 => '{',
        48 => '}',
        49 => '|',
        51 => ':',
        52 => '"',
        53 => '~',
        54 => '<',
        55 => '>',
        56 => '?',
        _ => return None,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
//  Decoder state
// ═══════════════════════════════════════════════════════════════════════════

/// Outcome of feeding one usage code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/// Accumulates one scan.  Usable without a reader (fuzzing, tests).
#[derive(Debug, Default)]
pub struct ScanDecoder {
    code: Barcode,
    shift: bool,
}

impl ScanDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one usage code.
    pub fn push(&mut self, usage: u8) -> Step {
        match usage {
            0 => {}
            ENTER => return Step::Done,
            SHIFT => self.shift = true,
            _ => {
                let mapped = if self.shift { upper(usage) } else { lower(usage) };
                match mapped {
                    Some(c) => {
                        self.shift = false;
                        if self.code.push(c).is_err() {
                            trace!("SCAN | code longer than {} chars, dropping '{}'", MAX_CODE_LEN, c);
                        }
                    }
                    // Noise: ignored, a pending shift stays armed.
                    None => trace!("SCAN | ignoring unmapped usage code {}", usage),
                }
            }
        }
        Step::Continue
    }

    /// Feed a whole report.  Bytes after Enter are ignored.
    pub fn push_report(&mut self, report: &[u8]) -> Step {
        for &usage in report {
            if self.push(usage) == Step::Done {
                return Step::Done;
            }
        }
        Step::Continue
    }

    pub fn finish(self) -> Barcode {
        self.code
    }
}

/// Decode a complete byte sequence in one go.
pub fn decode_bytes(bytes: &[u8]) -> Barcode {
    let mut decoder = ScanDecoder::new();
    decoder.push_report(bytes);
    decoder.finish()
}

// ═══════════════════════════════════════════════════════════════════════════
//  Stream decode
// ═══════════════════════════════════════════════════════════════════════════

/// Read one scan from `reader`.
///
/// Waits up to `timeout` for the first report; if none arrives the result
/// is empty (not an error).  Each later report gets the same allowance; a
/// scan that stalls before Enter is discarded and also reads as empty.
pub async fn decode<R>(reader: &mut R, timeout: Duration) -> Result<Barcode, DeviceError>
where
    R: ByteStreamReader + ?Sized,
{
    let mut decoder = ScanDecoder::new();
    let mut buf = [0u8; REPORT_LEN];
    let mut started = false;

    loop {
        let n = reader.read_report(&mut buf, timeout).await?;
        if n == 0 {
            if started {
                debug!("SCAN | scan stalled before Enter, discarding");
            }
            return Ok(Barcode::new());
        }
        started = true;
        if decoder.push_report(&buf[..n.min(REPORT_LEN)]) == Step::Done {
            return Ok(decoder.finish());
        }
    }
}
