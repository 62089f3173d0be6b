//! Fuzz target: barcode HID decoder
//!
//! Feeds arbitrary bytes through the report decoder, both as one flat
//! stream and as 8-byte reports, and checks that it never panics and
//! never yields more than the code capacity.
//!
//! cargo fuzz run fuzz_barcode_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use trashcan::drivers::barcode::{self, MAX_CODE_LEN, REPORT_LEN, ScanDecoder, Step};

fuzz_target!(|data: &[u8]| {
    let flat = barcode::decode_bytes(data);
    assert!(flat.len() <= MAX_CODE_LEN);
    assert!(flat.chars().all(|c| c.is_ascii_graphic() || c == ' '));

    let mut decoder = ScanDecoder::new();
    for report in data.chunks(REPORT_LEN) {
        if decoder.push_report(report) == Step::Done {
            break;
        }
    }
    assert!(decoder.finish().len() <= MAX_CODE_LEN);
});
