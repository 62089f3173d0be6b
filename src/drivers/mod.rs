//! Pin adapters, the barcode HID decoder, the HX711 load-cell driver and
//! the scale pipeline.

pub mod barcode;
pub mod gpio;
pub mod hx711;
pub mod scale;
