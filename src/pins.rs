//! Default GPIO assignments for the TrashCAN controller board (BCM numbering).
//!
//! These seed the `*_pin` fields of [`SystemConfig`](crate::config::SystemConfig);
//! a deployment can remap any of them through the config store.

// ---------------------------------------------------------------------------
// Lid
// ---------------------------------------------------------------------------

/// Digital input: lid reed switch.  Active = lid open.
pub const LID_SWITCH_GPIO: u8 = 17;
/// Digital output: momentary "open" button on the lid motor controller (active LOW).
pub const LID_OPEN_GPIO: u8 = 27;
/// Digital output: momentary "close" button on the lid motor controller (active LOW).
pub const LID_CLOSE_GPIO: u8 = 22;

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

/// Digital output: UV light relay (active LOW).
pub const LIGHT_GPIO: u8 = 23;
/// Digital output: extraction fan relay (active LOW).
pub const FAN_GPIO: u8 = 24;

// ---------------------------------------------------------------------------
// Indicators and peripherals
// ---------------------------------------------------------------------------

/// Digital output: front status LED (active LOW).
pub const LED_GPIO: u8 = 25;
/// Digital output: barcode scanner trigger/enable line (active LOW).
pub const SCANNER_TRIGGER_GPIO: u8 = 5;

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

/// Digital input: HX711 DOUT.
pub const SCALE_DATA_GPIO: u8 = 6;
/// Digital output: HX711 PD_SCK.
pub const SCALE_CLOCK_GPIO: u8 = 13;
