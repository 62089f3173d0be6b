//! Application core: domain orchestration behind port traits.
//!
//! The lid service, the inbound command type and the outbound event type
//! live here.  All interaction with hardware, storage and the home server
//! happens through the **port traits** defined in [`ports`], keeping this
//! layer testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
