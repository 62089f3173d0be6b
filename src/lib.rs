//! TrashCAN bin activity controller library.
//!
//! Exposes the controller's modules for integration testing and for
//! alternative front-ends.  Hardware access goes through the port traits
//! in [`app::ports`]; the simulated backends in [`adapters::sim`] let the
//! whole controller run on a workstation.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod devices;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod pins;
pub mod records;
pub mod runtime;
pub mod scheduler;
pub mod sync;
