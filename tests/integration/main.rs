//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host with simulated pins
//! and no real hardware or network.

mod lid_flow_tests;
mod mock_hw;
mod scheduler_tests;
mod sync_tests;
