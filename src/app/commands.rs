//! Inbound commands to the controller.
//!
//! Requests from the outside world (operator API, bench tooling) travel
//! over [`COMMAND_CHANNEL`] to the runtime's command task, which applies
//! them in-process.  Sending is fire-and-forget; outcomes surface as
//! [`AppEvent`](super::events::AppEvent)s.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::devices::{Action, Actuator};

/// Commands that external adapters can send into the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Switch one actuator.  Refused for light/fan while a cycle holds them.
    Actuate { actuator: Actuator, action: Action },

    /// Press the lid motor: `On` opens, `Off` closes, `Toggle` by lid switch.
    Lid(Action),

    /// Re-zero the scale and persist the new tare.
    Tare,

    /// Take one measurement and report it without buffering a record.
    ReadScale,

    /// Start a scheduled job now.
    RunJob(String),
}

/// Channel depth for inbound commands.
const COMMAND_DEPTH: usize = 8;

/// Inbound command channel: adapters → runtime command task.
pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, DeviceCommand, COMMAND_DEPTH> =
    Channel::new();

/// Queue a command.  Returns `false` (and logs) if the channel is full.
pub fn send_command(cmd: DeviceCommand) -> bool {
    try_queue(&COMMAND_CHANNEL, cmd)
}

fn try_queue<const N: usize>(
    channel: &Channel<CriticalSectionRawMutex, DeviceCommand, N>,
    cmd: DeviceCommand,
) -> bool {
    match channel.try_send(cmd) {
        Ok(()) => true,
        Err(_) => {
            warn!("CMD: command channel full, dropping command");
            false
        }
    }
}
