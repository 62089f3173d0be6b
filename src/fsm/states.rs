//! Concrete lid state handlers and table builder.
//!
//! ```text
//!  IDLE ──[lid opened]──▶ OPEN
//!    ▲                      │
//!    └────[lid closed]──────┘
//! ```
//!
//! Entering `Open`: pause scheduler, notify, scanner on, new session.
//! Leaving `Open`: resume scheduler, notify, scanner off, capture weight.

use super::context::{LidContext, ScanSession};
use super::{StateDescriptor, StateId};
use crate::app::ports::LidStatus;
use log::info;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1: Open
        StateDescriptor {
            id: StateId::Open,
            name: "Open",
            on_enter: Some(open_enter),
            on_exit: Some(open_exit),
            on_update: open_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(_ctx: &mut LidContext) {
    info!("LID | idle, watching lid switch");
}

fn idle_update(ctx: &mut LidContext) -> Option<StateId> {
    ctx.lid_open.then_some(StateId::Open)
}

// ═══════════════════════════════════════════════════════════════════════════
//  OPEN state: scan session active
// ═══════════════════════════════════════════════════════════════════════════

fn open_enter(ctx: &mut LidContext) {
    ctx.requests.pause_scheduler = true;
    ctx.requests.notify = Some(LidStatus::Open);
    ctx.requests.scanner = Some(true);
    ctx.session = Some(ScanSession::new(ctx.total_ticks));
    info!("LID | opened, scan session started");
}

fn open_exit(ctx: &mut LidContext) {
    ctx.requests.resume_scheduler = true;
    ctx.requests.notify = Some(LidStatus::Closed);
    ctx.requests.scanner = Some(false);
    ctx.requests.capture_weight = true;
    if let Some(session) = ctx.session.take() {
        info!(
            "LID | closed after {} ticks, {} scan(s)",
            ctx.total_ticks.saturating_sub(session.opened_at_tick),
            session.scans
        );
    }
}

fn open_update(ctx: &mut LidContext) -> Option<StateId> {
    (!ctx.lid_open).then_some(StateId::Idle)
}
