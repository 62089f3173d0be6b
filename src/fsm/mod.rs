//! Function-pointer finite state machine engine for the lid.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  StateTable                                              │
//! │  ┌─────────┬───────────┬──────────┬───────────────────┐  │
//! │  │ StateId │ on_enter  │ on_exit  │ on_update         │  │
//! │  ├─────────┼───────────┼──────────┼───────────────────┤  │
//! │  │ Idle    │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ Open    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  └─────────┴───────────┴──────────┴───────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  Handlers never touch hardware: they write side-effect
//! requests into the [`LidContext`] and the
//! [`LidService`](crate::app::service::LidService) applies them.

pub mod context;
pub mod states;

use core::fmt;

use context::LidContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all lid states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    /// Lid closed, scheduler running.
    Idle = 0,
    /// Lid open: scan session active, scheduler paused.
    Open = 1,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 2;

    /// Convert an index back to `StateId`.  Out-of-range falls back to `Idle`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            1 => Self::Open,
            0 => Self::Idle,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Idle
            }
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Open => write!(f, "Open"),
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut LidContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut LidContext) -> Option<StateId>;

/// Static descriptor for a single state (one row in the table).
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut LidContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    pub fn tick(&mut self, ctx: &mut LidContext) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
        ctx.total_ticks = self.tick_count;

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    fn transition(&mut self, next_id: StateId, ctx: &mut LidContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::context::LidContext;
    use super::*;

    fn make_fsm() -> Fsm {
        Fsm::new(states::build_state_table(), StateId::Idle)
    }

    #[test]
    fn start_in_idle_has_no_side_effects() {
        let mut fsm = make_fsm();
        let mut ctx = LidContext::new();
        fsm.start(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert!(ctx.requests.is_empty());
        assert!(ctx.session.is_none());
    }

    #[test]
    fn open_lid_starts_session_and_pauses() {
        let mut fsm = make_fsm();
        let mut ctx = LidContext::new();
        fsm.start(&mut ctx);
        ctx.lid_open = true;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Open);
        assert!(ctx.session.is_some());
        let r = ctx.requests.take();
        assert!(r.pause_scheduler);
        assert!(!r.resume_scheduler);
        assert_eq!(r.scanner, Some(true));
        assert!(!r.capture_weight);
    }

    #[test]
    fn close_lid_ends_session_and_captures() {
        let mut fsm = make_fsm();
        let mut ctx = LidContext::new();
        fsm.start(&mut ctx);
        ctx.lid_open = true;
        fsm.tick(&mut ctx);
        ctx.requests.take();

        ctx.lid_open = false;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert!(ctx.session.is_none());
        let r = ctx.requests.take();
        assert!(r.resume_scheduler);
        assert!(r.capture_weight);
        assert_eq!(r.scanner, Some(false));
    }

    #[test]
    fn steady_lid_requests_nothing() {
        let mut fsm = make_fsm();
        let mut ctx = LidContext::new();
        fsm.start(&mut ctx);
        ctx.lid_open = true;
        fsm.tick(&mut ctx);
        ctx.requests.take();
        for _ in 0..10 {
            fsm.tick(&mut ctx);
        }
        assert!(ctx.requests.is_empty());
        assert_eq!(fsm.ticks_in_current_state(), 10);
    }

    #[test]
    fn state_id_from_index_roundtrip() {
        for i in 0..StateId::COUNT {
            assert_eq!(StateId::from_index(i) as usize, i);
        }
    }
}
