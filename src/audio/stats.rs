//! Counters shared between the processing loop and its controller.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Where the processing loop is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed, never started
    Idle,
    Running,
    /// Exited after observing the stop flag
    Stopped,
    /// Exited on an unrecoverable device error
    Fatal,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => EngineState::Running,
            2 => EngineState::Stopped,
            3 => EngineState::Fatal,
            _ => EngineState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EngineState::Idle => 0,
            EngineState::Running => 1,
            EngineState::Stopped => 2,
            EngineState::Fatal => 3,
        }
    }
}

/// Lock-free event counters, written by the loop thread.
///
/// The state is also set by the controller when a run starts or fails to spawn.
#[derive(Debug, Default)]
pub struct EngineStats {
    state: AtomicU8,
    periods: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
    suspends: AtomicU64,
    short_reads: AtomicU64,
    short_writes: AtomicU64,
}

/// Point-in-time copy of `EngineStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub state: EngineState,
    /// Completed capture → transform → playback cycles
    pub periods: u64,
    pub overruns: u64,
    pub underruns: u64,
    pub suspends: u64,
    pub short_reads: u64,
    pub short_writes: u64,
}

impl EngineStats {
    pub(crate) fn set_state(&self, state: EngineState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn period_done(&self) {
        self.periods.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn suspend(&self) {
        self.suspends.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn short_read(&self) {
        self.short_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn short_write(&self) {
        self.short_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            state: self.state(),
            periods: self.periods.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            suspends: self.suspends.load(Ordering::Relaxed),
            short_reads: self.short_reads.load(Ordering::Relaxed),
            short_writes: self.short_writes.load(Ordering::Relaxed),
        }
    }
}
