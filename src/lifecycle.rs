//! Open/closed/disposed state with a single compare-and-set transition.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// No process running.
    Closed = 0,
    /// Process running, frames can be read.
    Open = 1,
    /// Terminal; the device can never be opened again.
    Disposed = 2,
}

impl LifecycleState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Closed,
            1 => Self::Open,
            _ => Self::Disposed,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Atomic lifecycle cell. Only the device's open/close/dispose use it.
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Closed as u8))
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. On failure returns the state actually observed.
    pub(crate) fn transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(drop)
            .map_err(LifecycleState::from_u8)
    }

    /// Enter `Disposed`, returning the previous state.
    pub(crate) fn dispose(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.swap(LifecycleState::Disposed as u8, Ordering::AcqRel))
    }
}
