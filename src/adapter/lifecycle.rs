//! Adapter Lifecycle
//!
//! ```text
//! CREATED ──> STARTING ──> STARTED ──> STOPPING ──> STOPPED ──> DESTROYED
//!                 ▲                                     │
//!                 └─────────────────────────────────────┘
//! ```
//!
//! The state is a single atomic; every transition is a compare-and-swap, so
//! racing `start`/`stop`/`destroy` calls see exactly one winner.

use crate::error::LifecycleError;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Created = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
    Stopped = 4,
    Destroyed = 5,
}

impl State {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => State::Created,
            1 => State::Starting,
            2 => State::Started,
            3 => State::Stopping,
            4 => State::Stopped,
            _ => State::Destroyed,
        }
    }
}

/// CAS-guarded lifecycle state.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(State::Created as u8),
        }
    }

    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_started(&self) -> bool {
        self.state() == State::Started
    }

    /// Moves from `from` to `to`, failing if another transition got there first.
    pub fn transition(&self, from: State, to: State) -> Result<(), LifecycleError> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| match State::from_u8(actual) {
                State::Destroyed => LifecycleError::Destroyed,
                actual => LifecycleError::InvalidTransition { from: actual, to },
            })
    }

    /// Enters `Starting` from `Created` or `Stopped`.
    ///
    /// Returns `Ok(false)` if the adapter is already starting or started.
    pub fn begin_start(&self) -> Result<bool, LifecycleError> {
        for from in [State::Created, State::Stopped] {
            if self.transition(from, State::Starting).is_ok() {
                return Ok(true);
            }
        }
        match self.state() {
            State::Starting | State::Started => Ok(false),
            State::Destroyed => Err(LifecycleError::Destroyed),
            actual => Err(LifecycleError::InvalidTransition {
                from: actual,
                to: State::Starting,
            }),
        }
    }

    /// Enters `Stopping` from `Started`.
    ///
    /// Returns `Ok(false)` if the adapter is not running.
    pub fn begin_stop(&self) -> Result<bool, LifecycleError> {
        match self.transition(State::Started, State::Stopping) {
            Ok(()) => Ok(true),
            Err(LifecycleError::Destroyed) => Err(LifecycleError::Destroyed),
            Err(_) => Ok(false),
        }
    }

    /// Enters the terminal `Destroyed` state from anywhere.
    ///
    /// Returns the previous state.
    pub fn destroy(&self) -> State {
        State::from_u8(self.state.swap(State::Destroyed as u8, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_start_stop_cycle() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), State::Created);

        assert_eq!(lifecycle.begin_start(), Ok(true));
        assert_eq!(lifecycle.begin_start(), Ok(false));
        lifecycle.transition(State::Starting, State::Started).unwrap();
        assert!(lifecycle.is_started());

        assert_eq!(lifecycle.begin_stop(), Ok(true));
        lifecycle.transition(State::Stopping, State::Stopped).unwrap();
        assert_eq!(lifecycle.begin_stop(), Ok(false));

        // Restart after stop
        assert_eq!(lifecycle.begin_start(), Ok(true));
    }

    #[test]
    fn test_invalid_transition_is_typed() {
        let lifecycle = Lifecycle::new();
        assert_eq!(
            lifecycle.transition(State::Started, State::Stopping),
            Err(LifecycleError::InvalidTransition {
                from: State::Created,
                to: State::Stopping
            })
        );
    }

    #[test]
    fn test_destroy_is_terminal() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.destroy(), State::Created);
        assert_eq!(lifecycle.begin_start(), Err(LifecycleError::Destroyed));
        assert_eq!(lifecycle.begin_stop(), Err(LifecycleError::Destroyed));
        assert_eq!(lifecycle.destroy(), State::Destroyed);
    }

    #[test]
    fn test_concurrent_start_has_one_winner() {
        let lifecycle = Arc::new(Lifecycle::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                std::thread::spawn(move || lifecycle.begin_start().unwrap())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
