//! Listening-service lifecycle state machine
//!
//! Both daemons run an accept loop whose shutdown used to be a plain boolean
//! read and written from different threads. This replaces it with an explicit
//! state machine — Stopped → Listening → Stopping → Stopped — where every
//! transition is a compare-and-swap, so a stop request observed mid-accept
//! cannot be lost and illegal transitions are rejected instead of silently
//! clobbering state.

use std::sync::atomic::{AtomicU8, Ordering};

const STOPPED: u8 = 0;
const LISTENING: u8 = 1;
const STOPPING: u8 = 2;

/// Lifecycle phase of a listening service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Stopped,
    Listening,
    Stopping,
}

/// Atomic lifecycle tracker for a listening service
#[derive(Debug)]
pub struct ServiceState {
    phase: AtomicU8,
}

impl ServiceState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(STOPPED),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        match self.phase.load(Ordering::Acquire) {
            LISTENING => LifecyclePhase::Listening,
            STOPPING => LifecyclePhase::Stopping,
            _ => LifecyclePhase::Stopped,
        }
    }

    /// Stopped → Listening; false if the service was not stopped
    pub fn start(&self) -> bool {
        self.phase
            .compare_exchange(STOPPED, LISTENING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Listening → Stopping; false if the service was not listening
    pub fn request_stop(&self) -> bool {
        self.phase
            .compare_exchange(LISTENING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stopping → Stopped; false unless a stop was in progress
    pub fn finish_stop(&self) -> bool {
        self.phase
            .compare_exchange(STOPPING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True while the accept loop should keep running
    pub fn is_listening(&self) -> bool {
        self.phase.load(Ordering::Acquire) == LISTENING
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let state = ServiceState::new();
        assert_eq!(state.phase(), LifecyclePhase::Stopped);

        assert!(state.start());
        assert!(state.is_listening());

        assert!(state.request_stop());
        assert_eq!(state.phase(), LifecyclePhase::Stopping);
        assert!(!state.is_listening());

        assert!(state.finish_stop());
        assert_eq!(state.phase(), LifecyclePhase::Stopped);
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let state = ServiceState::new();

        // Cannot stop a service that never started
        assert!(!state.request_stop());
        assert!(!state.finish_stop());

        assert!(state.start());
        // Double start is rejected while listening
        assert!(!state.start());
        // Cannot finish a stop that was never requested
        assert!(!state.finish_stop());

        assert!(state.request_stop());
        // Stop request is not reentrant
        assert!(!state.request_stop());
        // Cannot start again until the stop completes
        assert!(!state.start());

        assert!(state.finish_stop());
        assert!(state.start());
    }

    #[test]
    fn test_concurrent_stop_requests_only_one_wins() {
        use std::sync::Arc;

        let state = Arc::new(ServiceState::new());
        assert!(state.start());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.request_stop())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1, "exactly one stop request may transition the state");
        assert_eq!(state.phase(), LifecyclePhase::Stopping);
    }
}
