//! Shared input state between the listener thread and the dispatch loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Run flag and held-key set shared between the input-producing context and the dispatch loop.
///
/// Single-writer discipline: the input context writes the key set and clears the run flag, the
/// dispatch context only reads. The run flag is terminal, once cleared it never becomes true
/// again. Instances are threaded explicitly through the contexts that need them rather than
/// living in a process-wide global, so two vehicles only share a shutdown if they are handed the
/// same instance.
pub struct RunState {
    keys: Mutex<HashSet<DriveKey>>,
    run: AtomicBool
}

pub type SharedRunState = Arc<RunState>;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Keys with a teleoperation binding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DriveKey {
    Forward,
    Reverse,
    Left,
    Right,
    Brake
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RunState {
    /// Create a new shared run state with the run flag set.
    pub fn new() -> SharedRunState {
        Arc::new(Self {
            keys: Mutex::new(HashSet::new()),
            run: AtomicBool::new(true)
        })
    }

    /// Record a key press edge. Pressing a key that is already held has no effect.
    pub fn press(&self, key: DriveKey) {
        self.keys
            .lock()
            .expect("RunState: keys mutex poisoned")
            .insert(key);
    }

    /// Record a key release edge. Releasing a key that is not held has no effect.
    pub fn release(&self, key: DriveKey) {
        self.keys
            .lock()
            .expect("RunState: keys mutex poisoned")
            .remove(&key);
    }

    /// A snapshot of the currently held keys.
    pub fn held(&self) -> HashSet<DriveKey> {
        self.keys
            .lock()
            .expect("RunState: keys mutex poisoned")
            .clone()
    }

    /// True while teleoperation should keep running.
    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::Relaxed)
    }

    /// Clear the run flag. Idempotent, and the flag never becomes true again.
    pub fn stop(&self) {
        self.run.store(false, Ordering::Relaxed);
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_press_release_idempotent() {
        let state = RunState::new();

        state.press(DriveKey::Forward);
        state.press(DriveKey::Forward);
        assert_eq!(state.held().len(), 1);

        state.release(DriveKey::Forward);
        state.release(DriveKey::Forward);
        assert!(state.held().is_empty());

        // Releasing a key that was never pressed is fine too
        state.release(DriveKey::Brake);
        assert!(state.held().is_empty());
    }

    #[test]
    fn test_stop_terminal() {
        let state = RunState::new();
        assert!(state.is_running());

        state.stop();
        assert!(!state.is_running());

        // Firing the quit signal twice has the same effect as once
        state.stop();
        assert!(!state.is_running());
    }
}
