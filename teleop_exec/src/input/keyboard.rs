//! Keyboard edge-event input source.
//!
//! A background listener thread collects key press/release edges into the shared held-key set,
//! and the sampler derives actuator targets from a snapshot of that set. Driving feel comes
//! from holding keys: a held direction key is a full-deflection target which the ramp module
//! then smooths.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashSet;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use log::info;

use super::key_state::{DriveKey, SharedRunState};
use super::{InputError, InputIntent, InputSampler};
use crate::ramp::ActuatorState;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period between polls of the event queue in the listener thread. Short enough that the thread
/// notices the run flag clearing promptly.
const LISTEN_POLL_MS: u64 = 10;

/// Releasing this key stops teleoperation.
const QUIT_KEY: char = 'q';

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the keyboard listener thread.
pub struct KeyboardListener {
    join_handle: JoinHandle<Result<(), InputError>>
}

/// Edge-set input sampler, derives ramp targets from the held-key snapshot.
pub struct KeyboardSampler {
    state: SharedRunState
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl KeyboardListener {
    /// Spawn the listener thread.
    ///
    /// The thread runs until the quit key is released, the run flag is cleared elsewhere, or the
    /// event source fails. A failure clears the run flag before the thread exits so the dispatch
    /// loop is never left running against a dead input source.
    pub fn spawn(state: SharedRunState) -> Self {
        Self {
            join_handle: thread::spawn(move || listen(state))
        }
    }

    /// Wait for the listener to finish and surface any fatal input error.
    pub fn join(self) -> Result<(), InputError> {
        match self.join_handle.join() {
            Ok(result) => result,
            Err(_) => Err(InputError::ListenerPanicked)
        }
    }
}

impl KeyboardSampler {
    pub fn new(state: SharedRunState) -> Self {
        Self { state }
    }
}

impl InputSampler for KeyboardSampler {
    fn sample(&mut self) -> InputIntent {
        InputIntent::Ramp(targets_from_keys(&self.state.held()))
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Derive actuator targets from the set of currently held keys.
///
/// Opposite directions resolve by fixed precedence: forward wins over reverse and left over
/// right when both are held. A held brake key overrides the direction keys entirely.
pub fn targets_from_keys(held: &HashSet<DriveKey>) -> ActuatorState {
    let mut target = ActuatorState::default();

    if held.contains(&DriveKey::Forward) {
        target.engine = 1.0;
    }
    else if held.contains(&DriveKey::Reverse) {
        target.engine = -1.0;
    }

    if held.contains(&DriveKey::Left) {
        target.steering = -1.0;
    }
    else if held.contains(&DriveKey::Right) {
        target.steering = 1.0;
    }

    if held.contains(&DriveKey::Brake) {
        target = ActuatorState::full_stop();
    }

    target
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Listener thread body.
fn listen(state: SharedRunState) -> Result<(), InputError> {
    let result = listen_inner(&state);

    // The dispatch loop must not outlive its input source, with the listener gone no quit
    // signal could ever arrive
    if result.is_err() {
        state.stop();
    }

    result
}

fn listen_inner(state: &SharedRunState) -> Result<(), InputError> {
    while state.is_running() {
        // Bounded poll so the flag is rechecked even while no keys arrive
        let pending = event::poll(Duration::from_millis(LISTEN_POLL_MS))
            .map_err(InputError::EventReadError)?;

        if !pending {
            continue;
        }

        let key_event = match event::read().map_err(InputError::EventReadError)? {
            Event::Key(k) => k,
            _ => continue
        };

        match key_event.kind {
            KeyEventKind::Press | KeyEventKind::Repeat => {
                if let Some(key) = drive_key(key_event.code) {
                    state.press(key);
                }
            }
            KeyEventKind::Release => {
                // The quit signal is edge triggered, it fires once on release
                if key_event.code == KeyCode::Char(QUIT_KEY) {
                    info!("Quit key released, stopping teleop");
                    state.stop();
                    continue;
                }

                if let Some(key) = drive_key(key_event.code) {
                    state.release(key);
                }
            }
        }
    }

    Ok(())
}

/// Map a key code to its drive binding, or `None` for an unbound key.
fn drive_key(code: KeyCode) -> Option<DriveKey> {
    match code {
        KeyCode::Up => Some(DriveKey::Forward),
        KeyCode::Down => Some(DriveKey::Reverse),
        KeyCode::Left => Some(DriveKey::Left),
        KeyCode::Right => Some(DriveKey::Right),
        KeyCode::Char(' ') => Some(DriveKey::Brake),
        _ => None
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn held(keys: &[DriveKey]) -> HashSet<DriveKey> {
        keys.iter().copied().collect()
    }

    #[test]
    fn test_no_keys_is_neutral() {
        assert_eq!(targets_from_keys(&held(&[])), ActuatorState::default());
    }

    #[test]
    fn test_direction_targets() {
        let target = targets_from_keys(&held(&[DriveKey::Forward, DriveKey::Right]));
        assert_eq!(target.engine, 1.0);
        assert_eq!(target.steering, 1.0);
        assert_eq!(target.brake, 0.0);

        let target = targets_from_keys(&held(&[DriveKey::Reverse, DriveKey::Left]));
        assert_eq!(target.engine, -1.0);
        assert_eq!(target.steering, -1.0);
    }

    #[test]
    fn test_opposite_key_precedence() {
        // Forward wins over reverse, left wins over right
        let target = targets_from_keys(&held(&[DriveKey::Forward, DriveKey::Reverse]));
        assert_eq!(target.engine, 1.0);

        let target = targets_from_keys(&held(&[DriveKey::Left, DriveKey::Right]));
        assert_eq!(target.steering, -1.0);
    }

    #[test]
    fn test_brake_overrides_directions() {
        let target = targets_from_keys(&held(&[
            DriveKey::Forward,
            DriveKey::Left,
            DriveKey::Brake
        ]));

        assert_eq!(target, ActuatorState::full_stop());
    }
}
