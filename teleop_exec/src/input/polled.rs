//! Polled single-key input source.
//!
//! Reads at most one buffered keypress per tick and applies direct increments to accumulated
//! actuator values, the way a terminal that cannot report key-release edges has to be driven.
//! The accumulated state goes to the vehicle as-is, ramping happens one keypress at a time
//! under the operator's thumb instead.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use log::{error, info};

use super::{InputError, InputIntent, InputSampler};
use crate::ramp::ActuatorState;
use util::maths::clamp;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Engine increment applied per keypress
const ENGINE_STEP: f64 = 0.1;

/// Steering increment applied per keypress
const STEER_STEP: f64 = 0.15;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Non-blocking poll-for-one-keypress collaborator.
pub trait KeySource {
    /// Return the next buffered keypress, or `None` when the buffer is empty.
    fn poll_key(&mut self) -> Result<Option<KeyCode>, InputError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Crossterm-backed key source reading from the terminal.
pub struct TerminalKeys;

/// Accumulating sampler over a polled key source.
pub struct PolledSampler<K> {
    source: K,
    state: ActuatorState
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl KeySource for TerminalKeys {
    fn poll_key(&mut self) -> Result<Option<KeyCode>, InputError> {
        // Zero timeout: take a buffered key if there is one, never wait for it
        if !event::poll(Duration::from_secs(0)).map_err(InputError::EventReadError)? {
            return Ok(None);
        }

        match event::read().map_err(InputError::EventReadError)? {
            Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            }) => Ok(Some(code)),
            _ => Ok(None)
        }
    }
}

impl<K> PolledSampler<K> {
    pub fn new(source: K) -> Self {
        Self {
            source,
            state: ActuatorState::default()
        }
    }
}

impl<K: KeySource> InputSampler for PolledSampler<K> {
    fn sample(&mut self) -> InputIntent {
        let code = match self.source.poll_key() {
            Ok(Some(code)) => code,
            // No new key, hold the accumulated state
            Ok(None) => return InputIntent::Set(self.state),
            Err(e) => {
                // With the key source dead no quit could ever arrive, stop instead
                error!("Keyboard poll failed, stopping teleop: {}", e);
                return InputIntent::Quit;
            }
        };

        match code {
            KeyCode::Char('w') | KeyCode::Char('W') => {
                self.state.brake = 0.0;
                self.state.engine = clamp(self.state.engine + ENGINE_STEP, -1.0, 1.0);
            }
            KeyCode::Char('s') | KeyCode::Char('S') => {
                self.state.brake = 0.0;
                self.state.engine = clamp(self.state.engine - ENGINE_STEP, -1.0, 1.0);
            }
            KeyCode::Char('a') | KeyCode::Char('A') => {
                self.state.steering = clamp(self.state.steering - STEER_STEP, -1.0, 1.0);
            }
            KeyCode::Char('d') | KeyCode::Char('D') => {
                self.state.steering = clamp(self.state.steering + STEER_STEP, -1.0, 1.0);
            }
            KeyCode::Char(' ') => {
                // Full brake, stop the engine immediately. Steering is left where it is.
                self.state.brake = 1.0;
                self.state.engine = 0.0;
            }
            KeyCode::Char('0') => {
                self.state = ActuatorState::default();
            }
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                info!("Quit key pressed, stopping teleop");
                return InputIntent::Quit;
            }
            _ => ()
        }

        InputIntent::Set(self.state)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use approx::assert_relative_eq;

    use super::*;

    /// Key source fed from a script of key codes.
    struct ScriptedKeys {
        codes: VecDeque<KeyCode>
    }

    impl ScriptedKeys {
        fn new(codes: &[KeyCode]) -> Self {
            Self {
                codes: codes.iter().copied().collect()
            }
        }
    }

    impl KeySource for ScriptedKeys {
        fn poll_key(&mut self) -> Result<Option<KeyCode>, InputError> {
            Ok(self.codes.pop_front())
        }
    }

    fn set_state(intent: InputIntent) -> ActuatorState {
        match intent {
            InputIntent::Set(state) => state,
            i => panic!("Expected Set, got {:?}", i)
        }
    }

    #[test]
    fn test_increment_and_clamp() {
        let mut sampler = PolledSampler::new(ScriptedKeys::new(
            &[KeyCode::Char('w'); 12]
        ));

        let mut state = ActuatorState::default();
        for _ in 0..12 {
            state = set_state(sampler.sample());
        }

        // Twelve increments of 0.1 clamp at the +1 bound
        assert_eq!(state.engine, 1.0);

        // An empty buffer holds the accumulated state
        let state = set_state(sampler.sample());
        assert_eq!(state.engine, 1.0);
    }

    #[test]
    fn test_brake_zeroes_engine() {
        let mut sampler = PolledSampler::new(ScriptedKeys::new(&[
            KeyCode::Char('w'),
            KeyCode::Char('w'),
            KeyCode::Char('a'),
            KeyCode::Char(' ')
        ]));

        for _ in 0..3 {
            sampler.sample();
        }

        let state = set_state(sampler.sample());
        assert_eq!(state.brake, 1.0);
        assert_eq!(state.engine, 0.0);
        // Steering is left where it was
        assert_relative_eq!(state.steering, -0.15);
    }

    #[test]
    fn test_reset_key() {
        let mut sampler = PolledSampler::new(ScriptedKeys::new(&[
            KeyCode::Char('w'),
            KeyCode::Char('d'),
            KeyCode::Char('0')
        ]));

        sampler.sample();
        sampler.sample();

        let state = set_state(sampler.sample());
        assert_eq!(state, ActuatorState::default());
    }

    #[test]
    fn test_quit_keys() {
        let mut sampler = PolledSampler::new(ScriptedKeys::new(&[KeyCode::Char('q')]));
        assert_eq!(sampler.sample(), InputIntent::Quit);

        let mut sampler = PolledSampler::new(ScriptedKeys::new(&[KeyCode::Esc]));
        assert_eq!(sampler.sample(), InputIntent::Quit);
    }
}
