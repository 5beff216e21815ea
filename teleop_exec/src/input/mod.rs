//! # Input Sampling Module
//!
//! Abstracts over the heterogeneous input sources used for teleoperation. The dispatch loop is
//! written against [`InputSampler`] and does not assume a particular physical device: the edge
//! variant derives targets from a held-key set maintained by a listener thread, the polled
//! variant accumulates values from one buffered keypress per tick.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod key_state;
pub mod keyboard;
pub mod polled;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::ramp::ActuatorState;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The intent derived from the input source on one sampling tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputIntent {
    /// Drive the actuators toward these targets under the ramp limits.
    Ramp(ActuatorState),

    /// Set the actuators to these values directly on this tick.
    Set(ActuatorState),

    /// Stop teleoperation.
    Quit
}

/// Possible errors from an input source.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Could not read from the keyboard event source: {0}")]
    EventReadError(std::io::Error),

    #[error("The keyboard listener thread panicked")]
    ListenerPanicked
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of teleoperation intent.
///
/// `sample` is non-blocking and returns the most recent known state, which is not necessarily
/// changed since the last call. The absence of new input is the steady state, not an error.
pub trait InputSampler {
    fn sample(&mut self) -> InputIntent;
}
