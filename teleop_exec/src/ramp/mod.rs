//! # Ramp Control Module
//!
//! RampCtrl converts raw actuator targets into a smooth command stream by bounding the per-tick
//! change of the engine and steering values. The brake is deliberately excluded from ramping,
//! a brake demand takes effect on the very next command.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod state;

pub use state::{ActuatorState, InputData, RampCtrl, StatusReport};

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the ramp control module
#[derive(Clone, Deserialize)]
pub struct Params {
    /// Maximum magnitude of engine change per tick
    pub engine_step: f64,

    /// Maximum magnitude of steering change per tick
    pub steer_step: f64
}

impl Default for Params {
    fn default() -> Self {
        Self {
            engine_step: 0.02,
            steer_step: 0.05
        }
    }
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RampCtrlError {
    #[error("Could not load the ramp parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Ramp steps must be positive (engine_step = {0}, steer_step = {1})")]
    NonPositiveStep(f64, f64)
}
