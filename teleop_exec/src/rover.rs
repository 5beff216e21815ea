//! # Rover Vehicle Handle
//!
//! Wraps the session's services channel with the rover actuation lifecycle. Authority follows
//! the enable -> arm order before any command is accepted, and disarm -> disable when control
//! is handed back. Command values are clamped here before dispatch, an out-of-range demand is
//! trimmed rather than rejected.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;

use sim_if::sim::SimRequest;
use util::maths::clamp;

use crate::sim_client::{SimSession, SimSessionError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to a rover in the simulation.
pub struct Rover<'s> {
    session: &'s SimSession,
    name: String
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RoverError {
    #[error("Service request failed: {0}")]
    RequestError(#[from] SimSessionError)
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Actuation interface required by the command dispatcher.
///
/// Implemented by [`Rover`], and by mocks in the dispatcher's tests. All methods are bounded in
/// time, a slow transport costs the socket timeout rather than the cadence.
pub trait RoverInterface {
    /// Take API control of the vehicle's actuators.
    fn enable_api_control(&self) -> Result<(), RoverError>;

    /// Release API control of the vehicle's actuators.
    fn disable_api_control(&self) -> Result<(), RoverError>;

    /// Arm the vehicle.
    fn arm(&self) -> Result<(), RoverError>;

    /// Disarm the vehicle.
    fn disarm(&self) -> Result<(), RoverError>;

    /// Send one actuator command snapshot.
    fn set_rover_controls(
        &self,
        engine: f64,
        steering_angle: f64,
        brake: f64
    ) -> Result<(), RoverError>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'s> Rover<'s> {
    /// Create a handle to the named rover within the connected session.
    pub fn new(session: &'s SimSession, name: &str) -> Self {
        info!("Rover handle created for \"{}\"", name);

        Self {
            session,
            name: String::from(name)
        }
    }

    /// The robot name this handle commands.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl RoverInterface for Rover<'_> {
    fn enable_api_control(&self) -> Result<(), RoverError> {
        self.session
            .request_ok(&SimRequest::EnableApiControl {
                robot: self.name.clone()
            })
            .map_err(RoverError::from)
    }

    fn disable_api_control(&self) -> Result<(), RoverError> {
        self.session
            .request_ok(&SimRequest::DisableApiControl {
                robot: self.name.clone()
            })
            .map_err(RoverError::from)
    }

    fn arm(&self) -> Result<(), RoverError> {
        self.session
            .request_ok(&SimRequest::Arm {
                robot: self.name.clone()
            })
            .map_err(RoverError::from)
    }

    fn disarm(&self) -> Result<(), RoverError> {
        self.session
            .request_ok(&SimRequest::Disarm {
                robot: self.name.clone()
            })
            .map_err(RoverError::from)
    }

    fn set_rover_controls(
        &self,
        engine: f64,
        steering_angle: f64,
        brake: f64
    ) -> Result<(), RoverError> {
        self.session
            .request_ok(&SimRequest::SetRoverControls {
                robot: self.name.clone(),
                engine: clamp(engine, -1.0, 1.0),
                steering_angle: clamp(steering_angle, -1.0, 1.0),
                brake: clamp(brake, 0.0, 1.0)
            })
            .map_err(RoverError::from)
    }
}
