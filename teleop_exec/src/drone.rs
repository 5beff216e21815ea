//! # Drone Vehicle Handle
//!
//! The drone is initialised for presence in the simulation but is neither armed nor taken
//! under API control, manual flight stays with the operator's ground control station. The
//! watch loop holds the branch open and polls the shared run flag so the drone side exits
//! together with the rover teleop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::thread;
use std::time::Duration;

use log::info;

use sim_if::sim::SimRequest;

use crate::input::key_state::SharedRunState;
use crate::sim_client::{SimSession, SimSessionError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period between run flag polls in the manual flight watch.
const WATCH_PERIOD_S: u64 = 1;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to a drone in the simulation.
pub struct Drone<'s> {
    session: &'s SimSession,
    name: String
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DroneError {
    #[error("Service request failed: {0}")]
    RequestError(#[from] SimSessionError)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'s> Drone<'s> {
    /// Create a handle to the named drone within the connected session.
    pub fn new(session: &'s SimSession, name: &str) -> Self {
        info!("Drone handle created for \"{}\"", name);

        Self {
            session,
            name: String::from(name)
        }
    }

    /// The robot name this handle commands.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forward one raw RC channel vector to the drone's flight controller.
    pub fn set_rc_channels(&self, channels: Vec<f64>) -> Result<(), DroneError> {
        self.session
            .request_ok(&SimRequest::SetRcChannels {
                robot: self.name.clone(),
                channels
            })
            .map_err(DroneError::from)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Hold the manual-flight branch open until teleoperation ends.
///
/// The drone takes no commands from this executable, this loop exists so the operator sees the
/// branch is alive and so its exit is coupled to the same quit signal as the rover teleop.
pub fn manual_flight_watch(drone_name: &str, run_state: &SharedRunState) {
    info!("================================================================");
    info!("{} initialised.", drone_name);
    info!("Use the ground control station to arm and fly manually.");
    info!("================================================================");

    while run_state.is_running() {
        thread::sleep(Duration::from_secs(WATCH_PERIOD_S));
    }

    info!("Teleop ended, leaving manual flight to the ground station");
}
