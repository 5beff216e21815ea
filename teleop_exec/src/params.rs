//! # Teleop Executable Parameters
//!
//! This module provides parameters for the teleop executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Clone, Deserialize)]
pub struct TeleopExecParams {
    /// Name of the rover robot in the scene config
    pub rover_name: String,

    /// Name of the drone robot in the scene config
    pub drone_name: String,

    /// Entities expected to have registered topics once the scene has settled
    pub expected_entities: Vec<String>,

    /// Settle period between triggering the scene load and trusting topic enumeration, in
    /// seconds
    pub settle_duration_s: f64,

    /// Scene config to load if none is given on the command line
    pub scene_config: String
}
