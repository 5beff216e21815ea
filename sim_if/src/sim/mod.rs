//! # Simulation server messages
//!
//! Requests and responses exchanged with the simulation server over the services connection.
//! All messages are serialised as JSON strings, the server is not a Rust process and cannot
//! share type definitions, so this module is the single place the wire format is written down.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A named data channel exposed by a simulated entity, discoverable by enumeration after
/// connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Full topic path, for example `/Sim/SceneDroneRover/robots/Rover1/actual_pose`
    pub name: String,

    /// Name of the message type published on this topic
    pub msg_type: String,

    /// Nominal publication frequency in hertz
    pub frequency_hz: f64
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A request made to the simulation server over the services connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SimRequest {
    /// Trigger a load of the named scene configuration.
    LoadScene {
        scene_config: String
    },

    /// Enumerate the topics currently registered with the server.
    ListTopics,

    /// Take API control of the named robot's actuators.
    EnableApiControl {
        robot: String
    },

    /// Release API control of the named robot's actuators.
    DisableApiControl {
        robot: String
    },

    /// Arm the named robot.
    Arm {
        robot: String
    },

    /// Disarm the named robot.
    Disarm {
        robot: String
    },

    /// Actuator command for a rover. Engine and steering are normalised to [-1, 1], brake to
    /// [0, 1]. Out-of-range values are clamped by the caller before dispatch.
    SetRoverControls {
        robot: String,
        engine: f64,
        steering_angle: f64,
        brake: f64
    },

    /// Raw RC channel vector for a robot's flight controller.
    SetRcChannels {
        robot: String,
        channels: Vec<f64>
    }
}

/// Response from the simulation server to a [`SimRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SimResponse {
    /// Request was valid and has been executed
    Ok,

    /// Request was valid but cannot be executed in the current state, for example arming a robot
    /// which is not under API control
    Rejected,

    /// The topic listing requested by `ListTopics`
    Topics(Vec<TopicInfo>),

    /// Request failed on the server
    Error(String)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimRequest {
    /// Serialise this request into its JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl SimResponse {
    /// Parse a response from its JSON wire form.
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let request = SimRequest::SetRoverControls {
            robot: String::from("Rover1"),
            engine: 0.4,
            steering_angle: -0.2,
            brake: 0.0
        };

        let json = request.to_json().unwrap();
        assert!(json.contains("SetRoverControls"));
        assert!(json.contains("Rover1"));
    }

    #[test]
    fn test_response_parse() {
        let response = SimResponse::from_json("\"Ok\"").unwrap();
        assert!(matches!(response, SimResponse::Ok));

        let response = SimResponse::from_json(
            "{\"Topics\":[{\"name\":\"/robots/Rover1/actual_pose\",\
             \"msg_type\":\"PoseStamped\",\"frequency_hz\":50.0}]}"
        ).unwrap();

        match response {
            SimResponse::Topics(topics) => {
                assert_eq!(topics.len(), 1);
                assert_eq!(topics[0].name, "/robots/Rover1/actual_pose");
            }
            r => panic!("Expected Topics, got {:?}", r)
        }
    }
}
