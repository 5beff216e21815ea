//! # Simulation Session Client
//!
//! Manages the client side of one connection to the simulation server: the services
//! request/reply socket, the topics subscription socket, and the topic directory captured when
//! the connection was established.
//!
//! Sessions are single use. `disconnect` consumes the session, and reconnecting constructs a
//! brand-new session so that a topic directory captured by an earlier connection is discarded
//! rather than trusted. A dynamically-spawned entity is not in the directory of a connection
//! made before the entity registered, which is why [`phased_connect`] exists: connect, trigger
//! the scene load, wait for spawns to settle, throw the session away, and only trust the
//! enumeration of a second, fresh session.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::thread;
use std::time::Duration;

use log::{debug, error, info};

use sim_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, SimNetParams, SocketOptions},
    sim::{SimRequest, SimResponse, TopicInfo}
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One connection to the simulation server.
pub struct SimSession {
    services: MonitoredSocket,

    topics_socket: MonitoredSocket,

    /// The topic directory captured when this session connected. Deliberately never refreshed,
    /// a fresh session is the only way to re-enumerate.
    topics: Vec<TopicInfo>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimSessionError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("The session is not connected to the server")]
    NotConnected,

    #[error("Could not send the request to the server: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a response from the server: {0}")]
    RecvError(zmq::Error),

    #[error("No response from the server within the timeout")]
    ResponseTimeout,

    #[error("Could not serialize the request: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the response from the server: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The server sent a message which was not valid UTF-8")]
    NonUtf8Response,

    #[error("The server rejected the request in the current state")]
    RequestRejected,

    #[error("The server reported an error: {0}")]
    ServerError(String),

    #[error("Unexpected response from the server: {0}")]
    UnexpectedResponse(String)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimSession {
    /// Connect a new session to the simulation server.
    ///
    /// Connects the services and topics sockets, then captures the topic directory. This
    /// function blocks until both sockets are connected or their connect timeout expires.
    pub fn connect(ctx: &zmq::Context, params: &SimNetParams) -> Result<Self, SimSessionError> {
        // TODO: Move these into a parameter file
        let services_options = SocketOptions {
            connect_timeout: 2000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 2000,
            send_timeout: 1000,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        let topics_options = SocketOptions {
            connect_timeout: 2000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 10,
            ..Default::default()
        };

        info!(
            "Connecting to the simulation server at {}",
            params.services_endpoint()
        );

        let services = MonitoredSocket::new(
            ctx,
            zmq::REQ,
            services_options,
            &params.services_endpoint()
        ).map_err(SimSessionError::SocketError)?;

        let topics_socket = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            topics_options,
            &params.topics_endpoint()
        ).map_err(SimSessionError::SocketError)?;

        let mut session = Self {
            services,
            topics_socket,
            topics: Vec::new()
        };

        // Capture the topic directory for this connection
        session.topics = match session.request(&SimRequest::ListTopics)? {
            SimResponse::Topics(topics) => topics,
            response => {
                return Err(SimSessionError::UnexpectedResponse(format!("{:?}", response)))
            }
        };

        debug!(
            "Connected, topic directory holds {} topics",
            session.topics.len()
        );

        Ok(session)
    }

    /// Check if the session is connected to the server.
    pub fn is_connected(&self) -> bool {
        self.services.connected() && self.topics_socket.connected()
    }

    /// Make one bounded request/reply round trip with the server.
    ///
    /// Both the send and the recieve are bounded by the socket timeouts, so a slow or dead
    /// server costs at most the timeout rather than stalling the caller's cadence forever.
    pub fn request(&self, request: &SimRequest) -> Result<SimResponse, SimSessionError> {
        if !self.services.connected() {
            return Err(SimSessionError::NotConnected);
        }

        let request_str = request
            .to_json()
            .map_err(SimSessionError::SerializationError)?;

        match self.services.send(&request_str, 0) {
            Ok(()) => (),
            Err(zmq::Error::EAGAIN) => return Err(SimSessionError::ResponseTimeout),
            Err(e) => return Err(SimSessionError::SendError(e))
        };

        let response_str = match self.services.recv_string(0) {
            // Valid message
            Ok(Ok(s)) => s,
            // Non UTF-8 message
            Ok(Err(_)) => return Err(SimSessionError::NonUtf8Response),
            // No response within the timeout
            Err(zmq::Error::EAGAIN) => return Err(SimSessionError::ResponseTimeout),
            // Recieve error
            Err(e) => return Err(SimSessionError::RecvError(e))
        };

        SimResponse::from_json(&response_str).map_err(SimSessionError::DeserializeError)
    }

    /// Make a request for which the only interesting answer is success.
    pub fn request_ok(&self, request: &SimRequest) -> Result<(), SimSessionError> {
        match self.request(request)? {
            SimResponse::Ok => Ok(()),
            SimResponse::Rejected => Err(SimSessionError::RequestRejected),
            SimResponse::Error(message) => Err(SimSessionError::ServerError(message)),
            response => Err(SimSessionError::UnexpectedResponse(format!("{:?}", response)))
        }
    }

    /// Trigger a load of the named scene configuration on the server.
    pub fn load_scene(&self, scene_config: &str) -> Result<(), SimSessionError> {
        info!("Requesting scene load of \"{}\"", scene_config);

        self.request_ok(&SimRequest::LoadScene {
            scene_config: String::from(scene_config)
        })
    }

    /// The topic directory captured when this session connected.
    pub fn topics(&self) -> &[TopicInfo] {
        &self.topics
    }

    /// Count the topics whose name contains the given entity identifier.
    pub fn count_entity_topics(&self, entity: &str) -> usize {
        count_matching_topics(&self.topics, entity)
    }

    /// Explicitly disconnect the session.
    ///
    /// Consumes the session, a disconnected session cannot be reused and anything it captured
    /// dies with it. Callable after partial failures.
    pub fn disconnect(self) {
        info!("Disconnecting from the simulation server");

        // Linger is set low on both sockets so closing them does not hold the context open
        drop(self.services);
        drop(self.topics_socket);
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Establish a verified connection using the two-phase connect/reconnect protocol.
///
/// Phase 1 connects, triggers the scene load, and waits out the settle period so that
/// dynamically-spawned entities have time to register their topics. That session is then
/// explicitly discarded, and phase 2 connects a brand-new session whose directory is enumerated
/// from scratch. Finally the directory is checked for each expected entity.
///
/// A missing entity is logged as an error but is not fatal here, the caller decides whether it
/// can continue without that entity's control path.
pub fn phased_connect(
    ctx: &zmq::Context,
    params: &SimNetParams,
    scene_config: &str,
    expected_entities: &[String],
    settle_duration: Duration
) -> Result<SimSession, SimSessionError> {
    // ---- PHASE 1: LOAD ----

    info!("Connection phase 1: loading the scene");

    let loader = SimSession::connect(ctx, params)?;
    loader.load_scene(scene_config)?;

    info!(
        "Waiting {:.1} s for spawned entities to register their topics",
        settle_duration.as_secs_f64()
    );
    thread::sleep(settle_duration);

    // The disconnect must be explicit, phase 2 has to enumerate from scratch rather than
    // inherit anything this connection captured
    loader.disconnect();

    // ---- PHASE 2: FRESH CONNECTION ----

    info!("Connection phase 2: reconnecting with a fresh session");

    let session = SimSession::connect(ctx, params)?;

    // ---- VERIFICATION ----

    for entity in expected_entities {
        let num_matching = session.count_entity_topics(entity);

        if num_matching == 0 {
            error!(
                "No topics matching \"{}\" after reconnection. Check that the scene config \
                 \"{}\" actually spawns this entity, and that the settle duration is long \
                 enough for it to register.",
                entity, scene_config
            );
        }
        else {
            info!("Found {} topics for entity \"{}\"", num_matching, entity);
        }
    }

    Ok(session)
}

/// Count the entries in a topic list whose name contains the given entity identifier.
pub fn count_matching_topics(topics: &[TopicInfo], entity: &str) -> usize {
    topics.iter().filter(|t| t.name.contains(entity)).count()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn topic(name: &str) -> TopicInfo {
        TopicInfo {
            name: String::from(name),
            msg_type: String::from("PoseStamped"),
            frequency_hz: 50.0
        }
    }

    #[test]
    fn test_count_matching_topics() {
        let topics = vec![
            topic("/Sim/SceneDroneRover/robots/Rover1/actual_pose"),
            topic("/Sim/SceneDroneRover/robots/Rover1/collision_info"),
            topic("/Sim/SceneDroneRover/robots/Drone1/actual_pose")
        ];

        assert_eq!(count_matching_topics(&topics, "Rover1"), 2);
        assert_eq!(count_matching_topics(&topics, "Drone1"), 1);

        // A missing entity counts zero rather than raising
        assert_eq!(count_matching_topics(&topics, "Rover2"), 0);

        // And an empty directory matches nothing
        assert_eq!(count_matching_topics(&[], "Rover1"), 0);
    }
}
