//! # Network Module
//!
//! This module provides networking abstractions over ZMQ, the transport used to reach the
//! simulation server. The server exposes two connections: a pub-sub connection carrying entity
//! topics, and a request-reply connection carrying service calls. Both are plain JSON strings
//! over ZMQ sockets.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::convert::TryInto;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc
};
use std::thread;

use log::debug;
use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use zmq::{Context, Socket, SocketEvent, SocketType};

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

macro_rules! set_sockopts {
    ($socket:expr, $(($opt:ident, $val:expr)),+) => {
        $(
            $socket.$opt($val)
                .map_err(|e| MonitoredSocketError::SocketOptionError(stringify!($opt).into(), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// STATICS
// ------------------------------------------------------------------------------------------------

/// Number of monitors that have been registered. Used to provide unique IDs for each monitor
/// endpoint.
static NUM_MONITORS: AtomicUsize = AtomicUsize::new(0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters locating the simulation server.
///
/// The defaults match the server's default command line switches, the driver layer may override
/// them from its own command line.
#[derive(Debug, Clone, Serialize, Deserialize, StructOpt)]
pub struct SimNetParams {
    /// IP address of the host running the simulation server
    #[structopt(long, default_value = "127.0.0.1")]
    pub address: String,

    /// TCP port of the simulation server's topic pub-sub connection
    #[structopt(long, default_value = "8989")]
    pub topics_port: u16,

    /// TCP port of the simulation server's services connection
    #[structopt(long, default_value = "8990")]
    pub services_port: u16
}

/// A zmq socket which is monitored providing additional information.
///
/// A background thread watches activity on the socket and keeps the `connected` flag current, so
/// that clients can cheaply check whether the server is actually on the other end before
/// attempting an exchange.
pub struct MonitoredSocket {
    socket: Socket,

    _join_handle: thread::JoinHandle<()>,

    shutdown: Arc<AtomicBool>,

    connected: Arc<AtomicBool>
}

/// Options applied to a monitored socket on creation.
///
/// These correspond to the options found in the
/// [`zmq_setsockopt`](http://api.zeromq.org/4-2:zmq-setsockopt) documentation, restricted to the
/// ones this software actually sets.
pub struct SocketOptions {
    /// If true the `MonitoredSocket::new()` function will block until the socket is connected, or
    /// until the connect_timeout elapses, in which case a
    /// `MonitoredSocketError::CouldNotConnect` error is returned.
    ///
    /// The default value is `true`.
    pub block_on_first_connect: bool,

    /// `ZMQ_REQ_CORRELATE`: Match replies with requests
    pub req_correlate: bool,

    /// `ZMQ_REQ_RELAXED`: relax strict alternation between request and reply
    pub req_relaxed: bool,

    /// `ZMQ_LINGER`: Set linger period for socket shutdown
    pub linger: i32,

    /// `ZMQ_CONNECT_TIMEOUT`: Set `connect()` timeout
    pub connect_timeout: i32,

    /// `ZMQ_RCVTIMEO`: Maximum time before a recv operation returns with `EAGAIN`
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`: Maximum time before a send operation returns with `EAGAIN`
    pub send_timeout: i32,

    /// `ZMQ_HEARTBEAT_IVL`: Set interval between sending ZMTP heartbeats
    pub heartbeat_ivl: i32,

    /// `ZMQ_HEARTBEAT_TIMEOUT`: Set timeout for ZMTP heartbeats
    pub heartbeat_timeout: i32,

    /// `ZMQ_HEARTBEAT_TTL`: Set the TTL (time to live) value for ZMTP heartbeats
    pub heartbeat_ttl: i32
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MonitoredSocketError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Error enabling monitoring for the socket: {0}")]
    MonitoringEnableError(zmq::Error),

    #[error("Could not connect the socket: {0:?}")]
    CouldNotConnect(Option<zmq::Error>),

    #[error("Could not read event from monitor socket: {0}")]
    EventReadError(zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(String, zmq::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimNetParams {
    /// The zmq endpoint string of the topics connection.
    pub fn topics_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.address, self.topics_port)
    }

    /// The zmq endpoint string of the services connection.
    pub fn services_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.address, self.services_port)
    }
}

impl MonitoredSocket {
    /// Create a new monitored socket connected to the given endpoint.
    ///
    /// If `socket_options.block_on_first_connect` is set this function blocks until the
    /// connection is established or the connect timeout expires.
    ///
    /// ## Arguments
    /// - `ctx`: the zmq context which will be used to create the socket
    /// - `socket_type`: the type of zmq socket to create
    /// - `socket_options`: a [`SocketOptions`] struct specifying how to configure the socket
    /// - `endpoint`: a zmq endpoint string, such as `"tcp://localhost:8990"`
    pub fn new(
        ctx: &Context,
        socket_type: SocketType,
        socket_options: SocketOptions,
        endpoint: &str
    ) -> Result<Self, MonitoredSocketError> {
        // Create atomics
        let shutdown = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));

        // Create socket
        let socket = ctx.socket(socket_type)
            .map_err(MonitoredSocketError::CreateSocketError)?;

        // Create monitor endpoint
        let monitor_endpoint = format!(
            "inproc://monitor_{}",
            NUM_MONITORS.fetch_add(1, Ordering::Relaxed)
        );

        // Enable, create, and connect the monitor pair socket
        socket.monitor(&monitor_endpoint, SocketEvent::ALL as i32)
            .map_err(MonitoredSocketError::MonitoringEnableError)?;
        let monitor = ctx.socket(zmq::PAIR)
            .map_err(MonitoredSocketError::CreateSocketError)?;
        monitor.connect(&monitor_endpoint)
            .map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

        // Set the options on the socket
        socket_options.set(&socket)?;

        // Connect the socket to its endpoint
        socket.connect(endpoint)
            .map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

        // If the block on first connect flag is set wait for the monitor to signal connection
        if socket_options.block_on_first_connect {
            loop {
                let event = read_event(&monitor)
                    .map_err(MonitoredSocketError::EventReadError)?;

                match event {
                    SocketEvent::CONNECTED => break,
                    SocketEvent::CONNECT_DELAYED => continue,
                    SocketEvent::CONNECT_RETRIED => continue,
                    _ => return Err(MonitoredSocketError::CouldNotConnect(None))
                }
            }

            // The connected event has arrived so the flag can be raised immediately
            connected.store(true, Ordering::Relaxed);
        }

        // Create clones for use by the monitor thread
        let shutdown_clone = shutdown.clone();
        let connected_clone = connected.clone();

        // Spawn the monitor thread
        let join_handle = thread::spawn(
            move || monitor_socket(monitor, shutdown_clone, connected_clone)
        );

        // Create self
        Ok(Self {
            socket,
            _join_handle: join_handle,
            shutdown,
            connected
        })
    }

    /// Return if the socket is connected or not.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for MonitoredSocket {
    fn drop(&mut self) {
        // The monitor thread is not joined here, it may be blocked waiting for an event that
        // will never come once the socket is closed. It exits on the next event or when the
        // process ends.
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl std::ops::Deref for MonitoredSocket {
    type Target = Socket;

    fn deref(&self) -> &Self::Target {
        &self.socket
    }
}

impl SocketOptions {
    /// Set these options on the given socket.
    pub fn set(&self, socket: &Socket) -> Result<(), MonitoredSocketError> {

        // Set all the socket options, we use a macro here to make the error handling nice and
        // easy
        set_sockopts!(
            socket,
            (set_connect_timeout, self.connect_timeout),
            (set_heartbeat_ivl, self.heartbeat_ivl),
            (set_heartbeat_timeout, self.heartbeat_timeout),
            (set_heartbeat_ttl, self.heartbeat_ttl),
            (set_linger, self.linger),
            (set_rcvtimeo, self.recv_timeout),
            (set_sndtimeo, self.send_timeout)
        );

        // If the socket is a req type set the req-specific options
        if let Ok(SocketType::REQ) = socket.get_socket_type() {
            set_sockopts!(
                socket,
                (set_req_correlate, self.req_correlate),
                (set_req_relaxed, self.req_relaxed)
            );
        }

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        // Defaults for sockopts taken from http://api.zeromq.org/4-2:zmq-setsockopt
        Self {
            block_on_first_connect: true,
            connect_timeout: 0,
            heartbeat_ivl: 0,
            heartbeat_timeout: 0,
            heartbeat_ttl: 0,
            linger: 30_000,
            recv_timeout: -1,
            req_correlate: false,
            req_relaxed: false,
            send_timeout: 0
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read an event from a monitor socket.
fn read_event(socket: &Socket) -> Result<SocketEvent, zmq::Error> {

    let msg = socket.recv_msg(0)?;

    let event = u16::from_ne_bytes(
        msg[..2].try_into().expect("Monitor event message shorter than two bytes")
    );

    assert!(
        socket.get_rcvmore()?,
        "Monitor socket should have two messages per event"
    );

    // the address, we'll ignore it
    let _ = socket.recv_msg(0)?;

    Ok(SocketEvent::from_raw(event))
}

fn monitor_socket(
    monitor: Socket,
    shutdown: Arc<AtomicBool>,
    connected: Arc<AtomicBool>
) {
    // So long as the shutdown isn't requested
    while !shutdown.load(Ordering::Relaxed) {
        // Read the next event from the monitor, exiting quietly if the monitor pair has been
        // closed under us
        let event = match read_event(&monitor) {
            Ok(e) => e,
            Err(_) => break
        };

        // Raise any flags required by the event
        match event {
            SocketEvent::CONNECTED => {
                debug!("Monitored socket connected");
                connected.store(true, Ordering::Relaxed)
            }
            SocketEvent::DISCONNECTED => {
                debug!("Monitored socket disconnected");
                connected.store(false, Ordering::Relaxed)
            }
            _ => ()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_endpoints() {
        let params = SimNetParams {
            address: String::from("10.0.0.2"),
            topics_port: 8989,
            services_port: 8990
        };

        assert_eq!(params.topics_endpoint(), "tcp://10.0.0.2:8989");
        assert_eq!(params.services_endpoint(), "tcp://10.0.0.2:8990");
    }
}
