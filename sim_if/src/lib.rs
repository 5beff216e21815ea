//! # Simulation interface crate.
//!
//! Provides the wire messages and network plumbing used to talk to the simulation server.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Network module
pub mod net;

/// Request, response and topic definitions for the simulation server
pub mod sim;
