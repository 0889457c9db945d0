//! Ferry - unattended channel-to-channel message relay.
//!
//! The forwarding engine lives in [`forwarder`]; the platform connection is
//! abstracted behind [`gateway::SessionGateway`].

pub mod config;
pub mod forwarder;
pub mod gateway;
pub mod handlers;
pub mod response;
pub mod server;
