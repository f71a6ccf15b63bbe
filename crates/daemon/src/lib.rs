//! Mudra Band signal multiplexing daemon.
//!
//! Ingests the band's telemetry stream, tracks per-client subscriptions,
//! enforces hardware compatibility constraints, and fans events out over
//! WebSocket, HTTP, and RPC surfaces backed by one shared routing core.

pub mod compat;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod router;
pub mod rpc;
pub mod server;
