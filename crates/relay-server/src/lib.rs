//! # relay-server
//!
//! WebSocket broadcast relay: every text frame received from one client is
//! stamped with the server's receipt time and relayed to every connected
//! client, the sender included.
//!
//! - [`acceptor`]: binds the listener, admits upgrade requests, stops on demand
//! - [`websocket::registry`]: concurrent identity-keyed set of live connections
//! - [`websocket::session`]: per-connection receive loop and writer
//! - [`websocket::broadcast`]: snapshot-based fan-out with per-target isolation
//! - [`shutdown`]: explicit cancellation propagated to every receive loop

#![deny(unsafe_code)]

pub mod acceptor;
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{BindTarget, ServerConfig};
pub use server::RelayServer;
