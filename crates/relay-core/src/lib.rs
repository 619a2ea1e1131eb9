//! # relay-core
//!
//! Shared types for the broadcast relay.
//!
//! - [`ids::ConnectionId`]: branded, never-reused connection identifiers
//! - [`state::ConnectionState`]: the `Open → Closing → Closed` lifecycle
//! - [`errors`]: one error type per failure domain (accept, transport, send, transform)
//! - [`transform`]: the message decoration contract and its clock

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod state;
pub mod transform;

pub use errors::{AcceptError, RegistryError, RelayError, SendError, TransformError, TransportError};
pub use ids::ConnectionId;
pub use state::ConnectionState;
pub use transform::{Clock, FixedClock, MessageTransform, SystemClock, TimestampTransform};
