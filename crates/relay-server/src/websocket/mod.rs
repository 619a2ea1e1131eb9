//! WebSocket connection lifecycle and broadcasting.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-client handle: state machine, bounded outbound queue, close signal |
//! | `registry` | Concurrent identity-keyed membership set with point-in-time snapshots |
//! | `broadcast` | Fan-out of one decorated message to a registry snapshot |
//! | `session` | Receive loop + writer task owning one socket |
//!
//! ## Data Flow
//!
//! `session` reads a text frame → message transform → `broadcast` → each
//! target's outbound queue → that target's writer → socket.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod session;
