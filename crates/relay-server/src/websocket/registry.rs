//! Concurrent registry of live connections.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_core::{ConnectionId, RegistryError};

use super::connection::Connection;

/// Identity-keyed set of live connections.
///
/// Sharded internally, so `register`/`unregister` on one connection never
/// wait behind a broadcast to another: broadcasts work on a [`snapshot`]
/// and hold no lock while sending.
///
/// [`snapshot`]: ConnectionRegistry::snapshot
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

/// Proof of membership returned by [`ConnectionRegistry::register`].
///
/// Removes exactly the connection it was issued for. Dropping the handle
/// unregisters as well, so a session that unwinds never leaks its entry.
#[must_use = "dropping the handle unregisters the connection"]
pub struct RegistrationHandle {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
}

impl RegistrationHandle {
    /// The registered connection's id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

impl Drop for RegistrationHandle {
    fn drop(&mut self) {
        let _ = self.registry.remove(&self.id);
    }
}

impl std::fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationHandle").field("id", &self.id).finish()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Fails if a connection with the same id is present.
    pub fn register(
        self: &Arc<Self>,
        connection: Arc<Connection>,
    ) -> Result<RegistrationHandle, RegistryError> {
        match self.connections.entry(connection.id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(connection.id.clone())),
            Entry::Vacant(slot) => {
                let id = connection.id.clone();
                let _ = slot.insert(connection);
                Ok(RegistrationHandle {
                    id,
                    registry: Arc::clone(self),
                })
            }
        }
    }

    /// Remove the connection identified by `handle`.
    ///
    /// Returns `true` if this call removed it; later calls are no-ops.
    pub fn unregister(&self, handle: &RegistrationHandle) -> bool {
        self.remove(&handle.id)
    }

    fn remove(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    /// Point-in-time copy of current members.
    ///
    /// Later registrations and removals are not reflected in the returned
    /// vector; each member appears exactly once.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Look up a member by id.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
