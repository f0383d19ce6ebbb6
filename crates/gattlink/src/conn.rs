//! Connection lifecycle management
//!
//! Owns the table of logical links shared by both roles: handle
//! allocation, per-connection state, and the invariant that at most one
//! live handle exists per peer address.

use crate::error::{GattError, GattResult};
use crate::gap::{AddressType, BdAddr, Role};
use std::collections::HashMap;

/// Per-connection client state machine. Absence of a table entry is the
/// idle/disconnected state; an initiated but unanswered connect lives
/// outside the table until the peer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Discovering,
    Discovered,
    Active,
    Disconnecting,
}

/// One logical link.
#[derive(Debug, Clone)]
pub struct Connection {
    pub handle: u16,
    pub peer: BdAddr,
    pub peer_type: AddressType,
    /// Role the local device plays on this link.
    pub local_role: Role,
    pub state: ConnectionState,
}

/// Allocates and retires connection handles for both roles.
pub struct ConnectionManager {
    connections: HashMap<u16, Connection>,
    /// Peer of an initiated, not yet accepted, outbound connect.
    pending_connect: Option<(AddressType, BdAddr)>,
    next_handle: u16,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            pending_connect: None,
            next_handle: 1,
        }
    }

    /// Record an outbound connect attempt. Fails with `NotPermitted` if
    /// a live handle to this peer already exists. A previous unanswered
    /// attempt is abandoned (the caller times out on its own deadline).
    pub fn begin_connect(&mut self, addr_type: AddressType, addr: BdAddr) -> GattResult<()> {
        if self.find_by_peer(addr).is_some() {
            return Err(GattError::NotPermitted);
        }
        self.pending_connect = Some((addr_type, addr));
        Ok(())
    }

    /// Accept an inbound connect request (peripheral side). Returns the
    /// freshly allocated handle, or `None` when the peer already holds
    /// a live link.
    pub fn accept(&mut self, peer_type: AddressType, peer: BdAddr) -> Option<u16> {
        if self.find_by_peer(peer).is_some() {
            return None;
        }
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);
        self.connections.insert(
            handle,
            Connection {
                handle,
                peer,
                peer_type,
                local_role: Role::Peripheral,
                state: ConnectionState::Connected,
            },
        );
        Some(handle)
    }

    /// Adopt the handle assigned by an accepting peripheral (central
    /// side). Returns false for unsolicited accepts, which are dropped.
    pub fn adopt(&mut self, handle: u16, peer_type: AddressType, peer: BdAddr) -> bool {
        match self.pending_connect {
            Some((_, pending)) if pending == peer => {
                self.pending_connect = None;
                self.connections.insert(
                    handle,
                    Connection {
                        handle,
                        peer,
                        peer_type,
                        local_role: Role::Central,
                        state: ConnectionState::Connected,
                    },
                );
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, handle: u16) -> Option<&Connection> {
        self.connections.get(&handle)
    }

    pub fn get_mut(&mut self, handle: u16) -> Option<&mut Connection> {
        self.connections.get_mut(&handle)
    }

    /// Whether the handle refers to a live link that has not begun
    /// teardown.
    pub fn is_established(&self, handle: u16) -> bool {
        self.connections
            .get(&handle)
            .map(|c| c.state != ConnectionState::Disconnecting)
            .unwrap_or(false)
    }

    /// Retire a handle. Idempotent: retiring an unknown handle returns
    /// `None` and is not an error.
    pub fn remove(&mut self, handle: u16) -> Option<Connection> {
        self.connections.remove(&handle)
    }

    pub fn find_by_peer(&self, peer: BdAddr) -> Option<&Connection> {
        self.connections.values().find(|c| c.peer == peer)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> BdAddr {
        BdAddr::new([n; 6])
    }

    #[test]
    fn accept_allocates_increasing_handles() {
        let mut mgr = ConnectionManager::new();
        let a = mgr.accept(AddressType::Public, peer(1)).unwrap();
        let b = mgr.accept(AddressType::Public, peer(2)).unwrap();
        assert!(b > a);
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn at_most_one_live_handle_per_peer() {
        let mut mgr = ConnectionManager::new();
        assert!(mgr.accept(AddressType::Public, peer(1)).is_some());
        assert!(mgr.accept(AddressType::Public, peer(1)).is_none());

        assert!(matches!(
            mgr.begin_connect(AddressType::Public, peer(1)),
            Err(GattError::NotPermitted)
        ));
    }

    #[test]
    fn adopt_requires_matching_pending_connect() {
        let mut mgr = ConnectionManager::new();
        assert!(!mgr.adopt(9, AddressType::Public, peer(1)));

        mgr.begin_connect(AddressType::Public, peer(1)).unwrap();
        assert!(!mgr.adopt(9, AddressType::Public, peer(2)));
        assert!(mgr.adopt(9, AddressType::Public, peer(1)));
        assert_eq!(mgr.get(9).unwrap().local_role, Role::Central);

        // Pending slot is consumed by the adopt
        assert!(!mgr.adopt(10, AddressType::Public, peer(1)));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut mgr = ConnectionManager::new();
        let handle = mgr.accept(AddressType::Public, peer(1)).unwrap();
        assert!(mgr.remove(handle).is_some());
        assert!(mgr.remove(handle).is_none());
        assert!(!mgr.is_established(handle));
    }
}
