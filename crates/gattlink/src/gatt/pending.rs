//! Write-status tracking
//!
//! Correlates outstanding acknowledged writes with their eventual
//! status. Transaction ids are monotonically increasing and never
//! reused, so an id created on a closed connection can never be
//! matched against a later connection's responses.

use std::collections::HashMap;

/// Outstanding acknowledged writes, keyed by transaction id.
pub struct PendingWrites {
    next_txid: u32,
    entries: HashMap<u32, u16>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self {
            next_txid: 0,
            entries: HashMap::new(),
        }
    }

    /// Allocate a transaction id for an acknowledged write on `conn`.
    pub fn allocate(&mut self, conn: u16) -> u32 {
        self.next_txid += 1;
        self.entries.insert(self.next_txid, conn);
        self.next_txid
    }

    /// Resolve a transaction, returning the connection it was created
    /// on. Resolves at most once; a second completion for the same id
    /// returns `None`.
    pub fn complete(&mut self, txid: u32) -> Option<u16> {
        self.entries.remove(&txid)
    }

    /// Invalidate every outstanding transaction for a connection,
    /// returning how many were dropped.
    pub fn drop_connection(&mut self, conn: u16) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, owner| *owner != conn);
        before - self.entries.len()
    }

    /// Number of outstanding transactions for a connection.
    pub fn outstanding(&self, conn: u16) -> usize {
        self.entries.values().filter(|owner| **owner == conn).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingWrites {
    fn default() -> Self {
        Self::new()
    }
}
