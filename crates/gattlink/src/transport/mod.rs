//! Opaque datagram transport
//!
//! The engine treats the radio as a reliable, ordered datagram channel
//! that already handles link-layer encoding and timing. This module
//! defines that seam plus an in-process loopback implementation used to
//! wire two engines together in the same process.

pub mod pdu;

use crate::error::GattResult;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub use pdu::Pdu;

/// A reliable, ordered, non-blocking datagram channel to one peer.
pub trait Transport: Send {
    /// Queue a datagram for delivery to the peer.
    fn send(&self, datagram: &[u8]) -> GattResult<()>;

    /// Take the next inbound datagram, if one has arrived.
    fn recv(&self) -> Option<Vec<u8>>;
}

type Queue = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// One end of an in-process loopback channel.
pub struct LoopbackEndpoint {
    outbound: Queue,
    inbound: Queue,
}

/// Create a pair of linked endpoints. Datagrams sent on one end arrive
/// on the other, in order.
pub fn loopback_pair() -> (LoopbackEndpoint, LoopbackEndpoint) {
    let a = Arc::new(Mutex::new(VecDeque::new()));
    let b = Arc::new(Mutex::new(VecDeque::new()));
    (
        LoopbackEndpoint {
            outbound: Arc::clone(&a),
            inbound: Arc::clone(&b),
        },
        LoopbackEndpoint {
            outbound: b,
            inbound: a,
        },
    )
}

impl Transport for LoopbackEndpoint {
    fn send(&self, datagram: &[u8]) -> GattResult<()> {
        self.outbound.lock().unwrap().push_back(datagram.to_vec());
        Ok(())
    }

    fn recv(&self) -> Option<Vec<u8>> {
        self.inbound.lock().unwrap().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_delivers_in_order_both_ways() {
        let (a, b) = loopback_pair();

        a.send(b"one").unwrap();
        a.send(b"two").unwrap();
        assert_eq!(b.recv().as_deref(), Some(&b"one"[..]));
        assert_eq!(b.recv().as_deref(), Some(&b"two"[..]));
        assert_eq!(b.recv(), None);

        b.send(b"back").unwrap();
        assert_eq!(a.recv().as_deref(), Some(&b"back"[..]));
    }
}
