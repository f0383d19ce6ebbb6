//! Event bus and event waiting
//!
//! All engine state transitions surface to the application as tagged
//! events delivered through a single registered callback. Events from
//! one connection are delivered in the order their underlying transport
//! events occurred; there is no ordering guarantee across connections.

use crate::error::{GattError, GattResult};
use crate::gap::{AddressType, BdAddr};
use crate::gatt::types::CharacteristicProperty;
use crate::uuid::Uuid;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// An engine event with its payload, decoded once at the bus boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A central connected to the local server.
    CentralConnect {
        conn: u16,
        addr_type: AddressType,
        addr: BdAddr,
    },
    /// A central disconnected from the local server.
    CentralDisconnect {
        conn: u16,
        addr_type: AddressType,
        addr: BdAddr,
    },
    /// A peer wrote to a local characteristic value.
    AttributeWrite { conn: u16, handle: u16 },
    /// The local client connected to a peripheral.
    PeripheralConnect {
        conn: u16,
        addr_type: AddressType,
        addr: BdAddr,
    },
    /// The local client's link to a peripheral went down.
    PeripheralDisconnect {
        conn: u16,
        addr_type: AddressType,
        addr: BdAddr,
    },
    /// One service produced by a discovery sweep.
    ServiceDiscovered {
        conn: u16,
        start_handle: u16,
        end_handle: u16,
        uuid: Uuid,
    },
    /// One characteristic produced by a discovery sweep.
    CharacteristicDiscovered {
        conn: u16,
        decl_handle: u16,
        value_handle: u16,
        properties: CharacteristicProperty,
        uuid: Uuid,
    },
    /// Completion of a client-initiated read.
    ReadResult {
        conn: u16,
        handle: u16,
        value: Vec<u8>,
    },
    /// Completion of an acknowledged client write. Fires exactly once
    /// per acknowledged write; never for write-without-response.
    WriteStatus { conn: u16, status: u8 },
    /// A server-initiated notification.
    Notify {
        conn: u16,
        handle: u16,
        value: Vec<u8>,
    },
}

/// Discriminant of an [`Event`], for predicate matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CentralConnect,
    CentralDisconnect,
    AttributeWrite,
    PeripheralConnect,
    PeripheralDisconnect,
    ServiceDiscovered,
    CharacteristicDiscovered,
    ReadResult,
    WriteStatus,
    Notify,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::CentralConnect { .. } => EventKind::CentralConnect,
            Event::CentralDisconnect { .. } => EventKind::CentralDisconnect,
            Event::AttributeWrite { .. } => EventKind::AttributeWrite,
            Event::PeripheralConnect { .. } => EventKind::PeripheralConnect,
            Event::PeripheralDisconnect { .. } => EventKind::PeripheralDisconnect,
            Event::ServiceDiscovered { .. } => EventKind::ServiceDiscovered,
            Event::CharacteristicDiscovered { .. } => EventKind::CharacteristicDiscovered,
            Event::ReadResult { .. } => EventKind::ReadResult,
            Event::WriteStatus { .. } => EventKind::WriteStatus,
            Event::Notify { .. } => EventKind::Notify,
        }
    }

    /// The connection handle this event belongs to.
    pub fn conn(&self) -> u16 {
        match self {
            Event::CentralConnect { conn, .. }
            | Event::CentralDisconnect { conn, .. }
            | Event::AttributeWrite { conn, .. }
            | Event::PeripheralConnect { conn, .. }
            | Event::PeripheralDisconnect { conn, .. }
            | Event::ServiceDiscovered { conn, .. }
            | Event::CharacteristicDiscovered { conn, .. }
            | Event::ReadResult { conn, .. }
            | Event::WriteStatus { conn, .. }
            | Event::Notify { conn, .. } => *conn,
        }
    }
}

/// Event callback type.
pub type EventHandler = Box<dyn FnMut(&Event) + Send>;

/// Single-callback dispatcher.
///
/// `register` installs exactly one handler (last writer wins) and
/// `emit` delivers synchronously before returning to the component
/// that triggered the emission. Handlers must not call back into the
/// engine; the engine is mutably borrowed for the duration of the
/// delivery, so re-entrant calls cannot compile in safe code.
#[derive(Default)]
pub struct EventBus {
    handler: Option<EventHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { handler: None }
    }

    /// Install the event handler, replacing any previous one.
    pub fn register(&mut self, handler: EventHandler) {
        self.handler = Some(handler);
    }

    /// Deliver an event. Emitting with no registered handler is a no-op.
    pub fn emit(&mut self, event: &Event) {
        if let Some(handler) = self.handler.as_mut() {
            handler(event);
        }
    }
}

struct RecorderInner {
    events: VecDeque<Event>,
    capacity: usize,
    generation: u64,
}

/// Bounded event history with a generation counter.
///
/// Replaces polling a single shared last-event slot: callers query the
/// recorder for "has X happened" predicates without racing on global
/// state. Cloning shares the underlying queue, so a clone captured by
/// the bus handler and a clone held by the caller observe the same
/// history. When full, the oldest event is dropped.
#[derive(Clone)]
pub struct EventRecorder {
    inner: Arc<Mutex<RecorderInner>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecorderInner {
                events: VecDeque::with_capacity(capacity),
                capacity,
                generation: 0,
            })),
        }
    }

    /// Build a bus handler that appends every event to this recorder.
    pub fn handler(&self) -> EventHandler {
        let inner = Arc::clone(&self.inner);
        Box::new(move |event| {
            let mut guard = inner.lock().unwrap();
            if guard.events.len() == guard.capacity {
                guard.events.pop_front();
            }
            guard.events.push_back(event.clone());
            guard.generation += 1;
        })
    }

    /// Total number of events ever recorded.
    pub fn generation(&self) -> u64 {
        self.inner.lock().unwrap().generation
    }

    /// The most recently recorded event.
    pub fn last(&self) -> Option<Event> {
        self.inner.lock().unwrap().events.back().cloned()
    }

    /// The most recent event matching the predicate.
    pub fn find<P: Fn(&Event) -> bool>(&self, predicate: P) -> Option<Event> {
        let guard = self.inner.lock().unwrap();
        guard.events.iter().rev().find(|e| predicate(e)).cloned()
    }

    /// Number of retained events matching the predicate.
    pub fn count<P: Fn(&Event) -> bool>(&self, predicate: P) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.events.iter().filter(|e| predicate(e)).count()
    }

    /// Snapshot of the retained events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().events.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().events.clear();
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `drive` until `predicate` holds or `timeout` elapses.
///
/// The engine never blocks and never times out internally; all timeout
/// policy lives in callers. `drive` is expected to advance the engines
/// under test (typically by calling `poll` on each).
pub fn wait_until<D, P>(timeout: Duration, mut drive: D, mut predicate: P) -> GattResult<()>
where
    D: FnMut(),
    P: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(GattError::Timeout);
        }
        drive();
        std::thread::yield_now();
    }
}
