//! # gattlink
//!
//! An event-driven GATT data-transfer engine for building connected
//! device pairs in one process. Each [`GattEngine`] plays both roles:
//! it can register services, advertise, and serve writes while also
//! connecting out, discovering, reading, writing, and receiving
//! notifications as a client.
//!
//! The engine is single-threaded and cooperative. All progress is made
//! inside [`GattEngine::poll`], which drains the transport and emits
//! events synchronously through the handler installed with
//! [`GattEngine::on_event`]. Callers own all timeout policy; the
//! [`event::wait_until`] helper polls a set of engines until a
//! predicate holds.
//!
//! ```no_run
//! use gattlink::gap::{AddressType, BdAddr};
//! use gattlink::transport::loopback_pair;
//! use gattlink::GattEngine;
//!
//! let (a, b) = loopback_pair();
//! let mut server = GattEngine::new(AddressType::Public, BdAddr::random(), Box::new(a));
//! let mut client = GattEngine::new(AddressType::Public, BdAddr::random(), Box::new(b));
//!
//! server.advertise(250_000, b"gattlink-demo");
//! client.connect(server.address().0, server.address().1).unwrap();
//! server.poll();
//! client.poll();
//! ```

pub mod conn;
pub mod error;
pub mod event;
pub mod gap;
pub mod gatt;
pub mod transport;
pub mod uuid;

pub use error::{GattError, GattResult};
pub use event::{Event, EventBus, EventKind, EventRecorder};
pub use gatt::{
    CharacteristicDefinition, CharacteristicProperty, GattEngine, ServiceDefinition,
};
pub use uuid::Uuid;
