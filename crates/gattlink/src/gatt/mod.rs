//! GATT engine: server role, client role, attribute store, and write
//! tracking.

pub mod engine;
pub mod pending;
pub mod store;
pub mod types;

mod client;
mod server;

#[cfg(test)]
mod tests;

pub use engine::GattEngine;
pub use pending::PendingWrites;
pub use store::{AttributeStore, ValueBuffer, DEFAULT_BUFFER_CAPACITY};
pub use types::{CharacteristicDefinition, CharacteristicProperty, ServiceDefinition};
