//! GAP (Generic Access Profile) types
//!
//! Device addressing and link roles. Connection establishment itself is
//! delegated to the transport; this module only provides the vocabulary
//! the engine and its events use to talk about peers.

pub mod types;

pub use types::{AddressType, BdAddr, Role};
