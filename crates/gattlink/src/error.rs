//! Error types for the gattlink library
//!
//! This module defines the error taxonomy used throughout the library.

use thiserror::Error;

/// Errors surfaced by the GATT engine.
///
/// Handle, permission, and registration errors fail the offending call
/// synchronously; they are never deferred into an event. A lost
/// connection surfaces as a disconnect event, not as an error.
#[derive(Error, Debug)]
pub enum GattError {
    #[error("Invalid attribute or connection handle: {0}")]
    InvalidHandle(u16),

    #[error("Operation requires an active connection")]
    NotConnected,

    #[error("Operation not permitted for this attribute")]
    NotPermitted,

    #[error("Service registration error: {0}")]
    Registration(String),

    #[error("Invalid PDU")]
    InvalidPdu,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation timed out")]
    Timeout,
}

/// Result type used throughout the library.
pub type GattResult<T> = Result<T, GattError>;
