//! Error types for the NetFS protocol

use thiserror::Error;

/// Protocol-level errors. The receiving side must close the connection on
/// any of these rather than guess at peer state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed header: need {need} bytes, got {got}")]
    MalformedHeader { need: usize, got: usize },

    #[error("unknown message type: {0}")]
    UnknownMessageType(u16),

    #[error("unknown status word: {0}")]
    UnknownStatus(u32),

    #[error("truncated payload: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("invalid path: {0}")]
    BadPath(String),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("directory entry name too long: {0} bytes")]
    NameTooLong(usize),
}
