//! NetFS Core - Shared types, wire codec, and attribute translation
//!
//! This crate contains the foundational pieces used by both sides of the
//! protocol. It has no dependencies on networking or async code: the codec
//! works on byte slices, and the attribute translator is a pure function of
//! a stat result and the server's identity.

pub mod config;
pub mod error;
pub mod translate;
pub mod types;
pub mod wire;
pub mod wirepath;

pub use config::{ClientConfig, Config, ServerConfig, TransportConfig};
pub use error::ProtocolError;
pub use types::{AttrRecord, MessageType, Status};

/// Default TCP port for the NetFS server
pub const DEFAULT_PORT: u16 = 5555;

/// Fixed header size: message_length (8) + message_type (2)
pub const HEADER_LEN: usize = 10;

/// Fixed attribute record size on the wire
pub const ATTR_RECORD_LEN: usize = 56;

/// Status word size on the wire
pub const STATUS_LEN: usize = 4;

/// Maximum path length in bytes (excluding the NUL terminator)
pub const MAX_PATH_LEN: usize = 4096;

/// Maximum request payload: a path plus its terminator
pub const MAX_PAYLOAD_LEN: usize = MAX_PATH_LEN + 1;

/// Maximum directory entry name length in bytes
pub const MAX_NAME_LEN: usize = 255;
