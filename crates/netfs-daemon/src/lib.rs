//! NetFS Daemon - TCP server and client protocol adapter
//!
//! This crate provides:
//! - Transport primitives that guarantee full-length reads/writes over a
//!   stream socket that may deliver partial data per call
//! - The four server-side request handlers (LIST, GET_ATTRIBUTES, OPEN, READ)
//! - The connection dispatcher with its bounded worker governor
//! - The client protocol adapter consumed by a filesystem-integration layer
//!
//! # Architecture
//!
//! ```text
//! integration layer -> NetfsClient -> Transport -> TCP
//!                                                   |
//!            NetfsServer (accept + governor) <------+
//!                     |
//!            handler (one worker per connection)
//!                     |
//!            attribute translator / real filesystem
//! ```
//!
//! Every connection carries exactly one request/response exchange and is
//! then closed by the server. Workers share no mutable state; the governor
//! semaphore is the only synchronization point.

pub mod client;
pub mod handlers;
pub mod server;
pub mod transfer;
pub mod transport;

pub use client::{ClientError, NetfsClient};
pub use handlers::Service;
pub use server::NetfsServer;
pub use transfer::FileStream;
pub use transport::{Transport, TransportError};

/// Default bound on concurrent request workers
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Buffer size for the buffered (non-sendfile) file transfer path
pub const TRANSFER_BUF_SIZE: usize = 64 * 1024;
