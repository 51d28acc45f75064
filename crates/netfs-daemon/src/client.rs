//! Client protocol adapter
//!
//! The client-side mirror of the request handlers, consumed by a
//! filesystem-integration layer. Each operation opens a fresh TCP
//! connection, performs one exchange, and lets the server close it; no
//! state crosses connections. Premature closure is always an error here,
//! never silently treated as success.

use std::io;

use tokio::net::TcpStream;
use tracing::debug;

use netfs_core::config::{ClientConfig, TransportConfig};
use netfs_core::translate::resolve_owner;
use netfs_core::{wire, wirepath, AttrRecord, MessageType, ProtocolError, Status};
use netfs_core::{ATTR_RECORD_LEN, MAX_NAME_LEN};

use crate::transport::{Transport, TransportError};

/// Errors surfaced to the integration layer. The core never retries; the
/// caller decides what a failure means for its own operation.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("not a directory")]
    NotADirectory,

    #[error("server reported an I/O failure")]
    RemoteIo,
}

impl ClientError {
    /// Map to a libc errno for the filesystem-integration layer.
    pub fn to_errno(&self) -> i32 {
        match self {
            ClientError::NotFound => libc::ENOENT,
            ClientError::AccessDenied => libc::EACCES,
            ClientError::NotADirectory => libc::ENOTDIR,
            ClientError::Connect { .. } => libc::EHOSTUNREACH,
            _ => libc::EIO,
        }
    }

    fn from_status(status: Status) -> Result<(), ClientError> {
        match status {
            Status::Ok => Ok(()),
            Status::NotFound => Err(ClientError::NotFound),
            Status::AccessDenied => Err(ClientError::AccessDenied),
            Status::NotADirectory => Err(ClientError::NotADirectory),
            Status::Io => Err(ClientError::RemoteIo),
        }
    }
}

/// NetFS client adapter. Cheap to clone; holds no connection.
#[derive(Clone, Debug)]
pub struct NetfsClient {
    host: String,
    port: u16,
    transport: TransportConfig,
    euid: u32,
}

impl NetfsClient {
    pub fn new(config: &ClientConfig, transport: TransportConfig) -> Self {
        // SAFETY: geteuid has no failure modes and touches no memory.
        let euid = unsafe { libc::geteuid() };
        Self::with_identity(config, transport, euid)
    }

    /// Explicit local identity, used by tests to simulate distinct clients.
    pub fn with_identity(config: &ClientConfig, transport: TransportConfig, euid: u32) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            transport,
            euid,
        }
    }

    async fn request(
        &self,
        msg_type: MessageType,
        path: &str,
    ) -> Result<Transport<TcpStream>, ClientError> {
        let payload = wirepath::encode_path(path)?;
        let addr = format!("{}:{}", self.host, self.port);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let mut transport = Transport::new(stream, &self.transport);
        transport
            .write_header(msg_type, payload.len() as u64)
            .await?;
        transport.write_exact(&payload).await?;
        transport.flush().await?;
        Ok(transport)
    }

    /// Enumerate directory entries. Order is whatever the server's
    /// filesystem yields; an empty directory is a valid empty listing.
    pub async fn list(&self, path: &str) -> Result<Vec<String>, ClientError> {
        let mut transport = self.request(MessageType::List, path).await?;
        ClientError::from_status(transport.read_status().await?)?;

        let mut names = Vec::new();
        loop {
            let len = transport.read_u16().await?;
            if len == 0 {
                break;
            }
            if len as usize > MAX_NAME_LEN {
                return Err(ProtocolError::NameTooLong(len as usize).into());
            }
            let mut buf = vec![0u8; len as usize];
            transport.read_exact(&mut buf).await?;
            names.push(String::from_utf8_lossy(&buf).into_owned());
        }

        debug!("list {}: {} entries", path, names.len());
        Ok(names)
    }

    /// Fetch one entry's attributes, with the owner sentinel resolved to
    /// this client's identity. The root is answered locally: the server
    /// would synthesize the identical record anyway.
    pub async fn get_attributes(&self, path: &str) -> Result<AttrRecord, ClientError> {
        if wirepath::is_root(path) {
            let mut record = AttrRecord::synthetic_root();
            record.owner_id = resolve_owner(record.owner_id, self.euid);
            return Ok(record);
        }

        let mut transport = self.request(MessageType::GetAttributes, path).await?;
        ClientError::from_status(transport.read_status().await?)?;

        let mut buf = [0u8; ATTR_RECORD_LEN];
        transport.read_exact(&mut buf).await?;
        let mut record = wire::decode_attr(&buf)?;
        record.owner_id = resolve_owner(record.owner_id, self.euid);
        Ok(record)
    }

    /// Probe that the path can be opened read-only on the server.
    pub async fn open(&self, path: &str) -> Result<(), ClientError> {
        let mut transport = self.request(MessageType::Open, path).await?;
        ClientError::from_status(transport.read_status().await?)
    }

    /// Read up to `length` bytes at `offset`. The result may be shorter
    /// than requested; the returned length is the true read length.
    pub async fn read(&self, path: &str, offset: u64, length: u64) -> Result<Vec<u8>, ClientError> {
        let mut transport = self.request(MessageType::Read, path).await?;
        transport.write_u64(offset).await?;
        transport.write_u64(length).await?;
        transport.flush().await?;

        ClientError::from_status(transport.read_status().await?)?;
        let promised = transport.read_u32().await?;

        // Fewer bytes than promised is a short read, not an error.
        let data = transport.read_at_most(promised as usize).await?;
        debug!(
            "read {} offset={} length={}: promised={} received={}",
            path,
            offset,
            length,
            promised,
            data.len()
        );
        Ok(data)
    }
}
