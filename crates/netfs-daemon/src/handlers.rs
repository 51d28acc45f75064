//! Server-side request handlers
//!
//! One handler per request type. Each handler owns the connection from the
//! decoded header until close: it reads the path payload of exactly the
//! announced length, resolves it onto the service root, and answers with a
//! status word followed by the response body. Filesystem failures become
//! statuses, never crashes, and every code path writes a defined response.

use std::io;
use std::path::PathBuf;

use tokio::fs;
use tracing::{debug, warn};

use netfs_core::translate::record_from_metadata;
use netfs_core::{wire, wirepath, AttrRecord, MessageType, Status};

use crate::transfer::FileStream;
use crate::transport::{Transport, TransportError};

/// The exported tree plus the identity attributes are translated against.
#[derive(Clone, Debug)]
pub struct Service {
    root: PathBuf,
    euid: u32,
}

impl Service {
    /// Service rooted at `root`, using the process's effective uid for
    /// identity redaction.
    pub fn new(root: PathBuf) -> Self {
        // SAFETY: geteuid has no failure modes and touches no memory.
        let euid = unsafe { libc::geteuid() };
        Self::with_identity(root, euid)
    }

    /// Explicit identity, used by tests to exercise both redaction arms.
    pub fn with_identity(root: PathBuf, euid: u32) -> Self {
        Self { root, euid }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn resolve(&self, wire_path: &str) -> Result<PathBuf, Status> {
        wirepath::resolve(&self.root, wire_path).map_err(|e| {
            warn!("rejected path {:?}: {}", wire_path, e);
            Status::AccessDenied
        })
    }
}

/// Route a decoded header to its handler.
pub async fn dispatch<S: FileStream>(
    service: &Service,
    transport: &mut Transport<S>,
    msg_type: MessageType,
    payload_len: u64,
) -> Result<(), TransportError> {
    match msg_type {
        MessageType::List => handle_list(service, transport, payload_len).await,
        MessageType::GetAttributes => handle_getattr(service, transport, payload_len).await,
        MessageType::Open => handle_open(service, transport, payload_len).await,
        MessageType::Read => handle_read(service, transport, payload_len).await,
    }
}

/// LIST: status, then length-prefixed names, then the zero terminator.
pub async fn handle_list<S: FileStream>(
    service: &Service,
    transport: &mut Transport<S>,
    payload_len: u64,
) -> Result<(), TransportError> {
    let path = transport.read_path(payload_len).await?;
    debug!("list: {}", path);

    let resolved = match service.resolve(&path) {
        Ok(p) => p,
        Err(status) => return transport.write_status(status).await,
    };

    let mut entries = match fs::read_dir(&resolved).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("list {:?} failed: {}", resolved, e);
            return transport.write_status(status_for(&e)).await;
        }
    };

    transport.write_status(Status::Ok).await?;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                // The status is already committed; end the stream early
                // rather than poison it, but leave a trace.
                warn!("listing {:?} ended early: {}", resolved, e);
                break;
            }
        };
        let name = entry.file_name();
        match wire::encode_dir_entry(name_bytes(&name)) {
            Ok(encoded) => transport.write_exact(&encoded).await?,
            Err(e) => {
                // Unrepresentable name; skip rather than poison the stream.
                warn!("skipping entry {:?}: {}", name, e);
            }
        }
    }

    transport.write_exact(&wire::DIR_STREAM_END).await?;
    transport.flush().await
}

/// GET_ATTRIBUTES: status, then on success the 56-byte translated record.
/// The root path is answered synthetically without touching the filesystem.
pub async fn handle_getattr<S: FileStream>(
    service: &Service,
    transport: &mut Transport<S>,
    payload_len: u64,
) -> Result<(), TransportError> {
    let path = transport.read_path(payload_len).await?;
    debug!("getattr: {}", path);

    if wirepath::is_root(&path) {
        transport.write_status(Status::Ok).await?;
        transport
            .write_exact(&wire::encode_attr(&AttrRecord::synthetic_root()))
            .await?;
        return transport.flush().await;
    }

    let resolved = match service.resolve(&path) {
        Ok(p) => p,
        Err(status) => return transport.write_status(status).await,
    };

    match fs::metadata(&resolved).await {
        Ok(meta) => {
            let record = record_from_metadata(&meta, service.euid);
            transport.write_status(Status::Ok).await?;
            transport.write_exact(&wire::encode_attr(&record)).await?;
            transport.flush().await
        }
        Err(e) => {
            debug!("getattr {:?} failed: {}", resolved, e);
            transport.write_status(status_for(&e)).await
        }
    }
}

/// OPEN: probe that the path opens read-only; status is the whole response.
/// Nothing survives the connection, so READ re-resolves on its own.
pub async fn handle_open<S: FileStream>(
    service: &Service,
    transport: &mut Transport<S>,
    payload_len: u64,
) -> Result<(), TransportError> {
    let path = transport.read_path(payload_len).await?;
    debug!("open: {}", path);

    let resolved = match service.resolve(&path) {
        Ok(p) => p,
        Err(status) => return transport.write_status(status).await,
    };

    let status = match fs::File::open(&resolved).await {
        Ok(_) => Status::Ok,
        Err(e) => {
            debug!("open {:?} failed: {}", resolved, e);
            status_for(&e)
        }
    };

    transport.write_status(status).await?;
    transport.flush().await
}

/// READ: after the path, the client sends `offset: u64` and `length: u64`.
/// The response is status, the promised byte count (never more than the
/// file holds past `offset`), then exactly that many content bytes. A
/// short transfer simply ends the stream early.
pub async fn handle_read<S: FileStream>(
    service: &Service,
    transport: &mut Transport<S>,
    payload_len: u64,
) -> Result<(), TransportError> {
    let path = transport.read_path(payload_len).await?;
    let offset = transport.read_u64().await?;
    let length = transport.read_u64().await?;
    debug!("read: {} offset={} length={}", path, offset, length);

    let resolved = match service.resolve(&path) {
        Ok(p) => p,
        Err(status) => return transport.write_status(status).await,
    };

    let file = match fs::File::open(&resolved).await {
        Ok(f) => f,
        Err(e) => {
            debug!("read open {:?} failed: {}", resolved, e);
            return transport.write_status(status_for(&e)).await;
        }
    };

    let file_size = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => {
            debug!("read stat {:?} failed: {}", resolved, e);
            return transport.write_status(status_for(&e)).await;
        }
    };

    let promised = length
        .min(file_size.saturating_sub(offset))
        .min(u64::from(u32::MAX)) as u32;

    transport.write_status(Status::Ok).await?;
    transport.write_u32(promised).await?;

    // The transfer path works on the raw descriptor (sendfile or pread).
    let file = file.into_std().await;
    let sent = transport
        .send_file_range(&file, offset, u64::from(promised))
        .await?;
    if sent < u64::from(promised) {
        // The file shrank under us; the client sees the short count as the
        // true read length.
        debug!("short transfer on {:?}: {} of {}", resolved, sent, promised);
    }

    transport.flush().await
}

fn status_for(e: &io::Error) -> Status {
    match e.kind() {
        io::ErrorKind::NotFound => Status::NotFound,
        io::ErrorKind::PermissionDenied => Status::AccessDenied,
        _ if e.raw_os_error() == Some(libc::ENOTDIR) => Status::NotADirectory,
        _ => Status::Io,
    }
}

#[cfg(unix)]
fn name_bytes(name: &std::ffi::OsStr) -> &[u8] {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes()
}
