//! Transport primitives
//!
//! Reliable full-length reads and writes over a stream socket. A single
//! socket call may transfer fewer bytes than requested; everything here
//! loops until the requested length has moved or the peer is gone. Each
//! operation runs under a configurable timeout so a stalled peer cannot
//! pin a worker forever.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use netfs_core::config::TransportConfig;
use netfs_core::{wire, wirepath, MessageType, ProtocolError, Status};
use netfs_core::{HEADER_LEN, MAX_PAYLOAD_LEN, STATUS_LEN};

use crate::transfer::FileStream;

/// Transport-level errors. Never retried by the core; always surfaced.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// Peer closed the connection before the full length arrived
    #[error("connection closed mid-message")]
    ConnectionClosed,

    #[error("write failed: {0}")]
    Write(String),

    #[error("operation timed out")]
    TimedOut,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A framed stream carrying one request/response exchange.
///
/// Generic over the underlying stream so handlers can be exercised against
/// in-memory duplex pipes in tests.
pub struct Transport<S> {
    stream: S,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<S> Transport<S> {
    pub fn new(stream: S, config: &TransportConfig) -> Self {
        Self {
            stream,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

async fn timed<T, F>(limit: Option<Duration>, fut: F) -> Result<io::Result<T>, TransportError>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(d) => timeout(d, fut).await.map_err(|_| TransportError::TimedOut),
        None => Ok(fut.await),
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Transport<S> {
    /// Read exactly `buf.len()` bytes, looping over partial deliveries.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let result = timed(self.read_timeout, self.stream.read_exact(buf)).await?;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(TransportError::ConnectionClosed)
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    /// Write all of `bytes`, looping over partial sends.
    pub async fn write_exact(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        timed(self.write_timeout, self.stream.write_all(bytes))
            .await?
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    pub async fn flush(&mut self) -> Result<(), TransportError> {
        timed(self.write_timeout, self.stream.flush())
            .await?
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    /// Read and decode the fixed message header.
    pub async fn read_header(&mut self) -> Result<(MessageType, u64), TransportError> {
        let mut buf = [0u8; HEADER_LEN];
        self.read_exact(&mut buf).await?;
        Ok(wire::decode_header(&buf)?)
    }

    pub async fn write_header(
        &mut self,
        msg_type: MessageType,
        payload_len: u64,
    ) -> Result<(), TransportError> {
        self.write_exact(&wire::encode_header(msg_type, payload_len))
            .await
    }

    /// Read a request payload of exactly `len` bytes and decode it as a
    /// wire path. Length is validated before any allocation.
    pub async fn read_path(&mut self, len: u64) -> Result<String, TransportError> {
        if len < 2 {
            // No room for even "/" plus its terminator.
            return Err(ProtocolError::Truncated {
                expected: 2,
                got: len as usize,
            }
            .into());
        }
        if len as usize > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                size: len as usize,
                max: MAX_PAYLOAD_LEN,
            }
            .into());
        }
        let mut payload = vec![0u8; len as usize];
        self.read_exact(&mut payload).await?;
        Ok(wirepath::decode_path(&payload)?)
    }

    pub async fn read_status(&mut self) -> Result<Status, TransportError> {
        let mut buf = [0u8; STATUS_LEN];
        self.read_exact(&mut buf).await?;
        Ok(wire::decode_status(&buf)?)
    }

    pub async fn write_status(&mut self, status: Status) -> Result<(), TransportError> {
        self.write_exact(&wire::encode_status(status)).await
    }

    pub async fn read_u16(&mut self) -> Result<u16, TransportError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf).await?;
        Ok(u16::from_be_bytes(buf))
    }

    pub async fn read_u32(&mut self) -> Result<u32, TransportError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf).await?;
        Ok(u32::from_be_bytes(buf))
    }

    pub async fn read_u64(&mut self) -> Result<u64, TransportError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf).await?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Read up to `max` bytes, stopping early if the peer closes. Used for
    /// READ content where fewer bytes than promised is a valid outcome.
    pub async fn read_at_most(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let mut data = Vec::with_capacity(max.min(crate::TRANSFER_BUF_SIZE));
        let mut buf = vec![0u8; crate::TRANSFER_BUF_SIZE.min(max).max(1)];

        while data.len() < max {
            let want = (max - data.len()).min(buf.len());
            let n = timed(self.read_timeout, self.stream.read(&mut buf[..want])).await??;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }

        Ok(data)
    }

    pub async fn write_u32(&mut self, value: u32) -> Result<(), TransportError> {
        self.write_exact(&value.to_be_bytes()).await
    }

    pub async fn write_u64(&mut self, value: u64) -> Result<(), TransportError> {
        self.write_exact(&value.to_be_bytes()).await
    }
}

impl<S: FileStream> Transport<S> {
    /// Stream `len` bytes of `file` starting at `offset` into the socket,
    /// zero-copy where the platform provides it. Returns the bytes actually
    /// sent; a short count means the file shrank or the peer went away.
    pub async fn send_file_range(
        &mut self,
        file: &std::fs::File,
        offset: u64,
        len: u64,
    ) -> Result<u64, TransportError> {
        self.stream
            .send_file_range(file, offset, len)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}
