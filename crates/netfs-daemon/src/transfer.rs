//! Platform-specific bulk file transfer
//!
//! The READ data path moves file bytes straight into the socket with
//! sendfile(2) where the platform provides it (Linux TCP sockets), and
//! falls back to a buffered pread+send loop everywhere else, including the
//! in-memory duplex streams the tests run against.

use std::fs::File;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::TRANSFER_BUF_SIZE;

/// Largest single sendfile submission; keeps one worker from hogging the
/// reactor on a huge range.
const MAX_SENDFILE_CHUNK: u64 = 1024 * 1024;

/// A byte stream that can accept a file range, zero-copy when possible.
///
/// The default implementation is the portable buffered loop; transports
/// with a kernel fast path override it.
#[async_trait]
pub trait FileStream: AsyncRead + AsyncWrite + Unpin + Send {
    /// Send `len` bytes of `file` starting at `offset`. Returns the bytes
    /// actually sent, which is short if the file ends early or the peer
    /// stops accepting data.
    async fn send_file_range(&mut self, file: &File, offset: u64, len: u64) -> io::Result<u64> {
        copy_range_buffered(file, self, offset, len).await
    }
}

/// Buffered pread+send loop, the portable transfer path. The pread runs on
/// the blocking pool so a slow disk never stalls a runtime thread.
pub async fn copy_range_buffered<W>(
    file: &File,
    sink: &mut W,
    offset: u64,
    len: u64,
) -> io::Result<u64>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let reader = Arc::new(file.try_clone()?);
    let mut buf = vec![0u8; TRANSFER_BUF_SIZE.min(len as usize).max(1)];
    let mut sent = 0u64;

    while sent < len {
        let want = ((len - sent) as usize).min(buf.len());
        let pos = offset + sent;
        let reader = reader.clone();

        let (returned, n) = tokio::task::spawn_blocking(move || {
            use std::os::unix::fs::FileExt;
            let n = reader.read_at(&mut buf[..want], pos)?;
            Ok::<_, io::Error>((buf, n))
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        buf = returned;

        if n == 0 {
            // File ended before the requested range; short transfer.
            break;
        }
        sink.write_all(&buf[..n]).await?;
        sent += n as u64;
    }

    sink.flush().await?;
    Ok(sent)
}

impl FileStream for tokio::io::DuplexStream {}

#[cfg(target_os = "linux")]
#[async_trait]
impl FileStream for TcpStream {
    async fn send_file_range(&mut self, file: &File, offset: u64, len: u64) -> io::Result<u64> {
        use std::os::unix::io::AsRawFd;
        use tokio::io::Interest;

        let file_fd = file.as_raw_fd();
        let mut off = offset as libc::off_t;
        let mut total = 0u64;

        while total < len {
            let remaining = len - total;
            self.writable().await?;

            let result = self.try_io(Interest::WRITABLE, || {
                let count = remaining.min(MAX_SENDFILE_CHUNK) as usize;
                let n = unsafe { libc::sendfile(self.as_raw_fd(), file_fd, &mut off, count) };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as u64)
                }
            });

            match result {
                // sendfile returns 0 once the file has no more bytes at off
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e)
                    if e.raw_os_error() == Some(libc::EINVAL)
                        || e.raw_os_error() == Some(libc::ENOSYS) =>
                {
                    // Source filesystem cannot back sendfile; buffered path
                    // picks up where the kernel left off.
                    let sent =
                        copy_range_buffered(file, self, offset + total, len - total).await?;
                    return Ok(total + sent);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(total)
    }
}

#[cfg(not(target_os = "linux"))]
impl FileStream for TcpStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_buffered_copy_full_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let file = File::open(&path).unwrap();
        let (mut read_end, mut write_end) = tokio::io::duplex(64 * 1024);

        let len = content.len() as u64;
        let sender =
            tokio::spawn(
                async move { copy_range_buffered(&file, &mut write_end, 0, len).await },
            );

        let mut received = Vec::new();
        read_end.read_to_end(&mut received).await.unwrap();
        assert_eq!(sender.await.unwrap().unwrap(), len);
        assert_eq!(received, content);
    }

    #[tokio::test]
    async fn test_buffered_copy_offset_and_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let file = File::open(&path).unwrap();
        let (mut read_end, mut write_end) = tokio::io::duplex(1024);

        // Ask for 100 bytes at offset 6: only 4 exist.
        let sender =
            tokio::spawn(async move { copy_range_buffered(&file, &mut write_end, 6, 100).await });

        let mut received = Vec::new();
        read_end.read_to_end(&mut received).await.unwrap();
        assert_eq!(sender.await.unwrap().unwrap(), 4);
        assert_eq!(received, b"6789");
    }

    #[tokio::test]
    async fn test_buffered_copy_offset_past_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();

        let file = File::open(&path).unwrap();
        let (mut read_end, mut write_end) = tokio::io::duplex(64);

        let sender =
            tokio::spawn(async move { copy_range_buffered(&file, &mut write_end, 10, 5).await });

        let mut received = Vec::new();
        read_end.read_to_end(&mut received).await.unwrap();
        assert_eq!(sender.await.unwrap().unwrap(), 0);
        assert!(received.is_empty());
    }
}
