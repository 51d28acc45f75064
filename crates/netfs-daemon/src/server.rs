//! Connection dispatcher and concurrency governor
//!
//! The server accepts one TCP connection per request, decodes the header,
//! and routes it to a handler running in its own worker task. Admission
//! control is a bounded semaphore: a permit is acquired before the next
//! accept, so the number of in-flight workers can never exceed the
//! configured maximum and a full house blocks further accepts at the
//! OS listen backlog, not in application code. Permits are owned by the
//! worker task and released on drop, including on panic.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use netfs_core::config::{ServerConfig, TransportConfig};

use crate::handlers::{self, Service};
use crate::transport::{Transport, TransportError};

/// The NetFS server: listener, service root, and worker governor.
pub struct NetfsServer {
    service: Arc<Service>,
    transport: TransportConfig,
    governor: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    listener: TcpListener,
}

impl NetfsServer {
    /// Bind the listening socket. Serving starts with [`NetfsServer::serve`].
    pub async fn bind(config: &ServerConfig, transport: TransportConfig) -> io::Result<Self> {
        let addr = SocketAddr::new(config.bind, config.port);
        let listener = TcpListener::bind(addr).await?;

        info!(
            "netfs listening on {} serving {:?} (max {} workers)",
            listener.local_addr()?,
            config.root,
            config.max_workers
        );

        Ok(Self {
            service: Arc::new(Service::new(config.root.clone())),
            transport,
            governor: Arc::new(Semaphore::new(config.max_workers.max(1))),
            active: Arc::new(AtomicUsize::new(0)),
            listener,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Workers currently servicing connections. Observability only; the
    /// governor is what enforces the bound.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept loop. Runs until the listener fails irrecoverably.
    pub async fn serve(&self) -> io::Result<()> {
        loop {
            // Block here when at the worker cap; a finished worker's
            // dropped permit is what lets the next accept proceed.
            let permit = match self.governor.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Semaphore closed; nothing left to do.
                    return Ok(());
                }
            };

            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            };
            debug!("accepted connection from {}", peer);

            let service = self.service.clone();
            let transport = self.transport.clone();
            let guard = WorkerGuard::enter(self.active.clone());

            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;

                if let Err(e) = handle_connection(&service, stream, &transport).await {
                    debug!("request from {} failed: {}", peer, e);
                }
            });
        }
    }
}

/// One request/response exchange, then the connection closes on drop.
async fn handle_connection(
    service: &Service,
    stream: TcpStream,
    config: &TransportConfig,
) -> Result<(), TransportError> {
    let mut transport = Transport::new(stream, config);
    let (msg_type, payload_len) = transport.read_header().await?;
    debug!("handling request: type={:?} length={}", msg_type, payload_len);
    handlers::dispatch(service, &mut transport, msg_type, payload_len).await
}

/// Keeps the in-flight gauge honest whatever way the worker exits.
struct WorkerGuard(Arc<AtomicUsize>);

impl WorkerGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, NetfsClient};
    use netfs_core::config::{ClientConfig, ServerConfig};
    use netfs_core::wire;
    use netfs_core::MessageType;
    use std::fs;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    fn loopback_config(root: std::path::PathBuf, max_workers: usize) -> ServerConfig {
        ServerConfig {
            root,
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            max_workers,
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let dir = TempDir::new().unwrap();
        let server = NetfsServer::bind(
            &loopback_config(dir.path().to_path_buf(), 2),
            TransportConfig::default(),
        )
        .await
        .unwrap();

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.active_workers(), 0);
    }

    /// Bind on an ephemeral port, start serving, and hand back a client
    /// pointed at it. The server task runs until the test ends.
    async fn start_server(root: std::path::PathBuf, max_workers: usize) -> (Arc<NetfsServer>, NetfsClient) {
        let server = Arc::new(
            NetfsServer::bind(
                &loopback_config(root, max_workers),
                TransportConfig::default(),
            )
            .await
            .unwrap(),
        );
        let addr = server.local_addr().unwrap();

        let serving = server.clone();
        tokio::spawn(async move {
            let _ = serving.serve().await;
        });

        let config = ClientConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let client = NetfsClient::with_identity(&config, TransportConfig::default(), 7777);
        (server, client)
    }

    #[tokio::test]
    async fn test_end_to_end_list() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("alpha.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join("photos")).unwrap();

        let (_server, client) = start_server(dir.path().to_path_buf(), 4).await;

        let mut names = client.list("/").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["alpha.txt", "photos"]);

        let empty = client.list("/photos").await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_attributes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data.bin"), vec![0u8; 1234]).unwrap();

        let (_server, client) = start_server(dir.path().to_path_buf(), 4).await;

        let record = client.get_attributes("/data.bin").await.unwrap();
        assert!(record.is_file());
        assert_eq!(record.size, 1234);
        // The file belongs to this process, so it crosses the wire as the
        // service sentinel and resolves to the client's own identity.
        assert_eq!(record.owner_id, 7777);
        // Write bits are stripped on the way out.
        assert_eq!(record.mode & 0o222, 0);

        let err = client.get_attributes("/missing").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound));
    }

    #[tokio::test]
    async fn test_end_to_end_open_and_read() {
        let dir = TempDir::new().unwrap();
        let body: Vec<u8> = (0..200u8).collect();
        fs::write(dir.path().join("blob"), &body).unwrap();

        let (_server, client) = start_server(dir.path().to_path_buf(), 4).await;

        client.open("/blob").await.unwrap();
        assert!(matches!(
            client.open("/nope").await.unwrap_err(),
            ClientError::NotFound
        ));

        let all = client.read("/blob", 0, 1024).await.unwrap();
        assert_eq!(all, body);

        // Offset near the end: the reply promises only what exists.
        let tail = client.read("/blob", 190, 100).await.unwrap();
        assert_eq!(tail, &body[190..]);

        let past = client.read("/blob", 5000, 10).await.unwrap();
        assert!(past.is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let (_server, client) = start_server(dir.path().to_path_buf(), 4).await;

        let err = client.list("/../etc").await.unwrap_err();
        assert!(matches!(err, ClientError::AccessDenied));
    }

    #[tokio::test]
    async fn test_worker_bound_holds_under_stalled_clients() {
        let dir = TempDir::new().unwrap();
        let (server, client) = start_server(dir.path().to_path_buf(), 2).await;
        let addr = server.local_addr().unwrap();

        // Five connections that send a header and then stall; each occupies
        // a worker inside the payload read.
        let mut stalled = Vec::new();
        for _ in 0..5 {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(&wire::encode_header(MessageType::List, 10))
                .await
                .unwrap();
            stalled.push(stream);
        }

        // Let the accept loop and workers settle, then check the gauge
        // never exceeds the cap.
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(server.active_workers() <= 2);
        }
        assert_eq!(server.active_workers(), 2);

        // Releasing the stalled connections frees workers; a real request
        // then gets through.
        drop(stalled);
        let names = client.list("/").await.unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn test_worker_guard_tracks_scope() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let _a = WorkerGuard::enter(counter.clone());
            let _b = WorkerGuard::enter(counter.clone());
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
