//! Connection session: exclusive owner of one transport connection
//!
//! A session owns exactly one connection to exactly one endpoint at a
//! time. Its lifecycle is observable only through the typed
//! [`SessionEvent`] channel handed back by [`Session::open`]. An error
//! that disconnects yields `Error` then `Closed`; neither is ever
//! delivered twice for the same cause.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Transport seam: produces one connection to one endpoint.
///
/// Implementations: [`TcpDialer`] (production), scripted dialers over
/// in-memory streams (tests).
pub trait Dialer: Send + Sync + 'static {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(&self, endpoint: &str) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

/// Plain TCP transport.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, endpoint: &str) -> io::Result<TcpStream> {
        TcpStream::connect(endpoint).await
    }
}

/// Lifecycle events a session reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    Error(String),
    Closed(String),
}

/// One live (or already-released) transport connection.
///
/// The underlying handle is exclusively owned and replaced wholesale on
/// reconnect; a discarded handle is never reused. Dropping the session
/// closes it, so every exit path releases the connection and detaches its
/// monitor.
#[derive(Debug)]
pub struct Session<C> {
    endpoint: String,
    writer: Option<WriteHalf<C>>,
    monitor: Option<JoinHandle<()>>,
}

impl<C: AsyncRead + AsyncWrite + Unpin + Send + 'static> Session<C> {
    /// Attempt to establish a connection within `timeout`.
    ///
    /// On success returns the session and its event channel; `Opened` is
    /// already queued on it. On timeout or refusal, any partial resources
    /// are dropped and an error is returned.
    pub async fn open<D>(
        dialer: &D,
        endpoint: &str,
        timeout: Duration,
    ) -> io::Result<(Self, mpsc::Receiver<SessionEvent>)>
    where
        D: Dialer<Conn = C>,
    {
        let conn = match tokio::time::timeout(timeout, dialer.dial(endpoint)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {endpoint} timed out after {timeout:?}"),
                ));
            }
        };

        let (reader, writer) = tokio::io::split(conn);
        let (event_tx, event_rx) = mpsc::channel(8);

        // Channel is fresh, capacity 8: cannot fail
        let _ = event_tx.try_send(SessionEvent::Opened);

        let monitor = tokio::spawn(monitor_transport(reader, event_tx));
        debug!(endpoint, "session opened");

        Ok((
            Self {
                endpoint: endpoint.to_string(),
                writer: Some(writer),
                monitor: Some(monitor),
            },
            event_rx,
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Write a payload to the transport.
    ///
    /// Returns `true` only if the session is open and the transport
    /// accepted the write. A closed session answers `false`; that is an
    /// expected condition, not an error.
    pub async fn send(&mut self, payload: &[u8]) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };

        match writer.write_all(payload).await {
            Ok(()) => writer.flush().await.is_ok(),
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "write failed");
                false
            }
        }
    }

    /// Release the connection and detach the monitor.
    ///
    /// Idempotent and safe from any state. After `close` returns, no
    /// further events from this handle can be observed, so a reconnect
    /// cannot see stale events from a prior handle.
    pub fn close(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        if self.writer.take().is_some() {
            debug!(endpoint = %self.endpoint, "session closed");
        }
    }
}

impl<C> Drop for Session<C> {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

/// Drain inbound bytes until the transport disconnects.
///
/// Payloads are not interpreted at this layer; reading serves only to
/// detect EOF and I/O errors. Emits the terminal events exactly once.
async fn monitor_transport<C>(mut reader: ReadHalf<C>, events: mpsc::Sender<SessionEvent>)
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                let _ = events
                    .send(SessionEvent::Closed("connection closed by peer".to_string()))
                    .await;
                return;
            }
            Ok(n) => trace!(bytes = n, "inbound payload discarded"),
            Err(e) => {
                let reason = e.to_string();
                let _ = events.send(SessionEvent::Error(reason.clone())).await;
                let _ = events.send(SessionEvent::Closed(reason)).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::DuplexStream;

    /// Dialer over in-memory streams. Peer halves are parked so the
    /// connection stays alive until the test drops them.
    #[derive(Clone, Default)]
    struct MemoryDialer {
        peers: Arc<Mutex<Vec<DuplexStream>>>,
    }

    impl Dialer for MemoryDialer {
        type Conn = DuplexStream;

        async fn dial(&self, _endpoint: &str) -> io::Result<DuplexStream> {
            let (local, peer) = tokio::io::duplex(1024);
            self.peers.lock().unwrap().push(peer);
            Ok(local)
        }
    }

    /// Dialer whose connection attempts never complete.
    #[derive(Clone)]
    struct StalledDialer;

    impl Dialer for StalledDialer {
        type Conn = DuplexStream;

        async fn dial(&self, _endpoint: &str) -> io::Result<DuplexStream> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_open_emits_opened() {
        let dialer = MemoryDialer::default();
        let (session, mut events) = Session::open(&dialer, "mem:1", Duration::from_secs(1))
            .await
            .unwrap();

        assert!(session.is_open());
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_timeout_is_enforced() {
        let err = Session::open(&StalledDialer, "mem:1", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_send_after_close_is_false() {
        let dialer = MemoryDialer::default();
        let (mut session, _events) = Session::open(&dialer, "mem:1", Duration::from_secs(1))
            .await
            .unwrap();

        assert!(session.send(b"ping").await);

        session.close();
        assert!(!session.send(b"ping").await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dialer = MemoryDialer::default();
        let (mut session, _events) = Session::open(&dialer, "mem:1", Duration::from_secs(1))
            .await
            .unwrap();

        session.close();
        session.close();
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_peer_eof_yields_single_closed() {
        let dialer = MemoryDialer::default();
        let (_session, mut events) = Session::open(&dialer, "mem:1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));

        dialer.peers.lock().unwrap().clear();

        assert!(matches!(events.recv().await, Some(SessionEvent::Closed(_))));
        // Monitor exits after the terminal event: channel ends, no duplicates
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_error_yields_error_then_closed() {
        let reader = tokio_test::io::Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (read_half, _write_half) = tokio::io::split(reader);
        let (tx, mut rx) = mpsc::channel(8);

        monitor_transport(read_half, tx).await;

        assert!(matches!(rx.recv().await, Some(SessionEvent::Error(_))));
        assert!(matches!(rx.recv().await, Some(SessionEvent::Closed(_))));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_no_events_after_close() {
        let dialer = MemoryDialer::default();
        let (mut session, mut events) = Session::open(&dialer, "mem:1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Opened));

        session.close();
        // Dropping the peer after close must not produce a stale Closed
        dialer.peers.lock().unwrap().clear();

        assert_eq!(events.recv().await, None);
    }
}
