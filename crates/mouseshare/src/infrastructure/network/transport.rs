//! Session transport: one connected byte-stream with framed sends, exact
//! receives under a deadline, and a half-close teardown.
//!
//! Sessions carry tiny frames where latency matters far more than
//! throughput, so every socket runs with Nagle's algorithm off and
//! SO_KEEPALIVE on. Connects are non-blocking with an explicit deadline.
//! Concurrent senders serialize through [`SessionWriter`]'s lock; reads are
//! single-task per session.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time;
use tracing::debug;

use mouseshare_core::{encode_event, Event};

use crate::application::forward_input::EventSink;

/// Default deadline for establishing a session.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A session with no inbound frame for this long is dead.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors surfaced by the transport layer. All of them are session-fatal to
/// the owning loop except where the caller explicitly retries (connect).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    #[error("connect to {addr} timed out after {deadline:?}")]
    ConnectTimeout { addr: SocketAddr, deadline: Duration },

    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("receive timed out")]
    RecvTimeout,

    #[error("connection closed by peer")]
    Closed,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Monotonic milliseconds since the first call in this process; the
/// `timestamp_ms` value stamped into outbound frame headers.
pub fn timestamp_ms() -> u32 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u32
}

// ── Connect / listen ──────────────────────────────────────────────────────────

/// Opens a session to `host:port` within `deadline`.
///
/// Resolution and the deadline-bounded connect run on the blocking pool; the
/// established stream is handed to tokio with Nagle off and keepalive on.
///
/// # Errors
///
/// Returns [`TransportError::Resolve`], [`TransportError::ConnectTimeout`],
/// or [`TransportError::ConnectFailed`].
pub async fn connect(
    host: &str,
    port: u16,
    deadline: Duration,
) -> Result<TcpStream, TransportError> {
    let host_owned = host.to_string();
    let stream = tokio::task::spawn_blocking(move || -> Result<std::net::TcpStream, TransportError> {
        use std::net::ToSocketAddrs;

        let addr = (host_owned.as_str(), port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(TransportError::Resolve {
                host: host_owned.clone(),
                port,
            })?;

        let stream = std::net::TcpStream::connect_timeout(&addr, deadline).map_err(|source| {
            if source.kind() == std::io::ErrorKind::TimedOut {
                TransportError::ConnectTimeout { addr, deadline }
            } else {
                TransportError::ConnectFailed { addr, source }
            }
        })?;

        let sock = socket2::SockRef::from(&stream);
        sock.set_keepalive(true)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(stream)
    })
    .await
    .expect("connect task panicked")?;

    Ok(TcpStream::from_std(stream)?)
}

/// Binds a session listener with address reuse and keepalive enabled.
///
/// # Errors
///
/// Returns [`TransportError::BindFailed`] when the port is unavailable.
pub fn listen(addr: SocketAddr) -> Result<TcpListener, TransportError> {
    let bind = |addr: SocketAddr| -> std::io::Result<std::net::TcpListener> {
        let domain = Domain::for_address(addr);
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_keepalive(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(8)?;
        Ok(socket.into())
    };

    let listener = bind(addr).map_err(|source| TransportError::BindFailed { addr, source })?;
    Ok(TcpListener::from_std(listener)?)
}

/// Tunes an accepted session stream for low latency.
pub fn configure_accepted(stream: &TcpStream) -> Result<(), TransportError> {
    stream.set_nodelay(true)?;
    Ok(())
}

// ── Exact-length receive ──────────────────────────────────────────────────────

/// Fills `buf` completely or fails. The deadline applies to the whole call,
/// not to each underlying read.
///
/// # Errors
///
/// [`TransportError::RecvTimeout`] when the deadline expires,
/// [`TransportError::Closed`] on a clean peer close, [`TransportError::Io`]
/// otherwise. Each is session-fatal.
pub async fn recv_exact<R>(
    reader: &mut R,
    buf: &mut [u8],
    deadline: Duration,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    match time::timeout(deadline, reader.read_exact(buf)).await {
        Err(_elapsed) => Err(TransportError::RecvTimeout),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
        Ok(Err(e)) => Err(TransportError::Io(e)),
        Ok(Ok(_)) => Ok(()),
    }
}

// ── Send gate ─────────────────────────────────────────────────────────────────

/// The per-session send gate.
///
/// Holds the write half behind a lock so the event pump and the keepalive
/// tick serialize their frames. `close` performs a half-close and drops the
/// handle; it is idempotent and safe against a send racing it (the send
/// simply finds the writer gone and reports the session closed).
pub struct SessionWriter {
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl SessionWriter {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(None),
        }
    }

    /// Installs the write half of a freshly established session.
    pub async fn attach(&self, writer: OwnedWriteHalf) {
        *self.writer.lock().await = Some(writer);
    }

    pub async fn is_attached(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Writes one already-encoded frame.
    ///
    /// # Errors
    ///
    /// Any failure here is session-fatal: the owner must close the session
    /// and fall back to idle.
    pub async fn send_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        match writer.write_all(frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // A broken pipe means the session is gone; drop the handle so
                // later sends fail fast.
                *guard = None;
                Err(TransportError::Io(e))
            }
        }
    }

    /// Encodes and sends one event with the current monotonic timestamp.
    pub async fn send_event(&self, event: &Event) -> Result<(), TransportError> {
        let frame = encode_event(event, timestamp_ms());
        self.send_frame(&frame).await
    }

    /// Half-closes and releases the session socket. Idempotent.
    pub async fn close(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("session shutdown: {e}");
            }
        }
    }
}

impl Default for SessionWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for SessionWriter {
    async fn send(&self, event: &Event) -> Result<(), String> {
        self.send_event(event).await.map_err(|e| e.to_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mouseshare_core::{decode_payload, FrameHeader, MouseMoveEvent, HEADER_SIZE};

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, (server, _)) =
            tokio::join!(async { connect("127.0.0.1", addr.port(), CONNECT_TIMEOUT).await.unwrap() }, async {
                listener.accept().await.unwrap()
            });
        configure_accepted(&server).unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_send_event_round_trips_over_loopback() {
        let (mut client, server) = loopback_pair().await;

        let writer = SessionWriter::new();
        let (_server_read, write_half) = server.into_split();
        writer.attach(write_half).await;

        let sent = Event::MouseMove(MouseMoveEvent { x: 10, y: 20, dx: 1, dy: 2 });
        writer.send_event(&sent).await.unwrap();

        let mut header_buf = [0u8; HEADER_SIZE];
        recv_exact(&mut client, &mut header_buf, RECV_TIMEOUT).await.unwrap();
        let header = FrameHeader::decode(&header_buf).unwrap();
        let mut payload = vec![0u8; header.payload_size as usize];
        recv_exact(&mut client, &mut payload, RECV_TIMEOUT).await.unwrap();

        let decoded = decode_payload(header.type_id, &payload).unwrap().unwrap();
        assert_eq!(decoded, sent);
    }

    #[tokio::test]
    async fn test_recv_exact_times_out_when_no_data_arrives() {
        let (_client, server) = loopback_pair().await;
        let (mut reader, _write_half) = server.into_split();

        let mut buf = [0u8; 4];
        let result = recv_exact(&mut reader, &mut buf, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TransportError::RecvTimeout)));
    }

    #[tokio::test]
    async fn test_recv_exact_reports_peer_close() {
        let (client, server) = loopback_pair().await;
        drop(client);
        let (mut reader, _write_half) = server.into_split();

        let mut buf = [0u8; 4];
        let result = recv_exact(&mut reader, &mut buf, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_send_without_attached_writer_fails() {
        let writer = SessionWriter::new();
        let result = writer.send_event(&Event::Keepalive).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_detaches() {
        let (client, server) = loopback_pair().await;
        drop(client);

        let writer = SessionWriter::new();
        let (_reader, write_half) = server.into_split();
        writer.attach(write_half).await;

        writer.close().await;
        writer.close().await;
        assert!(!writer.is_attached().await);
        assert!(writer.send_event(&Event::Keepalive).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Bind then drop to get a port nothing is listening on.
        let listener = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect("127.0.0.1", port, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_listen_twice_on_same_port_fails() {
        let first = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();
        let second = listen(addr);
        assert!(matches!(second, Err(TransportError::BindFailed { .. })));
    }

    #[test]
    fn test_timestamp_ms_is_monotonic() {
        let a = timestamp_ms();
        let b = timestamp_ms();
        assert!(b >= a);
    }
}
