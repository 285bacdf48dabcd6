//! UDP broadcast discovery beacon.
//!
//! Every endpoint, whichever role it runs, keeps one UDP socket on the
//! discovery port and loops: broadcast our ANNOUNCE every 3 s, fold received
//! announces into the peer table, answer QUERYs immediately, and evict peers
//! that have gone silent. The loop runs as a blocking task on a dedicated
//! thread so synchronous socket I/O never stalls the Tokio runtime; the
//! socket carries a short read timeout and the `running` flag is checked on
//! every wakeup so shutdown is prompt.
//!
//! Table changes are posted on an `mpsc` channel as [`PeerEvent`]s, the
//! abstract change notification a UI (or just the log) subscribes to.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mouseshare_core::domain::peer::AnnounceOutcome;
use mouseshare_core::protocol::announce::{KIND_ANNOUNCE, KIND_QUERY};
use mouseshare_core::{AnnouncePacket, PeerTable, DEFAULT_DISCOVERY_PORT};

/// How often the local ANNOUNCE is broadcast.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(3);

/// Peers silent for longer than this are evicted.
pub const STALE_AFTER: Duration = Duration::from_secs(10);

/// Socket read timeout; bounds shutdown latency.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Error type for beacon startup.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn discovery thread: {0}")]
    SpawnFailed(std::io::Error),
}

/// A peer-table change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Discovered { name: String, addr: IpAddr },
    Expired { name: String },
}

/// Beacon configuration.
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    /// UDP port to bind and broadcast on.
    pub port: u16,
    /// TCP service port advertised in our announces.
    pub service_port: u16,
    /// Role flag advertised in our announces.
    pub is_server: bool,
    pub announce_interval: Duration,
    pub stale_after: Duration,
    /// Where announces are sent; the LAN broadcast address in production,
    /// loopback in tests.
    pub announce_to: SocketAddr,
}

impl BeaconConfig {
    pub fn new(port: u16, service_port: u16, is_server: bool) -> Self {
        Self {
            port,
            service_port,
            is_server,
            announce_interval: ANNOUNCE_INTERVAL,
            stale_after: STALE_AFTER,
            announce_to: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port),
        }
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_PORT, mouseshare_core::DEFAULT_PORT, false)
    }
}

/// Handle to a running beacon.
pub struct Beacon {
    thread: std::thread::JoinHandle<()>,
    local_port: u16,
}

impl Beacon {
    /// The UDP port the beacon actually bound (useful when configured as 0).
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Waits for the beacon thread to exit. Call after clearing `running`.
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Binds the discovery socket and spawns the beacon thread.
///
/// Returns the beacon handle and the change-notification receiver.
///
/// # Errors
///
/// Returns [`DiscoveryError::BindFailed`] when the discovery port is
/// unavailable.
pub fn start_beacon(
    config: BeaconConfig,
    peers: Arc<Mutex<PeerTable>>,
    running: Arc<AtomicBool>,
) -> Result<(Beacon, mpsc::Receiver<PeerEvent>), DiscoveryError> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
    let socket = bind_discovery_socket(addr)
        .map_err(|source| DiscoveryError::BindFailed { addr, source })?;
    let local_port = socket.local_addr().map(|a| a.port()).unwrap_or(config.port);

    {
        let mut table = peers.lock().expect("peer table lock poisoned");
        table.set_local_service(config.service_port, config.is_server);
    }

    let (tx, rx) = mpsc::channel(64);
    let thread = std::thread::Builder::new()
        .name("mouseshare-discovery".to_string())
        .spawn(move || beacon_loop(socket, config, peers, tx, running))
        .map_err(DiscoveryError::SpawnFailed)?;

    info!("discovery beacon on UDP {addr}");
    Ok((Beacon { thread, local_port }, rx))
}

fn bind_discovery_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.bind(&addr.into())?;
    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(READ_TIMEOUT))?;
    Ok(socket)
}

/// The announce/receive/expire loop executed on the beacon thread.
fn beacon_loop(
    socket: UdpSocket,
    config: BeaconConfig,
    peers: Arc<Mutex<PeerTable>>,
    tx: mpsc::Sender<PeerEvent>,
    running: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 512];
    let mut last_announce: Option<Instant> = None;

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();

        let due = last_announce
            .map(|t| now.duration_since(t) >= config.announce_interval)
            .unwrap_or(true);
        if due {
            send_announce(&socket, &config, &peers);
            last_announce = Some(now);
        }

        match socket.recv_from(&mut buf) {
            Ok((len, src)) => handle_datagram(&buf[..len], src, &socket, &config, &peers, &tx),
            Err(e) if is_timeout_error(&e) => {}
            Err(e) => {
                warn!("discovery recv error: {e}");
            }
        }

        let evicted = {
            let mut table = peers.lock().expect("peer table lock poisoned");
            table.evict_stale(Instant::now(), config.stale_after)
        };
        for name in evicted {
            info!("peer expired: {name}");
            let _ = tx.blocking_send(PeerEvent::Expired { name });
        }
    }

    info!("discovery beacon stopped");
}

fn handle_datagram(
    datagram: &[u8],
    src: SocketAddr,
    socket: &UdpSocket,
    config: &BeaconConfig,
    peers: &Arc<Mutex<PeerTable>>,
    tx: &mpsc::Sender<PeerEvent>,
) {
    let packet = match AnnouncePacket::decode(datagram) {
        Ok(p) => p,
        Err(e) => {
            debug!("ignoring datagram from {src}: {e}");
            return;
        }
    };

    match packet.kind {
        KIND_ANNOUNCE => {
            let outcome = {
                let mut table = peers.lock().expect("peer table lock poisoned");
                table.observe_announce(&packet, src.ip(), Instant::now())
            };
            if outcome == AnnounceOutcome::Inserted {
                info!("discovered peer {} at {}", packet.name, src.ip());
                let _ = tx.blocking_send(PeerEvent::Discovered {
                    name: packet.name.clone(),
                    addr: src.ip(),
                });
            }
        }
        KIND_QUERY => {
            debug!("discovery query from {src}");
            send_announce(socket, config, peers);
        }
        other => {
            debug!("unknown discovery kind {other} from {src}");
        }
    }
}

fn send_announce(socket: &UdpSocket, config: &BeaconConfig, peers: &Arc<Mutex<PeerTable>>) {
    let packet = {
        let table = peers.lock().expect("peer table lock poisoned");
        let local = table.local();
        AnnouncePacket::announce(
            &local.name,
            config.service_port,
            local.screen_w,
            local.screen_h,
            config.is_server,
        )
    };
    if let Err(e) = socket.send_to(&packet.encode(), config.announce_to) {
        // Broadcast may be filtered on some networks; discovery degrades to
        // receive-only rather than failing the beacon.
        debug!("announce send failed: {e}");
    }
}

fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
