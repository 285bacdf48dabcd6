//! Controller session loop: listen, accept one target at a time, pump hook
//! events through the forward pipeline, and keep the session alive.
//!
//! Sessions are strictly one at a time. The loop owns the session socket for
//! its whole life; the hook thread only reaches the session through the
//! pipeline's send gate. Every way out of a session (peer failure, protocol
//! error, shutdown) runs the same teardown: control released to LOCAL,
//! capture off, socket half-closed, peer flag cleared.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{error, info, warn};

use mouseshare_core::{Event, PeerTable, ScreenEdge, ScreenInfoEvent};

use crate::application::forward_input::{EventSink, ForwardInput, WATCHDOG_TIMEOUT};
use crate::infrastructure::capture::{CaptureError, CapturePort, CapturedEvent};
use crate::infrastructure::network::transport::{self, SessionWriter, TransportError};

/// Interval between KEEPALIVE frames; the watchdog is checked on the same
/// tick.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Error type for the serve loop. Everything here is init-fatal; session
/// failures are handled inside the loop.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("failed to spawn hook bridge thread: {0}")]
    SpawnFailed(std::io::Error),
}

/// Options for the controller role.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub bind: IpAddr,
    pub port: u16,
    /// The screen edge targets sit behind; seeds the peer layout on accept.
    pub edge: ScreenEdge,
    pub keepalive_interval: Duration,
    pub watchdog_timeout: Duration,
}

impl ServeOptions {
    pub fn new(port: u16, edge: ScreenEdge) -> Self {
        Self {
            bind: IpAddr::from([0u8, 0, 0, 0]),
            port,
            edge,
            keepalive_interval: KEEPALIVE_INTERVAL,
            watchdog_timeout: WATCHDOG_TIMEOUT,
        }
    }
}

enum SessionEnd {
    PeerLost,
    Shutdown,
}

/// Runs the controller role until shutdown.
///
/// # Errors
///
/// Returns [`ServeError`] only for init failures (bind, hook start); those
/// map to exit code 1.
pub async fn run(
    opts: ServeOptions,
    screen: (i32, i32),
    capture: Arc<dyn CapturePort>,
    peers: Arc<Mutex<PeerTable>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) -> Result<(), ServeError> {
    let listener = transport::listen(SocketAddr::new(opts.bind, opts.port))?;
    let local_addr = listener.local_addr().map_err(TransportError::Io)?;
    info!("listening on {local_addr}");

    let raw_events = capture.start()?;

    // Bridge the hook's synchronous channel onto the runtime. The thread
    // exits when capture.stop() drops the sender.
    let (event_tx, mut event_rx) = mpsc::channel::<CapturedEvent>(1024);
    let bridge = std::thread::Builder::new()
        .name("mouseshare-hook-bridge".to_string())
        .spawn(move || {
            for event in raw_events {
                if event_tx.blocking_send(event).is_err() {
                    break;
                }
            }
        })
        .map_err(ServeError::SpawnFailed)?;

    let writer = Arc::new(SessionWriter::new());
    let mut pipeline = ForwardInput::new(
        screen.0,
        screen.1,
        Arc::clone(&peers),
        Arc::clone(&writer) as Arc<dyn EventSink>,
        Arc::clone(&capture),
    );
    let control = pipeline.control();

    while running.load(Ordering::SeqCst) {
        info!("waiting for a target to connect");
        let accepted = tokio::select! {
            _ = shutdown.notified() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                // Transient: keep accepting.
                warn!("accept failed: {e}");
                continue;
            }
        };
        if let Err(e) = transport::configure_accepted(&stream) {
            warn!("could not tune session socket: {e}");
        }

        let (read_half, write_half) = stream.into_split();
        // The controller never reads from the session; failures surface on
        // send.
        drop(read_half);
        writer.attach(write_half).await;

        let peer_name = {
            let mut table = peers.lock().expect("peer table lock poisoned");
            table.connect_peer_at(peer_addr.ip(), opts.edge)
        };
        info!("target connected from {peer_addr} ({peer_name})");

        // Events observed while no session existed are stale; an old edge
        // crossing must not switch the fresh session.
        while event_rx.try_recv().is_ok() {}

        let end = run_session(&opts, screen, &writer, &mut pipeline, &mut event_rx, &shutdown).await;

        // Unconditional session teardown: LOCAL, capture released, socket
        // half-closed, peer flag cleared.
        control.release_to_local();
        writer.close().await;
        {
            let mut table = peers.lock().expect("peer table lock poisoned");
            table.set_connected(&peer_name, false);
        }
        info!("target disconnected ({peer_name})");

        if matches!(end, SessionEnd::Shutdown) {
            break;
        }
    }

    // Final teardown: socket already closed above; stop the hook so the
    // bridge thread unblocks, then join it, then reset peer flags.
    control.release_to_local();
    writer.close().await;
    capture.stop();
    let _ = bridge.join();
    peers
        .lock()
        .expect("peer table lock poisoned")
        .reset_connected();
    info!("controller stopped");
    Ok(())
}

/// Drives one session until it fails, the hook closes, or shutdown begins.
async fn run_session(
    opts: &ServeOptions,
    screen: (i32, i32),
    writer: &Arc<SessionWriter>,
    pipeline: &mut ForwardInput,
    events: &mut mpsc::Receiver<CapturedEvent>,
    shutdown: &Arc<Notify>,
) -> SessionEnd {
    // The target needs our geometry before any switch can be scaled.
    if let Err(e) = writer
        .send_event(&Event::ScreenInfo(ScreenInfoEvent {
            width: screen.0,
            height: screen.1,
            x: 0,
            y: 0,
        }))
        .await
    {
        error!("could not send screen info: {e}");
        return SessionEnd::PeerLost;
    }

    let control = pipeline.control();
    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + opts.keepalive_interval,
        opts.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => return SessionEnd::Shutdown,

            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    warn!("hook event stream closed");
                    return SessionEnd::Shutdown;
                };
                if let Err(e) = pipeline.handle_event(event).await {
                    // Control is already back to LOCAL; drop the session.
                    error!("session send failed: {e}");
                    return SessionEnd::PeerLost;
                }
            }

            _ = keepalive.tick() => {
                control.check_watchdog(opts.watchdog_timeout);
                if let Err(e) = writer.send_event(&Event::Keepalive).await {
                    control.release_to_local();
                    error!("keepalive failed: {e}");
                    return SessionEnd::PeerLost;
                }
            }
        }
    }
}
