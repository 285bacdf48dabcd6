//! Target session loop: connect to the controller, receive frames, and
//! dispatch them into the apply pipeline.
//!
//! The target is the passive side: it never sends on the session. A session
//! ends on any transport failure, a protocol-violation frame, or the 30 s
//! receive timeout; the loop then backs off for a fixed 3 s and reconnects,
//! indefinitely, until the process shuts down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use mouseshare_core::{decode_payload, FrameHeader, HEADER_SIZE};

use crate::application::apply_input::ApplyInput;
use crate::infrastructure::network::transport::{self, TransportError, CONNECT_TIMEOUT, RECV_TIMEOUT};
use crate::infrastructure::synthesize::SynthesizePort;

/// Fixed delay between reconnect attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

/// Options for the target role.
#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub recv_timeout: Duration,
    pub reconnect_backoff: Duration,
}

impl JoinOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECT_TIMEOUT,
            recv_timeout: RECV_TIMEOUT,
            reconnect_backoff: RECONNECT_BACKOFF,
        }
    }
}

enum SessionEnd {
    /// Session died; reconnect after the backoff.
    Lost(String),
    Shutdown,
}

/// Runs the target role until shutdown. Reconnects forever; a failed
/// connect is not fatal.
pub async fn run(
    opts: JoinOptions,
    screen: (i32, i32),
    synth: Arc<dyn SynthesizePort>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    let mut apply = ApplyInput::new(synth, screen.0, screen.1);

    while running.load(Ordering::SeqCst) {
        info!("connecting to {}:{}", opts.host, opts.port);

        let connected = tokio::select! {
            _ = shutdown.notified() => break,
            result = transport::connect(&opts.host, opts.port, opts.connect_timeout) => result,
        };

        match connected {
            Ok(stream) => {
                info!("connected to controller");
                // The write half stays open (and unused) for the session's
                // lifetime; dropping it early would half-close our side.
                let (mut reader, _write_half) = stream.into_split();

                let end = run_session(&mut reader, &mut apply, opts.recv_timeout, &shutdown).await;
                apply.reset();

                match end {
                    SessionEnd::Lost(reason) => warn!("session ended: {reason}"),
                    SessionEnd::Shutdown => break,
                }
            }
            Err(e) => {
                warn!("connection failed: {e}");
            }
        }

        if !running.load(Ordering::SeqCst) {
            break;
        }
        debug!("reconnecting in {:?}", opts.reconnect_backoff);
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(opts.reconnect_backoff) => {}
        }
    }

    info!("target stopped");
}

/// Receives and dispatches frames until the session dies.
async fn run_session(
    reader: &mut OwnedReadHalf,
    apply: &mut ApplyInput,
    recv_timeout: Duration,
    shutdown: &Arc<Notify>,
) -> SessionEnd {
    let mut header_buf = [0u8; HEADER_SIZE];
    let mut payload = Vec::new();

    loop {
        let received = tokio::select! {
            _ = shutdown.notified() => return SessionEnd::Shutdown,
            result = transport::recv_exact(reader, &mut header_buf, recv_timeout) => result,
        };
        if let Err(e) = received {
            return SessionEnd::Lost(describe_transport_error(e));
        }

        let header = match FrameHeader::decode(&header_buf) {
            Ok(h) => h,
            Err(e) => {
                // Protocol violation: session-fatal.
                error!("{e}");
                return SessionEnd::Lost(e.to_string());
            }
        };

        payload.resize(header.payload_size as usize, 0);
        if !payload.is_empty() {
            let received = tokio::select! {
                _ = shutdown.notified() => return SessionEnd::Shutdown,
                result = transport::recv_exact(reader, &mut payload, recv_timeout) => result,
            };
            if let Err(e) = received {
                return SessionEnd::Lost(describe_transport_error(e));
            }
        }

        match decode_payload(header.type_id, &payload) {
            Ok(Some(event)) => {
                if let Err(e) = apply.handle_event(&event) {
                    // Injection failures degrade the session but do not end it.
                    error!("apply error: {e}");
                }
            }
            Ok(None) => {
                debug!("skipping unknown event type {}", header.type_id);
            }
            Err(e) => {
                error!("{e}");
                return SessionEnd::Lost(e.to_string());
            }
        }
    }
}

fn describe_transport_error(e: TransportError) -> String {
    match e {
        TransportError::RecvTimeout => "receive timeout".to_string(),
        TransportError::Closed => "connection closed by controller".to_string(),
        other => other.to_string(),
    }
}
