//! MouseShare application entry point.
//!
//! One binary, two roles:
//!
//! ```text
//! mouseshare serve [--port N] [--edge right]    controller: share input out
//! mouseshare join <server-host> [--port N]      target: apply received input
//! ```
//!
//! `main` wires the pieces together: config, logging, the peer table, the
//! discovery beacon, and the chosen role's session loop. The platform
//! capture/synthesis backends are host-provided; this build wires the mock
//! ports, which keeps the whole protocol path real while injecting nothing
//! into the OS.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mouseshare::application::service::Service;
use mouseshare::config::{self, AppConfig};
use mouseshare::infrastructure::capture::{mock::MockCapturePort, CapturePort};
use mouseshare::infrastructure::network::discovery::{self, BeaconConfig};
use mouseshare::infrastructure::network::{join, serve};
use mouseshare::infrastructure::screen::{FixedScreenProbe, ScreenProbe};
use mouseshare::infrastructure::synthesize::{mock::MockSynthesizePort, SynthesizePort};
use mouseshare_core::{PeerTable, ScreenEdge};

#[derive(Parser)]
#[command(name = "mouseshare", version, about = "Share one mouse and keyboard across LAN machines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Share this machine's input (controller role).
    Serve {
        /// TCP port to listen on.
        #[arg(long)]
        port: Option<u16>,
        /// Screen edge the target sits behind.
        #[arg(long, value_enum)]
        edge: Option<EdgeArg>,
    },
    /// Receive and apply input from a controller (target role).
    Join {
        /// Host name or address of the controller.
        server_host: String,
        /// TCP port to connect to.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EdgeArg {
    Left,
    Right,
    Top,
    Bottom,
}

impl From<EdgeArg> for ScreenEdge {
    fn from(edge: EdgeArg) -> Self {
        match edge {
            EdgeArg::Left => ScreenEdge::Left,
            EdgeArg::Right => ScreenEdge::Right,
            EdgeArg::Top => ScreenEdge::Top,
            EdgeArg::Bottom => ScreenEdge::Bottom,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("warning: {e}; using defaults");
            AppConfig::default()
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone())),
        )
        .init();

    let name = config.general.name.clone().unwrap_or_else(config::hostname);
    let probe = FixedScreenProbe::from_env();
    let (width, height) = probe.screen_size();
    info!("host {name}, screen {width}x{height}");

    let peers = Arc::new(Mutex::new(PeerTable::new(name, width, height)));
    let service = Arc::new(Service::new(Arc::clone(&peers)));

    // Ctrl-C begins shutdown; the session loops observe the notify and the
    // running flag.
    {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                service.shutdown();
            }
        });
    }

    let result = match cli.command {
        Command::Serve { port, edge } => {
            let port = port.unwrap_or(config.network.port);
            let edge = edge.map(ScreenEdge::from).unwrap_or_else(|| {
                config::parse_edge(&config.controller.edge).unwrap_or_else(|| {
                    warn!("unknown edge '{}' in config; using right", config.controller.edge);
                    ScreenEdge::Right
                })
            });
            run_controller(&config, &service, &peers, (width, height), port, edge).await
        }
        Command::Join { server_host, port } => {
            let port = port.unwrap_or(config.network.port);
            run_target(&config, &service, &peers, (width, height), server_host, port).await
        }
    };

    service.shutdown();
    if let Err(e) = &result {
        error!("{e:#}");
    }
    result
}

async fn run_controller(
    config: &AppConfig,
    service: &Arc<Service>,
    peers: &Arc<Mutex<PeerTable>>,
    screen: (i32, i32),
    port: u16,
    edge: ScreenEdge,
) -> anyhow::Result<()> {
    let _role = service.begin_serving()?;

    let beacon = start_beacon(config, service, peers, port, true)?;

    info!("switch edge: {edge:?}; press ScrollLock to toggle control");
    let capture: Arc<dyn CapturePort> = Arc::new(MockCapturePort::new());
    let outcome = serve::run(
        serve::ServeOptions::new(port, edge),
        screen,
        capture,
        Arc::clone(peers),
        service.running(),
        service.shutdown_notify(),
    )
    .await
    .context("controller failed");

    service.shutdown();
    beacon.join();
    outcome
}

async fn run_target(
    config: &AppConfig,
    service: &Arc<Service>,
    peers: &Arc<Mutex<PeerTable>>,
    screen: (i32, i32),
    host: String,
    port: u16,
) -> anyhow::Result<()> {
    let _role = service.begin_joining()?;

    let beacon = start_beacon(config, service, peers, port, false)?;

    let synth: Arc<dyn SynthesizePort> = Arc::new(MockSynthesizePort::new());
    join::run(
        join::JoinOptions::new(host, port),
        screen,
        synth,
        service.running(),
        service.shutdown_notify(),
    )
    .await;

    service.shutdown();
    beacon.join();
    Ok(())
}

/// Starts the discovery beacon and a task that logs its change events.
fn start_beacon(
    config: &AppConfig,
    service: &Arc<Service>,
    peers: &Arc<Mutex<PeerTable>>,
    service_port: u16,
    is_server: bool,
) -> anyhow::Result<discovery::Beacon> {
    let beacon_config = BeaconConfig::new(config.network.discovery_port, service_port, is_server);
    let (beacon, mut events) =
        discovery::start_beacon(beacon_config, Arc::clone(peers), service.running())
            .context("discovery beacon failed to start")?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                discovery::PeerEvent::Discovered { name, addr } => {
                    info!("peer online: {name} ({addr})");
                }
                discovery::PeerEvent::Expired { name } => {
                    info!("peer offline: {name}");
                }
            }
        }
    });

    Ok(beacon)
}
