//! defender-node binary
//!
//! Headless Defender node: runs the tick spinner, the event bus and one
//! network endpoint (client or server) until interrupted.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                         | Default           | Description                      |
//! |-----------------------------|-------------------|----------------------------------|
//! | `DEFENDER_ROLE`             | `client`          | `client` or `server`             |
//! | `DEFENDER_ADDRESS`          | `127.0.0.1:24100` | Server address (connect / bind)  |
//! | `DEFENDER_RECEIVER`         | `client-receiver` | Receiver name announced to server|
//! | `DEFENDER_FPS`              | `40`              | Frames per second                |
//! | `DEFENDER_MINIMUM_FPS`      | `4`               | Lower bound used to clamp deltas |
//! | `DEFENDER_CLIENT_TO_SERVER` | requests          | Allow-list, comma separated      |
//! | `DEFENDER_SERVER_TO_CLIENT` | game state        | Allow-list, comma separated      |
//!
//! Command-line flags override both.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use defender_events::{
    bus::EventBus,
    config::NodeConfig,
    endpoint::{NetworkEndpoint, Role},
    event::{Event, Listener, ListenerError},
    receiver::EventReceiver,
    registry::ObjectRegistry,
    spinner::{self, TickSpinner},
    transport::{
        tcp::{TcpClientTransport, TcpServerTransport},
        Transport,
    },
};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Client,
    Server,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Client => Role::Client,
            RoleArg::Server => Role::Server,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "defender-node", about = "Defender event node", version)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "DEFENDER_CONFIG")]
    config: Option<PathBuf>,

    /// Run as client or server
    #[arg(long, value_enum)]
    role: Option<RoleArg>,

    /// Server address (client connects, server binds)
    #[arg(long)]
    address: Option<String>,

    /// Frames per second
    #[arg(long)]
    fps: Option<u32>,
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// Logs every non-frame event that crosses the bus.
struct EventLog;

impl Listener for EventLog {
    fn notify(&mut self, event: &Event, _bus: &EventBus) -> Result<(), ListenerError> {
        match event {
            Event::Tick { .. } | Event::Render => {}
            other => match other.origin() {
                Some(origin) => log::debug!("event {} from {}", other.name(), origin),
                None => log::debug!("event {}", other.name()),
            },
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("defender_events=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut cfg = NodeConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(role) = args.role {
        cfg.role = role.into();
    }
    if let Some(address) = args.address {
        cfg.address = address;
    }
    if let Some(fps) = args.fps {
        cfg.fps = fps;
    }

    let addr = cfg.socket_addr()?;
    let allow = cfg.allow_list()?;

    tracing::info!(
        role = %cfg.role,
        address = %addr,
        fps = cfg.fps,
        "starting defender-node"
    );

    // Bus + shared registries
    let bus = EventBus::new();
    let objects = Rc::new(ObjectRegistry::new());

    let spinner = Rc::new(RefCell::new(TickSpinner::new(cfg.fps, cfg.minimum_fps)));
    let receiver = Rc::new(RefCell::new(EventReceiver::new(
        cfg.receiver.clone(),
        objects.clone(),
    )));
    let transport: Box<dyn Transport> = match cfg.role {
        Role::Client => {
            Box::new(TcpClientTransport::new(addr).with_connect_timeout(cfg.connect_timeout()))
        }
        Role::Server => Box::new(TcpServerTransport::new(addr)),
    };
    let endpoint = Rc::new(RefCell::new(
        NetworkEndpoint::new(cfg.role, transport, allow, objects).with_receiver(receiver.clone()),
    ));
    let event_log = Rc::new(RefCell::new(EventLog));

    bus.register(&spinner);
    bus.register(&receiver);
    bus.register(&endpoint);
    bus.register(&event_log);

    // Run until quit or Ctrl-C
    tokio::select! {
        _ = spinner::run(&spinner, &bus) => {}
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.context("waiting for Ctrl-C")?;
            log::info!("interrupted, shutting down");
            bus.post(Event::ProgramQuit);
            bus.post(Event::tick(0.0));
        }
    }

    log::info!(
        "defender-node stopped after {} ticks (endpoint {})",
        spinner.borrow().ticks(),
        endpoint.borrow().state()
    );

    bus.unregister(&event_log);
    bus.unregister(&endpoint);
    bus.unregister(&receiver);
    bus.unregister(&spinner);
    Ok(())
}
