//! harness-gatewayd
//!
//! Control-plane stream protocol daemon: accepts NDJSON connections,
//! authenticates them, and dispatches commands against the Domain Store,
//! the Session Registry, and the Subscription Multiplexer.

mod auth;
mod config;
mod connection;
mod dispatch;
mod gateway;
mod listener;
mod logging;
mod migration_runner;
mod persistence;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::{Config, ConfigOverrides};
use crate::dispatch::Dispatcher;
use crate::logging::init_logging;
use crate::persistence::{create_persistence_channel, load_startup_snapshot, PersistenceWriter};
use harness_registry::{DomainStore, SessionRegistry, SubscriptionMultiplexer};

pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "harness-gatewayd",
    about = "Control-plane stream protocol and session multiplexer daemon",
    version = VERSION
)]
struct Cli {
    /// Runtime directory (default: ~/.harness)
    #[arg(long, global = true, env = "HARNESS_RUNTIME")]
    runtime_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the control-plane daemon in the foreground
    Start {
        /// Port to bind (0 lets the OS choose)
        #[arg(long, env = "HARNESS_CONTROL_PLANE_PORT")]
        port: Option<u16>,

        /// Auth token clients must present in the first `auth` envelope
        #[arg(long, env = "HARNESS_CONTROL_PLANE_TOKEN")]
        token: Option<String>,
    },

    /// Stop a running daemon by signaling the PID in the gateway record
    Stop {
        /// Send SIGKILL instead of SIGTERM
        #[arg(long)]
        force: bool,
    },

    /// Report whether a daemon is running, per the gateway record
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        runtime_dir: cli.runtime_dir.clone(),
        ..Default::default()
    };

    match cli.command {
        Command::Status => {
            let config = Config::resolve(overrides);
            return cmd_status(&config);
        }
        Command::Stop { force } => {
            let config = Config::resolve(overrides);
            return cmd_stop(&config, force);
        }
        Command::Start { port, token } => {
            let overrides = ConfigOverrides {
                port,
                auth_token: token,
                ..overrides
            };
            let config = Config::resolve(overrides);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async_main(config))
        }
    }
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    config.ensure_dirs()?;

    let logging = init_logging(&config)?;
    let run_id = logging.run_id.clone();
    let _log_guard = logging.guard;
    let root_span = tracing::info_span!("gatewayd", service = "harness-gatewayd", run_id = %run_id);
    let _root_span_guard = root_span.enter();

    info!(
        component = "server",
        event = "server.starting",
        run_id = %run_id,
        version = VERSION,
        pid = std::process::id(),
        runtime_dir = %config.runtime_dir.display(),
        "Starting harness-gatewayd"
    );

    let db_path = config.db_path();
    {
        let mut conn = rusqlite::Connection::open(&db_path)?;
        migration_runner::run_migrations(&mut conn)?;
    }

    let (persist_tx, persist_rx) = create_persistence_channel();
    let persistence_writer = PersistenceWriter::new(persist_rx, db_path.clone());
    tokio::spawn(persistence_writer.run());

    let store = Arc::new(match load_startup_snapshot(&db_path) {
        Ok(snapshot) => {
            let restored = snapshot.directories.len()
                + snapshot.repositories.len()
                + snapshot.conversations.len()
                + snapshot.tasks.len();
            let mut state = harness_registry::store::StoreState::new();
            for d in snapshot.directories {
                state.directories.insert(d.directory_id.clone(), d);
            }
            for r in snapshot.repositories {
                state.repositories.insert(r.repository_id.clone(), r);
            }
            for c in snapshot.conversations {
                state.conversations.insert(c.conversation_id.clone(), c);
            }
            for t in snapshot.tasks {
                state.tasks.insert(t.task_id.clone(), t);
            }
            info!(
                component = "restore",
                event = "restore.complete",
                restored_count = restored,
                "Restored domain store state from disk"
            );
            DomainStore::restore(state)
        }
        Err(err) => {
            warn!(
                component = "restore",
                event = "restore.failed",
                error = %err,
                "Failed to load startup snapshot — starting with an empty store"
            );
            DomainStore::new()
        }
    });

    let sessions = Arc::new(SessionRegistry::new());
    let multiplexer = Arc::new(SubscriptionMultiplexer::new());
    let dispatcher = Arc::new(Dispatcher::new(store, sessions, multiplexer, persist_tx.clone()));

    let tcp_listener = listener::bind(&config).await?;
    let bound_port = tcp_listener.local_addr()?.port();

    let record = gateway::GatewayRecord::new(std::process::id(), bound_port, Some(config.auth_token.clone()));
    let record_path = gateway::default_record_path(&config);
    gateway::write_record(&record_path, &record)?;

    info!(
        component = "server",
        event = "server.listening",
        port = bound_port,
        "Listening for connections"
    );

    let (shutdown_handle, shutdown_rx) = shutdown::ShutdownHandle::new();
    let config = Arc::new(config);

    let listener_task = tokio::spawn(listener::run(
        tcp_listener,
        config.clone(),
        dispatcher.clone(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!(component = "server", event = "server.shutdown", "Shutdown signal received");

    shutdown_handle.trigger();
    shutdown::drain(&config, &dispatcher).await;
    let _ = listener_task.await;

    gateway::remove_record(&record_path);
    Ok(())
}

fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let record_path = gateway::default_record_path(config);
    println!();
    println!("  harness-gatewayd v{}", VERSION);
    println!("  Runtime dir: {}", config.runtime_dir.display());

    match gateway::status(&record_path)? {
        gateway::GatewayStatus::Running(record) => {
            println!("  PID: {} (running)", record.pid);
            println!("  Port: {}", record.port);
            println!("  Started: {}", record.started_at);
        }
        gateway::GatewayStatus::Stale(record) => {
            println!("  PID: {} (stale — process not found)", record.pid);
        }
        gateway::GatewayStatus::Stopped => {
            println!("  Not running.");
        }
    }

    println!();
    Ok(())
}

fn cmd_stop(config: &Config, force: bool) -> anyhow::Result<()> {
    let record_path = gateway::default_record_path(config);
    match gateway::status(&record_path)? {
        gateway::GatewayStatus::Running(record) => {
            let signal = if force { libc::SIGKILL } else { libc::SIGTERM };
            unsafe {
                libc::kill(record.pid as i32, signal);
            }
            println!("  Sent {} to pid {}", if force { "SIGKILL" } else { "SIGTERM" }, record.pid);
        }
        gateway::GatewayStatus::Stale(_) | gateway::GatewayStatus::Stopped => {
            println!("  No running daemon found.");
            gateway::remove_record(&record_path);
        }
    }
    Ok(())
}
