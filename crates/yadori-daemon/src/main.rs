//! yadori-daemon: the Yadori service process.
//!
//! Single OS process running a Tokio async runtime. UIs talk to it via
//! JSON-RPC over a Unix socket in the data directory.

use std::sync::{Arc, Mutex};

use tokio::signal::unix::SignalKind;
use tracing::{error, info};
use yadori_daemon::config::DaemonConfig;
use yadori_daemon::rpc::RpcServer;
use yadori_daemon::{triggers, DaemonState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config (it carries the log settings)
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("yadori={}", config.advanced.log_level).parse()?);
    if config.advanced.log_file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.advanced.log_file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }

    info!("Yadori daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 3. Open database
    let conn = yadori_db::open(&data_dir.join("yadori.db"))?;

    // 4. Build daemon state
    let state = Arc::new(DaemonState::new(config, conn)?);
    if state.geocoder.has_token() {
        info!("Geocoding enabled");
    } else {
        info!("No geocoding token; address search disabled");
    }

    // 5. Start push triggers
    let _push_triggers = triggers::spawn(&state.feed, state.db.clone(), state.push.clone());

    // 6. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    // 7. Run the RPC server until shutdown
    let mut terminate = tokio::signal::unix::signal(SignalKind::terminate())?;
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = terminate.recv() => {
            info!("SIGTERM received, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    info!("Daemon shutting down gracefully");
    let _ = std::fs::remove_file(&socket_path);
    info!("Daemon stopped");
    Ok(())
}
