use std::fs::OpenOptions;
use std::sync::Arc;

use roster_agent::activity::ActivityBroadcaster;
use roster_agent::agent::EchoAgent;
use roster_agent::client::RosterClient;
use roster_agent::config::AgentConfig;
use roster_agent::server::{self, AppState};
use roster_agent::tasks::TaskManager;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> roster_agent::Result<()> {
    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export ROSTER_RUNTIME_IP=... ROSTER_AGENT_NAME=... ROSTER_AGENT_PORT=...");
        std::process::exit(1);
    });

    // Initialize tracing; keep the guard alive so the file writer flushes on exit
    let (file_layer, _log_guard) = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("🤖 Roster agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Agent: {}", config.agent_name);
    eprintln!("   Runtime: {}", config.runtime_ip);
    eprintln!("   API: {}", config.api_url);
    eprintln!("   Listening: http://{}\n", config.bind_addr());

    let activity = ActivityBroadcaster::new();
    let client = RosterClient::new(config.api_url.clone(), config.status_update_path.clone());
    let tasks = TaskManager::new(Arc::new(client));
    let agent = Arc::new(EchoAgent::new(Arc::clone(&activity), config.step_delay));

    let app = server::router(AppState::new(agent, tasks.clone(), activity));
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(agent = %config.agent_name, addr = %config.bind_addr(), "Agent entrypoint started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(running = tasks.running_count(), "Entrypoint stopped, cancelling tasks");
    tasks.shutdown().await;
    info!("Agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
