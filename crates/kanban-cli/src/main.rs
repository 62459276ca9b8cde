mod config;
mod config_watcher;

use clap::{Parser, Subcommand};
use config_watcher::ConfigWatcher;
use kanban_core::TicketStatus;
use kanban_gateway::{AuthConfig, GatewayServer};
use kanban_orchestrator::Orchestrator;
use kanban_store::{FileTicketStore, TicketStore};
use kanban_tracker::{IssueTracker, JiraClient, TrackerSync};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kanban", about = "Kanban board that drives a coding agent per ticket")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "kanban.toml")]
    config: PathBuf,

    /// Human-readable logs instead of JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP control surface
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the board
    Tickets,
    /// Check the Jira credentials
    JiraTest,
}

/// Filter from `var`, falling back to `info`.
fn log_filter(var: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing(pretty: bool) {
    let filter = log_filter(EnvFilter::DEFAULT_ENV);
    if pretty {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // Before the subscriber is built, so RUST_LOG from .env takes effect.
    let dotenv = dotenvy::dotenv();
    init_tracing(cli.pretty);
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded .env");
    }

    let config = config::load(&cli.config)?;

    match cli.command {
        Commands::Serve { host, port } => serve(&cli.config, config, host, port).await?,
        Commands::Tickets => {
            let store = FileTicketStore::new(config.data_dir.clone()).await?;
            let tickets = store.list().await?;
            if tickets.is_empty() {
                println!("No tickets.");
            }
            for ticket in &tickets {
                let flag = if ticket.stopped { " (stopped)" } else { "" };
                println!(
                    "{:>4}  {:<12} {:<12} {}{flag}",
                    ticket.id,
                    ticket.status.to_string(),
                    ticket.ticket_type.to_string(),
                    ticket.title
                );
            }
        }
        Commands::JiraTest => {
            if !config.tracker.is_configured() {
                anyhow::bail!("Jira is not configured (set [tracker] or JIRA_HOST)");
            }
            let client = JiraClient::new(&config.tracker);
            let user = client.test_connection().await?;
            println!("Connected as {} <{}>", user.display_name, user.email_address);
        }
    }

    Ok(())
}

async fn serve(
    config_path: &std::path::Path,
    config: config::KanbanConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let host = host.unwrap_or(config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let tracker = Arc::new(TrackerSync::from_config(&config.tracker));
    let orchestrator =
        Orchestrator::open(&config.data_dir, config.agent.clone(), tracker.clone()).await?;

    let tickets = orchestrator.tickets().list().await?;
    let orphaned = tickets
        .iter()
        .filter(|t| t.status == TicketStatus::InProgress && !t.stopped)
        .count();
    info!(
        data_dir = %config.data_dir.display(),
        tickets = tickets.len(),
        jira = config.tracker.is_configured(),
        agent = %config.agent.program,
        "Board loaded"
    );
    if orphaned > 0 {
        warn!(orphaned, "In-progress tickets have no live run; stop or restart them");
    }
    if let Err(e) = config.agent.resolve_executable() {
        warn!(error = %e, "Agent executable not found; starts will fail until it is configured");
    }

    let _watcher = if config_path.exists() {
        let engine = orchestrator.clone();
        let reload_tracker = tracker.clone();
        match ConfigWatcher::start(config_path.to_path_buf(), 500, move |reloaded| {
            if let Some(mut agent) = reloaded.agent {
                config::apply_agent_env(&mut agent, &|key: &str| std::env::var(key).ok());
                info!(program = %agent.program, max_concurrent_runs = agent.max_concurrent_runs, "Agent config reloaded");
                engine.set_agent_config(agent);
            }
            if let Some(mut tracker_config) = reloaded.tracker {
                config::apply_tracker_env(&mut tracker_config, &|key: &str| std::env::var(key).ok());
                info!(jira = tracker_config.is_configured(), "Tracker config reloaded");
                reload_tracker.reconfigure(&tracker_config);
            }
        }) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "Config hot-reload disabled");
                None
            }
        }
    } else {
        None
    };

    let auth = AuthConfig::new(config.server.api_keys.clone());
    if auth.is_enabled() {
        info!(keys = auth.api_keys.len(), "API key auth enabled");
    }
    let app = GatewayServer::build_with_auth(orchestrator.clone(), auth);

    GatewayServer::serve(app, addr, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
    })
    .await?;

    for run in orchestrator.running() {
        if let Err(e) = orchestrator.stop(&run.ticket_id).await {
            warn!(ticket_id = %run.ticket_id, error = %e, "Failed to stop run on shutdown");
        }
    }
    Ok(())
}
