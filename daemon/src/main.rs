//! Presence daemon: entry point for running a presence node and for
//! one-shot administration against its store.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use presence_node::{init_logging, LogFormat, NodeConfig, PresenceNode, StoreBackend};
use presence_types::{RequestId, SourceAddress};
use presence_utils::{format_duration, format_remaining_ms, init_tracing};

#[derive(Parser)]
#[command(name = "presence-daemon", about = "Presence verification and recovery node")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base; flags
    /// and env vars override them.
    #[arg(long, env = "PRESENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for LMDB storage.
    #[arg(long, env = "PRESENCE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Keep all state in memory instead of LMDB.
    #[arg(long, env = "PRESENCE_IN_MEMORY")]
    in_memory: bool,

    /// RPC server port.
    #[arg(long, env = "PRESENCE_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Disable the RPC server.
    #[arg(long, env = "PRESENCE_DISABLE_RPC")]
    no_rpc: bool,

    /// Enable the WebSocket server.
    #[arg(long, env = "PRESENCE_ENABLE_WEBSOCKET")]
    websocket: bool,

    /// WebSocket server port.
    #[arg(long, env = "PRESENCE_WS_PORT")]
    websocket_port: Option<u16>,

    /// Shared secret required on admin routes.
    #[arg(long, env = "PRESENCE_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "PRESENCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "PRESENCE_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node lifecycle.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Operator actions against the node's store.
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT or SIGTERM.
    Run,
}

#[derive(clap::Subcommand)]
enum AdminAction {
    /// List blocked source addresses.
    Blocked,
    /// Lift a fraud block. The operator name is recorded in the audit log.
    Unblock {
        source: String,
        #[arg(long)]
        operator: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Show the unblock audit log.
    Audit,
    /// Show the progress of a recovery request.
    Recovery { request_id: String },
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_string_lossy();
            let config = NodeConfig::from_toml_file(&path)
                .with_context(|| format!("loading config from {path}"))?;
            tracing::info!("loaded config from {path}");
            config
        }
        None => NodeConfig::default(),
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if cli.in_memory {
        config.store_backend = StoreBackend::Memory;
    }
    if let Some(port) = cli.rpc_port {
        config.rpc_port = port;
    }
    if cli.no_rpc {
        config.enable_rpc = false;
    }
    if cli.websocket {
        config.enable_websocket = true;
    }
    if let Some(port) = cli.websocket_port {
        config.websocket_port = port;
    }
    if let Some(token) = &cli.admin_token {
        config.admin_token = Some(token.clone());
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Open the store without servers or background tasks.
fn open_offline(config: &NodeConfig) -> anyhow::Result<PresenceNode> {
    let config = NodeConfig {
        enable_rpc: false,
        enable_websocket: false,
        ..config.clone()
    };
    PresenceNode::new(config).context("opening the node store")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Node {
            action: NodeAction::Run,
        } => {
            let config = load_config(&cli)?;
            let format: LogFormat = config.log_format.parse()?;
            init_logging(format, &config.log_level)?;

            tracing::info!(
                "starting presence node (RPC:{}, WS:{}, store:{:?})",
                if config.enable_rpc {
                    config.rpc_port.to_string()
                } else {
                    "off".into()
                },
                if config.enable_websocket {
                    config.websocket_port.to_string()
                } else {
                    "off".into()
                },
                config.store_backend,
            );
            if config.admin_token.is_none() {
                tracing::warn!("no admin token configured, admin routes are open");
            }

            let mut node = PresenceNode::new(config)?;
            node.start().await?;
            node.wait_for_signal().await;

            tracing::info!("shutdown signal received, stopping node");
            node.stop().await?;
            tracing::info!("presence daemon exited cleanly");
        }

        Command::Admin { action } => {
            init_tracing(cli.log_level.as_deref().unwrap_or("warn"));
            let config = load_config(&cli)?;
            let node = open_offline(&config)?;
            run_admin(&node, action)?;
        }

        Command::Config => {
            let config = load_config(&cli)?;
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}

fn run_admin(node: &PresenceNode, action: &AdminAction) -> anyhow::Result<()> {
    let now = presence_types::Timestamp::now();
    match action {
        AdminAction::Blocked => {
            let mut blocked = node.ledger().blocked_sources()?;
            blocked.sort_by_key(|b| b.blocked_at);
            if blocked.is_empty() {
                println!("no blocked sources");
            }
            for b in blocked {
                println!(
                    "{:<40} {:<32} {} ago",
                    b.source,
                    b.reason,
                    format_duration(b.blocked_at.elapsed_since(now) / 1000)
                );
            }
        }
        AdminAction::Unblock {
            source,
            operator,
            note,
        } => {
            let source = SourceAddress::new(source.trim());
            match node.ledger().unblock(&source, operator, note)? {
                Some(audit) => println!(
                    "unblocked {} (was: {}) by {}",
                    audit.block.source, audit.block.reason, audit.operator
                ),
                None => anyhow::bail!("{source} is not blocked"),
            }
        }
        AdminAction::Audit => {
            for entry in node.ledger().unblock_audit_log()? {
                println!(
                    "{} unblocked by {} at {}: {} ({})",
                    entry.block.source,
                    entry.operator,
                    entry.unblocked_at,
                    entry.block.reason,
                    entry.note
                );
            }
        }
        AdminAction::Recovery { request_id } => {
            let progress = node.recovery().progress(&RequestId::new(request_id.as_str()))?;
            println!(
                "{} {} {}/{} ({})",
                progress.request_id,
                progress.status.as_str(),
                progress.current,
                progress.required,
                format_remaining_ms(progress.remaining_ms)
            );
        }
    }
    Ok(())
}
