//! Command-line entry point for the Prime agent platform.
//!
//! `prime` runs as a short-lived client process against a separately
//! running gateway/REST server (`prime start`), talking to it over REST
//! and the `/ws/events` control plane — mirroring how the teacher's CLI
//! is a thin frontend over its own long-running services.

mod client;
mod commands;
mod server;
mod shell;
mod ws;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "prime", version, about = "Prime agent platform CLI")]
pub struct Cli {
    /// Path to a prime.toml config file; defaults to ./prime.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace directory agents and tools operate against.
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Guided first-run setup.
    Onboard {
        #[arg(long)]
        auto: bool,
        #[arg(long)]
        prod: bool,
        #[arg(long)]
        doctor: bool,
        #[arg(long)]
        repair: bool,
        #[arg(long)]
        seed: bool,
        #[arg(long)]
        validate: bool,
    },
    /// Start the gateway + REST server in the foreground (or background with --prod).
    Start {
        #[arg(long)]
        prod: bool,
    },
    /// Stop a running server started with `prime start --prod`.
    Stop,
    /// Report whether the gateway/REST server is reachable and healthy.
    Status,
    /// Run environment/config diagnostics.
    Doctor,
    /// Tail the server log.
    Logs {
        #[arg(short = 'f', long)]
        follow: bool,
        /// Number of trailing lines to print.
        lines: Option<usize>,
    },
    /// Print a summary of configured secrets (never their values).
    Security,
    /// List configured LLM provider keys.
    Models,
    /// Gateway control-plane operations.
    Gateway {
        #[command(subcommand)]
        action: GatewayAction,
    },
    /// Telegram channel configuration summary.
    Telegram,
    /// Channel adapter operations.
    Channels {
        #[command(subcommand)]
        action: ChannelsAction,
    },
    /// Node execution/approval queue.
    Nodes,
    /// Knowledge base memory operations.
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// Pending cross-channel pairing requests.
    Pairing {
        #[command(subcommand)]
        action: PairingAction,
    },
    /// Cron triggers.
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },
    /// Webhook triggers.
    Webhooks {
        #[command(subcommand)]
        action: WebhooksAction,
    },
    /// Installed skills.
    Skills,
    /// Tailscale network integration (thin wrapper over the system `tailscale` CLI).
    Tailscale {
        #[command(subcommand)]
        action: TailscaleAction,
    },
    /// Print (and optionally open) the dashboard URL.
    Dashboard {
        #[arg(long)]
        open: bool,
    },
    /// Interactive offline agent shell, backed by a mock provider.
    Shell,
    /// Interactive terminal UI (currently an alias for `shell`).
    Tui,
    /// Device-code authentication against a running gateway.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum GatewayAction {
    Status,
    Health,
    Call {
        method: String,
        #[arg(long)]
        params: Option<String>,
    },
    Url,
}

#[derive(Subcommand, Debug)]
pub enum ChannelsAction {
    List,
    Doctor,
    Connect { channel: String },
    Verify { channel: String },
}

#[derive(Subcommand, Debug)]
pub enum MemoryAction {
    List { knowledge_base_id: String },
    Search { knowledge_base_id: String, query: String },
}

#[derive(Subcommand, Debug)]
pub enum PairingAction {
    List,
    Approve { id: String },
    Reject { id: String },
}

#[derive(Subcommand, Debug)]
pub enum CronAction {
    List,
}

#[derive(Subcommand, Debug)]
pub enum WebhooksAction {
    List,
}

#[derive(Subcommand, Debug)]
pub enum TailscaleAction {
    Status,
    Connect,
    Funnel,
}

#[derive(Subcommand, Debug)]
pub enum AuthAction {
    Login,
    Status,
    Whoami,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .init();

    let workspace = cli.workspace.canonicalize().unwrap_or(cli.workspace.clone());

    if let Err(e) = commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await {
        eprintln!("error: {e:#}");
        std::process::exit(exit_code_for(&e));
    }
}

/// Exit code per spec: 0 success, 1 operational failure, 2 usage error.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<clap::Error>().is_some() {
        2
    } else {
        1
    }
}
