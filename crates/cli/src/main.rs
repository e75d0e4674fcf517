//! RiskWatch CLI - Main entry point

use clap::{Parser, Subcommand};
use riskwatch_cli::{commands, AppContext};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "riskwatch")]
#[command(about = "RiskWatch - fraud detection and risk scoring engine", long_about = None)]
struct Cli {
    /// SQLite database path
    #[arg(short, long, default_value = "./riskwatch.db")]
    db: PathBuf,

    /// Engine config JSON (falls back to $RISKWATCH_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a JSONL file of login attempts and transactions
    Replay {
        /// One tagged event per line
        file: PathBuf,
    },

    /// Show a user's risk score
    Score {
        user: String,
    },

    /// Show the block state of an IP address
    Ip {
        address: String,
    },

    /// List security events, newest first
    Events {
        /// Only events for this user
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// List a user's notifications
    Notifications {
        user: String,
    },

    /// Mark a notification as read
    Read {
        id: String,
    },

    /// Mark a device as trusted (or untrusted with --revoke)
    TrustDevice {
        user: String,
        device: String,
        #[arg(long)]
        revoke: bool,
    },

    /// Dashboard metrics for the last 24 hours
    Metrics,

    /// Print the active fraud rules and their hash
    Rules,

    /// List audit records, newest first
    Audit {
        /// Read this JSONL ledger instead of the database
        #[arg(long)]
        ledger: Option<PathBuf>,
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Only failed mutations
        #[arg(long)]
        failed: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::new(&cli.db, cli.config.as_deref()).await?;

    let result = match cli.command {
        Commands::Replay { file } => commands::replay(&ctx, &file).await.map(|_| ()),
        Commands::Score { user } => commands::score(&ctx, &user).await,
        Commands::Ip { address } => commands::ip(&ctx, &address).await,
        Commands::Events { user, limit } => commands::events(&ctx, user.as_deref(), limit).await,
        Commands::Notifications { user } => commands::notifications(&ctx, &user).await,
        Commands::Read { id } => commands::mark_read(&ctx, &id).await,
        Commands::TrustDevice {
            user,
            device,
            revoke,
        } => commands::trust_device(&ctx, &user, &device, !revoke).await,
        Commands::Metrics => commands::metrics(&ctx).await,
        Commands::Rules => commands::rules(&ctx),
        Commands::Audit {
            ledger,
            limit,
            failed,
        } => commands::audit(&ctx, ledger.as_deref(), limit, failed).await,
    };

    ctx.close().await;
    result
}
