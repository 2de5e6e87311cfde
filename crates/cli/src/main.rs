use anyhow::Context;
use clap::{Parser, Subcommand};

mod run;

#[derive(Parser)]
#[command(name = "auto-trade")]
#[command(about = "Unattended multi-asset trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading engine with the staleness monitor and web API
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print recent ledger records for one asset
    History {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Asset identifier (e.g., "BTC")
        #[arg(short, long)]
        asset: String,
        /// Number of records to show
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Classify every configured asset's ledger age
    Health {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local secrets (exchange keys, API tokens) live in .env during
    // development; missing file is fine.
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run::run_engine(&config).await,
        Commands::History {
            config,
            asset,
            limit,
        } => run::print_history(&config, &asset, limit).await,
        Commands::Health { config } => run::print_health(&config).await,
    }
    .context("command failed")
}
