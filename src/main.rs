//! Pumpwatch - real-time pump.fun token monitoring and alerting
//!
//! Watches the PumpPortal feed, aggregates per-token state, scores
//! composite signals, and emits deduplicated alerts with win/loss outcome
//! tracking. No trading: alerting only.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use pumpwatch::config::Config;
use pumpwatch::engine::Engine;
use pumpwatch::{outcome::GlobalStats, persistence};

/// Pump.fun token monitor and alert bot
#[derive(Parser)]
#[command(name = "pumpwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitor
    Start {
        /// Log alerts instead of delivering to the webhook
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Show alerting statistics from the last snapshot
    Stats,

    /// Clear all persisted state and counters
    Reset {
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pumpwatch=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Start { dry_run } => {
            if dry_run {
                info!("Dry run: alerts will be logged, not delivered");
            }
            Engine::run(config, dry_run).await?;
        }
        Commands::Config => {
            println!("{}", config.masked_display());
        }
        Commands::Stats => {
            show_stats(&config).await;
        }
        Commands::Reset { force } => {
            reset(&config, force).await?;
        }
    }

    Ok(())
}

async fn show_stats(config: &Config) {
    let path = std::path::Path::new(&config.persistence.path);
    match persistence::load(path).await {
        Some(snapshot) => {
            print_stats(&snapshot.stats);
            println!("  tracked tokens: {}", snapshot.tokens.len());
            println!("  alert records:  {}", snapshot.alerts.len());
            println!("  snapshot taken: {}", snapshot.saved_at);
        }
        None => println!("No snapshot found at {}", config.persistence.path),
    }
}

fn print_stats(stats: &GlobalStats) {
    println!("Alerting statistics:");
    println!("  alerts emitted: {}", stats.alerts_emitted);
    println!(
        "  wins/losses:    {}/{} ({:.1}% win rate)",
        stats.wins,
        stats.losses,
        stats.win_rate()
    );
    println!(
        "  win gain:       avg {:.1}%, max {:.1}%",
        stats.average_win_gain_pct(),
        stats.max_win_gain_pct
    );
    for (alert_type, wins) in &stats.wins_by_type {
        println!("  wins[{}]: {}", alert_type, wins);
    }
    for (alert_type, losses) in &stats.losses_by_type {
        println!("  losses[{}]: {}", alert_type, losses);
    }
    for (multiple, count) in &stats.milestone_counts {
        println!("  milestones[{}x]: {}", multiple, count);
    }
}

async fn reset(config: &Config, force: bool) -> Result<()> {
    if !force {
        println!("This clears all persisted state and counters. Re-run with --force to confirm.");
        return Ok(());
    }
    let path = std::path::Path::new(&config.persistence.path);
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "Persisted state cleared");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("Nothing to clear.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
