// =============================================================================
// Sector Heat — Main Entry Point
// =============================================================================
//
// One binary, one pipeline per subcommand.  Every run except `dashboard`
// runs to completion and exits; cron drives the schedule:
//
//   init       write heat_config.json with every default filled in
//   snapshot   append today's prices and TVL to the history files
//   score      print heat scores from history (+ live funding)
//   alert      snapshot, score, send hot baskets to Telegram
//   prep       London-session prep report to Telegram
//   dashboard  JSON scores and weekly bias over HTTP
//   bias       daily bias / setup score journal
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alert;
mod api;
mod app_state;
mod bias_tracker;
mod binance;
mod futures_intel;
mod history;
mod indicators;
mod market_data;
mod notify;
mod prep_report;
mod runtime_config;
mod scoring;
mod setup;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::alert::{fetch_funding, run_alert, take_snapshots};
use crate::app_state::AppState;
use crate::bias_tracker::BiasTracker;
use crate::market_data::MarketClients;
use crate::notify::{ParseMode, TelegramNotifier};
use crate::runtime_config::HeatConfig;
use crate::scoring::score_from_history;
use crate::types::Baskets;

#[derive(Debug, Parser)]
#[command(name = "sector-heat", version, about = "Crypto sector heat scores and trading-session reports")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "HEAT_CONFIG", default_value = "heat_config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the effective configuration, with every default filled in.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Append today's price and TVL rows to the history files.
    Snapshot,
    /// Compute and print heat scores from the history files.
    Score {
        /// Skip the live funding lookup.
        #[arg(long)]
        no_funding: bool,
        /// Print the full breakdown as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Snapshot, score and alert on hot baskets.
    Alert {
        /// Log the alert lines instead of sending them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Build the London prep report.
    Prep {
        /// Print the report instead of sending it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Serve scores and the weekly bias summary as JSON.
    Dashboard {
        /// Listen address; overrides `dashboard_bind` from the config.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Daily bias journal.
    Bias {
        #[command(subcommand)]
        action: BiasCommand,
    },
}

#[derive(Debug, Subcommand)]
enum BiasCommand {
    /// Record today's directional bias for a token.
    Add {
        token: String,
        bias: String,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Record today's setup score for a token.
    Setup {
        token: String,
        score: f64,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Print the last seven days, or send them with `--send`.
    Summary {
        #[arg(long)]
        send: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(version = env!("CARGO_PKG_VERSION"), "sector-heat starting");

    // ── 2. Config ────────────────────────────────────────────────────────
    let config = HeatConfig::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        HeatConfig::default()
    });

    // ── 3. Dispatch ──────────────────────────────────────────────────────
    match cli.command {
        Command::Init { force } => {
            if cli.config.exists() && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to rewrite it",
                    cli.config.display()
                );
            }
            config.save(&cli.config)?;
        }

        Command::Snapshot => {
            let baskets = Baskets::load(&config.baskets_path)?;
            let clients = MarketClients::new()?;
            take_snapshots(&config, &baskets, &clients, Utc::now().date_naive()).await?;
        }

        Command::Score { no_funding, json } => {
            let baskets = Baskets::load(&config.baskets_path)?;
            let funding = if no_funding {
                Default::default()
            } else {
                let clients = MarketClients::new()?;
                fetch_funding(&config, &baskets, &clients).await
            };
            let scores = score_from_history(&config, &baskets, &funding);

            if json {
                let out = serde_json::to_string_pretty(&scores)
                    .context("failed to serialise scores")?;
                println!("{out}");
            } else {
                for s in scores.values() {
                    println!("{:<12} {}/{}", s.basket, s.score, s.max_score);
                }
            }
        }

        Command::Alert { dry_run } => {
            let baskets = Baskets::load(&config.baskets_path)?;
            let clients = MarketClients::new()?;
            let notifier = if dry_run {
                None
            } else {
                Some(TelegramNotifier::from_env(market_data::http_client()?)?)
            };
            let outcome = run_alert(
                &config,
                &baskets,
                &clients,
                notifier.as_ref(),
                Utc::now().date_naive(),
            )
            .await?;
            if dry_run {
                for line in &outcome.lines {
                    println!("{line}");
                }
            }
            info!(
                baskets = outcome.scores.len(),
                delivered = outcome.delivered,
                "alert finished"
            );
        }

        Command::Prep { dry_run } => {
            let clients = MarketClients::new()?;
            let now = Utc::now();
            let lines = prep_report::collect(&config, &clients, now).await;
            let report =
                prep_report::format_report(now.date_naive(), &lines, config.score.funding_threshold);

            if dry_run {
                println!("{report}");
            } else {
                let notifier = TelegramNotifier::from_env(market_data::http_client()?)?;
                notifier.send_message(&report, Some(ParseMode::Markdown)).await?;
                info!(tokens = lines.len(), "prep report sent");
            }
        }

        Command::Dashboard { bind } => {
            let baskets = Baskets::load(&config.baskets_path)?;
            let funding = futures_intel::FundingRateMonitor::with_client(market_data::http_client()?);
            let bind_addr = bind.unwrap_or_else(|| config.dashboard_bind.clone());

            let state = Arc::new(AppState::new(config, baskets, funding));
            let app = api::router(state);

            let listener = tokio::net::TcpListener::bind(&bind_addr)
                .await
                .with_context(|| format!("failed to bind dashboard on {bind_addr}"))?;
            info!(addr = %bind_addr, "dashboard listening");
            axum::serve(listener, app)
                .await
                .context("dashboard server failed")?;
        }

        Command::Bias { action } => {
            let mut tracker = BiasTracker::open(&config.bias_path)?;
            let now = Utc::now();
            match action {
                BiasCommand::Add { token, bias, user } => {
                    tracker.add_bias(&token, &bias, &user, now)?;
                    info!(token = %token, bias = %bias, "bias recorded");
                }
                BiasCommand::Setup { token, score, user } => {
                    tracker.add_setup_score(&token, score, &user, now)?;
                    info!(token = %token, score, "setup score recorded");
                }
                BiasCommand::Summary { send } => {
                    let text = tracker.format_weekly_summary(now);
                    if send {
                        let notifier = TelegramNotifier::from_env(market_data::http_client()?)?;
                        notifier.send_message(&text, Some(ParseMode::Markdown)).await?;
                        info!("weekly summary sent");
                    } else {
                        println!("{text}");
                    }
                }
            }
        }
    }

    Ok(())
}
