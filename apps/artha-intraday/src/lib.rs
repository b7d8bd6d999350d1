//! Runner wiring: CLI, telemetry, config loading and engine lifecycle.

pub mod telemetry;

use anyhow::Context;
use artha_engine::{AllowAll, Engine, EngineConfig, TickSnapshot};
use artha_models::{Direction, MarketRegime, RegimeKind, Signal, StrategyId};
use artha_paper::{FixedRegimeSource, PaperBroker, ScriptedSignalSource, StaticPriceFeed};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "artha-intraday", about = "Artha intraday trading runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate a configuration, then exit.
    ValidateConfig {
        #[arg(long, default_value = "configs/paper.toml")]
        config: PathBuf,
    },
    /// Run a paper session against the built-in paper collaborators.
    Paper {
        #[arg(long, default_value = "configs/paper.toml")]
        config: PathBuf,
        /// Stop after this many seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration_secs: u64,
    },
}

pub fn run_cli() -> anyhow::Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    match cli.command {
        Command::ValidateConfig { config } => {
            let cfg = EngineConfig::load(&config)
                .with_context(|| format!("validating {}", config.display()))?;
            tracing::info!(
                tiers = cfg.tiers.len(),
                ceiling = cfg.governor.ceiling_per_sec,
                "configuration valid"
            );
            println!("OK: {}", config.display());
            Ok(())
        }
        Command::Paper {
            config,
            duration_secs,
        } => run_paper(&config, duration_secs),
    }
}

fn run_paper(config: &PathBuf, duration_secs: u64) -> anyhow::Result<()> {
    let cfg = EngineConfig::load(config)
        .with_context(|| format!("loading {}", config.display()))?;

    let broker = Arc::new(PaperBroker::new());
    let regime = Arc::new(FixedRegimeSource::new(Some(MarketRegime::new(
        RegimeKind::Ranging,
        0.7,
    ))));
    let signals = Arc::new(ScriptedSignalSource::new());
    let prices = Arc::new(StaticPriceFeed::new());
    seed_demo_market(&signals, &prices);

    let mut engine = Engine::new(
        cfg,
        broker,
        regime,
        signals,
        prices,
        Arc::new(AllowAll),
    )?;

    let stop = Arc::new(AtomicBool::new(false));
    let engine_stop = stop.clone();
    let worker = std::thread::spawn(move || engine.run(&engine_stop));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("tokio runtime")?;
    runtime.block_on(async {
        if duration_secs > 0 {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(duration_secs)) => {
                    tracing::info!(duration_secs, "session duration reached");
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received");
                }
            }
        } else if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "signal handler failed, stopping");
        }
    });

    stop.store(true, Ordering::Relaxed);
    worker
        .join()
        .map_err(|_| anyhow::anyhow!("engine thread panicked"))?;
    Ok(())
}

/// A couple of scripted proposals so a paper session exercises the full
/// arbitrate → dispatch → manage path out of the box.
fn seed_demo_market(signals: &ScriptedSignalSource, prices: &StaticPriceFeed) {
    let now = Utc::now();
    prices.set("RELIANCE", TickSnapshot::price_only(2950.0));
    prices.set("TCS", TickSnapshot::price_only(4100.0));
    signals.push_batch(vec![
        Signal::new(
            "RELIANCE",
            StrategyId::VwapReversion,
            Direction::Long,
            5,
            2950.0,
            7.2,
            now,
        ),
        Signal::new(
            "TCS",
            StrategyId::RangeFade,
            Direction::Short,
            3,
            4100.0,
            6.1,
            now,
        ),
    ]);
}
