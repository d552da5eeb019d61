// signal-scan - scan a watchlist for entry signals and track them live

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use signal_pulse::core::{setup_logging, EngineConfig};
use signal_pulse::layer3::{LiveTracker, SignalEngine, TrackerEvent};
use signal_pulse::Signal;

#[derive(Parser)]
#[command(
    name = "signal-scan",
    about = "Scan Binance spot pairs for entry signals"
)]
struct Cli {
    /// Config file path (defaults used when the file is missing)
    #[arg(long, default_value = "config/signal_pulse.json")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit structured JSON logs
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decision pipeline over a pair list and print results
    Scan {
        /// Pairs to scan (comma-separated; config watchlist if omitted)
        #[arg(short, long, value_delimiter = ',')]
        pairs: Option<Vec<String>>,

        /// Candle timeframe
        #[arg(short, long, default_value = "4h")]
        timeframe: String,

        /// Keep tracking actionable signals live until Ctrl-C
        #[arg(long)]
        track: bool,
    },

    /// Print the latest trade price for one pair
    Price {
        pair: String,
    },

    /// Write the default config file
    InitConfig,
}

fn print_signal_table(signals: &[Signal]) {
    println!(
        "{:<12} {:<9} {:>14} {:>14} {:>14} {:>6}  {}",
        "SYMBOL", "DIRECTION", "ENTRY", "TARGET", "STOP", "CONF", "TF"
    );
    for signal in signals {
        let target = signal
            .target_price
            .map(|p| format!("{:.4}", p))
            .unwrap_or_else(|| "-".to_string());
        let stop = signal
            .stop_loss_price
            .map(|p| format!("{:.4}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<9} {:>14.4} {:>14} {:>14} {:>6}  {}",
            signal.symbol,
            signal.direction.to_string(),
            signal.entry_price,
            target,
            stop,
            signal.confidence,
            signal.timeframe
        );
    }
}

async fn cmd_scan(
    config: EngineConfig,
    pairs: Option<Vec<String>>,
    timeframe: &str,
    track: bool,
) -> Result<()> {
    if !config.scan.timeframes.iter().any(|tf| tf == timeframe) {
        anyhow::bail!(
            "unknown timeframe: {timeframe}. Expected one of: {}",
            config.scan.timeframes.join(", ")
        );
    }

    let pairs = pairs.unwrap_or_else(|| config.scan.pairs.clone());
    let binance = config.binance.clone();
    let engine = SignalEngine::new(config).context("failed to create signal engine")?;

    let signals = engine.scan_pairs(&pairs, timeframe).await;
    print_signal_table(&signals);

    if !track {
        return Ok(());
    }

    let actionable: Vec<Signal> = signals.into_iter().filter(|s| s.is_actionable()).collect();
    if actionable.is_empty() {
        println!("No actionable signals to track.");
        return Ok(());
    }

    let tracker = LiveTracker::new(binance);
    let mut events = tracker.subscribe_events();
    for signal in actionable {
        if let Err(e) = tracker.track(signal) {
            warn!(error = %e, "Skipping duplicate signal");
        }
    }
    println!("Tracking {} signal(s). Ctrl-C to stop.", tracker.len());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(TrackerEvent::TickApplied { symbol, state }) => {
                    println!(
                        "{symbol}: {:.4} ({:+.2}% 24h)  progress {:.1}%  pnl {:+.2}% ({:+.4})",
                        state.live_price,
                        state.change_24h_percent,
                        state.progress_to_target_percent,
                        state.pnl_percent,
                        state.pnl_value
                    );
                }
                Ok(TrackerEvent::StreamErrored { symbol, message }) => {
                    warn!(symbol = %symbol, error = %message, "Stream error");
                }
                Ok(TrackerEvent::Removed { symbol }) => {
                    println!("{symbol}: tracking stopped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Event consumer lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    tracker.untrack_all().await;
    Ok(())
}

async fn cmd_price(config: EngineConfig, pair: &str) -> Result<()> {
    let engine = SignalEngine::new(config).context("failed to create signal engine")?;
    let price = engine
        .current_price(pair)
        .await
        .with_context(|| format!("failed to fetch price for {pair}"))?;
    println!("{price}");
    Ok(())
}

fn load_config(path: &str) -> Result<EngineConfig> {
    let mut config = EngineConfig::load_from_file(path).context("failed to load config")?;
    config.apply_env_overrides();
    config.validate().context("config validation failed")?;
    info!(summary = %config.summary(), "Configuration loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(Some(&cli.log_level), Some(cli.json_logs));

    match cli.command {
        Commands::Scan {
            pairs,
            timeframe,
            track,
        } => cmd_scan(load_config(&cli.config)?, pairs, &timeframe, track).await,
        Commands::Price { pair } => cmd_price(load_config(&cli.config)?, &pair).await,
        Commands::InitConfig => {
            EngineConfig::default()
                .save_to_file(&cli.config)
                .with_context(|| format!("failed to write {}", cli.config))?;
            println!("Wrote {}", cli.config);
            Ok(())
        }
    }
}
