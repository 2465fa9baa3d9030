use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use session_reversal::execution::{MarkerLayer, PaperBroker, StrategyConfig};
use session_reversal::trading_core::bars::{infer_interval_minutes, load_bars_csv, write_bars_csv};
use session_reversal::trading_core::trader::replay_bars;
use session_reversal::trading_core::{BarHandler, SessionReversalStrategy, SyntheticBarGenerator};

#[derive(Parser, Debug)]
#[command(name = "session-reversal")]
#[command(about = "Session-close extrema reversal strategy: replay and synthetic data")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a bar CSV through the strategy against a paper broker
    Replay {
        /// CSV with start_time,end_time,open,high,low,close columns
        #[arg(short, long)]
        bars: PathBuf,

        /// Instrument symbol (used in the journal)
        #[arg(short, long, env = "SESSION_REVERSAL_SYMBOL")]
        symbol: String,

        /// JSON strategy config; defaults apply to missing fields
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for the trade journal
        #[arg(short, long, env = "SESSION_REVERSAL_JOURNAL_DIR")]
        journal_dir: Option<PathBuf>,

        /// Override the lookback session count
        #[arg(short, long)]
        lookback: Option<usize>,

        /// Full bid/ask spread in price units
        #[arg(long, default_value = "0.0")]
        spread: f64,
    },

    /// Write a reproducible random-walk bar CSV
    Generate {
        /// Output CSV path
        #[arg(short, long)]
        out: PathBuf,

        /// Calendar days to cover (weekends produce no bars)
        #[arg(short, long, default_value = "30")]
        days: u32,

        /// Bar interval in minutes (1440 for daily bars)
        #[arg(short, long, default_value = "60")]
        interval_minutes: u32,

        /// First calendar day (YYYY-MM-DD)
        #[arg(long, default_value = "2024-01-01")]
        start: String,

        /// Starting price
        #[arg(long, default_value = "100.0")]
        start_price: f64,

        /// Per-minute return standard deviation
        #[arg(long, default_value = "0.0004")]
        volatility: f64,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("session_reversal={}", level).parse()?),
        )
        .init();

    match args.command {
        Commands::Replay {
            bars,
            symbol,
            config,
            journal_dir,
            lookback,
            spread,
        } => run_replay(bars, symbol, config, journal_dir, lookback, spread),
        Commands::Generate {
            out,
            days,
            interval_minutes,
            start,
            start_price,
            volatility,
            seed,
        } => run_generate(out, days, interval_minutes, &start, start_price, volatility, seed),
    }
}

fn run_replay(
    bars_path: PathBuf,
    symbol: String,
    config_path: Option<PathBuf>,
    journal_dir: Option<PathBuf>,
    lookback: Option<usize>,
    spread: f64,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => StrategyConfig::from_json_file(&path)?,
        None => StrategyConfig::default(),
    };
    if let Some(dir) = journal_dir {
        config.journal_dir = dir;
    }
    if let Some(lookback) = lookback {
        config.lookback_sessions = lookback;
    }

    let bars = load_bars_csv(&bars_path)?;
    if bars.is_empty() {
        warn!("No bars in {:?}", bars_path);
        return Ok(());
    }
    let interval = infer_interval_minutes(&bars);
    info!("Loaded {} bars ({} minute) from {:?}", bars.len(), interval, bars_path);

    let broker = PaperBroker::new(&symbol, spread);
    let mut strategy = SessionReversalStrategy::new(&symbol, config, broker, MarkerLayer::new())
        .context("Invalid strategy configuration")?;
    strategy
        .on_activate(interval)
        .context("Failed to activate strategy")?;

    let actions = replay_bars(&mut strategy, &bars, interval);
    strategy.on_deactivate();

    let summary = strategy.summary();
    println!("{}", summary);
    println!(
        "Actions: {} | Markers on chart: {} | Open position: {} | Unrealized: {:.2}",
        actions.len(),
        strategy.sink().markers().len(),
        strategy.executor().net_position(),
        strategy.executor().unrealized_pnl()
    );
    if let Some(path) = strategy.journal_path() {
        if summary.journal_rows > 0 {
            println!("Journal: {}", path.display());
        }
    }
    Ok(())
}

fn run_generate(
    out: PathBuf,
    days: u32,
    interval_minutes: u32,
    start: &str,
    start_price: f64,
    volatility: f64,
    seed: u64,
) -> Result<()> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .with_context(|| format!("Invalid start date: {}", start))?;
    let timezone = StrategyConfig::default().tz()?;

    let bars = SyntheticBarGenerator::new(seed, start_price, timezone)
        .with_volatility(volatility)
        .generate(start, days, interval_minutes)?;
    write_bars_csv(&out, &bars)?;

    info!("Wrote {} bars to {:?}", bars.len(), out);
    Ok(())
}
