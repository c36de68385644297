//! ReplayLab CLI: replay, sweep, rank, bar inspection and live commands.
//!
//! Commands:
//! - `run`: replay a TOML config and save the artifact set
//! - `sweep`: replay consecutive windows of a config in parallel
//! - `rank`: replay one config across several pairs and rank the results
//! - `bars`: fetch bars through the cache and print them as CSV
//! - `live`: drive the configured strategy from the wall clock
//!
//! Logging goes to stderr and is filtered with `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use replaylab_core::data::{
    BarFetcher, CircuitBreaker, HistoricalCsvFetcher, KrakenFetcher, SyntheticFetcher,
};
use replaylab_core::domain::{Interval, Pair};
use replaylab_core::engine::{run_live, SystemClock};
use replaylab_core::{BacktestTracker, TimeSeriesStore};
use replaylab_runner::export::{render_summary, save_artifacts};
use replaylab_runner::{
    build_context, build_fetcher, build_scheduler, evaluator, run_replay, run_windows,
    split_windows, stitched_tracker, Ranker, RankerRow, ReplayConfig,
};

#[derive(Parser)]
#[command(name = "replaylab", about = "ReplayLab CLI: deterministic market replay and live evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a TOML config and save outcome.json, equity.csv and fills.csv.
    Run {
        /// Path to a TOML replay config.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the summary only; write no artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },
    /// Split the backtest window into N parts and replay them in parallel.
    Sweep {
        #[arg(long)]
        config: PathBuf,

        /// Number of windows.
        #[arg(long, default_value_t = 4)]
        windows: usize,
    },
    /// Replay the config's strategy on each pair and rank by risk-adjusted metrics.
    Rank {
        #[arg(long)]
        config: PathBuf,

        /// Pairs to compare (e.g. BTC/USD ETH/USD).
        #[arg(long, required = true, num_args = 1..)]
        symbols: Vec<Pair>,

        /// Fraction reported as top and bottom.
        #[arg(long, default_value_t = 0.25)]
        quantile: f64,
    },
    /// Fetch bars through the cache and print them as CSV.
    Bars {
        #[arg(long, value_enum)]
        source: SourceArg,

        #[arg(long)]
        symbol: Pair,

        /// Bar interval (e.g. 1m, 15m, 1h, 1d).
        #[arg(long)]
        interval: Interval,

        /// RFC 3339 timestamp of the first bar.
        #[arg(long, value_parser = parse_time)]
        since: DateTime<Utc>,

        /// Data root for historical CSV files.
        #[arg(long, default_value = "data")]
        data_root: PathBuf,
    },
    /// Run the configured strategy live, one tick per minute.
    Live {
        #[arg(long)]
        config: PathBuf,

        /// Stop after this many ticks (runs until interrupted if omitted).
        #[arg(long)]
        ticks: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Kraken,
    HistoricalCsv,
    Synthetic,
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            no_save,
        } => run_replay_cmd(config, output_dir, no_save),
        Commands::Sweep { config, windows } => run_sweep(config, windows),
        Commands::Rank {
            config,
            symbols,
            quantile,
        } => run_rank(config, symbols, quantile),
        Commands::Bars {
            source,
            symbol,
            interval,
            since,
            data_root,
        } => run_bars(source, symbol, interval, since, data_root),
        Commands::Live { config, ticks } => run_live_cmd(config, ticks),
    }
}

fn load_config(path: &Path) -> Result<ReplayConfig> {
    ReplayConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn run_replay_cmd(config_path: PathBuf, output_dir: PathBuf, no_save: bool) -> Result<()> {
    let config = load_config(&config_path)?;
    let outcome = run_replay(&config, build_fetcher(&config)?)?;

    println!("{}", render_summary(&outcome));

    if !no_save {
        let run_dir = save_artifacts(&outcome, &output_dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    if let Some(err) = &outcome.error {
        bail!("replay aborted: {err}");
    }
    Ok(())
}

fn run_sweep(config_path: PathBuf, n: usize) -> Result<()> {
    let config = load_config(&config_path)?;
    let bt = &config.backtest;
    let windows = split_windows(bt.start, bt.end, bt.step, n);
    if windows.is_empty() {
        bail!("no whole {} step between {} and {}", bt.step, bt.start, bt.end);
    }

    let results = run_windows(&config, &windows, build_fetcher);

    println!("| Window | Start | End | Return | Sharpe | Max DD | Status |");
    println!("|---|---|---|---|---|---|---|");
    let mut outcomes = Vec::with_capacity(results.len());
    for (i, result) in results.into_iter().enumerate() {
        let (start, end) = windows[i];
        match result {
            Ok(outcome) => {
                let r = &outcome.report;
                println!(
                    "| {i} | {start} | {end} | {:.2}% | {:.3} | {:.2}% | {} |",
                    r.total_return * 100.0,
                    r.sharpe,
                    r.max_drawdown * 100.0,
                    outcome.error.as_deref().unwrap_or("ok")
                );
                outcomes.push(outcome);
            }
            Err(e) => println!("| {i} | {start} | {end} | - | - | - | {e} |"),
        }
    }

    let stitched = stitched_tracker(&outcomes, bt.step, bt.initial_capital);
    let report = stitched.report(bt.min_return);
    println!();
    println!(
        "Stitched: {} observations, return {:.2}%, sharpe {:.3}, max drawdown {:.2}%",
        report.observations,
        report.total_return * 100.0,
        report.sharpe,
        report.max_drawdown * 100.0
    );
    Ok(())
}

fn run_rank(config_path: PathBuf, symbols: Vec<Pair>, quantile: f64) -> Result<()> {
    let base = load_config(&config_path)?;
    let mut ranker = Ranker::default();

    for pair in symbols {
        let config = base.with_pair(pair.clone());
        let outcome = run_replay(&config, build_fetcher(&config)?)?;
        if let Some(err) = &outcome.error {
            info!(%pair, error = %err, "partial replay included in ranking");
        }
        ranker.push(RankerRow::from_report(pair.to_string(), &outcome.report));
    }
    ranker.rank();

    println!("| Rank | Pair | Score |");
    println!("|---|---|---|");
    for (i, row) in ranker.rows().iter().enumerate() {
        println!("| {} | {} | {:.3} |", i + 1, row.key, row.score());
    }

    let keys = |rows: &[RankerRow]| rows.iter().map(|r| r.key.as_str()).collect::<Vec<_>>().join(", ");
    println!();
    println!("Top {:.0}%: {}", quantile * 100.0, keys(ranker.top(quantile)));
    println!("Bottom {:.0}%: {}", quantile * 100.0, keys(ranker.bottom(quantile)));
    Ok(())
}

fn run_bars(
    source: SourceArg,
    symbol: Pair,
    interval: Interval,
    since: DateTime<Utc>,
    data_root: PathBuf,
) -> Result<()> {
    let fetcher: Box<dyn BarFetcher> = match source {
        SourceArg::Kraken => Box::new(KrakenFetcher::new(Arc::new(CircuitBreaker::for_exchange()))?),
        SourceArg::HistoricalCsv => Box::new(HistoricalCsvFetcher::new(data_root)),
        SourceArg::Synthetic => Box::new(SyntheticFetcher::new(since, Utc::now())),
    };
    let mut store = TimeSeriesStore::from_boxed(fetcher);
    let bars = store.get_since(&symbol.symbol(), interval, since)?;

    println!("time,open,high,low,close,volume");
    for b in bars {
        println!(
            "{},{},{},{},{},{}",
            b.start_time.to_rfc3339(),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        );
    }
    info!(%symbol, %interval, bars = bars.len(), "done");
    Ok(())
}

fn run_live_cmd(config_path: PathBuf, ticks: Option<usize>) -> Result<()> {
    let config = load_config(&config_path)?;
    let bt = &config.backtest;

    let mut scheduler = build_scheduler(&config);
    let mut ctx = build_context(&config, build_fetcher(&config)?);
    let mut tracker = BacktestTracker::new(Interval::BASE);
    let mut clock = SystemClock;

    info!(strategy = config.strategy.name(), pair = %config.strategy.pair(), "starting live loop");
    let result = run_live(
        &mut scheduler,
        &mut ctx,
        &mut tracker,
        evaluator(bt.quote.clone(), bt.step),
        &mut clock,
        ticks,
    );

    let report = tracker.report(bt.min_return);
    println!(
        "{} ticks, value {:.2}, return {:.2}%, max drawdown {:.2}%",
        report.observations,
        report.end_value,
        report.total_return * 100.0,
        report.max_drawdown * 100.0
    );
    result?;
    Ok(())
}
