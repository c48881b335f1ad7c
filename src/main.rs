mod config;
mod error;
mod indicator;
mod model;
mod overview;
mod report;
mod signal;
mod source;
mod storage;
mod watchlist;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use model::Timeframe;
use report::ChartExport;
use source::DataSource;
use source::cached::CachedSource;
use source::yahoo::{DEFAULT_REQUESTS_PER_SECOND, YahooSource};
use storage::sqlite::SqliteCache;
use watchlist::{Watchlist, WatchlistStore};

const DEFAULT_CONFIG_FILE: &str = "signal-watch.toml";

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("data source error")]
    Source,
    #[display("watchlist error")]
    Watchlist,
    #[display("failed to write output")]
    Output,
}

#[derive(Parser)]
#[command(
    name = "signal-watch",
    about = "MACD, RSI and Bollinger signals for a stock watchlist"
)]
struct Cli {
    /// Path to the TOML configuration file [default: signal-watch.toml if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Signals for every ticker on the watchlist
    Overview {
        #[arg(short, long, value_parser = parse_timeframe)]
        timeframe: Option<Timeframe>,
        /// Refresh every N seconds until ctrl+c
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        every: Option<u64>,
    },
    /// Detailed signals for one ticker
    Show {
        symbol: String,
        #[arg(short, long, value_parser = parse_timeframe)]
        timeframe: Option<Timeframe>,
        /// Print bars and aligned indicator series as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Look up tickers by symbol or company name
    Search {
        query: String,
        #[arg(short, long, default_value_t = 8)]
        limit: usize,
    },
    /// Manage the watchlist
    Watch {
        #[command(subcommand)]
        action: WatchCommand,
    },
}

#[derive(Subcommand)]
enum WatchCommand {
    List,
    Add {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    Remove {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Replace the watchlist with the one in FILE
    Import { file: PathBuf },
    /// Write the watchlist to FILE
    Export { file: PathBuf },
}

fn parse_timeframe(s: &str) -> Result<Timeframe, String> {
    Timeframe::from_str(s).ok_or_else(|| {
        let keys: Vec<&str> = Timeframe::ALL.iter().map(|tf| tf.as_str()).collect();
        format!("unknown timeframe \"{s}\", expected one of {}", keys.join(", "))
    })
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_tracing(&config);

    match cli.command {
        Command::Overview { timeframe, every } => {
            let timeframe = timeframe.unwrap_or_else(|| config.data.default_timeframe());
            run_overview(&config, timeframe, every).await
        }
        Command::Show {
            symbol,
            timeframe,
            json,
        } => {
            let timeframe = timeframe.unwrap_or_else(|| config.data.default_timeframe());
            run_show(&config, &symbol, timeframe, json).await
        }
        Command::Search { query, limit } => {
            let source = build_source(&config).await?;
            let quotes = source
                .search(&query, limit)
                .await
                .change_context(AppError::Source)?;
            print!("{}", report::render_quotes(&quotes));
            Ok(())
        }
        Command::Watch { action } => {
            run_watch(&WatchlistStore::new(config.watchlist_path()), action)
        }
    }
}

/// An explicit path must exist; the default file is optional.
fn load_config(path: Option<&Path>) -> Result<AppConfig, Report<AppError>> {
    match path {
        Some(path) => config::load(path).change_context(AppError::Config),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            config::load(Path::new(DEFAULT_CONFIG_FILE)).change_context(AppError::Config)
        }
        None => Ok(AppConfig::default()),
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Yahoo behind the SQLite bar cache, or bare Yahoo when the cache is off or
/// cannot be opened.
async fn build_source(config: &AppConfig) -> Result<Arc<dyn DataSource>, Report<AppError>> {
    let rate = config.data.rate_limit().unwrap_or(DEFAULT_REQUESTS_PER_SECOND);
    let yahoo: Arc<dyn DataSource> =
        Arc::new(YahooSource::new(rate).change_context(AppError::Source)?);

    if !config.data.cache_enabled {
        return Ok(yahoo);
    }

    let db_path = config.cache_db_path();
    match SqliteCache::open(&db_path).await {
        Ok(cache) => Ok(Arc::new(CachedSource::new(
            yahoo,
            Arc::new(cache),
            &config.data,
        ))),
        Err(e) => {
            warn!(path = %db_path.display(), error = ?e, "bar cache unavailable, continuing without it");
            Ok(yahoo)
        }
    }
}

async fn run_overview(
    config: &AppConfig,
    timeframe: Timeframe,
    every: Option<u64>,
) -> Result<(), Report<AppError>> {
    let store = WatchlistStore::new(config.watchlist_path());
    let source = build_source(config).await?;

    let cancel = CancellationToken::new();
    if every.is_some() {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl+c received, shutting down");
                cancel.cancel();
            }
        });
    }

    loop {
        // Reloaded each round so edits from another shell show up.
        let watchlist = store.load().change_context(AppError::Watchlist)?;
        let rows = overview::refresh(
            Arc::clone(&source),
            watchlist.symbols(),
            timeframe,
            &config.indicators,
        )
        .await;
        print!("{}", report::render_overview(&rows, timeframe));

        let Some(secs) = every else {
            break;
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(secs)) => println!(),
        }
    }

    Ok(())
}

async fn run_show(
    config: &AppConfig,
    symbol: &str,
    timeframe: Timeframe,
    json: bool,
) -> Result<(), Report<AppError>> {
    let source = build_source(config).await?;
    let symbol = symbol.trim().to_uppercase();
    if !watchlist::is_valid_symbol(&symbol) {
        return Err(Report::new(AppError::Source).attach(format!("invalid ticker symbol: {symbol}")));
    }
    let snapshot = overview::load_snapshot(source.as_ref(), &symbol, timeframe, &config.indicators)
        .await
        .change_context(AppError::Source)?;

    if json {
        let body = serde_json::to_string_pretty(&ChartExport::new(&snapshot))
            .change_context(AppError::Output)?;
        println!("{body}");
    } else {
        print!("{}", report::render_detail(&snapshot));
    }
    Ok(())
}

fn run_watch(store: &WatchlistStore, action: WatchCommand) -> Result<(), Report<AppError>> {
    match action {
        WatchCommand::List => {
            let watchlist = store.load().change_context(AppError::Watchlist)?;
            print_watchlist(&watchlist);
        }
        WatchCommand::Add { symbols } => {
            let mut watchlist = store.load().change_context(AppError::Watchlist)?;
            for symbol in &symbols {
                if watchlist.contains(symbol) {
                    warn!(symbol = %symbol, "already on the watchlist, skipped");
                } else if !watchlist.add(symbol) {
                    warn!(symbol = %symbol, "not a valid ticker symbol, skipped");
                }
            }
            store.save(&watchlist).change_context(AppError::Watchlist)?;
            print_watchlist(&watchlist);
        }
        WatchCommand::Remove { symbols } => {
            let mut watchlist = store.load().change_context(AppError::Watchlist)?;
            for symbol in &symbols {
                if !watchlist.remove(symbol) {
                    warn!(symbol = %symbol, "not on the watchlist");
                }
            }
            store.save(&watchlist).change_context(AppError::Watchlist)?;
            print_watchlist(&watchlist);
        }
        WatchCommand::Import { file } => {
            let watchlist = store.import(&file).change_context(AppError::Watchlist)?;
            print_watchlist(&watchlist);
        }
        WatchCommand::Export { file } => {
            let watchlist = store.export(&file).change_context(AppError::Watchlist)?;
            println!(
                "Exported {} symbols to {}",
                watchlist.len(),
                file.display()
            );
        }
    }
    Ok(())
}

fn print_watchlist(watchlist: &Watchlist) {
    if watchlist.is_empty() {
        println!("Watchlist is empty.");
        return;
    }
    for symbol in watchlist.symbols() {
        println!("{symbol}");
    }
}
