use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stock_scorecard::analysis::{
    quality_screen, screener_report, FundamentalAnalyzer, QualityScreenConfig, ScreenerReportConfig,
};
use stock_scorecard::api::{SecClient, YahooChartClient};
use stock_scorecard::cache::{read_screener_csv, ScreenerCache};
use stock_scorecard::concurrent_fetcher::{fetch_prices_concurrently, ConcurrentFetchConfig};
use stock_scorecard::data_collector::{normalize_ticker, CollectorCaches, DataCollector, Freshness};
use stock_scorecard::facts::FactResolver;
use stock_scorecard::models::Config;
use stock_scorecard::report::{self, OutputFormat};
use stock_scorecard::technical::{scan_oversold, DEFAULT_OVERSOLD_THRESHOLD};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fundamental and technical stock scorecards from SEC filings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score one ticker, or every ticker of a stored screener list
    Analyze {
        #[command(flatten)]
        tickers: TickerSelection,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Technical oversold scan
    Scan {
        #[command(flatten)]
        tickers: TickerSelection,

        #[arg(long, default_value_t = DEFAULT_OVERSOLD_THRESHOLD, allow_hyphen_values = true)]
        threshold: f64,

        #[arg(long, default_value_t = 20)]
        top_n: usize,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Oversold scan followed by a fundamental quality filter
    Screen {
        #[command(flatten)]
        tickers: TickerSelection,

        #[arg(long, default_value_t = DEFAULT_OVERSOLD_THRESHOLD, allow_hyphen_values = true)]
        threshold: f64,

        /// Minimum number of passing fundamental tests
        #[arg(long, default_value_t = 5)]
        min_score: usize,

        #[arg(long, default_value_t = 10)]
        top_n: usize,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Cheapest eligible members of a stored screener list with score and technicals
    ScreenerReport {
        /// Stored screener list, or `all`
        #[arg(short, long)]
        screener: String,

        /// Date the list was stored (YYYY-MM-DD), default today (local time).
        /// Falls back to the day before when that date has no list.
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(long, default_value_t = 20)]
        top_n: usize,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Store a screener membership list from a CSV export with a Ticker column
    ScreenerImport {
        /// Screener name to store the list under
        name: String,

        csv: PathBuf,
    },
}

#[derive(Args, Debug)]
struct TickerSelection {
    /// Comma-separated ticker symbols
    #[arg(short, long, value_delimiter = ',')]
    ticker: Vec<String>,

    /// Stored screener list, or `all` for every list stored on the date
    #[arg(short, long, conflicts_with = "ticker")]
    screener: Option<String>,

    /// Date the screener list was stored (YYYY-MM-DD), default today (local time)
    #[arg(short, long, requires = "screener")]
    date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Telegram)]
    format: OutputFormat,

    /// Ignore cached data and fetch again
    #[arg(long)]
    force_refresh: bool,
}

/// Tickers picked on the command line, plus the screener they came from
struct SelectedTickers {
    tickers: Vec<String>,
    screener: Option<(String, NaiveDate)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stock_scorecard=warn")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    info!("📋 Configuration loaded, data dir {}", config.data_dir.display());

    match cli.command {
        Command::Analyze { tickers, output } => run_analyze(&config, tickers, output).await,
        Command::Scan { tickers, threshold, top_n, output } => {
            run_scan(&config, tickers, threshold, top_n, output).await
        }
        Command::Screen { tickers, threshold, min_score, top_n, output } => {
            let screen_config = QualityScreenConfig {
                threshold,
                min_score,
                top_n,
                force_refresh: output.force_refresh,
                ..QualityScreenConfig::default()
            };
            run_screen(&config, tickers, screen_config, output.format).await
        }
        Command::ScreenerReport { screener, date, top_n, output } => {
            run_screener_report(&config, &screener, date, top_n, output).await
        }
        Command::ScreenerImport { name, csv } => run_screener_import(&config, &name, &csv).await,
    }
}

async fn build_collector(config: &Config) -> Result<Arc<DataCollector>> {
    let caches = CollectorCaches::open(config).await?;
    let sec = SecClient::new(config)?;
    let prices = YahooChartClient::new()?;

    Ok(Arc::new(DataCollector::new(
        Arc::new(sec),
        Arc::new(prices),
        caches,
        Freshness::from_config(config),
        config.price_lookback_days,
    )))
}

async fn select_tickers(config: &Config, selection: TickerSelection) -> Result<SelectedTickers> {
    if let Some(screener) = selection.screener {
        let date = selection.date.unwrap_or_else(|| Local::now().date_naive());
        let cache = ScreenerCache::open(config.screener_db_path(), chrono::Duration::days(config.screener_ttl_days))
            .await?;
        let tickers = cache.tickers_for_date(screener.trim(), date).await;
        if tickers.is_empty() {
            anyhow::bail!(
                "No stocks found for screener '{}' stored on {}. Run screener-import first or pass --date.",
                screener,
                date
            );
        }
        return Ok(SelectedTickers { tickers, screener: Some((screener, date)) });
    }

    let tickers: Vec<String> = selection
        .ticker
        .iter()
        .map(|t| normalize_ticker(t))
        .filter(|t| !t.is_empty())
        .collect();
    if tickers.is_empty() {
        anyhow::bail!("Either --ticker or --screener is required");
    }
    Ok(SelectedTickers { tickers, screener: None })
}

async fn run_analyze(config: &Config, selection: TickerSelection, output: OutputArgs) -> Result<()> {
    let selected = select_tickers(config, selection).await?;
    let analyzer = FundamentalAnalyzer::new(build_collector(config).await?, FactResolver::default());

    if let Some((screener, date)) = &selected.screener {
        print!("{}", report::render_batch_header(screener, *date, selected.tickers.len(), output.format));
    }

    for outcome in analyzer.analyze_batch(&selected.tickers, output.force_refresh).await {
        println!("{}", report::render_outcome(&outcome, output.format));
    }
    Ok(())
}

async fn run_scan(
    config: &Config,
    selection: TickerSelection,
    threshold: f64,
    top_n: usize,
    output: OutputArgs,
) -> Result<()> {
    let started = Instant::now();
    let selected = select_tickers(config, selection).await?;
    let collector = build_collector(config).await?;

    let fetch_config = ConcurrentFetchConfig::from_config(config, output.force_refresh);
    let fetched = fetch_prices_concurrently(collector, &selected.tickers, &fetch_config).await;

    let mut signals = scan_oversold(&fetched.prices, threshold);
    let found = signals.len();
    signals.truncate(top_n);

    print!(
        "{}",
        report::render_scan(&signals, selected.tickers.len(), found, started.elapsed(), output.format)
    );
    Ok(())
}

async fn run_screen(
    config: &Config,
    selection: TickerSelection,
    screen_config: QualityScreenConfig,
    format: OutputFormat,
) -> Result<()> {
    let started = Instant::now();
    let selected = select_tickers(config, selection).await?;
    let collector = build_collector(config).await?;

    let fetch_config = ConcurrentFetchConfig::from_config(config, screen_config.force_refresh);
    let fetched = fetch_prices_concurrently(Arc::clone(&collector), &selected.tickers, &fetch_config).await;
    let signals = scan_oversold(&fetched.prices, screen_config.threshold);

    let analyzer = FundamentalAnalyzer::new(collector, FactResolver::default());
    let opportunities = quality_screen(&analyzer, &signals, &screen_config).await;

    print!("{}", report::render_screen(&opportunities, &screen_config, started.elapsed(), format));
    Ok(())
}

async fn run_screener_report(
    config: &Config,
    screener: &str,
    date: Option<NaiveDate>,
    top_n: usize,
    output: OutputArgs,
) -> Result<()> {
    let screener = screener.trim();
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let cache = ScreenerCache::open(config.screener_db_path(), chrono::Duration::days(config.screener_ttl_days)).await?;

    let Some((stored_on, rows)) = cache.latest_rows(screener, date).await else {
        anyhow::bail!(
            "No stocks found for screener '{}' on {} or the day before. Run screener-import first.",
            screener,
            date
        );
    };

    let analyzer = FundamentalAnalyzer::new(build_collector(config).await?, FactResolver::default());
    let fetch_config = ConcurrentFetchConfig::from_config(config, output.force_refresh);
    let report_config = ScreenerReportConfig { top_n, force_refresh: output.force_refresh, ..ScreenerReportConfig::default() };
    let report_rows = screener_report(&analyzer, &rows, &fetch_config, &report_config).await;

    print!("{}", report::render_screener_report(&report_rows, screener, stored_on, output.format));
    Ok(())
}

async fn run_screener_import(config: &Config, name: &str, csv_path: &Path) -> Result<()> {
    let file = std::fs::File::open(csv_path).with_context(|| format!("Failed to open {}", csv_path.display()))?;
    let rows = read_screener_csv(file)?;

    let cache = ScreenerCache::open(config.screener_db_path(), chrono::Duration::days(config.screener_ttl_days)).await?;
    let stored = cache.store(name.trim(), rows).await?;
    if stored == 0 {
        anyhow::bail!("{} contains no tickers", csv_path.display());
    }

    println!("✅ Stored {} tickers for screener '{}'", stored, name.trim());
    Ok(())
}
