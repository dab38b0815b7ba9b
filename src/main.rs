use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stock_feed::api::YahooClient;
use stock_feed::enrich::ProfileEnricher;
use stock_feed::ingest::WorkbookReader;
use stock_feed::logging::LogContext;
use stock_feed::models::Config;
use stock_feed::orchestrator::BatchOrchestrator;
use stock_feed::store::TickerStore;

/// Company fundamentals and price history feed builder
#[derive(Parser)]
#[command(name = "stock-feed")]
#[command(version)]
#[command(about = "Merge workbook fundamentals with daily prices into per-ticker JSON documents")]
#[command(long_about = "
Reads one CSV sheet per year from the workbook directory, brings every ticker's
price history up to date (full refetch, incremental fetch or nothing, depending
on how fresh the stored series is), backfills recently missed trading days,
scores the latest year's evaluations and writes a summary feed.

Settings come from the environment (or a .env file); flags override them.

Examples:
  stock-feed update                          # incremental run
  stock-feed update --reset                  # wipe documents and rebuild
  stock-feed update -b 10 -d 1 --today 20240614
  stock-feed describe -i descriptions.csv    # fill in company profiles
")]
struct Cli {
    /// Also echo activity to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh prices and rebuild the summary feed
    Update {
        /// Delete every ticker document and the summary file first
        #[arg(long)]
        reset: bool,

        /// Tickers per batch
        #[arg(long, short = 'b')]
        batch_size: Option<usize>,

        /// Seconds to wait between batches
        #[arg(long, short = 'd')]
        batch_delay: Option<u64>,

        /// Days of staleness still served by an incremental fetch
        #[arg(long)]
        update_days: Option<i64>,

        /// Run as of this date (YYYYMMDD) instead of the local date
        #[arg(long)]
        today: Option<String>,

        /// Workbook directory holding <year>.csv sheets
        #[arg(long, short = 'w')]
        workbook: Option<PathBuf>,

        /// Sheets to read, comma separated (e.g. 2023,2024)
        #[arg(long, value_delimiter = ',')]
        years: Option<Vec<String>>,
    },

    /// Fetch company profiles into a description CSV
    Describe {
        /// CSV with a 'ticker' column
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// Where to write the result (defaults to the input file)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Tickers per batch
        #[arg(long, short = 'b', default_value_t = 30)]
        batch_size: usize,

        /// Seconds to wait between batches
        #[arg(long, short = 'd', default_value_t = 3)]
        batch_delay: u64,
    },
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    if date_str.len() != 8 || !date_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(anyhow!("date must be exactly 8 digits in YYYYMMDD format, got: {}", date_str));
    }
    NaiveDate::parse_from_str(date_str, "%Y%m%d").with_context(|| format!("invalid date: {}", date_str))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    let log = LogContext::open(&config.logs_dir, cli.verbose)
        .with_context(|| format!("failed to open logs in {}", config.logs_dir.display()))?;

    match cli.command {
        Command::Update {
            reset,
            batch_size,
            batch_delay,
            update_days,
            today,
            workbook,
            years,
        } => {
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size.max(1);
            }
            if let Some(delay) = batch_delay {
                config.api_delay_secs = delay;
            }
            if let Some(days) = update_days {
                config.price_update_days = days;
            }
            if let Some(workbook) = workbook {
                config.workbook_dir = workbook;
            }
            if let Some(years) = years.filter(|y| !y.is_empty()) {
                config.years = years;
            }
            let today = match today {
                Some(raw) => parse_date(&raw)?,
                None => Local::now().date_naive(),
            };
            run_update(&config, reset, today, log).await
        }
        Command::Describe {
            input,
            output,
            batch_size,
            batch_delay,
        } => {
            let provider = Arc::new(YahooClient::new(&config, log.clone())?);
            let enricher = ProfileEnricher::new(provider, batch_size, Duration::from_secs(batch_delay), log.clone());
            let output = output.unwrap_or_else(|| input.clone());

            log.info(format!("Starting description fetch for {}", input.display()));
            let report = enricher.run(&input, &output).await?;
            println!(
                "✅ {} rows, {} attempted, {} enriched, {} failed -> {}",
                report.rows,
                report.attempted,
                report.enriched,
                report.failed,
                output.display()
            );
            Ok(())
        }
    }
}

async fn run_update(config: &Config, reset: bool, today: NaiveDate, log: LogContext) -> Result<()> {
    log.info(format!("🚀 Starting update as of {}", today));

    // workbook problems abort the run before anything on disk is touched
    let companies = WorkbookReader::new(&config.workbook_dir, log.clone()).read_companies(&config.years)?;

    let store = Arc::new(TickerStore::new(&config.details_dir, log.clone())?);
    if reset {
        store.reset(&config.summary_file)?;
    }

    let provider = Arc::new(YahooClient::new(config, log.clone())?);
    let orchestrator = BatchOrchestrator::new(config, provider, store, log.clone());
    let report = orchestrator.run(&companies, today).await;

    println!("📊 {}", report);
    if !report.summary_saved {
        return Err(anyhow!("summary feed was not written to {}", config.summary_file.display()));
    }
    Ok(())
}
