//! Batch driver for the price pipeline.
//!
//! Companies are handled in fixed-size batches. Each batch is classified by
//! freshness, fetched with one batch call for full refreshes and one range
//! call per incremental ticker, then run through the per-ticker processor.
//! Awaits are strictly sequential.

use chrono::{Duration, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::PriceProvider;
use crate::backfill::GapBackfiller;
use crate::freshness::FreshnessClassifier;
use crate::logging::LogContext;
use crate::models::{CompanyRecord, Config, PriceRecord, SummaryEntry};
use crate::processor::{CompanyProcessor, TickerOutcome};
use crate::store::{colliding_tickers, TickerStore};

/// What happened during one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub batches: usize,
    pub full: usize,
    pub partial: usize,
    pub current: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub summary_saved: bool,
    pub outcomes: Vec<TickerOutcome>,
}

impl RunReport {
    fn record(&mut self, outcome: TickerOutcome) {
        match &outcome {
            TickerOutcome::Processed(_) => self.processed += 1,
            TickerOutcome::Skipped { .. } => self.skipped += 1,
            TickerOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn entries(&self) -> Vec<SummaryEntry> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                TickerOutcome::Processed(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batches | plan: {} full, {} partial, {} current | {} processed, {} skipped, {} failed | summary {}",
            self.batches,
            self.full,
            self.partial,
            self.current,
            self.processed,
            self.skipped,
            self.failed,
            if self.summary_saved { "saved" } else { "NOT saved" }
        )
    }
}

pub struct BatchOrchestrator {
    provider: Arc<dyn PriceProvider>,
    store: Arc<TickerStore>,
    classifier: FreshnessClassifier,
    processor: CompanyProcessor,
    batch_size: usize,
    api_delay: std::time::Duration,
    full_period: String,
    interval: String,
    summary_file: PathBuf,
    log: LogContext,
}

impl BatchOrchestrator {
    pub fn new(config: &Config, provider: Arc<dyn PriceProvider>, store: Arc<TickerStore>, log: LogContext) -> Self {
        let backfiller = GapBackfiller::new(provider.clone(), config.backfill_window_days, log.clone());
        Self {
            classifier: FreshnessClassifier::new(config.price_update_days, log.clone()),
            processor: CompanyProcessor::new(store.clone(), backfiller, log.clone()),
            provider,
            store,
            batch_size: config.batch_size.max(1),
            api_delay: std::time::Duration::from_secs(config.api_delay_secs),
            full_period: config.full_period.clone(),
            interval: config.interval.clone(),
            summary_file: config.summary_file.clone(),
            log,
        }
    }

    /// Run every company through the pipeline and write the summary feed
    pub async fn run(&self, companies: &[CompanyRecord], today: NaiveDate) -> RunReport {
        let mut report = RunReport::default();

        // tickers that would overwrite an earlier ticker's document
        let collisions = colliding_tickers(&self.store, companies.iter().map(|c| c.ticker.as_str()));
        for (ticker, owner) in &collisions {
            self.log.warn(format!("⚠️ {} shares a document file with {}, skipping", ticker, owner));
            report.record(TickerOutcome::Skipped {
                ticker: ticker.to_string(),
                reason: format!("document path already used by {}", owner),
            });
        }
        let companies: Vec<&CompanyRecord> = companies
            .iter()
            .filter(|c| !collisions.iter().any(|(ticker, _)| *ticker == c.ticker))
            .collect();
        let total_batches = companies.len().div_ceil(self.batch_size);

        self.log.info(format!(
            "🚀 Processing {} companies in {} batches of up to {} (as of {})",
            companies.len(),
            total_batches,
            self.batch_size,
            today
        ));

        for (index, batch) in companies.chunks(self.batch_size).enumerate() {
            self.log.info(format!("--- Batch {}/{} ---", index + 1, total_batches));
            self.run_batch(batch, today, &mut report).await;
            report.batches += 1;

            if index + 1 < total_batches && !self.api_delay.is_zero() {
                self.log.info(format!("Waiting {:?} before next batch...", self.api_delay));
                tokio::time::sleep(self.api_delay).await;
            }
        }

        let unprocessed: Vec<&str> = report
            .outcomes
            .iter()
            .filter(|o| !matches!(o, TickerOutcome::Processed(_)))
            .map(TickerOutcome::ticker)
            .collect();
        if !unprocessed.is_empty() {
            self.log.warn(format!("Not in this run's summary: {}", unprocessed.join(", ")));
        }

        let entries = report.entries();
        match self.store.write_summary(&self.summary_file, &entries) {
            Ok(()) => report.summary_saved = true,
            Err(e) => self.log.error(format!("Failed to write summary feed: {}", e)),
        }

        self.log.info(format!("📊 Run complete: {}", report));
        report
    }

    async fn run_batch(&self, batch: &[&CompanyRecord], today: NaiveDate, report: &mut RunReport) {
        let tickers: Vec<String> = batch.iter().map(|c| c.ticker.clone()).collect();
        let plan = self.classifier.classify(&tickers, &self.store, today);
        report.full += plan.full.len();
        report.partial += plan.partial.len();
        report.current += plan.current.len();

        let mut fetched: HashMap<String, Vec<PriceRecord>> = HashMap::new();
        let mut skipped: HashMap<String, String> = HashMap::new();

        if !plan.full.is_empty() {
            match self.provider.fetch_batch(&plan.full, &self.full_period, &self.interval).await {
                Ok(mut results) => {
                    for ticker in &plan.full {
                        match results.remove(ticker) {
                            Some(records) => {
                                fetched.insert(ticker.clone(), records);
                            }
                            None => {
                                self.log.warn(format!("⚠️ No data returned for {}, skipping", ticker));
                                skipped.insert(ticker.clone(), "no data in batch fetch".to_string());
                            }
                        }
                    }
                }
                Err(e) => {
                    self.log.error(format!("Batch fetch failed for {}: {}", plan.full.join(", "), e));
                    for ticker in &plan.full {
                        skipped.insert(ticker.clone(), format!("batch fetch failed: {}", e));
                    }
                }
            }
        }

        let end = today + Duration::days(1);
        for (ticker, start) in &plan.partial {
            match self.provider.fetch_range(ticker, *start, end).await {
                Ok(records) => {
                    self.log.debug(format!("{}: {} new records since {}", ticker, records.len(), start));
                    fetched.insert(ticker.clone(), records);
                }
                Err(e) => {
                    self.log.warn(format!("Incremental fetch failed for {}: {}", ticker, e));
                    skipped.insert(ticker.clone(), format!("incremental fetch failed: {}", e));
                }
            }
        }

        let current: HashSet<&String> = plan.current.iter().collect();
        for company in batch {
            let ticker = &company.ticker;
            if let Some(reason) = skipped.remove(ticker) {
                report.record(TickerOutcome::Skipped { ticker: ticker.clone(), reason });
                continue;
            }
            if current.contains(ticker) {
                self.log.debug(format!("{}: prices already current", ticker));
            }
            let records = fetched.remove(ticker).unwrap_or_default();
            let outcome = self.processor.process(company, &records, today).await;
            report.record(outcome);
        }
    }
}
