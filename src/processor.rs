use chrono::NaiveDate;
use std::sync::Arc;

use crate::backfill::GapBackfiller;
use crate::error::ProcessError;
use crate::logging::LogContext;
use crate::metrics::derive_scores;
use crate::models::{CompanyRecord, PriceRecord, SummaryEntry, TickerDocument};
use crate::store::{merge_prices, TickerStore};

/// Result of running one ticker through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum TickerOutcome {
    Processed(SummaryEntry),
    /// The provider had nothing usable; the stored document was not touched
    Skipped { ticker: String, reason: String },
    Failed { ticker: String, reason: String },
}

impl TickerOutcome {
    pub fn ticker(&self) -> &str {
        match self {
            TickerOutcome::Processed(entry) => &entry.ticker,
            TickerOutcome::Skipped { ticker, .. } | TickerOutcome::Failed { ticker, .. } => ticker,
        }
    }
}

/// Merge, backfill, score and persist one company
pub struct CompanyProcessor {
    store: Arc<TickerStore>,
    backfiller: GapBackfiller,
    log: LogContext,
}

impl CompanyProcessor {
    pub fn new(store: Arc<TickerStore>, backfiller: GapBackfiller, log: LogContext) -> Self {
        Self { store, backfiller, log }
    }

    pub async fn process(&self, company: &CompanyRecord, fetched: &[PriceRecord], today: NaiveDate) -> TickerOutcome {
        match self.try_process(company, fetched, today).await {
            Ok(entry) => TickerOutcome::Processed(entry),
            Err(e) => {
                self.log.error(format!("❌ Failed to process {}: {}", company.ticker, e));
                TickerOutcome::Failed {
                    ticker: company.ticker.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_process(
        &self,
        company: &CompanyRecord,
        fetched: &[PriceRecord],
        today: NaiveDate,
    ) -> Result<SummaryEntry, ProcessError> {
        let ticker = company.ticker.as_str();

        let existing = self.store.load_prices(ticker);
        let merged = merge_prices(&existing, fetched, &self.log);
        let series = self.backfiller.fill(ticker, merged, today).await;

        let mut document = TickerDocument::for_company(company);
        document.historical_prices = series;

        let latest_year = company.latest_year();
        match latest_year.and_then(|year| company.years.get(year).map(|data| (year, data))) {
            Some((year, data)) => {
                let scores = derive_scores(data);
                document.points = Some(scores.points);
                document.comparatives = scores.comparatives;
                document.combined_metrics.0.insert(year.to_string(), scores.combined);
            }
            None => self.log.warn(format!("{}: no yearly fundamentals, skipping scores", ticker)),
        }

        self.store.save(&document)?;
        self.log.info(format!(
            "✓ {}: {} prices stored, latest {}",
            ticker,
            document.historical_prices.len(),
            document
                .historical_prices
                .last()
                .map(|p| p.date.to_string())
                .unwrap_or_else(|| "none".to_string())
        ));

        Ok(SummaryEntry::from_document(&document, latest_year))
    }
}
