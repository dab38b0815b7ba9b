use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::api::PriceProvider;
use crate::logging::LogContext;
use crate::models::{PricePoint, PriceRecord};
use crate::store::merge_prices;
use crate::utils::MarketCalendar;

/// Repairs business days missing from the trailing window of a series
pub struct GapBackfiller {
    provider: Arc<dyn PriceProvider>,
    window_days: i64,
    log: LogContext,
}

impl GapBackfiller {
    pub fn new(provider: Arc<dyn PriceProvider>, window_days: i64, log: LogContext) -> Self {
        Self { provider, window_days, log }
    }

    fn window_start(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(self.window_days)
    }

    /// Business days in the window that fall on or before the latest stored
    /// date and have no point. Days after the latest point are the next
    /// incremental fetch's job.
    pub fn missing_business_days(&self, series: &[PricePoint], today: NaiveDate) -> Vec<NaiveDate> {
        let Some(latest) = series.iter().map(|p| p.date).max() else {
            return Vec::new();
        };
        let present: BTreeSet<NaiveDate> = series.iter().map(|p| p.date).collect();

        MarketCalendar::business_days(self.window_start(today), today.min(latest))
            .into_iter()
            .filter(|d| !present.contains(d))
            .collect()
    }

    /// Fetch the window once and splice in closes for missing days only.
    /// Provider failures leave the series unchanged.
    pub async fn fill(&self, ticker: &str, series: Vec<PricePoint>, today: NaiveDate) -> Vec<PricePoint> {
        let missing: BTreeSet<NaiveDate> = self.missing_business_days(&series, today).into_iter().collect();
        if missing.is_empty() {
            return series;
        }

        self.log.info(format!(
            "🩹 {}: {} missing trading days in the last {} days, backfilling",
            ticker,
            missing.len(),
            self.window_days
        ));

        let fetched = match self
            .provider
            .fetch_range(ticker, self.window_start(today), today + Duration::days(1))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                self.log.warn(format!("Backfill failed for {}: {}", ticker, e));
                return series;
            }
        };

        let patches: Vec<PriceRecord> = fetched
            .iter()
            .filter_map(|record| record.to_point().ok())
            .filter(|point| missing.contains(&point.date))
            .map(PriceRecord::from)
            .collect();

        if patches.is_empty() {
            self.log.info(format!("{}: provider had nothing for the missing days", ticker));
            return series;
        }

        let existing: Vec<PriceRecord> = series.into_iter().map(PriceRecord::from).collect();
        let filled = patches.len();
        let merged = merge_prices(&existing, &patches, &self.log);
        self.log.info(format!("{}: backfilled {} days", ticker, filled));
        merged
    }
}
