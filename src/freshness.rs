use chrono::{Duration, NaiveDate};

use crate::logging::LogContext;
use crate::store::TickerStore;

/// Tickers split by how much history they need
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePlan {
    /// No usable history, or history too old: refetch the full window
    pub full: Vec<String>,
    /// Fetch from the given start date through today
    pub partial: Vec<(String, NaiveDate)>,
    /// Already current
    pub current: Vec<String>,
}

impl UpdatePlan {
    pub fn len(&self) -> usize {
        self.full.len() + self.partial.len() + self.current.len()
    }
}

pub struct FreshnessClassifier {
    threshold_days: i64,
    log: LogContext,
}

impl FreshnessClassifier {
    pub fn new(threshold_days: i64, log: LogContext) -> Self {
        Self { threshold_days, log }
    }

    pub fn classify(&self, tickers: &[String], store: &TickerStore, today: NaiveDate) -> UpdatePlan {
        let mut plan = UpdatePlan::default();

        for ticker in tickers {
            let Some(latest) = store.latest_price_date(ticker) else {
                self.log.debug(format!("{}: no stored prices, full update", ticker));
                plan.full.push(ticker.clone());
                continue;
            };

            let age = (today - latest).num_days();
            if age > self.threshold_days {
                self.log.debug(format!("{}: last price {} is {} days old, full update", ticker, latest, age));
                plan.full.push(ticker.clone());
                continue;
            }

            let start = latest + Duration::days(1);
            if start > today {
                plan.current.push(ticker.clone());
            } else {
                plan.partial.push((ticker.clone(), start));
            }
        }

        self.log.info(format!(
            "Update plan: {} full, {} partial, {} current",
            plan.full.len(),
            plan.partial.len(),
            plan.current.len()
        ));
        plan
    }
}
