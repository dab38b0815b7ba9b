//! In-memory market standing in for the Yahoo client

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use stock_feed::api::PriceProvider;
use stock_feed::error::ProviderError;
use stock_feed::models::{PricePoint, PriceRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Batch(Vec<String>),
    Range(String, NaiveDate, NaiveDate),
}

/// Serves closes from a fixed price table. Batch fetches return everything
/// up to `as_of`; tickers listed as failing are left out of batch results
/// and error on range fetches.
pub struct FakeProvider {
    prices: HashMap<String, Vec<PricePoint>>,
    failing: Mutex<HashSet<String>>,
    as_of: Mutex<NaiveDate>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl FakeProvider {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            prices: HashMap::new(),
            failing: Mutex::new(HashSet::new()),
            as_of: Mutex::new(as_of),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_series(mut self, ticker: &str, series: Vec<PricePoint>) -> Self {
        self.prices.insert(ticker.to_string(), series);
        self
    }

    pub fn fail(&self, ticker: &str) {
        self.failing.lock().unwrap().insert(ticker.to_string());
    }

    pub fn set_as_of(&self, as_of: NaiveDate) {
        *self.as_of.lock().unwrap() = as_of;
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn is_failing(&self, ticker: &str) -> bool {
        self.failing.lock().unwrap().contains(ticker)
    }

    fn records(&self, ticker: &str, start: NaiveDate, end_exclusive: NaiveDate) -> Vec<PriceRecord> {
        self.prices
            .get(ticker)
            .map(|series| {
                series
                    .iter()
                    .filter(|p| p.date >= start && p.date < end_exclusive)
                    .copied()
                    .map(PriceRecord::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl PriceProvider for FakeProvider {
    async fn fetch_batch(
        &self,
        tickers: &[String],
        _period: &str,
        _interval: &str,
    ) -> Result<HashMap<String, Vec<PriceRecord>>, ProviderError> {
        self.calls.lock().unwrap().push(ProviderCall::Batch(tickers.to_vec()));
        let as_of = *self.as_of.lock().unwrap();

        let mut results = HashMap::new();
        for ticker in tickers {
            if self.is_failing(ticker) {
                continue;
            }
            let records = self.records(ticker, NaiveDate::MIN, as_of + chrono::Duration::days(1));
            if !records.is_empty() {
                results.insert(ticker.clone(), records);
            }
        }

        if results.is_empty() {
            return Err(ProviderError::Empty(tickers.join(", ")));
        }
        Ok(results)
    }

    async fn fetch_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(ProviderCall::Range(ticker.to_string(), start, end));

        if self.is_failing(ticker) {
            return Err(ProviderError::Api {
                ticker: ticker.to_string(),
                message: "simulated outage".to_string(),
            });
        }
        Ok(self.records(ticker, start, end))
    }
}
