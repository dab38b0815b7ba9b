use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;

use crate::error::ProviderError;
use crate::models::PriceRecord;

pub mod yahoo_client;
pub use yahoo_client::{CompanyProfile, YahooClient};

/// Evenly spaced request pacing for API clients
pub struct ApiRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

/// Source of daily closes.
///
/// `fetch_batch` may return fewer tickers than requested; a missing ticker
/// means the provider had nothing for it. `fetch_range` treats `end` as
/// exclusive.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_batch(
        &self,
        tickers: &[String],
        period: &str,
        interval: &str,
    ) -> Result<HashMap<String, Vec<PriceRecord>>, ProviderError>;

    async fn fetch_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, ProviderError>;
}

/// Source of descriptive company metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn fetch_profile(&self, ticker: &str) -> Result<CompanyProfile, ProviderError>;
}
