use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use super::{ApiRateLimiter, PriceProvider, ProfileProvider};
use crate::error::ProviderError;
use crate::logging::LogContext;
use crate::models::{Config, PriceRecord, DATE_FORMAT};

/// Chart endpoint envelope
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: Option<String>,
    description: Option<String>,
}

impl YahooError {
    fn message(&self) -> String {
        match (&self.code, &self.description) {
            (Some(code), Some(description)) => format!("{code}: {description}"),
            (Some(code), None) => code.clone(),
            (None, Some(description)) => description.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC, in seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
    #[serde(default)]
    adjclose: Vec<AdjCloseSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct AdjCloseSeries {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

impl ChartResult {
    /// One record per timestamp that carries a close. Adjusted closes win
    /// over raw closes.
    fn into_records(self) -> Vec<PriceRecord> {
        let closes = self.indicators.quote.into_iter().next().map(|q| q.close).unwrap_or_default();
        let adjusted = self
            .indicators
            .adjclose
            .into_iter()
            .next()
            .map(|a| a.adjclose)
            .unwrap_or_default();

        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, &ts)| {
                let close = adjusted
                    .get(i)
                    .copied()
                    .flatten()
                    .or_else(|| closes.get(i).copied().flatten())?;
                let date = DateTime::from_timestamp(ts + self.meta.gmtoffset, 0)?.date_naive();
                Some(PriceRecord::new(date.format(DATE_FORMAT).to_string(), Some(close)))
            })
            .collect()
    }
}

/// quoteSummary endpoint envelope
#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    result: Option<Vec<QuoteSummaryResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    #[serde(rename = "assetProfile", default)]
    asset_profile: AssetProfile,
    #[serde(default)]
    price: PriceModule,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetProfile {
    long_business_summary: Option<String>,
    industry: Option<String>,
    sector: Option<String>,
    website: Option<String>,
    full_time_employees: Option<u64>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    short_name: Option<String>,
    long_name: Option<String>,
}

/// Descriptive company metadata from the profile endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyProfile {
    pub long_business_summary: Option<String>,
    pub industry: Option<String>,
    pub sector: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub website: Option<String>,
    pub full_time_employees: Option<u64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl CompanyProfile {
    pub fn is_empty(&self) -> bool {
        *self == CompanyProfile::default()
    }
}

impl From<QuoteSummaryResult> for CompanyProfile {
    fn from(result: QuoteSummaryResult) -> Self {
        let profile = result.asset_profile;
        Self {
            long_business_summary: profile.long_business_summary,
            industry: profile.industry,
            sector: profile.sector,
            short_name: result.price.short_name,
            long_name: result.price.long_name,
            website: profile.website,
            full_time_employees: profile.full_time_employees,
            city: profile.city,
            state: profile.state,
            country: profile.country,
        }
    }
}

/// Yahoo Finance client
pub struct YahooClient {
    client: Client,
    base_url: Url,
    rate_limiter: ApiRateLimiter,
    log: LogContext,
}

impl YahooClient {
    /// Create a new Yahoo client
    pub fn new(config: &Config, log: LogContext) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; stock-feed/0.1)")
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.yahoo_base_url)?,
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
            log,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Decode(format!("base url cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Paced GET returning the decoded body. Non-success statuses are
    /// decoded too when possible, since Yahoo reports unknown symbols as a
    /// 404 carrying a normal error envelope.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<(u16, Result<T, String>), ProviderError> {
        self.rate_limiter.wait().await;
        self.log.debug(format!("Making request to: {}", url));

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let decoded = serde_json::from_str::<T>(&body).map_err(|_| body);
        Ok((status, decoded))
    }

    async fn get_chart(&self, ticker: &str, query: &[(&str, String)]) -> Result<Vec<PriceRecord>, ProviderError> {
        let mut url = self.endpoint(&["v8", "finance", "chart", ticker])?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));

        let (status, decoded) = self.get_json::<ChartResponse>(url).await?;
        let chart = match decoded {
            Ok(response) => response.chart,
            Err(body) if !(200..300).contains(&status) => return Err(ProviderError::Status { status, body }),
            Err(body) => return Err(ProviderError::Decode(body)),
        };

        if let Some(error) = chart.error {
            return Err(ProviderError::Api {
                ticker: ticker.to_string(),
                message: error.message(),
            });
        }

        let records: Vec<PriceRecord> = chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(ChartResult::into_records)
            .unwrap_or_default();

        self.log.debug(format!("Retrieved {} closes for {}", records.len(), ticker));
        Ok(records)
    }
}

#[async_trait]
impl PriceProvider for YahooClient {
    async fn fetch_batch(
        &self,
        tickers: &[String],
        period: &str,
        interval: &str,
    ) -> Result<HashMap<String, Vec<PriceRecord>>, ProviderError> {
        let mut results = HashMap::new();
        if tickers.is_empty() {
            return Ok(results);
        }

        let query = [("range", period.to_string()), ("interval", interval.to_string())];
        for ticker in tickers {
            match self.get_chart(ticker, &query).await {
                Ok(records) if records.is_empty() => {
                    self.log.warn(format!("No data returned for {}", ticker));
                }
                Ok(records) => {
                    results.insert(ticker.clone(), records);
                }
                Err(e) => {
                    self.log.warn(format!("Failed to fetch data for {}: {}", ticker, e));
                }
            }
        }

        if results.is_empty() {
            return Err(ProviderError::Empty(tickers.join(", ")));
        }

        self.log.info(format!(
            "Successfully fetched data for {} out of {} tickers",
            results.len(),
            tickers.len()
        ));
        Ok(results)
    }

    async fn fetch_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, ProviderError> {
        let query = [
            ("period1", midnight_utc(start).to_string()),
            ("period2", midnight_utc(end).to_string()),
            ("interval", "1d".to_string()),
        ];
        let records = self.get_chart(ticker, &query).await?;
        Ok(records)
    }
}

#[async_trait]
impl ProfileProvider for YahooClient {
    async fn fetch_profile(&self, ticker: &str) -> Result<CompanyProfile, ProviderError> {
        let mut url = self.endpoint(&["v10", "finance", "quoteSummary", ticker])?;
        url.query_pairs_mut().append_pair("modules", "assetProfile,price");

        let (status, decoded) = self.get_json::<QuoteSummaryResponse>(url).await?;
        let summary = match decoded {
            Ok(response) => response.quote_summary,
            Err(body) if !(200..300).contains(&status) => return Err(ProviderError::Status { status, body }),
            Err(body) => return Err(ProviderError::Decode(body)),
        };

        if let Some(error) = summary.error {
            return Err(ProviderError::Api {
                ticker: ticker.to_string(),
                message: error.message(),
            });
        }

        summary
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(CompanyProfile::from)
            .ok_or_else(|| ProviderError::Empty(ticker.to_string()))
    }
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}
