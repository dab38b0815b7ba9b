use chrono::NaiveDate;
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::PriceRecordError;

/// The nine tracked performance metrics, in spreadsheet order.
pub const METRIC_COLUMNS: [&str; 9] = [
    "FCF yield",
    "NOPAT",
    "ROIC",
    "ReinvRate",
    "D/E",
    "ICR",
    "OMS",
    "EV/OCF",
    "EVA/InvCap",
];

/// Metrics that carry a `<metric> Evaluation` column. NOPAT has none.
pub const EVALUATED_METRICS: [&str; 8] = [
    "FCF yield",
    "ROIC",
    "ReinvRate",
    "D/E",
    "ICR",
    "OMS",
    "EV/OCF",
    "EVA/InvCap",
];

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Company identity plus per-year fundamentals, as read from the workbook
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRecord {
    pub company: Option<String>,
    pub ticker: String,
    pub sector: Option<String>,
    pub description: Option<String>,
    pub years: BTreeMap<String, YearData>,
}

impl CompanyRecord {
    pub fn new(ticker: &str) -> Self {
        Self {
            company: None,
            ticker: ticker.to_string(),
            sector: None,
            description: None,
            years: BTreeMap::new(),
        }
    }

    /// Latest year label present for this company.
    pub fn latest_year(&self) -> Option<&str> {
        self.years.keys().next_back().map(String::as_str)
    }
}

/// One year's fundamentals for a company
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearData {
    pub dcf_value: Option<f64>,
    pub exit_multiple_value: Option<f64>,
    pub market_cap: Option<f64>,
    /// Metric name -> raw value
    pub metrics: BTreeMap<String, Option<f64>>,
    /// Metric name -> evaluation label ("Strong", "Weak", ...)
    pub evaluations: BTreeMap<String, Option<String>>,
}

/// Year fundamentals as persisted; the raw metric maps are not kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearSnapshot {
    #[serde(rename = "DCFValue")]
    pub dcf_value: Option<f64>,
    #[serde(rename = "ExitMultipleValue")]
    pub exit_multiple_value: Option<f64>,
    #[serde(rename = "MarketCap")]
    pub market_cap: Option<f64>,
}

impl From<&YearData> for YearSnapshot {
    fn from(year: &YearData) -> Self {
        Self {
            dcf_value: year.dcf_value,
            exit_multiple_value: year.exit_multiple_value,
            market_cap: year.market_cap,
        }
    }
}

/// A validated daily close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(rename = "Date", with = "iso_date")]
    pub date: NaiveDate,
    #[serde(rename = "Close")]
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Untrusted price observation, as found on disk or returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    #[serde(rename = "Date", default)]
    pub date: Value,
    #[serde(rename = "Close", default)]
    pub close: Value,
}

impl PriceRecord {
    pub fn new(date: impl Into<String>, close: Option<f64>) -> Self {
        Self {
            date: Value::String(date.into()),
            close: close
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }

    /// Normalize the date and validate the close.
    pub fn to_point(&self) -> Result<PricePoint, PriceRecordError> {
        let date = parse_record_date(&self.date)?;
        let close = match &self.close {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| PriceRecordError::InvalidClose(self.close.to_string()))?;

        if !close.is_finite() || close <= 0.0 {
            return Err(PriceRecordError::InvalidClose(self.close.to_string()));
        }
        Ok(PricePoint { date, close })
    }
}

impl From<PricePoint> for PriceRecord {
    fn from(point: PricePoint) -> Self {
        PriceRecord::new(point.date.format(DATE_FORMAT).to_string(), Some(point.close))
    }
}

/// Accepts `YYYY-MM-DD` optionally followed by a time component
/// (`2024-01-02T00:00:00`, `2024-01-02 00:00:00-05:00`).
fn parse_record_date(raw: &Value) -> Result<NaiveDate, PriceRecordError> {
    let text = raw
        .as_str()
        .ok_or_else(|| PriceRecordError::InvalidDate(raw.to_string()))?
        .trim();
    let date_part = text.split(|c: char| c == 'T' || c == ' ').next().unwrap_or_default();
    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
        .map_err(|_| PriceRecordError::InvalidDate(text.to_string()))
}

mod iso_date {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// A metric value paired with its evaluation label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedMetric {
    #[serde(rename = "Value")]
    pub value: Option<f64>,
    #[serde(rename = "Evaluation")]
    pub evaluation: Option<String>,
}

pub type CombinedMetrics = BTreeMap<String, CombinedMetric>;

const COMBINED_METRICS_PREFIX: &str = "CombinedPerformanceMetrics_";

/// Year -> combined metrics, flattened into the document as
/// `CombinedPerformanceMetrics_<year>` keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearMetrics(pub BTreeMap<String, CombinedMetrics>);

impl Serialize for YearMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (year, metrics) in &self.0 {
            map.serialize_entry(&format!("{COMBINED_METRICS_PREFIX}{year}"), metrics)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for YearMetrics {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct YearMetricsVisitor;

        impl<'de> Visitor<'de> for YearMetricsVisitor {
            type Value = YearMetrics;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of CombinedPerformanceMetrics_<year> entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut years = BTreeMap::new();
                while let Some(key) = access.next_key::<String>()? {
                    match key.strip_prefix(COMBINED_METRICS_PREFIX) {
                        Some(year) => {
                            let metrics: CombinedMetrics = access.next_value()?;
                            years.insert(year.to_string(), metrics);
                        }
                        None => {
                            access.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(YearMetrics(years))
            }
        }

        deserializer.deserialize_map(YearMetricsVisitor)
    }
}

/// The persisted per-ticker document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerDocument {
    #[serde(rename = "Company")]
    pub company: Option<String>,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Sector")]
    pub sector: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "HistoricalPrices", default)]
    pub historical_prices: Vec<PricePoint>,
    #[serde(rename = "Years", default)]
    pub years: BTreeMap<String, YearSnapshot>,
    #[serde(rename = "Points", default)]
    pub points: Option<u32>,
    #[serde(rename = "Comparatives", default)]
    pub comparatives: Option<f64>,
    #[serde(flatten)]
    pub combined_metrics: YearMetrics,
}

impl TickerDocument {
    /// Fresh document carrying only identity fields.
    pub fn for_company(company: &CompanyRecord) -> Self {
        Self {
            company: company.company.clone(),
            ticker: company.ticker.clone(),
            sector: company.sector.clone(),
            description: company.description.clone(),
            historical_prices: Vec::new(),
            years: company
                .years
                .iter()
                .map(|(year, data)| (year.clone(), YearSnapshot::from(data)))
                .collect(),
            points: None,
            comparatives: None,
            combined_metrics: YearMetrics::default(),
        }
    }

    pub fn current_price(&self) -> Option<f64> {
        self.historical_prices.last().map(|p| p.close)
    }
}

/// Only the part of a stored document the pipeline reads back. Elements
/// are kept raw so one bad entry cannot sink the rest of the series.
#[derive(Debug, Default, Deserialize)]
pub struct PersistedPrices {
    #[serde(rename = "HistoricalPrices", default)]
    pub historical_prices: Vec<Value>,
}

/// One row of the aggregate summary feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    #[serde(rename = "Company")]
    pub company: Option<String>,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Sector")]
    pub sector: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "CurrentPrice")]
    pub current_price: Option<f64>,
    #[serde(rename = "MarketCap")]
    pub market_cap: Option<f64>,
    #[serde(rename = "DCFValue")]
    pub dcf_value: Option<f64>,
    #[serde(rename = "ExitMultipleValue")]
    pub exit_multiple_value: Option<f64>,
    #[serde(rename = "Points")]
    pub points: Option<u32>,
    #[serde(rename = "Comparatives")]
    pub comparatives: Option<f64>,
    #[serde(rename = "LatestCombinedPerformanceMetrics")]
    pub latest_combined_metrics: Option<CombinedMetrics>,
}

impl SummaryEntry {
    pub fn from_document(document: &TickerDocument, latest_year: Option<&str>) -> Self {
        let year = latest_year.and_then(|y| document.years.get(y));
        Self {
            company: document.company.clone(),
            ticker: document.ticker.clone(),
            sector: document.sector.clone(),
            description: document.description.clone(),
            current_price: document.current_price(),
            market_cap: year.and_then(|y| y.market_cap),
            dcf_value: year.and_then(|y| y.dcf_value),
            exit_multiple_value: year.and_then(|y| y.exit_multiple_value),
            points: document.points,
            comparatives: document.comparatives,
            latest_combined_metrics: latest_year
                .and_then(|y| document.combined_metrics.0.get(y))
                .cloned(),
        }
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub workbook_dir: PathBuf,
    pub details_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub summary_file: PathBuf,
    pub years: Vec<String>,
    pub batch_size: usize,
    pub api_delay_secs: u64,
    pub price_update_days: i64,
    pub full_period: String,
    pub interval: String,
    pub backfill_window_days: i64,
    pub rate_limit_per_minute: u32,
    pub yahoo_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workbook_dir: PathBuf::from("data_script/workbook"),
            details_dir: PathBuf::from("details"),
            logs_dir: PathBuf::from("logs"),
            summary_file: PathBuf::from("companies.json"),
            years: vec!["2023".to_string(), "2024".to_string()],
            batch_size: 20,
            api_delay_secs: 3,
            price_update_days: 1,
            full_period: "1y".to_string(),
            interval: "1d".to_string(),
            backfill_window_days: 30,
            rate_limit_per_minute: 120,
            yahoo_base_url: "https://query1.finance.yahoo.com".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        let defaults = Config::default();

        let years = match std::env::var("YEARS") {
            Ok(raw) => {
                let years: Vec<String> = raw
                    .split(',')
                    .map(|y| y.trim().to_string())
                    .filter(|y| !y.is_empty())
                    .collect();
                if years.is_empty() {
                    anyhow::bail!("YEARS must name at least one sheet, got {:?}", raw);
                }
                years
            }
            Err(_) => defaults.years,
        };

        Ok(Config {
            workbook_dir: env_path("WORKBOOK_DIR", defaults.workbook_dir),
            details_dir: env_path("DETAILS_DIR", defaults.details_dir),
            logs_dir: env_path("LOGS_DIR", defaults.logs_dir),
            summary_file: env_path("SUMMARY_FILE", defaults.summary_file),
            years,
            batch_size: env_parse("BATCH_SIZE", defaults.batch_size).max(1),
            api_delay_secs: env_parse("API_DELAY_SECS", defaults.api_delay_secs),
            price_update_days: env_parse("PRICE_UPDATE_DAYS", defaults.price_update_days),
            full_period: std::env::var("FULL_PERIOD").unwrap_or(defaults.full_period),
            interval: std::env::var("PRICE_INTERVAL").unwrap_or(defaults.interval),
            backfill_window_days: env_parse("BACKFILL_WINDOW_DAYS", defaults.backfill_window_days),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            yahoo_base_url: std::env::var("YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
        })
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
