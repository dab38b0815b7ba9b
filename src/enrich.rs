//! Company profile enrichment for the description CSV.
//!
//! Rows whose descriptive columns are blank or hold a previous failure are
//! re-fetched in batches. The file is rewritten after every batch so an
//! interrupted run keeps its progress.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{CompanyProfile, ProfileProvider};
use crate::error::EnrichError;
use crate::logging::LogContext;

const NOT_AVAILABLE: &str = "Not available";
const LIMITED_INFO: &str = "Limited information available";

/// Columns written for every enriched row
pub const PROFILE_COLUMNS: [&str; 11] = [
    "longBusinessSummary",
    "industry",
    "sector",
    "shortName",
    "longName",
    "website",
    "fullTimeEmployees",
    "city",
    "state",
    "country",
    "shortDescription",
];

/// A row is re-fetched when any of these is missing
const REQUIRED_COLUMNS: [&str; 4] = ["longBusinessSummary", "industry", "sector", "shortDescription"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichReport {
    pub rows: usize,
    pub attempted: usize,
    pub enriched: usize,
    pub failed: usize,
}

pub struct ProfileEnricher {
    provider: Arc<dyn ProfileProvider>,
    batch_size: usize,
    delay: Duration,
    log: LogContext,
}

impl ProfileEnricher {
    pub fn new(provider: Arc<dyn ProfileProvider>, batch_size: usize, delay: Duration, log: LogContext) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            delay,
            log,
        }
    }

    /// Enrich `input`, writing the result to `output` (which may be the
    /// same file).
    pub async fn run(&self, input: &Path, output: &Path) -> Result<EnrichReport, EnrichError> {
        let mut sheet = ProfileSheet::read(input)?;
        let mut report = EnrichReport {
            rows: sheet.rows.len(),
            ..Default::default()
        };

        let pending: Vec<usize> = (0..sheet.rows.len()).filter(|&i| sheet.needs_profile(i)).collect();
        if pending.is_empty() {
            self.log.info("All tickers already have complete company information!");
            return Ok(report);
        }

        let total_batches = pending.len().div_ceil(self.batch_size);
        self.log.info(format!(
            "Found {} of {} tickers that need descriptions, {} batches of {}",
            pending.len(),
            sheet.rows.len(),
            total_batches,
            self.batch_size
        ));

        for (batch_index, batch) in pending.chunks(self.batch_size).enumerate() {
            self.log.info(format!("--- Processing Batch {}/{} ---", batch_index + 1, total_batches));

            for &row in batch {
                let ticker = sheet.ticker(row);
                report.attempted += 1;

                let values = match self.provider.fetch_profile(&ticker).await {
                    Ok(profile) if profile.is_empty() => {
                        let message = format!("No company information available for {}", ticker);
                        self.log.warn(&message);
                        report.failed += 1;
                        uniform_values(&message)
                    }
                    Ok(profile) => {
                        report.enriched += 1;
                        self.log.info(format!("✓ Fetched company info for {}", ticker));
                        profile_values(&profile)
                    }
                    Err(e) => {
                        self.log.error(format!("Error fetching company info for {}: {}", ticker, e));
                        report.failed += 1;
                        uniform_values(&format!("Error: {}", e))
                    }
                };
                sheet.set_profile(row, &values);
            }

            sheet.write(output)?;
            self.log.info(format!("✓ Batch {} completed and saved", batch_index + 1));

            if batch_index + 1 < total_batches && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        self.log.info(format!(
            "Summary: {} enriched, {} failed of {} attempted",
            report.enriched, report.failed, report.attempted
        ));
        Ok(report)
    }
}

/// The description CSV held in memory, with every profile column present
struct ProfileSheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    ticker_column: usize,
}

impl ProfileSheet {
    fn read(path: &Path) -> Result<Self, EnrichError> {
        let csv_error = |source| EnrichError::Csv { path: path.to_path_buf(), source };
        let mut reader = ReaderBuilder::new().flexible(true).from_path(path).map_err(csv_error)?;

        let mut headers: Vec<String> = reader.headers().map_err(csv_error)?.iter().map(str::to_string).collect();
        let ticker_column = headers
            .iter()
            .position(|h| h.trim() == "ticker")
            .ok_or_else(|| EnrichError::MissingTickerColumn(path.to_path_buf()))?;

        for column in PROFILE_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record: StringRecord = record.map_err(csv_error)?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows, ticker_column })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn ticker(&self, row: usize) -> String {
        self.rows[row][self.ticker_column].trim().to_string()
    }

    fn needs_profile(&self, row: usize) -> bool {
        if self.ticker(row).is_empty() {
            return false;
        }
        REQUIRED_COLUMNS.iter().any(|column| {
            self.column(column)
                .map(|i| is_missing(&self.rows[row][i]))
                .unwrap_or(true)
        })
    }

    fn set_profile(&mut self, row: usize, values: &[(&str, String)]) {
        for (column, value) in values {
            if let Some(i) = self.column(column) {
                self.rows[row][i] = value.clone();
            }
        }
    }

    fn write(&self, path: &Path) -> Result<(), EnrichError> {
        let csv_error = |source| EnrichError::Csv { path: PathBuf::from(path), source };
        let mut writer = WriterBuilder::new().from_path(path).map_err(csv_error)?;
        writer.write_record(&self.headers).map_err(csv_error)?;
        for row in &self.rows {
            writer.write_record(row).map_err(csv_error)?;
        }
        writer.flush().map_err(|e| csv_error(e.into()))
    }
}

fn is_missing(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || value.eq_ignore_ascii_case("nan")
        || value.starts_with("Error:")
        || value.starts_with("No ")
        || value == NOT_AVAILABLE
}

fn uniform_values(message: &str) -> Vec<(&'static str, String)> {
    PROFILE_COLUMNS.iter().map(|c| (*c, message.to_string())).collect()
}

fn profile_values(profile: &CompanyProfile) -> Vec<(&'static str, String)> {
    let text = |value: &Option<String>| value.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string());
    vec![
        ("longBusinessSummary", text(&profile.long_business_summary)),
        ("industry", text(&profile.industry)),
        ("sector", text(&profile.sector)),
        ("shortName", text(&profile.short_name)),
        ("longName", text(&profile.long_name)),
        ("website", text(&profile.website)),
        (
            "fullTimeEmployees",
            profile
                .full_time_employees
                .map(|n| n.to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        ),
        ("city", text(&profile.city)),
        ("state", text(&profile.state)),
        ("country", text(&profile.country)),
        ("shortDescription", short_description(profile)),
    ]
}

/// "Industry: ...; Sector: ...; Employees: 1,234; Location: city, state, country"
pub fn short_description(profile: &CompanyProfile) -> String {
    let mut parts = Vec::new();
    if let Some(industry) = &profile.industry {
        parts.push(format!("Industry: {industry}"));
    }
    if let Some(sector) = &profile.sector {
        parts.push(format!("Sector: {sector}"));
    }
    if let Some(employees) = profile.full_time_employees {
        parts.push(format!("Employees: {}", group_thousands(employees)));
    }

    let location: Vec<&str> = [&profile.city, &profile.state, &profile.country]
        .into_iter()
        .filter_map(|p| p.as_deref())
        .collect();
    if !location.is_empty() {
        parts.push(format!("Location: {}", location.join(", ")));
    }

    if parts.is_empty() {
        LIMITED_INFO.to_string()
    } else {
        parts.join("; ")
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
