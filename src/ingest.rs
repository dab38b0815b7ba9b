//! Workbook ingestion.
//!
//! The workbook is a directory with one CSV sheet per year label
//! (`2023.csv`, `2024.csv`, ...). Each row describes one company for that
//! year. Rows are folded into [`CompanyRecord`]s keyed by ticker, keeping the
//! order in which tickers first appear.

use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::logging::LogContext;
use crate::models::{CompanyRecord, YearData, EVALUATED_METRICS, METRIC_COLUMNS};

const TICKER: &str = "ticker";
const COMPANY: &str = "Company";
const SECTOR: &str = "Primary Sector";
const DESCRIPTION: &str = "Description";
const DCF_VALUE: &str = "DCF value";
const EXIT_MULTIPLE_VALUE: &str = "Exit multiple value";
const MARKET_CAP: &str = "MarketCap";

pub fn evaluation_column(metric: &str) -> String {
    format!("{metric} Evaluation")
}

fn required_columns() -> Vec<String> {
    let mut columns: Vec<String> = [TICKER, COMPANY, SECTOR, DESCRIPTION, DCF_VALUE, EXIT_MULTIPLE_VALUE, MARKET_CAP]
        .iter()
        .map(|c| c.to_string())
        .collect();
    columns.extend(METRIC_COLUMNS.iter().map(|c| c.to_string()));
    columns.extend(EVALUATED_METRICS.iter().map(|m| evaluation_column(m)));
    columns
}

pub struct WorkbookReader {
    workbook_dir: PathBuf,
    log: LogContext,
}

impl WorkbookReader {
    pub fn new(workbook_dir: impl Into<PathBuf>, log: LogContext) -> Self {
        Self {
            workbook_dir: workbook_dir.into(),
            log,
        }
    }

    pub fn sheet_path(&self, year: &str) -> PathBuf {
        self.workbook_dir.join(format!("{year}.csv"))
    }

    /// Read every configured sheet into company records
    pub fn read_companies(&self, years: &[String]) -> Result<Vec<CompanyRecord>, IngestError> {
        let mut companies: Vec<CompanyRecord> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for year in years {
            let path = self.sheet_path(year);
            let rows = match self.read_sheet(year, &path) {
                Ok(rows) => rows,
                Err(e) => {
                    self.log.error(format!("Error reading workbook: {e}"));
                    return Err(e);
                }
            };

            for row in rows {
                let slot = *index.entry(row.ticker.clone()).or_insert_with(|| {
                    let mut record = CompanyRecord::new(&row.ticker);
                    record.company = row.company.clone();
                    record.sector = row.sector.clone();
                    record.description = row.description.clone();
                    companies.push(record);
                    companies.len() - 1
                });
                companies[slot].years.insert(year.clone(), row.year);
            }
        }

        self.log.info(format!(
            "📋 Parsed {} unique companies from sheets {}",
            companies.len(),
            years.join(", ")
        ));
        Ok(companies)
    }

    fn read_sheet(&self, year: &str, path: &Path) -> Result<Vec<SheetRow>, IngestError> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| IngestError::Open {
                sheet: year.to_string(),
                path: path.to_path_buf(),
                source,
            })?;

        let headers = reader
            .headers()
            .map_err(|source| IngestError::Read { sheet: year.to_string(), source })?
            .clone();
        let columns = ColumnIndex::new(&headers);

        let missing: Vec<String> = required_columns()
            .into_iter()
            .filter(|c| !columns.contains(c))
            .collect();
        if !missing.is_empty() {
            return Err(IngestError::MissingColumns {
                sheet: year.to_string(),
                path: path.to_path_buf(),
                columns: missing,
            });
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| IngestError::Read { sheet: year.to_string(), source })?;
            if let Some(row) = SheetRow::parse(&columns, &record) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

struct ColumnIndex(HashMap<String, usize>);

impl ColumnIndex {
    fn new(headers: &StringRecord) -> Self {
        Self(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().to_string(), i))
                .collect(),
        )
    }

    fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    fn text(&self, record: &StringRecord, column: &str) -> Option<String> {
        let raw = self.0.get(column).and_then(|&i| record.get(i))?.trim();
        if is_blank(raw) {
            None
        } else {
            Some(raw.to_string())
        }
    }

    fn number(&self, record: &StringRecord, column: &str) -> Option<f64> {
        self.text(record, column)
            .and_then(|s| parse_number(&s))
    }
}

struct SheetRow {
    ticker: String,
    company: Option<String>,
    sector: Option<String>,
    description: Option<String>,
    year: YearData,
}

impl SheetRow {
    fn parse(columns: &ColumnIndex, record: &StringRecord) -> Option<Self> {
        let ticker = columns.text(record, TICKER)?;

        let metrics = METRIC_COLUMNS
            .iter()
            .map(|m| (m.to_string(), columns.number(record, m)))
            .collect();
        let evaluations = EVALUATED_METRICS
            .iter()
            .map(|m| (m.to_string(), columns.text(record, &evaluation_column(m))))
            .collect();

        Some(Self {
            ticker,
            company: columns.text(record, COMPANY),
            sector: columns.text(record, SECTOR),
            description: columns.text(record, DESCRIPTION),
            year: YearData {
                dcf_value: columns.number(record, DCF_VALUE),
                exit_multiple_value: columns.number(record, EXIT_MULTIPLE_VALUE),
                market_cap: columns.number(record, MARKET_CAP),
                metrics,
                evaluations,
            },
        })
    }
}

fn is_blank(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case("nan")
}

/// Numbers as exported from a spreadsheet: `1,234.5`, `12%`, `$3.2`
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ',' | '$' | ' ')).collect();
    let (digits, scale) = match cleaned.strip_suffix('%') {
        Some(stripped) => (stripped, 0.01),
        None => (cleaned.as_str(), 1.0),
    };
    digits
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * scale)
}
