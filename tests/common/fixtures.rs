//! On-disk fixtures: workbook sheets and run directories

use std::fs;
use std::path::{Path, PathBuf};

use stock_feed::ingest::evaluation_column;
use stock_feed::models::{Config, EVALUATED_METRICS, METRIC_COLUMNS};

/// One workbook row. Metric values are all `0.1`; evaluations default to
/// empty.
pub struct SheetRow<'a> {
    pub ticker: &'a str,
    pub company: &'a str,
    pub dcf_value: &'a str,
    pub evaluations: &'a [(&'a str, &'a str)],
}

pub fn sheet_header() -> Vec<String> {
    let mut header: Vec<String> = [
        "ticker",
        "Company",
        "Primary Sector",
        "Description",
        "DCF value",
        "Exit multiple value",
        "MarketCap",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    header.extend(METRIC_COLUMNS.iter().map(|m| m.to_string()));
    header.extend(EVALUATED_METRICS.iter().map(|m| evaluation_column(m)));
    header
}

/// Write `<dir>/<year>.csv` with the given rows
pub fn write_sheet(dir: &Path, year: &str, rows: &[SheetRow]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{year}.csv"));
    let mut writer = csv::Writer::from_path(&path).unwrap();
    writer.write_record(sheet_header()).unwrap();

    for row in rows {
        let mut cells = vec![
            row.ticker.to_string(),
            row.company.to_string(),
            "Technology".to_string(),
            format!("{} description", row.company),
            row.dcf_value.to_string(),
            "95".to_string(),
            "1000000000".to_string(),
        ];
        cells.extend(METRIC_COLUMNS.iter().map(|_| "0.1".to_string()));
        cells.extend(EVALUATED_METRICS.iter().map(|metric| {
            row.evaluations
                .iter()
                .find(|(m, _)| m == metric)
                .map(|(_, label)| label.to_string())
                .unwrap_or_default()
        }));
        writer.write_record(&cells).unwrap();
    }
    writer.flush().unwrap();
    path
}

/// Config rooted in a temporary directory, with no inter-batch delay
pub fn test_config(root: &Path) -> Config {
    Config {
        workbook_dir: root.join("workbook"),
        details_dir: root.join("details"),
        logs_dir: root.join("logs"),
        summary_file: root.join("companies.json"),
        api_delay_secs: 0,
        ..Config::default()
    }
}
