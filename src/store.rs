//! Per-ticker document persistence.
//!
//! Each ticker owns `<details_dir>/<TICKER>.json`. Documents are rewritten
//! whole through a temp file and a rename so a crash never leaves a
//! half-written file behind.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::logging::LogContext;
use crate::models::{PersistedPrices, PricePoint, PriceRecord, SummaryEntry, TickerDocument};

pub struct TickerStore {
    details_dir: PathBuf,
    log: LogContext,
}

impl TickerStore {
    pub fn new(details_dir: impl Into<PathBuf>, log: LogContext) -> Result<Self, StoreError> {
        let details_dir = details_dir.into();
        fs::create_dir_all(&details_dir).map_err(|e| StoreError::io(&details_dir, e))?;
        Ok(Self { details_dir, log })
    }

    /// `/` and `\\` in the ticker become `_`, so `BRK/B` and `BRK_B` share a
    /// file. [`colliding_tickers`] finds such pairs before a run.
    pub fn document_path(&self, ticker: &str) -> PathBuf {
        let file_stem = ticker.replace(['/', '\\'], "_");
        self.details_dir.join(format!("{file_stem}.json"))
    }

    /// Persisted price records for `ticker`. A missing document is empty; a
    /// corrupt one is reported and treated as empty. Entries that are not
    /// `{Date, Close}` objects are dropped one by one.
    pub fn load_prices(&self, ticker: &str) -> Vec<PriceRecord> {
        match self.read_prices(ticker) {
            Ok(prices) => prices
                .historical_prices
                .into_iter()
                .filter_map(|raw| match serde_json::from_value::<PriceRecord>(raw.clone()) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        self.log.warn(format!("Dropping stored price entry {} for {}: {}", raw, ticker, e));
                        None
                    }
                })
                .collect(),
            Err(e) => {
                self.log.warn(format!("Ignoring stored prices for {}: {}", ticker, e));
                Vec::new()
            }
        }
    }

    fn read_prices(&self, ticker: &str) -> Result<PersistedPrices, StoreError> {
        let path = self.document_path(ticker);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PersistedPrices::default()),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Most recent valid date in the persisted series
    pub fn latest_price_date(&self, ticker: &str) -> Option<NaiveDate> {
        self.load_prices(ticker)
            .iter()
            .filter_map(|record| record.to_point().ok())
            .map(|point| point.date)
            .max()
    }

    pub fn save(&self, document: &TickerDocument) -> Result<PathBuf, StoreError> {
        let path = self.document_path(&document.ticker);
        let bytes = to_pretty_json(document).map_err(|source| StoreError::Encode {
            ticker: document.ticker.clone(),
            source,
        })?;
        write_atomic(&path, &bytes)?;
        self.log.debug(format!("Saved {} prices for {} to {}", document.historical_prices.len(), document.ticker, path.display()));
        Ok(path)
    }

    pub fn write_summary(&self, path: &Path, entries: &[SummaryEntry]) -> Result<(), StoreError> {
        let bytes = to_pretty_json(&entries).map_err(|source| StoreError::Encode {
            ticker: "summary".to_string(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        write_atomic(path, &bytes)?;
        self.log.info(format!("✅ Saved {} companies to {}", entries.len(), path.display()));
        Ok(())
    }

    /// Delete every ticker document and the summary file. Returns how many
    /// documents were removed.
    pub fn reset(&self, summary_file: &Path) -> Result<usize, StoreError> {
        let mut removed = 0;
        let entries = fs::read_dir(&self.details_dir).map_err(|e| StoreError::io(&self.details_dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.details_dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
                removed += 1;
            }
        }

        match fs::remove_file(summary_file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(summary_file, e)),
        }

        self.log.info(format!("🗑️ Removed {} ticker documents and {}", removed, summary_file.display()));
        Ok(removed)
    }
}

/// Tickers in `tickers` whose document file is already claimed by an
/// earlier ticker, paired with that earlier ticker.
pub fn colliding_tickers<'a>(store: &TickerStore, tickers: impl IntoIterator<Item = &'a str>) -> Vec<(&'a str, &'a str)> {
    let mut owners: HashMap<PathBuf, &'a str> = HashMap::new();
    let mut collisions = Vec::new();
    for ticker in tickers {
        match owners.entry(store.document_path(ticker)) {
            Entry::Occupied(owner) if *owner.get() != ticker => collisions.push((ticker, *owner.get())),
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(ticker);
            }
        }
    }
    collisions
}

/// Merge `incoming` into `existing`, keyed by calendar date.
///
/// Invalid records from either side are dropped with a warning. On a date
/// conflict the incoming record wins, and within one input the later record
/// wins. The result is strictly ascending by date.
pub fn merge_prices(existing: &[PriceRecord], incoming: &[PriceRecord], log: &LogContext) -> Vec<PricePoint> {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for (source, records) in [("stored", existing), ("fetched", incoming)] {
        for record in records {
            match record.to_point() {
                Ok(point) => {
                    by_date.insert(point.date, point.close);
                }
                Err(e) => log.warn(format!("Dropping {} price record: {}", source, e)),
            }
        }
    }

    by_date
        .into_iter()
        .map(|(date, close)| PricePoint::new(date, close))
        .collect()
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}
