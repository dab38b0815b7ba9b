use std::path::PathBuf;
use thiserror::Error;

/// Workbook problems. These abort the run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open sheet {sheet} at {path}: {source}")]
    Open {
        sheet: String,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read sheet {sheet}: {source}")]
    Read {
        sheet: String,
        #[source]
        source: csv::Error,
    },

    #[error("missing required columns in {} sheet {sheet}: {}", path.display(), columns.join(", "))]
    MissingColumns {
        sheet: String,
        path: PathBuf,
        columns: Vec<String>,
    },
}

/// Failures talking to the market-data provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider error for {ticker}: {message}")]
    Api { ticker: String, message: String },

    #[error("no data returned for {0}")]
    Empty(String),

    #[error("unreadable response: {0}")]
    Decode(String),
}

/// Failures reading or writing the document directory
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {ticker}: {source}")]
    Encode {
        ticker: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt document {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io { path: path.into(), source }
    }
}

/// Why a single price record was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PriceRecordError {
    #[error("invalid date {0}")]
    InvalidDate(String),

    #[error("invalid close {0}")]
    InvalidClose(String),
}

/// Anything that stops one ticker from being processed
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures in the profile enrichment job
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("csv error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} has no 'ticker' column", .0.display())]
    MissingTickerColumn(PathBuf),
}
