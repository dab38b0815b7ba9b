//! End-to-end runs of the batch pipeline against an in-memory market

use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;

use crate::common::fixtures::{test_config, write_sheet, SheetRow};
use crate::common::logging::{init_test_logging, log_test_data, log_test_step};
use crate::common::test_data::{create_test_company, create_test_series, date};
use crate::common::{FakeProvider, ProviderCall};
use stock_feed::ingest::WorkbookReader;
use stock_feed::logging::{LogContext, ERROR_LOG};
use stock_feed::models::{CompanyRecord, Config, SummaryEntry, TickerDocument};
use stock_feed::orchestrator::{BatchOrchestrator, RunReport};
use stock_feed::store::TickerStore;

struct Harness {
    _root: tempfile::TempDir,
    config: Config,
    store: Arc<TickerStore>,
    provider: Arc<FakeProvider>,
    log: LogContext,
}

impl Harness {
    fn new(provider: FakeProvider) -> Self {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let log = LogContext::open(&config.logs_dir, false).unwrap();
        let store = Arc::new(TickerStore::new(&config.details_dir, log.clone()).unwrap());
        Self {
            _root: root,
            config,
            store,
            provider: Arc::new(provider),
            log,
        }
    }

    async fn run(&self, companies: &[CompanyRecord], today: NaiveDate) -> RunReport {
        let orchestrator = BatchOrchestrator::new(&self.config, self.provider.clone(), self.store.clone(), self.log.clone());
        orchestrator.run(companies, today).await
    }

    fn document(&self, ticker: &str) -> TickerDocument {
        let text = fs::read_to_string(self.store.document_path(ticker)).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn summary(&self) -> Vec<SummaryEntry> {
        let text = fs::read_to_string(&self.config.summary_file).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn seed(&self, ticker: &str, series: Vec<stock_feed::models::PricePoint>) {
        let mut document = TickerDocument::for_company(&CompanyRecord::new(ticker));
        document.historical_prices = series;
        self.store.save(&document).unwrap();
    }
}

fn market_start() -> NaiveDate {
    date(2024, 4, 1)
}

fn friday() -> NaiveDate {
    date(2024, 6, 14)
}

#[test_log::test(tokio::test)]
async fn test_full_then_partial_then_current() {
    init_test_logging();
    log_test_step("Full refresh, then incremental, then nothing to do");

    let thursday = friday() - Duration::days(1);
    let provider = FakeProvider::new(thursday)
        .with_series("AAA", create_test_series(market_start(), friday()))
        .with_series("BBB", create_test_series(market_start(), friday()));
    let harness = Harness::new(provider);
    let companies = vec![
        create_test_company("AAA", "2024", &[("ROIC", "Strong")]),
        create_test_company("BBB", "2024", &[("ROIC", "Weak")]),
    ];

    // day one: nothing stored, one batch fetch
    let report = harness.run(&companies, thursday).await;
    log_test_data("First run", &report);
    assert_eq!(report.full, 2);
    assert_eq!(report.processed, 2);
    assert_eq!(
        harness.provider.calls(),
        vec![ProviderCall::Batch(vec!["AAA".to_string(), "BBB".to_string()])]
    );
    let first = harness.document("AAA");
    assert_eq!(first.historical_prices.last().map(|p| p.date), Some(thursday));

    // day two: one incremental fetch per ticker, end exclusive
    harness.provider.clear_calls();
    harness.provider.set_as_of(friday());
    let report = harness.run(&companies, friday()).await;
    assert_eq!(report.partial, 2);
    assert_eq!(
        harness.provider.calls(),
        vec![
            ProviderCall::Range("AAA".to_string(), friday(), friday() + Duration::days(1)),
            ProviderCall::Range("BBB".to_string(), friday(), friday() + Duration::days(1)),
        ]
    );
    let second = harness.document("AAA");
    assert_eq!(second.historical_prices.len(), first.historical_prices.len() + 1);
    assert_eq!(second.historical_prices.last().map(|p| p.date), Some(friday()));

    // same day again: already current, no provider traffic, summary still complete
    harness.provider.clear_calls();
    let report = harness.run(&companies, friday()).await;
    assert_eq!(report.current, 2);
    assert_eq!(report.processed, 2);
    assert!(harness.provider.calls().is_empty());
    assert_eq!(harness.document("AAA").historical_prices, second.historical_prices);

    let summary = harness.summary();
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].ticker, "AAA");
    assert_eq!(summary[0].current_price, second.current_price());
    assert_eq!(summary[0].comparatives, Some(1_000_000.0));
    assert_eq!(summary[1].comparatives, Some(0.0));
}

#[test_log::test(tokio::test)]
async fn test_corrupt_document_is_rebuilt() {
    let provider = FakeProvider::new(friday()).with_series("AAA", create_test_series(market_start(), friday()));
    let harness = Harness::new(provider);
    fs::write(harness.store.document_path("AAA"), "{\"HistoricalPrices\": [oops").unwrap();

    let report = harness.run(&[create_test_company("AAA", "2024", &[])], friday()).await;

    assert_eq!(report.full, 1);
    assert_eq!(report.processed, 1);
    let document = harness.document("AAA");
    assert_eq!(document.historical_prices.first().map(|p| p.date), Some(market_start()));

    let errors = fs::read_to_string(harness.config.logs_dir.join(ERROR_LOG)).unwrap();
    assert!(errors.contains("AAA"));
}

#[test_log::test(tokio::test)]
async fn test_provider_failure_leaves_document_untouched() {
    let provider = FakeProvider::new(friday())
        .with_series("AAA", create_test_series(market_start(), friday()))
        .with_series("BBB", create_test_series(market_start(), friday()));
    provider.fail("BBB");
    let harness = Harness::new(provider);

    // stale enough to need a full refresh
    harness.seed("BBB", create_test_series(date(2024, 4, 1), date(2024, 4, 30)));
    let before = fs::read(harness.store.document_path("BBB")).unwrap();

    let companies = vec![
        create_test_company("AAA", "2024", &[]),
        create_test_company("BBB", "2024", &[]),
    ];
    let report = harness.run(&companies, friday()).await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(fs::read(harness.store.document_path("BBB")).unwrap(), before);

    let tickers: Vec<String> = harness.summary().into_iter().map(|e| e.ticker).collect();
    assert_eq!(tickers, vec!["AAA".to_string()]);
}

#[test_log::test(tokio::test)]
async fn test_recent_gaps_are_backfilled_with_one_fetch() {
    let provider = FakeProvider::new(friday()).with_series("AAA", create_test_series(market_start(), friday()));
    let harness = Harness::new(provider);

    let holes = [date(2024, 6, 5), date(2024, 6, 10)];
    let gappy: Vec<_> = create_test_series(market_start(), friday())
        .into_iter()
        .filter(|p| !holes.contains(&p.date))
        .collect();
    harness.seed("AAA", gappy);

    let report = harness.run(&[create_test_company("AAA", "2024", &[])], friday()).await;

    assert_eq!(report.current, 1);
    assert_eq!(
        harness.provider.calls(),
        vec![ProviderCall::Range(
            "AAA".to_string(),
            friday() - Duration::days(30),
            friday() + Duration::days(1)
        )]
    );
    let document = harness.document("AAA");
    assert_eq!(document.historical_prices, create_test_series(market_start(), friday()));
}

#[test_log::test(tokio::test)]
async fn test_workbook_to_summary_feed() {
    let provider = FakeProvider::new(friday()).with_series("MSFT", create_test_series(market_start(), friday()));
    let harness = Harness::new(provider);

    write_sheet(
        &harness.config.workbook_dir,
        "2023",
        &[SheetRow { ticker: "MSFT", company: "Microsoft", dcf_value: "300", evaluations: &[] }],
    );
    write_sheet(
        &harness.config.workbook_dir,
        "2024",
        &[SheetRow {
            ticker: "MSFT",
            company: "Microsoft",
            dcf_value: "410.5",
            evaluations: &[("ROIC", "Strong"), ("ICR", "Strong"), ("OMS", "Weak"), ("D/E", "✅")],
        }],
    );

    let companies = WorkbookReader::new(&harness.config.workbook_dir, harness.log.clone())
        .read_companies(&harness.config.years)
        .unwrap();
    let report = harness.run(&companies, friday()).await;
    assert!(report.summary_saved);

    let summary = harness.summary();
    assert_eq!(summary.len(), 1);
    let entry = &summary[0];
    assert_eq!(entry.company.as_deref(), Some("Microsoft"));
    assert_eq!(entry.dcf_value, Some(410.5));
    assert_eq!(entry.points, Some(1));
    assert_eq!(entry.comparatives, Some(200.0));
    let metrics = entry.latest_combined_metrics.as_ref().unwrap();
    assert_eq!(metrics["ROIC"].evaluation.as_deref(), Some("Strong"));

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(harness.store.document_path("MSFT")).unwrap()).unwrap();
    assert!(raw.get("CombinedPerformanceMetrics_2024").is_some());
    assert!(raw.get("CombinedPerformanceMetrics_2023").is_none());
    assert_eq!(raw["Years"]["2023"]["DCFValue"], serde_json::json!(300.0));
}
