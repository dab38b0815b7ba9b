//! Price merge properties

use pretty_assertions::assert_eq;
use serde_json::json;
use test_log::test;

use crate::common::test_data::{create_test_series, date};
use stock_feed::logging::LogContext;
use stock_feed::models::{PricePoint, PriceRecord};
use stock_feed::store::merge_prices;

fn records(points: &[PricePoint]) -> Vec<PriceRecord> {
    points.iter().copied().map(PriceRecord::from).collect()
}

#[test]
fn test_merge_is_idempotent_over_overlapping_windows() {
    let log = LogContext::silent();
    let old = records(&create_test_series(date(2024, 5, 1), date(2024, 5, 31)));
    let new = records(&create_test_series(date(2024, 5, 20), date(2024, 6, 14)));

    let once = merge_prices(&old, &new, &log);
    let twice = merge_prices(&records(&once), &[], &log);
    assert_eq!(once, twice);

    // re-applying the same fetch changes nothing either
    let again = merge_prices(&records(&once), &new, &log);
    assert_eq!(once, again);
}

#[test]
fn test_merge_output_is_strictly_ascending() {
    let log = LogContext::silent();
    let mut shuffled = records(&create_test_series(date(2024, 1, 1), date(2024, 3, 31)));
    shuffled.reverse();
    shuffled.push(PriceRecord::new("2024-02-01T16:00:00", Some(1.0)));

    let merged = merge_prices(&[], &shuffled, &log);
    assert!(merged.windows(2).all(|w| w[0].date < w[1].date));
    let feb_1 = merged.iter().find(|p| p.date == date(2024, 2, 1)).unwrap();
    assert_eq!(feb_1.close, 1.0);
}

#[test]
fn test_merge_heals_stored_garbage() {
    let log = LogContext::silent();
    let stored = vec![
        PriceRecord { date: json!("2024-06-03"), close: json!(10.0) },
        PriceRecord { date: json!(null), close: json!(11.0) },
        PriceRecord { date: json!("2024-06-04"), close: json!(null) },
        PriceRecord { date: json!("2024-06-05"), close: json!("12.5") },
        PriceRecord { date: json!("2024-13-01"), close: json!(13.0) },
    ];

    let merged = merge_prices(&stored, &[], &log);
    assert_eq!(
        merged,
        vec![PricePoint::new(date(2024, 6, 3), 10.0), PricePoint::new(date(2024, 6, 5), 12.5)]
    );
}
