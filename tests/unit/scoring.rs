//! Scoring over workbook-shaped fundamentals

use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::test_data::create_test_company;
use stock_feed::metrics::{derive_scores, COMPARATIVES_SENTINEL, PASS_MARKER};

#[test]
fn test_all_strong_hits_sentinel() {
    let company = create_test_company("ACME", "2024", &[("ROIC", "Strong"), ("ICR", "Strong"), ("OMS", "Strong")]);
    let scores = derive_scores(&company.years["2024"]);

    assert_eq!(scores.strong, 3);
    assert_eq!(scores.weak, 0);
    assert_eq!(scores.comparatives, Some(COMPARATIVES_SENTINEL));
}

#[test]
fn test_neutral_labels_count_for_nothing() {
    let company = create_test_company("ACME", "2024", &[("ROIC", "Neutral"), ("ICR", "strong")]);
    let scores = derive_scores(&company.years["2024"]);

    assert_eq!(scores.strong, 0);
    assert_eq!(scores.weak, 0);
    assert_eq!(scores.comparatives, None);
}

#[test]
fn test_points_count_pass_markers() {
    let company = create_test_company(
        "ACME",
        "2024",
        &[("ROIC", PASS_MARKER), ("ICR", PASS_MARKER), ("OMS", "Weak"), ("D/E", "Strong")],
    );
    let scores = derive_scores(&company.years["2024"]);

    assert_eq!(scores.points, 2);
    assert_eq!(scores.comparatives, Some(100.0));
    assert_eq!(scores.combined["ROIC"].value, Some(0.5));
}
