use chrono::{Datelike, NaiveDate, Weekday};

/// Weekday-only market calendar. Exchange holidays are not modelled, so a
/// holiday looks like a missing trading day.
pub struct MarketCalendar;

impl MarketCalendar {
    /// Check if a date falls Monday through Friday
    pub fn is_business_day(date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Every business day in `start..=end`, ascending
    pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| Self::is_business_day(*d))
            .collect()
    }
}
