use chrono::{Duration, NaiveDate};

/// A `[start, end)` slice of the listing range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Last day covered, as sent in the API's inclusive `to` parameter
    pub fn last_day(&self) -> NaiveDate {
        self.end - Duration::days(1)
    }
}

/// Splits `[start, end)` into consecutive windows of at most `max_days`.
/// Empty when `start >= end` or `max_days < 1`.
pub fn date_windows(start: NaiveDate, end: NaiveDate, max_days: i64) -> Vec<DateWindow> {
    let mut windows = Vec::new();
    if max_days < 1 {
        return windows;
    }

    let step = Duration::days(max_days);
    let mut current = start;
    while current < end {
        let next = (current + step).min(end);
        windows.push(DateWindow {
            start: current,
            end: next,
        });
        current = next;
    }
    windows
}
