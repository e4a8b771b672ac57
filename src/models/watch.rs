use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One row of the watch list: a symbol with its user-defined price levels.
///
/// `entries` is ordered from the first (highest, least aggressive) entry to
/// the deepest one. A trailing run of absent entries is trimmed; gaps in the
/// middle are kept as `None` so entry indices stay stable for labeling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchItem {
    pub symbol: String,
    pub entries: Vec<Option<f64>>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub quantity: f64,
    pub start_date: Option<NaiveDate>,
}

impl WatchItem {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            entries: Vec::new(),
            stop_loss: None,
            take_profit: None,
            quantity: 1.0,
            start_date: None,
        }
    }

    /// Drop the trailing run of absent entry levels.
    pub fn trim_entries(&mut self) {
        while self.entries.last() == Some(&None) {
            self.entries.pop();
        }
    }

    /// Entry prices that are present and positive, in index order.
    pub fn valid_entries(&self) -> Vec<f64> {
        self.entries.iter().filter_map(|e| *e).collect()
    }
}

/// Lenient price parsing for spreadsheet cells: tolerates `$`, thousands
/// separators and whitespace; anything non-numeric or non-positive is `None`.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}

const DATE_FORMATS: &[&str] = &[
    "%d/%m/%y", "%d/%m/%Y", "%d-%m-%y", "%d-%m-%Y", "%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y",
];

/// Parse a spreadsheet date cell, trying a fixed list of common formats.
///
/// Two-digit years follow the usual 2000s/1900s window. A date that lands in
/// the future relative to `today` is rolled back one year: watch-list start
/// dates are always in the past, so "25/12" parsed into next year means the
/// year was implied, not that the position starts next Christmas.
pub fn parse_date_flexible(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(mut date) = NaiveDate::parse_from_str(raw, fmt) {
            if date > today {
                date = date.with_year(date.year() - 1)?;
            }
            return Some(date);
        }
    }
    None
}
