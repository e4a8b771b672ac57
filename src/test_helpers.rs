use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::models::{Candle, CandleSeries, WatchItem};

/// Create daily candles from (open, high, low, close) tuples, one per
/// calendar day starting 2024-01-15.
pub fn make_daily_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let base = DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: base + Duration::days(i as i64),
            open: o,
            high: h,
            low: l,
            close: c,
        })
        .collect();

    CandleSeries::new(candles)
}

/// Watch item with the given entry levels and a start date before the
/// candles `make_daily_candles` produces.
pub fn make_watch_item(symbol: &str, entries: &[f64]) -> WatchItem {
    let mut item = WatchItem::new(symbol);
    item.entries = entries.iter().map(|e| Some(*e)).collect();
    item.start_date = NaiveDate::from_ymd_opt(2024, 1, 10);
    item
}
