use chrono::{DateTime, Duration, Utc};
use level_watch_bot::models::{Candle, CandleSeries};

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
