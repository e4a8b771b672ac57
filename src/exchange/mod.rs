pub mod binance;

pub use binance::BinanceClient;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::models::CandleSeries;

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Daily candles from `start` (inclusive) to now. May be empty.
    async fn fetch_daily_candles(&mut self, symbol: &str, start: NaiveDate)
        -> Result<CandleSeries>;

    /// Batch live prices keyed by the caller's symbol spelling. Symbols the
    /// venue doesn't know are simply absent from the map.
    async fn fetch_prices(&mut self, symbols: &[String]) -> Result<HashMap<String, f64>>;
}
