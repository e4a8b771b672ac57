use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::exchange::MarketData;
use crate::models::{Candle, CandleSeries};

const BASE_URL: &str = "https://fapi.binance.com";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const KLINES_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

pub struct BinanceClient {
    client: Client,
    last_request: Option<Instant>,
    candle_cache: HashMap<String, (Instant, CandleSeries)>,
    cache_ttl: Duration,
}

impl BinanceClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            last_request: None,
            candle_cache: HashMap::new(),
            cache_ttl: Duration::from_secs(30),
        }
    }

    async fn rate_limit(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    async fn fetch_single_price(&mut self, venue_symbol: &str) -> Result<f64> {
        self.rate_limit().await;
        let ticker: TickerPrice = self
            .client
            .get(format!("{}/fapi/v1/ticker/price", BASE_URL))
            .query(&[("symbol", venue_symbol)])
            .send()
            .await
            .context("Failed to fetch ticker")?
            .error_for_status()
            .context("Ticker request rejected")?
            .json()
            .await
            .context("Failed to parse ticker")?;
        ticker
            .price
            .parse()
            .context("Non-numeric price in ticker")
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Venue spelling of a watch-list symbol: separators stripped, uppercased,
/// quoted against USDT.
pub fn normalize_symbol(symbol: &str) -> String {
    let clean: String = symbol
        .chars()
        .filter(|c| *c != '/' && *c != '-')
        .collect::<String>()
        .to_uppercase();
    if clean.ends_with("USDT") {
        clean
    } else {
        format!("{clean}USDT")
    }
}

/// Parse a batch ticker payload into venue-symbol → price. Entries with a
/// non-numeric price are dropped; a body that is not a ticker array at all
/// is an error.
pub fn parse_ticker_batch(body: &str) -> Result<HashMap<String, f64>> {
    let tickers: Vec<TickerPrice> =
        serde_json::from_str(body).context("Failed to parse tickers")?;
    Ok(tickers
        .into_iter()
        .filter_map(|t| Some((t.symbol, t.price.parse().ok()?)))
        .collect())
}

/// Parse a Binance klines payload (array of mixed-type arrays). Malformed
/// rows are dropped individually; output is sorted ascending by open time.
pub fn parse_klines(rows: &[Value]) -> CandleSeries {
    let mut candles: Vec<Candle> = rows
        .iter()
        .filter_map(|row| {
            let row = row.as_array()?;
            let ts_millis = row.first()?.as_i64()?;
            let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(ts_millis)?;
            let field = |i: usize| row.get(i)?.as_str()?.parse::<f64>().ok();
            Some(Candle {
                timestamp,
                open: field(1)?,
                high: field(2)?,
                low: field(3)?,
                close: field(4)?,
            })
        })
        .collect();
    candles.sort_by_key(|c| c.timestamp);
    CandleSeries::new(candles)
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn fetch_daily_candles(
        &mut self,
        symbol: &str,
        start: NaiveDate,
    ) -> Result<CandleSeries> {
        let venue_symbol = normalize_symbol(symbol);
        let cache_key = format!("{}_{}", venue_symbol, start);
        if let Some((cached_at, series)) = self.candle_cache.get(&cache_key) {
            if cached_at.elapsed() < self.cache_ttl {
                return Ok(series.clone());
            }
        }

        self.rate_limit().await;

        let start_ms = start
            .and_hms_opt(0, 0, 0)
            .context("Invalid start date")?
            .and_utc()
            .timestamp_millis();
        let end_ms = Utc::now().timestamp_millis();

        let resp = self
            .client
            .get(format!("{}/fapi/v1/klines", BASE_URL))
            .query(&[
                ("symbol", venue_symbol.clone()),
                ("interval", "1d".to_string()),
                ("startTime", start_ms.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", KLINES_LIMIT.to_string()),
            ])
            .send()
            .await
            .context("Failed to fetch klines")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Binance klines error {}: {}", status, body);
        }

        let rows: Vec<Value> = resp.json().await.context("Failed to parse klines")?;
        let series = parse_klines(&rows);

        self.candle_cache
            .insert(cache_key, (Instant::now(), series.clone()));

        Ok(series)
    }

    async fn fetch_prices(&mut self, symbols: &[String]) -> Result<HashMap<String, f64>> {
        self.rate_limit().await;

        let mut prices = HashMap::new();

        // One batch call covers the whole watch list.
        match self
            .client
            .get(format!("{}/fapi/v1/ticker/price", BASE_URL))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                let parsed = match resp.text().await {
                    Ok(body) => parse_ticker_batch(&body),
                    Err(e) => Err(e.into()),
                };
                match parsed {
                    Ok(by_venue) => {
                        for symbol in symbols {
                            if let Some(price) = by_venue.get(&normalize_symbol(symbol)) {
                                prices.insert(symbol.clone(), *price);
                            }
                        }
                    }
                    // An unparseable 200 degrades like any other batch
                    // failure: the per-symbol fallback takes over.
                    Err(e) => debug!("Batch ticker unusable: {:#}", e),
                }
            }
            Ok(resp) => debug!("Batch ticker request failed: {}", resp.status()),
            Err(e) => debug!("Batch ticker request failed: {}", e),
        }

        // Per-symbol fallback for anything the batch missed.
        for symbol in symbols {
            if prices.contains_key(symbol) {
                continue;
            }
            match self.fetch_single_price(&normalize_symbol(symbol)).await {
                Ok(price) => {
                    prices.insert(symbol.clone(), price);
                }
                Err(e) => debug!("Price fetch failed for {}: {:#}", symbol, e),
            }
        }

        Ok(prices)
    }
}
