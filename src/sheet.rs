use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::watch::{parse_date_flexible, parse_price};
use crate::models::WatchItem;

const SYMBOL_COLUMNS: &[&str] = &["Symbol", "PAIR NAME", "Pair", "symbol", "pair"];
const ENTRY_COLUMNS: &[[&str; 3]] = &[
    ["Entry 1", "Entry 2", "Entry 3"],
    ["1st entry", "2nd entry", "3rd entry"],
];
const STOP_LOSS_COLUMNS: &[&str] = &["SL", "Stop Loss"];
const TAKE_PROFIT_COLUMNS: &[&str] = &["TP", "Take Profit"];
const QUANTITY_COLUMNS: &[&str] = &["Quantity"];
const DATE_COLUMNS: &[&str] = &["Date of given", "Date", "Start Date", "Given Date"];

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("watch list has no symbol column (tried {0:?})")]
    NoSymbolColumn(&'static [&'static str]),

    #[error("watch list contains no usable rows")]
    Empty,

    #[error("watch list CSV is malformed: {0}")]
    Csv(#[from] csv::Error),
}

/// Fetches the published watch-list CSV over HTTP.
pub struct SheetClient {
    client: Client,
    url: String,
}

impl SheetClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            url: cfg.sheet_csv_url.clone(),
        }
    }

    pub async fn fetch(&self) -> Result<Vec<WatchItem>> {
        let text = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to fetch watch-list CSV")?
            .error_for_status()
            .context("Watch-list CSV request rejected")?
            .text()
            .await
            .context("Failed to read watch-list CSV body")?;

        let items = parse_watchlist(&text, Utc::now().date_naive())?;
        debug!("Watch list loaded: {} rows", items.len());
        Ok(items)
    }
}

fn find_column(headers: &csv::StringRecord, candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
}

/// Parse the watch-list CSV into items. Header names are matched against a
/// fixed list of aliases; rows without a usable symbol are skipped with a
/// warning rather than failing the whole list.
pub fn parse_watchlist(
    csv_text: &str,
    today: NaiveDate,
) -> Result<Vec<WatchItem>, WatchlistError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader.headers()?.clone();
    let symbol_col = find_column(&headers, SYMBOL_COLUMNS)
        .ok_or(WatchlistError::NoSymbolColumn(SYMBOL_COLUMNS))?;

    // First alias set with any matching header wins.
    let entry_cols: Vec<Option<usize>> = ENTRY_COLUMNS
        .iter()
        .map(|set| {
            set.iter()
                .map(|name| find_column(&headers, std::slice::from_ref(name)))
                .collect::<Vec<_>>()
        })
        .find(|cols| cols.iter().any(|c| c.is_some()))
        .unwrap_or_else(|| vec![None; 3]);
    let sl_col = find_column(&headers, STOP_LOSS_COLUMNS);
    let tp_col = find_column(&headers, TAKE_PROFIT_COLUMNS);
    let qty_col = find_column(&headers, QUANTITY_COLUMNS);
    let date_col = find_column(&headers, DATE_COLUMNS);

    let cell = |record: &csv::StringRecord, col: Option<usize>| -> Option<String> {
        let raw = record.get(col?)?.trim();
        if raw.is_empty() {
            None
        } else {
            Some(raw.to_string())
        }
    };

    let mut items = Vec::new();
    for record in reader.records() {
        let record = record?;
        let symbol = match cell(&record, Some(symbol_col)) {
            Some(s) => s,
            None => continue,
        };

        let mut item = WatchItem::new(symbol);
        item.entries = entry_cols
            .iter()
            .map(|col| cell(&record, *col).and_then(|raw| parse_price(&raw)))
            .collect();
        item.trim_entries();
        item.stop_loss = cell(&record, sl_col).and_then(|raw| parse_price(&raw));
        item.take_profit = cell(&record, tp_col).and_then(|raw| parse_price(&raw));
        item.quantity = cell(&record, qty_col)
            .and_then(|raw| parse_price(&raw))
            .unwrap_or(1.0);

        if let Some(raw) = cell(&record, date_col) {
            item.start_date = parse_date_flexible(&raw, today);
            if item.start_date.is_none() {
                warn!("Unparseable start date '{}' for {}", raw, item.symbol);
            }
        }

        items.push(item);
    }

    if items.is_empty() {
        return Err(WatchlistError::Empty);
    }
    Ok(items)
}
