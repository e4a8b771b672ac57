use crate::alerts::SentAlert;
use crate::matching::match_entries;
use crate::metrics::{self, HitOutcome, TradeMetrics};
use crate::models::{CandleSeries, WatchItem};

/// One human-readable result row of a pass.
#[derive(Debug, Clone)]
pub struct SymbolRow {
    pub symbol: String,
    pub live_price: Option<f64>,
    pub metrics: TradeMetrics,
}

impl SymbolRow {
    pub fn to_line(&self) -> String {
        format!(
            "{:<12} live {:>12}  avg {:>12}  P/L {:>12}  down {:>8}  ROI {:>8}  | {}",
            self.symbol,
            fmt_price(self.live_price),
            fmt_price(self.metrics.avg_entry),
            fmt_price(self.metrics.pl),
            fmt_pct(self.metrics.entry_down_pct),
            fmt_pct(self.metrics.roi_pct),
            self.metrics.hit_status,
        )
    }
}

fn fmt_price(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${:.5}", v),
        None => "–".to_string(),
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v),
        None => "–".to_string(),
    }
}

/// Evaluate one watch-list row: historical entry hits, then derived
/// metrics. `candles` is `None` when no fetch happened (no start date, or
/// the fetch failed); the metrics degrade to the matching sentinel instead
/// of aborting the pass.
pub fn evaluate_symbol(
    item: &WatchItem,
    live_price: Option<f64>,
    candles: Option<&CandleSeries>,
) -> SymbolRow {
    let entries = item.valid_entries();

    let outcome = if item.start_date.is_none() {
        HitOutcome::NoStartDate
    } else {
        match candles {
            Some(c) if !c.is_empty() => HitOutcome::Computed(match_entries(&entries, c)),
            _ => HitOutcome::NoCandleData,
        }
    };

    SymbolRow {
        symbol: item.symbol.clone(),
        live_price,
        metrics: metrics::compute(&entries, &outcome, live_price, item.quantity),
    }
}

/// Everything one full pass produced: a row per symbol plus the alerts
/// that were newly sent.
#[derive(Debug, Default)]
pub struct PassReport {
    pub rows: Vec<SymbolRow>,
    pub alerts: Vec<SentAlert>,
}

impl PassReport {
    pub fn entries_hit(&self) -> usize {
        self.rows.iter().filter(|r| r.metrics.entry_hit).count()
    }

    pub fn hit_rate_pct(&self) -> f64 {
        if self.rows.is_empty() {
            0.0
        } else {
            self.entries_hit() as f64 / self.rows.len() as f64 * 100.0
        }
    }
}
