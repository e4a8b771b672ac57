use crate::matching::EntryHits;

/// Why historical hit detection produced (or could not produce) a result.
#[derive(Debug, Clone, PartialEq)]
pub enum HitOutcome {
    NoStartDate,
    NoCandleData,
    Computed(EntryHits),
}

/// Derived trade metrics for one watch-list row. Absent inputs propagate as
/// `None` rather than defaulting to zero; `hit_status` always carries a
/// human-readable summary or sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeMetrics {
    pub entry_hit: bool,
    pub avg_entry: Option<f64>,
    pub pl: Option<f64>,
    pub entry_down_pct: Option<f64>,
    pub roi_pct: Option<f64>,
    pub hit_status: String,
}

impl TradeMetrics {
    /// All-absent metrics with a status string. Used both for missing
    /// inputs ("–") and for internal failures (short diagnostic).
    pub fn degraded(status: impl Into<String>) -> Self {
        Self {
            entry_hit: false,
            avg_entry: None,
            pl: None,
            entry_down_pct: None,
            roi_pct: None,
            hit_status: status.into(),
        }
    }
}

/// Compute metrics for one row.
///
/// `entries` are the valid (present, positive) entry prices in index order;
/// `outcome` is index-aligned with them when hits were computed. Pure
/// function: identical inputs give identical output, and it never panics —
/// anything unexpected degrades to an all-absent result.
pub fn compute(
    entries: &[f64],
    outcome: &HitOutcome,
    live_price: Option<f64>,
    quantity: f64,
) -> TradeMetrics {
    let live = match live_price {
        Some(p) if p.is_finite() && p > 0.0 => p,
        _ => return TradeMetrics::degraded("–"),
    };
    if entries.is_empty() {
        return TradeMetrics::degraded("–");
    }

    let (hits, hit_status) = match outcome {
        HitOutcome::NoStartDate => (None, "No start date provided".to_string()),
        HitOutcome::NoCandleData => (None, "No candle data".to_string()),
        HitOutcome::Computed(hits) => {
            let status = if hits.any_hit() {
                let parts: Vec<String> = hits
                    .hit
                    .iter()
                    .zip(&hits.hit_date)
                    .enumerate()
                    .filter_map(|(i, (hit, date))| {
                        let date = (*date)?;
                        hit.then(|| format!("Entry {} ({})", i + 1, date.format("%Y-%m-%d")))
                    })
                    .collect();
                parts.join(" → ")
            } else {
                "No entries hit".to_string()
            };
            (Some(hits), status)
        }
    };

    // Average of the hit entries; before anything has triggered, fall back
    // to the average of all valid entries so the row stays informative.
    let hit_entries: Vec<f64> = match hits {
        Some(h) => entries
            .iter()
            .zip(&h.hit)
            .filter_map(|(e, hit)| hit.then_some(*e))
            .collect(),
        None => Vec::new(),
    };
    let basis: &[f64] = if hit_entries.is_empty() {
        entries
    } else {
        &hit_entries
    };
    let avg_entry = basis.iter().sum::<f64>() / basis.len() as f64;

    if !avg_entry.is_finite() || avg_entry <= 0.0 {
        return TradeMetrics::degraded("Error: invalid average entry");
    }
    let quantity = if quantity.is_finite() && quantity > 0.0 {
        quantity
    } else {
        1.0
    };

    let pl = (live - avg_entry) * quantity;
    let entry_down_pct = (live - avg_entry) / avg_entry * 100.0;
    let roi_pct = pl / (avg_entry * quantity) * 100.0;

    TradeMetrics {
        entry_hit: hits.map(|h| h.any_hit()).unwrap_or(false),
        avg_entry: Some(avg_entry),
        pl: Some(pl),
        entry_down_pct: Some(entry_down_pct),
        roi_pct: Some(roi_pct),
        hit_status,
    }
}
