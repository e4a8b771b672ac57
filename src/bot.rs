use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use level_watch_bot::alerts::{watched_levels, AlertState, CooldownEngine};
use level_watch_bot::config::Config;
use level_watch_bot::exchange::MarketData;
use level_watch_bot::models::{CandleSeries, WatchItem};
use level_watch_bot::notify::NotificationSink;
use level_watch_bot::pipeline::{evaluate_symbol, PassReport};
use level_watch_bot::sheet::SheetClient;

pub struct LevelWatchBot {
    config: Config,
    market: Box<dyn MarketData>,
    sink: Arc<dyn NotificationSink>,
    sheet: SheetClient,
    engine: CooldownEngine,
    state: AlertState,
    pass_count: u64,
}

impl LevelWatchBot {
    pub fn new(
        config: Config,
        market: Box<dyn MarketData>,
        sink: Arc<dyn NotificationSink>,
        sheet: SheetClient,
    ) -> Self {
        info!("{}", "=".repeat(60));
        info!("Level watch bot starting up");
        info!("Poll interval: {}s", config.poll_interval_secs);
        info!(
            "Alert band: fire <= {:.2}%, re-arm > {:.2}%",
            config.fire_threshold * 100.0,
            config.reset_threshold * 100.0
        );
        info!(
            "Alert memory cap: {} keys (checked every {} passes)",
            config.max_alert_keys, config.alert_cleanup_every
        );
        info!("{}", "=".repeat(60));

        let engine = CooldownEngine::new(
            config.fire_threshold,
            config.reset_threshold,
            config.max_alert_keys,
            config.alert_cleanup_every,
        );

        Self {
            config,
            market,
            sink,
            sheet,
            engine,
            state: AlertState::new(),
            pass_count: 0,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Bot is now running. Press Ctrl+C to stop.");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown();
                    return Ok(());
                }
                _ = self.tick() => {}
            }
        }
    }

    async fn tick(&mut self) {
        self.run_pass().await;
        tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
    }

    /// One full evaluation of the watch list. A failure for one symbol
    /// degrades that row and the pass carries on.
    pub async fn run_pass(&mut self) {
        self.pass_count += 1;

        let items = match self.sheet.fetch().await {
            Ok(items) => items,
            Err(e) => {
                warn!("Watch list unavailable, skipping pass: {:#}", e);
                return;
            }
        };

        let symbols: Vec<String> = items.iter().map(|i| i.symbol.clone()).collect();
        let prices = match self.market.fetch_prices(&symbols).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!("Price fetch failed, rows will degrade: {:#}", e);
                Default::default()
            }
        };

        self.engine.begin_pass(&mut self.state);

        let mut report = PassReport::default();
        let mut pending = Vec::new();
        for item in &items {
            let live_price = prices.get(&item.symbol).copied();

            let candles = self.fetch_candles(item).await;
            report
                .rows
                .push(evaluate_symbol(item, live_price, candles.as_ref()));

            if let Some(live) = live_price {
                let levels = watched_levels(item);
                pending.extend(self.engine.scan(&item.symbol, live, &levels, &mut self.state));
            }
        }

        // Deliveries from the whole pass overlap; state transitions still
        // apply one at a time on this task as each send settles.
        report.alerts = self
            .engine
            .deliver(pending, &mut self.state, Arc::clone(&self.sink))
            .await;

        self.log_report(&report);
    }

    async fn fetch_candles(&mut self, item: &WatchItem) -> Option<CandleSeries> {
        let start = item.start_date?;
        if item.valid_entries().is_empty() {
            return None;
        }
        match self.market.fetch_daily_candles(&item.symbol, start).await {
            Ok(series) => Some(series),
            Err(e) => {
                debug!("Candle fetch failed for {}: {:#}", item.symbol, e);
                None
            }
        }
    }

    fn log_report(&self, report: &PassReport) {
        info!("--- Pass {} ---", self.pass_count);
        for row in &report.rows {
            info!("  {}", row.to_line());
        }
        info!(
            "Entries hit: {}/{} ({:.1}%) | Fired keys in memory: {}",
            report.entries_hit(),
            report.rows.len(),
            report.hit_rate_pct(),
            self.state.len()
        );
        for alert in &report.alerts {
            info!("  Alert sent this pass: {} {}", alert.symbol, alert.label);
        }
    }

    fn shutdown(&self) {
        info!("Shutting down...");
        info!(
            "Passes run: {} | Fired keys in memory: {}",
            self.pass_count,
            self.state.len()
        );
        info!("Bot stopped.");
    }
}
