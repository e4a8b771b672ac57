use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::models::WatchItem;
use crate::notify::NotificationSink;

/// Which watched level an alert refers to. Entry indices are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelKind {
    Entry(usize),
    StopLoss,
    TakeProfit,
}

/// A level being watched for one symbol: its kind plus the numeric target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchedLevel {
    pub kind: LevelKind,
    pub price: f64,
}

impl WatchedLevel {
    pub fn entry(index: usize, price: f64) -> Self {
        Self {
            kind: LevelKind::Entry(index),
            price,
        }
    }

    pub fn label(&self) -> String {
        match self.kind {
            LevelKind::Entry(i) => format!("{} Entry (${:.5})", ordinal(i), self.price),
            LevelKind::StopLoss => format!("Stop Loss (${:.5})", self.price),
            LevelKind::TakeProfit => format!("Take Profit (${:.5})", self.price),
        }
    }
}

fn ordinal(index: usize) -> String {
    match index {
        0 => "1st".to_string(),
        1 => "2nd".to_string(),
        2 => "3rd".to_string(),
        n => format!("{}th", n + 1),
    }
}

/// The watched levels of one watch-list row, in alert-evaluation order.
pub fn watched_levels(item: &WatchItem) -> Vec<WatchedLevel> {
    let mut levels: Vec<WatchedLevel> = item
        .entries
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.map(|price| WatchedLevel::entry(i, price)))
        .collect();
    if let Some(sl) = item.stop_loss {
        levels.push(WatchedLevel {
            kind: LevelKind::StopLoss,
            price: sl,
        });
    }
    if let Some(tp) = item.take_profit {
        levels.push(WatchedLevel {
            kind: LevelKind::TakeProfit,
            price: tp,
        });
    }
    levels
}

/// Identity of a fired alert. Two keys are equal only if symbol, level kind
/// and the exact target price match; the price doubles as the baseline for
/// the reset calculation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    symbol: String,
    kind: LevelKind,
    price_bits: u64,
}

impl AlertKey {
    fn new(symbol: &str, level: &WatchedLevel) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind: level.kind,
            price_bits: level.price.to_bits(),
        }
    }

    /// Baseline price the alert fired against (the level's nominal target).
    fn baseline(&self) -> f64 {
        f64::from_bits(self.price_bits)
    }
}

/// Fired-alert bookkeeping for the whole process.
///
/// Keys are kept in fire order (deque) with a set for membership, so
/// "oldest fired" is well-defined when the cap eviction runs. Empty at
/// process start, never persisted.
#[derive(Debug, Default)]
pub struct AlertState {
    fired: HashSet<AlertKey>,
    fire_order: VecDeque<AlertKey>,
    passes: u64,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    fn is_fired(&self, key: &AlertKey) -> bool {
        self.fired.contains(key)
    }

    fn mark_fired(&mut self, key: AlertKey) {
        if self.fired.insert(key.clone()) {
            self.fire_order.push_back(key);
        }
    }

    fn rearm(&mut self, key: &AlertKey) {
        if self.fired.remove(key) {
            self.fire_order.retain(|k| k != key);
        }
    }

    /// Evict oldest-fired keys until at most `target` remain. Evicted keys
    /// are armed again and may re-fire on their next qualifying price.
    fn evict_oldest(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.fired.len() > target {
            match self.fire_order.pop_front() {
                Some(key) => {
                    self.fired.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// A notification that was actually delivered this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SentAlert {
    pub symbol: String,
    pub label: String,
}

/// Payload handed to the notification sink.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub symbol: String,
    pub live_price: f64,
    pub level: WatchedLevel,
}

/// An in-range Armed level queued for delivery. The key stays private so
/// only `deliver` can transition it to Fired.
#[derive(Debug, Clone)]
pub struct PendingAlert {
    key: AlertKey,
    pub event: AlertEvent,
}

/// How many deliveries may be in flight at once.
const MAX_CONCURRENT_DELIVERIES: usize = 8;

/// Per-key two-state machine (Armed/Fired) with asymmetric thresholds.
///
/// A key fires when live price comes within `fire_threshold` of its target
/// and re-arms only once price has moved more than `reset_threshold` away
/// from the target — the wider reset band keeps price oscillating on a
/// level from flapping the alert.
pub struct CooldownEngine {
    fire_threshold: f64,
    reset_threshold: f64,
    max_keys: usize,
    cleanup_every: u64,
}

impl CooldownEngine {
    pub fn new(
        fire_threshold: f64,
        reset_threshold: f64,
        max_keys: usize,
        cleanup_every: u64,
    ) -> Self {
        Self {
            fire_threshold,
            reset_threshold,
            max_keys,
            cleanup_every: cleanup_every.max(1),
        }
    }

    /// Bump the pass counter and run the periodic cap check. Coarse safety
    /// valve: when due and over the cap, the oldest-fired half is evicted.
    pub fn begin_pass(&self, state: &mut AlertState) {
        state.passes += 1;
        if state.passes % self.cleanup_every != 0 {
            return;
        }
        if state.fired.len() > self.max_keys {
            let evicted = state.evict_oldest(self.max_keys / 2);
            info!(
                "Alert memory over cap: evicted {} oldest fired keys ({} remain)",
                evicted,
                state.len()
            );
        }
    }

    /// Evaluate every watched level of one symbol against the live price,
    /// returning the in-range Armed levels as pending deliveries.
    ///
    /// For a Fired key the reset distance is checked first; a key that
    /// re-arms and still satisfies the fire condition is queued again in the
    /// same cycle. Nothing transitions to Fired here: the caller collects
    /// pending alerts across the whole pass and hands them to `deliver`.
    pub fn scan(
        &self,
        symbol: &str,
        live_price: f64,
        levels: &[WatchedLevel],
        state: &mut AlertState,
    ) -> Vec<PendingAlert> {
        let mut pending = Vec::new();
        if !(live_price.is_finite() && live_price > 0.0) {
            return pending;
        }

        for level in levels {
            if !(level.price.is_finite() && level.price > 0.0) {
                continue;
            }
            let key = AlertKey::new(symbol, level);

            if state.is_fired(&key) {
                let baseline = key.baseline();
                let pct_away = (live_price - baseline).abs() / baseline;
                if pct_away > self.reset_threshold {
                    state.rearm(&key);
                    debug!(
                        "Cooldown reset for {} {} ({:.3}% away)",
                        symbol,
                        level.label(),
                        pct_away * 100.0
                    );
                } else {
                    // Dormant near its target, in or out of the fire band.
                    continue;
                }
            }

            let distance = (live_price - level.price).abs() / level.price;
            if distance > self.fire_threshold {
                continue;
            }

            pending.push(PendingAlert {
                key,
                event: AlertEvent {
                    symbol: symbol.to_string(),
                    live_price,
                    level: *level,
                },
            });
        }

        pending
    }

    /// Send the pending alerts of one pass, at most
    /// `MAX_CONCURRENT_DELIVERIES` in flight at a time, so one slow send
    /// never holds up the rest. State transitions happen here on the single
    /// caller task, per key and per outcome: only a confirmed send marks the
    /// key Fired, so a failed delivery retries next pass while the price
    /// condition holds. Returns the alerts delivered this cycle, in queue
    /// order.
    pub async fn deliver(
        &self,
        pending: Vec<PendingAlert>,
        state: &mut AlertState,
        sink: Arc<dyn NotificationSink>,
    ) -> Vec<SentAlert> {
        // A key watched by more than one row is sent once.
        let mut seen = HashSet::new();
        let mut queue = pending
            .into_iter()
            .filter(|p| seen.insert(p.key.clone()))
            .enumerate();

        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::new();
        loop {
            while tasks.len() < MAX_CONCURRENT_DELIVERIES {
                let Some((idx, p)) = queue.next() else { break };
                let sink = Arc::clone(&sink);
                tasks.spawn(async move {
                    let outcome = sink.send(&p.event).await;
                    (idx, p, outcome)
                });
            }
            match tasks.join_next().await {
                Some(Ok(result)) => outcomes.push(result),
                Some(Err(e)) => warn!("Alert delivery task failed: {e}"),
                None => break,
            }
        }
        outcomes.sort_by_key(|(idx, ..)| *idx);

        let mut sent = Vec::new();
        for (_, p, outcome) in outcomes {
            let label = p.event.level.label();
            match outcome {
                Ok(()) => {
                    info!("Alert sent: {} {}", p.event.symbol, label);
                    sent.push(SentAlert {
                        symbol: p.event.symbol,
                        label,
                    });
                    state.mark_fired(p.key);
                }
                Err(e) => {
                    // Stays Armed; retried next pass while still in range.
                    warn!(
                        "Alert delivery failed for {} {}: {:#}",
                        p.event.symbol, label, e
                    );
                }
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    struct RecordingSink {
        sent: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, event: &AlertEvent) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("sink unavailable");
            }
            self.sent
                .lock()
                .unwrap()
                .push(format!("{} {}", event.symbol, event.level.label()));
            Ok(())
        }
    }

    struct SlowSink {
        delay: Duration,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for SlowSink {
        async fn send(&self, event: &AlertEvent) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.sent.lock().unwrap().push(event.symbol.clone());
            Ok(())
        }
    }

    fn engine() -> CooldownEngine {
        CooldownEngine::new(0.01, 0.012, 1000, 50)
    }

    fn entry_level(price: f64) -> Vec<WatchedLevel> {
        vec![WatchedLevel::entry(0, price)]
    }

    /// Scan one symbol and deliver its pending alerts in one step.
    async fn evaluate(
        engine: &CooldownEngine,
        symbol: &str,
        live_price: f64,
        levels: &[WatchedLevel],
        state: &mut AlertState,
        sink: Arc<RecordingSink>,
    ) -> Vec<SentAlert> {
        let pending = engine.scan(symbol, live_price, levels, state);
        engine.deliver(pending, state, sink).await
    }

    #[tokio::test]
    async fn fires_once_within_band() {
        let engine = engine();
        let mut state = AlertState::new();
        let sink = RecordingSink::new();
        let levels = entry_level(100.0);

        let sent = evaluate(&engine, "BTC", 100.5, &levels, &mut state, sink.clone()).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].symbol, "BTC");
        assert_eq!(state.len(), 1);

        // Oscillating inside the reset band never re-fires.
        for price in [99.2, 100.8, 100.0, 101.1, 98.9] {
            let again = evaluate(&engine, "BTC", price, &levels, &mut state, sink.clone()).await;
            assert!(again.is_empty(), "re-fired at {price}");
        }
        assert_eq!(sink.sent_count(), 1);
    }

    #[tokio::test]
    async fn refires_after_leaving_and_reentering_band() {
        let engine = engine();
        let mut state = AlertState::new();
        let sink = RecordingSink::new();
        let levels = entry_level(100.0);

        evaluate(&engine, "BTC", 100.0, &levels, &mut state, sink.clone()).await;
        assert_eq!(sink.sent_count(), 1);

        // Outside the 1.2% reset band: re-arms, nothing sent.
        let sent = evaluate(&engine, "BTC", 105.0, &levels, &mut state, sink.clone()).await;
        assert!(sent.is_empty());
        assert!(state.is_empty());

        // Back inside the 1% fire band: exactly one more alert.
        let sent = evaluate(&engine, "BTC", 100.9, &levels, &mut state, sink.clone()).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sink.sent_count(), 2);
    }

    #[tokio::test]
    async fn out_of_range_armed_key_stays_silent() {
        let engine = engine();
        let mut state = AlertState::new();
        let sink = RecordingSink::new();

        let sent = evaluate(
            &engine,
            "BTC",
            120.0,
            &entry_level(100.0),
            &mut state,
            sink.clone(),
        )
        .await;
        assert!(sent.is_empty());
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_keeps_key_armed_for_retry() {
        let engine = engine();
        let mut state = AlertState::new();
        let sink = RecordingSink::new();
        let levels = entry_level(100.0);

        sink.fail.store(true, Ordering::SeqCst);
        let sent = evaluate(&engine, "BTC", 100.2, &levels, &mut state, sink.clone()).await;
        assert!(sent.is_empty());
        assert!(state.is_empty());

        sink.fail.store(false, Ordering::SeqCst);
        let sent = evaluate(&engine, "BTC", 100.2, &levels, &mut state, sink.clone()).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn distinct_levels_fire_independently() {
        let engine = engine();
        let mut state = AlertState::new();
        let sink = RecordingSink::new();
        let levels = vec![
            WatchedLevel::entry(0, 100.0),
            WatchedLevel {
                kind: LevelKind::StopLoss,
                price: 100.4,
            },
        ];

        let sent = evaluate(&engine, "BTC", 100.2, &levels, &mut state, sink.clone()).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(state.len(), 2);
        assert!(sent[0].label.contains("1st Entry"));
        assert!(sent[1].label.contains("Stop Loss"));
    }

    #[tokio::test]
    async fn same_symbol_different_target_is_a_different_key() {
        let engine = engine();
        let mut state = AlertState::new();
        let sink = RecordingSink::new();

        evaluate(
            &engine,
            "BTC",
            100.2,
            &entry_level(100.0),
            &mut state,
            sink.clone(),
        )
        .await;
        // Same level slot, updated target price: treated as a new alert.
        let sent = evaluate(
            &engine,
            "BTC",
            100.2,
            &entry_level(100.5),
            &mut state,
            sink.clone(),
        )
        .await;
        assert_eq!(sent.len(), 1);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn cap_eviction_keeps_oldest_out_newest_in() {
        let engine = CooldownEngine::new(0.01, 0.012, 1000, 50);
        let mut state = AlertState::new();

        for i in 0..1001usize {
            let level = WatchedLevel::entry(0, 100.0 + i as f64);
            state.mark_fired(AlertKey::new(&format!("SYM{i}"), &level));
        }
        assert_eq!(state.len(), 1001);

        // Not due yet: counter has to reach the cleanup interval.
        for _ in 0..49 {
            engine.begin_pass(&mut state);
        }
        assert_eq!(state.len(), 1001);

        engine.begin_pass(&mut state);
        assert_eq!(state.len(), 500);

        // Oldest keys were evicted and are armed again; newest survive.
        let oldest = AlertKey::new("SYM0", &WatchedLevel::entry(0, 100.0));
        let newest = AlertKey::new("SYM1000", &WatchedLevel::entry(0, 1100.0));
        assert!(!state.is_fired(&oldest));
        assert!(state.is_fired(&newest));
    }

    #[tokio::test]
    async fn evicted_key_can_fire_again() {
        let engine = CooldownEngine::new(0.01, 0.012, 2, 1);
        let mut state = AlertState::new();
        let sink = RecordingSink::new();

        for sym in ["A", "B", "C"] {
            evaluate(
                &engine,
                sym,
                100.0,
                &entry_level(100.0),
                &mut state,
                sink.clone(),
            )
            .await;
        }
        assert_eq!(state.len(), 3);

        engine.begin_pass(&mut state); // cap 2 exceeded, evict to 1
        assert_eq!(state.len(), 1);

        let sent = evaluate(
            &engine,
            "A",
            100.0,
            &entry_level(100.0),
            &mut state,
            sink.clone(),
        )
        .await;
        assert_eq!(sent.len(), 1, "evicted key must be able to re-fire");
    }

    #[tokio::test]
    async fn slow_deliveries_overlap_instead_of_queueing() {
        let engine = engine();
        let mut state = AlertState::new();
        let sink = Arc::new(SlowSink {
            delay: Duration::from_millis(100),
            sent: Mutex::new(Vec::new()),
        });
        let levels = entry_level(100.0);

        let mut pending = Vec::new();
        for sym in ["A", "B", "C", "D", "E"] {
            pending.extend(engine.scan(sym, 100.2, &levels, &mut state));
        }
        assert_eq!(pending.len(), 5);

        let started = Instant::now();
        let sent = engine.deliver(pending, &mut state, sink.clone()).await;
        let elapsed = started.elapsed();

        assert_eq!(sent.len(), 5);
        assert_eq!(state.len(), 5);
        assert_eq!(sink.sent.lock().unwrap().len(), 5);
        // Sequential sends would take 500ms.
        assert!(
            elapsed < Duration::from_millis(450),
            "deliveries ran back to back: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn duplicate_rows_for_one_key_deliver_once() {
        let engine = engine();
        let mut state = AlertState::new();
        let sink = RecordingSink::new();
        let levels = entry_level(100.0);

        let mut pending = engine.scan("BTC", 100.2, &levels, &mut state);
        pending.extend(engine.scan("BTC", 100.2, &levels, &mut state));
        assert_eq!(pending.len(), 2);

        let sent = engine.deliver(pending, &mut state, sink.clone()).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sink.sent_count(), 1);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn watched_levels_skips_absent_slots() {
        let mut item = WatchItem::new("ETH");
        item.entries = vec![Some(10.0), None, Some(8.0)];
        item.stop_loss = Some(7.0);

        let levels = watched_levels(&item);
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0].kind, LevelKind::Entry(0));
        assert_eq!(levels[1].kind, LevelKind::Entry(2));
        assert_eq!(levels[1].label(), "3rd Entry ($8.00000)");
        assert_eq!(levels[2].kind, LevelKind::StopLoss);
    }
}
