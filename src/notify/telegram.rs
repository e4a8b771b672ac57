use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::alerts::{AlertEvent, LevelKind};
use crate::config::Config;
use crate::notify::NotificationSink;

const API_BASE: &str = "https://api.telegram.org";
const MAX_ATTEMPTS: u32 = 3;

pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            bot_token: cfg.telegram_bot_token.clone(),
            chat_id: cfg.telegram_chat_id.clone(),
        }
    }

    async fn post_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", API_BASE, self.bot_token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        for attempt in 0..MAX_ATTEMPTS {
            match self
                .client
                .post(&url)
                .json(&payload)
                .timeout(Duration::from_secs(10))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Telegram message sent (attempt {})", attempt + 1);
                    return Ok(());
                }
                Ok(resp) => {
                    let status = resp.status();
                    // Client errors (bad token, bad chat id) won't heal on retry.
                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        anyhow::bail!("Telegram rejected message ({}): {}", status, body);
                    }
                    warn!(
                        "Telegram send failed (attempt {}): {}",
                        attempt + 1,
                        status
                    );
                }
                Err(e) => {
                    warn!("Telegram send error (attempt {}): {}", attempt + 1, e);
                }
            }

            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }
        }

        anyhow::bail!("Telegram delivery failed after {} attempts", MAX_ATTEMPTS)
    }
}

/// Markdown alert message with a headline matching the level kind.
pub fn format_alert_message(event: &AlertEvent) -> String {
    let headline = match event.level.kind {
        LevelKind::Entry(_) => "ENTRY ALERT",
        LevelKind::StopLoss => "STOP LOSS ALERT",
        LevelKind::TakeProfit => "TAKE PROFIT ALERT",
    };

    format!(
        "*{headline}*\n\n\
         *Symbol:* `{}`\n\
         *Current Price:* `${:.5}`\n\
         *Alert Level:* `{}`\n\
         *Distance:* `within 1%`\n\
         *Time:* `{}`",
        event.symbol,
        event.live_price,
        event.level.label(),
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
    )
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let text = format_alert_message(event);
        self.post_message(&text)
            .await
            .with_context(|| format!("delivering alert for {}", event.symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::WatchedLevel;

    #[test]
    fn message_headline_follows_level_kind() {
        let mut event = AlertEvent {
            symbol: "BTC".to_string(),
            live_price: 100.2,
            level: WatchedLevel::entry(1, 100.0),
        };
        let msg = format_alert_message(&event);
        assert!(msg.starts_with("*ENTRY ALERT*"));
        assert!(msg.contains("`BTC`"));
        assert!(msg.contains("2nd Entry ($100.00000)"));

        event.level = WatchedLevel {
            kind: LevelKind::StopLoss,
            price: 95.0,
        };
        assert!(format_alert_message(&event).starts_with("*STOP LOSS ALERT*"));

        event.level = WatchedLevel {
            kind: LevelKind::TakeProfit,
            price: 110.0,
        };
        assert!(format_alert_message(&event).starts_with("*TAKE PROFIT ALERT*"));
    }
}
