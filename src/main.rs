mod bot;

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use level_watch_bot::config::Config;
use level_watch_bot::exchange::BinanceClient;
use level_watch_bot::notify::TelegramNotifier;
use level_watch_bot::sheet::SheetClient;

use crate::bot::LevelWatchBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    if cfg.sheet_csv_url.is_empty() {
        anyhow::bail!("SHEET_CSV_URL is not set");
    }
    if cfg.telegram_bot_token.is_empty() || cfg.telegram_chat_id.is_empty() {
        anyhow::bail!("TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set");
    }

    let market = Box::new(BinanceClient::new());
    let sink = Arc::new(TelegramNotifier::new(&cfg));
    let sheet = SheetClient::new(&cfg);

    let mut bot = LevelWatchBot::new(cfg, market, sink, sheet);
    bot.run().await?;

    Ok(())
}
