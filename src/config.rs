#[derive(Debug, Clone)]
pub struct Config {
    // Watch-list source
    pub sheet_csv_url: String,

    // Telegram
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,

    // Scheduling
    pub poll_interval_secs: u64,

    // Alert hysteresis (as fraction, e.g., 0.01 = 1%)
    pub fire_threshold: f64,
    pub reset_threshold: f64,

    // Alert memory bound
    pub max_alert_keys: usize,
    pub alert_cleanup_every: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        Config {
            sheet_csv_url: env("SHEET_CSV_URL", ""),
            telegram_bot_token: env("TELEGRAM_BOT_TOKEN", ""),
            telegram_chat_id: env("TELEGRAM_CHAT_ID", ""),
            poll_interval_secs: env("POLL_INTERVAL_SECS", "30").parse().unwrap_or(30),
            fire_threshold: env("FIRE_THRESHOLD_PCT", "0.01").parse().unwrap_or(0.01),
            reset_threshold: env("RESET_THRESHOLD_PCT", "0.012").parse().unwrap_or(0.012),
            max_alert_keys: env("MAX_ALERT_KEYS", "1000").parse().unwrap_or(1000),
            alert_cleanup_every: env("ALERT_CLEANUP_EVERY", "50").parse().unwrap_or(50),
            log_level: env("LOG_LEVEL", "INFO").to_string(),
        }
    }
}
