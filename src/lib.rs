pub mod alerts;
pub mod config;
pub mod exchange;
pub mod matching;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod sheet;
#[cfg(test)]
pub mod test_helpers;
