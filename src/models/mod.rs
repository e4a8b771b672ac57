pub mod candle;
pub mod watch;

pub use candle::{Candle, CandleSeries};
pub use watch::WatchItem;
