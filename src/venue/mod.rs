//! Venue adapters and reference price sources

pub mod binance;
pub mod coingecko;
pub mod paper;

pub use binance::{BinanceFuturesAdapter, BinancePriceSource};
pub use coingecko::CoinGeckoPriceSource;
pub use paper::PaperVenue;
