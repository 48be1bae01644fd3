//! Binance adapters

pub mod auth;
pub mod futures;
pub mod price;

pub use futures::BinanceFuturesAdapter;
pub use price::BinancePriceSource;
