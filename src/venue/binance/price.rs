//! Spot ticker price, the primary reference price source

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::PriceSource;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: Decimal,
}

#[derive(Debug, Clone)]
pub struct BinancePriceSource {
    client: Client,
    base_url: String,
    quote_asset: String,
}

impl BinancePriceSource {
    /// # Arguments
    /// * `base_url` - Spot REST base URL
    /// * `quote_asset` - Quote appended to the asset, e.g. `USDT`
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, quote_asset: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::internal("binance.client_build_failed").with_source(e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            quote_asset: quote_asset.to_uppercase(),
        })
    }
}

#[async_trait]
impl PriceSource for BinancePriceSource {
    fn name(&self) -> &'static str {
        "binance"
    }

    #[instrument(skip(self))]
    async fn latest_price(&self, asset: &str) -> Result<Decimal> {
        let symbol = format!("{}{}", asset.to_uppercase(), self.quote_asset);
        let url = format!("{}/api/v3/ticker/price", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            return Err(EngineError::not_found("binance.unknown_symbol")
                .with("symbol", symbol)
                .with("status", status.as_u16()));
        }
        if !status.is_success() {
            return Err(EngineError::unavailable("binance.price_unavailable")
                .with("symbol", symbol)
                .with("status", status.as_u16()));
        }

        let ticker: TickerPrice = response.json().await?;
        debug!(symbol = %symbol, price = %ticker.price, "fetched ticker price");
        Ok(ticker.price)
    }
}
