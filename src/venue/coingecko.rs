//! CoinGecko simple price, the fallback reference price source

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::PriceSource;

/// Prices in USD, looked up by aggregator id
#[derive(Debug, Clone)]
pub struct CoinGeckoPriceSource {
    client: Client,
    base_url: String,
    /// Upper-case ticker to aggregator id, e.g. `BTC` to `bitcoin`
    ids: HashMap<String, String>,
}

impl CoinGeckoPriceSource {
    pub fn new(base_url: &str, ids: HashMap<String, String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::internal("coingecko.client_build_failed").with_source(e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            ids,
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoPriceSource {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    #[instrument(skip(self))]
    async fn latest_price(&self, asset: &str) -> Result<Decimal> {
        let ticker = asset.to_uppercase();
        let id = self
            .ids
            .get(&ticker)
            .ok_or_else(|| EngineError::not_found("coingecko.unknown_asset").with("asset", &ticker))?;
        let url = format!("{}/simple/price", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("ids", id.as_str()), ("vs_currencies", "usd")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::unavailable("coingecko.price_unavailable")
                .with("asset", &ticker)
                .with("status", status.as_u16()));
        }

        // {"bitcoin": {"usd": 50123.4}}
        let body: HashMap<String, HashMap<String, serde_json::Number>> = response.json().await?;
        let price = body
            .get(id)
            .and_then(|quotes| quotes.get("usd"))
            .ok_or_else(|| EngineError::not_found("coingecko.missing_quote").with("asset", &ticker))?;

        let price = Decimal::from_str(&price.to_string())
            .or_else(|_| Decimal::from_scientific(&price.to_string()))
            .map_err(|e| {
                EngineError::internal("coingecko.invalid_price")
                    .with("asset", &ticker)
                    .with_source(e)
            })?;
        debug!(asset = %ticker, id = %id, price = %price, "fetched aggregator price");
        Ok(price)
    }
}
