//! Reference price lookup with retry and fallback

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::retry::ReadRetry;
use crate::common::traits::PriceSource;

/// Primary source retried with exponential backoff, then an optional fallback
pub struct FallbackPriceFetcher {
    primary: Arc<dyn PriceSource>,
    fallback: Option<Arc<dyn PriceSource>>,
    retry: ReadRetry,
}

impl FallbackPriceFetcher {
    /// # Arguments
    /// * `primary` - Venue price source, tried first
    /// * `fallback` - Aggregator source used once the primary is exhausted
    /// * `max_attempts` - Attempts against the primary (at least one)
    /// * `initial_backoff` - First retry delay; doubles per attempt
    pub fn new(
        primary: Arc<dyn PriceSource>,
        fallback: Option<Arc<dyn PriceSource>>,
        max_attempts: u32,
        initial_backoff: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            retry: ReadRetry::new(max_attempts, initial_backoff),
        }
    }

    async fn fetch_primary(&self, asset: &str) -> Result<Decimal> {
        let primary = &self.primary;
        self.retry
            .run(primary.name(), || primary.latest_price(asset))
            .await
    }
}

#[async_trait]
impl PriceSource for FallbackPriceFetcher {
    fn name(&self) -> &'static str {
        "fallback"
    }

    #[instrument(skip(self))]
    async fn latest_price(&self, asset: &str) -> Result<Decimal> {
        let primary_err = match self.fetch_primary(asset).await {
            Ok(price) => return Ok(price),
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };

        warn!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            error = %primary_err,
            "primary price source exhausted, falling back"
        );

        fallback.latest_price(asset).await.map_err(|e| {
            EngineError::unavailable("price.all_sources_failed")
                .with("asset", asset)
                .with("primary_error", primary_err.reason())
                .with("fallback_error", e.reason())
        })
    }
}
