//! Binance USD-M futures adapter
//!
//! | Operation     | Method | Path                    |
//! |---------------|--------|-------------------------|
//! | Place order   | POST   | `/fapi/v1/order`        |
//! | Balances      | GET    | `/fapi/v2/balance`      |
//! | Exchange info | GET    | `/fapi/v1/exchangeInfo` |

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::auth::{signed_query, API_KEY_HEADER};
use crate::common::errors::{EngineError, Result};
use crate::common::traits::{AssetSource, VenueAdapter};
use crate::common::types::{
    InstrumentType, Order, OrderKind, PlacedOrder, SymbolFilters, Venue, VenueBalance,
    VenueCredentials,
};
use crate::config::types::BinanceConfig;

/// Quote asset balances are read in
const MARGIN_ASSET: &str = "USDT";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderResponse {
    order_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
    asset: String,
    balance: Decimal,
    available_balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeSymbol {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    contract_type: String,
    #[serde(default)]
    filters: Vec<ExchangeFilter>,
}

impl ExchangeSymbol {
    fn is_live_perpetual(&self) -> bool {
        self.status == "TRADING" && (self.contract_type.is_empty() || self.contract_type == "PERPETUAL")
    }

    fn symbol_filters(&self) -> SymbolFilters {
        let mut filters = SymbolFilters {
            tick_size: Decimal::ZERO,
            step_size: Decimal::ZERO,
        };
        for filter in &self.filters {
            match filter {
                ExchangeFilter::Price { tick_size } => filters.tick_size = *tick_size,
                ExchangeFilter::LotSize { step_size } => filters.step_size = *step_size,
                ExchangeFilter::Other => {}
            }
        }
        filters
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum ExchangeFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { tick_size: Decimal },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: Decimal },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Signed REST adapter for perpetual futures
#[derive(Debug, Clone)]
pub struct BinanceFuturesAdapter {
    client: Client,
    base_url: String,
    recv_window_ms: u64,
    /// Filters of live perpetuals keyed by symbol, filled on first use
    filters: Arc<RwLock<HashMap<String, SymbolFilters>>>,
}

impl BinanceFuturesAdapter {
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| EngineError::internal("binance.client_build_failed").with_source(e))?;

        Ok(Self {
            client,
            base_url: config.futures_url.trim_end_matches('/').to_string(),
            recv_window_ms: config.recv_window_ms,
            filters: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Fetch every listed symbol and refresh the filter cache
    #[instrument(skip(self))]
    async fn exchange_info(&self) -> Result<Vec<ExchangeSymbol>> {
        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        let info: ExchangeInfo = response.json().await?;
        let live: HashMap<String, SymbolFilters> = info
            .symbols
            .iter()
            .filter(|s| s.is_live_perpetual())
            .map(|s| (s.symbol.clone(), s.symbol_filters()))
            .collect();
        debug!(symbols = live.len(), "exchange info loaded");
        *self.filters.write().await = live;
        Ok(info.symbols)
    }

    fn order_params(&self, order: &Order) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", order.symbol()),
            ("side", order.side.to_string()),
            ("type", order.kind.to_string()),
            ("quantity", order.quantity.normalize().to_string()),
        ];
        if let Some(price) = order.price {
            params.push(("price", price.normalize().to_string()));
        }
        if let Some(stop_price) = order.stop_price {
            params.push(("stopPrice", stop_price.normalize().to_string()));
        }
        if let Some(tif) = order.time_in_force {
            params.push(("timeInForce", tif.to_string()));
        }
        if order.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        if let Some(working_type) = order.working_type {
            if matches!(order.kind, OrderKind::StopMarket | OrderKind::TakeProfitMarket) {
                params.push(("workingType", working_type.to_string()));
            }
        }
        params
    }

    fn signed(&self, mut params: Vec<(&'static str, String)>, credentials: &VenueCredentials) -> Result<String> {
        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));
        signed_query(&params, &credentials.secret_key)
    }
}

/// Map a non-success response to an engine error
///
/// The venue's message goes into context for logs only.
fn classify(status: StatusCode, body: &str) -> EngineError {
    let api = serde_json::from_str::<ApiError>(body).ok();
    let code = api.as_ref().map(|e| e.code);

    let err = match (status, code) {
        (StatusCode::UNAUTHORIZED, _) | (_, Some(-2014 | -2015 | -1022)) => {
            EngineError::unauthenticated("binance.invalid_credentials")
        }
        (StatusCode::TOO_MANY_REQUESTS, _) | (_, Some(-1003)) => {
            EngineError::unavailable("binance.rate_limited")
        }
        (s, _) if s.is_server_error() => EngineError::unavailable("binance.server_error"),
        _ => EngineError::precondition("binance.order_rejected"),
    };

    let err = err.with("status", status.as_u16());
    match api {
        Some(api) => err.with("code", api.code).with("venue_message", api.msg),
        None => err,
    }
}

#[async_trait]
impl VenueAdapter for BinanceFuturesAdapter {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn instrument_type(&self) -> InstrumentType {
        InstrumentType::FuturePerpetual
    }

    #[instrument(skip(self, order, credentials), fields(symbol = %order.symbol(), kind = %order.kind))]
    async fn place_order(&self, order: &Order, credentials: &VenueCredentials) -> Result<PlacedOrder> {
        let query = self.signed(self.order_params(order), credentials)?;
        let url = format!("{}/fapi/v1/order?{}", self.base_url, query);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify(status, &body).with("symbol", order.symbol());
            warn!(error = %err, "order rejected");
            return Err(err);
        }

        let placed: NewOrderResponse = response.json().await?;
        debug!(order_id = placed.order_id, "order accepted");
        Ok(PlacedOrder {
            external_order_id: placed.order_id.to_string(),
            placed_at: Utc::now(),
        })
    }

    #[instrument(skip(self, credentials))]
    async fn read_balance(&self, credentials: &VenueCredentials) -> Result<VenueBalance> {
        let query = self.signed(Vec::new(), credentials)?;
        let url = format!("{}/fapi/v2/balance?{}", self.base_url, query);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        let balances: Vec<BalanceEntry> = response.json().await?;
        balances
            .into_iter()
            .find(|b| b.asset == MARGIN_ASSET)
            .map(|b| VenueBalance {
                asset: b.asset,
                total: b.balance,
                available_margin: b.available_balance,
            })
            .ok_or_else(|| EngineError::not_found("binance.balance_asset_missing").with("asset", MARGIN_ASSET))
    }

    async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        if let Some(filters) = self.filters.read().await.get(symbol) {
            return Ok(*filters);
        }
        self.exchange_info().await?;
        self.filters
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| EngineError::not_found("binance.unknown_symbol").with("symbol", symbol))
    }
}

#[async_trait]
impl AssetSource for BinanceFuturesAdapter {
    async fn tradeable_assets(&self, quote_asset: &str) -> Result<Vec<String>> {
        let assets: BTreeSet<String> = self
            .exchange_info()
            .await?
            .into_iter()
            .filter(|s| s.is_live_perpetual() && s.quote_asset.eq_ignore_ascii_case(quote_asset))
            .map(|s| s.base_asset.to_uppercase())
            .collect();
        info!(assets = assets.len(), quote_asset, "loaded tradeable assets");
        Ok(assets.into_iter().collect())
    }
}
