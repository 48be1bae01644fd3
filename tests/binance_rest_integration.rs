//! Integration tests for the Binance REST adapters and the price fallback
//!
//! Every request goes to a local wiremock server; nothing reaches the
//! real venue.

use chrono::Utc;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use signal_engine::common::types::{
    InstrumentType, Order, OrderSide, SymbolFilters, TimeInForce, VenueCredentials, WorkingType,
};
use signal_engine::config::types::BinanceConfig;
use signal_engine::parser::FallbackPriceFetcher;
use signal_engine::venue::{BinanceFuturesAdapter, BinancePriceSource, CoinGeckoPriceSource};
use signal_engine::{AssetSource, ErrorKind, OrderKind, PriceSource, Venue, VenueAdapter};

const TIMEOUT: Duration = Duration::from_secs(5);

fn credentials() -> VenueCredentials {
    VenueCredentials {
        venue: Venue::Binance,
        api_key: "test-api-key".to_string(),
        secret_key: "test-secret".to_string(),
        subaccount: None,
    }
}

fn futures_adapter(server: &MockServer) -> BinanceFuturesAdapter {
    BinanceFuturesAdapter::new(&BinanceConfig {
        futures_url: server.uri(),
        ..BinanceConfig::default()
    })
    .expect("Failed to create futures adapter")
}

fn limit_order() -> Order {
    Order {
        venue: Venue::Binance,
        instrument_type: InstrumentType::FuturePerpetual,
        asset: "BTC".to_string(),
        pair: "USDT".to_string(),
        kind: OrderKind::Limit,
        side: OrderSide::Buy,
        price: Some(dec!(50166.6667)),
        stop_price: None,
        quantity: dec!(0.028),
        reduce_only: false,
        working_type: None,
        time_in_force: Some(TimeInForce::Gtc),
        created: Utc::now(),
        external_order_id: None,
    }
}

// ============================================================================
// Order placement
// ============================================================================

#[tokio::test]
async fn test_place_limit_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .and(header("X-MBX-APIKEY", "test-api-key"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("side", "BUY"))
        .and(query_param("type", "LIMIT"))
        .and(query_param("quantity", "0.028"))
        .and(query_param("price", "50166.6667"))
        .and(query_param("timeInForce", "GTC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orderId": 283194212,
            "symbol": "BTCUSDT",
            "status": "NEW"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let placed = futures_adapter(&server)
        .place_order(&limit_order(), &credentials())
        .await
        .unwrap();

    assert_eq!(placed.external_order_id, "283194212");
}

#[tokio::test]
async fn test_stop_order_carries_trigger_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .and(query_param("type", "STOP_MARKET"))
        .and(query_param("stopPrice", "49000"))
        .and(query_param("reduceOnly", "true"))
        .and(query_param("workingType", "MARK_PRICE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "orderId": 7 })))
        .expect(1)
        .mount(&server)
        .await;

    let mut order = limit_order();
    order.kind = OrderKind::StopMarket;
    order.side = OrderSide::Sell;
    order.price = None;
    order.time_in_force = None;
    order.stop_price = Some(dec!(49000));
    order.reduce_only = true;
    order.working_type = Some(WorkingType::MarkPrice);

    let placed = futures_adapter(&server).place_order(&order, &credentials()).await.unwrap();
    assert_eq!(placed.external_order_id, "7");
}

#[tokio::test]
async fn test_requests_are_signed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v2/balance"))
        .and(header_exists("X-MBX-APIKEY"))
        .and(query_param("recvWindow", "5000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "asset": "USDT", "balance": "1.0", "availableBalance": "1.0" }
        ])))
        .mount(&server)
        .await;

    futures_adapter(&server).read_balance(&credentials()).await.unwrap();

    let requests = server.received_requests().await.expect("recording enabled");
    let query = requests[0].url.query().unwrap_or_default().to_string();
    assert!(query.contains("timestamp="));
    let signature = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("signature="))
        .expect("signature parameter");
    assert_eq!(signature.len(), 64);
    assert!(query.ends_with(&format!("signature={}", signature)));
}

#[tokio::test]
async fn test_rejection_is_a_precondition_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": -2019,
            "msg": "Margin is insufficient."
        })))
        .mount(&server)
        .await;

    let err = futures_adapter(&server)
        .place_order(&limit_order(), &credentials())
        .await
        .unwrap_err();

    assert!(err.is(ErrorKind::FailedPrecondition));
    assert_eq!(err.reason(), "binance.order_rejected");
    assert_eq!(err.context().get("code").map(String::as_str), Some("-2019"));
    assert!(!err.user_message().contains("Margin"));
}

#[tokio::test]
async fn test_bad_key_is_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": -2015,
            "msg": "Invalid API-key, IP, or permissions for action."
        })))
        .mount(&server)
        .await;

    let err = futures_adapter(&server)
        .place_order(&limit_order(), &credentials())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Unauthenticated));
}

#[tokio::test]
async fn test_rate_limit_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let err = futures_adapter(&server)
        .place_order(&limit_order(), &credentials())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Unavailable));
    assert_eq!(err.reason(), "binance.rate_limited");
}

// ============================================================================
// Balances
// ============================================================================

#[tokio::test]
async fn test_read_usdt_balance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v2/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "asset": "BNB", "balance": "3.2", "availableBalance": "3.2" },
            { "asset": "USDT", "balance": "1520.75", "availableBalance": "980.10" }
        ])))
        .mount(&server)
        .await;

    let balance = futures_adapter(&server).read_balance(&credentials()).await.unwrap();
    assert_eq!(balance.asset, "USDT");
    assert_eq!(balance.total, dec!(1520.75));
    assert_eq!(balance.available_margin, dec!(980.10));
}

#[tokio::test]
async fn test_missing_quote_asset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v2/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "asset": "BNB", "balance": "3.2", "availableBalance": "3.2" }
        ])))
        .mount(&server)
        .await;

    let err = futures_adapter(&server).read_balance(&credentials()).await.unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

// ============================================================================
// Exchange info
// ============================================================================

fn exchange_info() -> serde_json::Value {
    json!({
        "timezone": "UTC",
        "symbols": [
            {
                "symbol": "BTCUSDT",
                "status": "TRADING",
                "baseAsset": "BTC",
                "quoteAsset": "USDT",
                "contractType": "PERPETUAL",
                "filters": [
                    { "filterType": "PRICE_FILTER", "minPrice": "556.80", "maxPrice": "4529764", "tickSize": "0.10" },
                    { "filterType": "LOT_SIZE", "minQty": "0.001", "maxQty": "1000", "stepSize": "0.001" },
                    { "filterType": "MIN_NOTIONAL", "notional": "100" }
                ]
            },
            {
                "symbol": "1000PEPEUSDT",
                "status": "TRADING",
                "baseAsset": "1000PEPE",
                "quoteAsset": "USDT",
                "contractType": "PERPETUAL",
                "filters": [
                    { "filterType": "PRICE_FILTER", "tickSize": "0.0000001" },
                    { "filterType": "LOT_SIZE", "stepSize": "1" }
                ]
            },
            {
                "symbol": "BTCUSDT_240628",
                "status": "TRADING",
                "baseAsset": "BTC",
                "quoteAsset": "USDT",
                "contractType": "CURRENT_QUARTER",
                "filters": []
            },
            {
                "symbol": "SRMUSDT",
                "status": "SETTLING",
                "baseAsset": "SRM",
                "quoteAsset": "USDT",
                "contractType": "PERPETUAL",
                "filters": []
            },
            {
                "symbol": "ETHBUSD",
                "status": "TRADING",
                "baseAsset": "ETH",
                "quoteAsset": "BUSD",
                "contractType": "PERPETUAL",
                "filters": []
            }
        ]
    })
}

#[tokio::test]
async fn test_symbol_filters_are_read_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(exchange_info()))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = futures_adapter(&server);
    let btc = adapter.symbol_filters("BTCUSDT").await.unwrap();
    assert_eq!(
        btc,
        SymbolFilters {
            tick_size: dec!(0.1),
            step_size: dec!(0.001),
        }
    );
    let pepe = adapter.symbol_filters("1000PEPEUSDT").await.unwrap();
    assert_eq!(pepe.step_size, dec!(1));
}

#[tokio::test]
async fn test_unlisted_symbol_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(exchange_info()))
        .mount(&server)
        .await;

    let err = futures_adapter(&server).symbol_filters("SRMUSDT").await.unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
    assert_eq!(err.reason(), "binance.unknown_symbol");
}

#[tokio::test]
async fn test_tradeable_assets_are_live_perpetuals() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(exchange_info()))
        .mount(&server)
        .await;

    let assets = futures_adapter(&server).tradeable_assets("usdt").await.unwrap();
    assert_eq!(assets, vec!["1000PEPE".to_string(), "BTC".to_string()]);
}

// ============================================================================
// Reference prices
// ============================================================================

async fn mount_ticker(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/price"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_aggregator(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "bitcoin"))
        .and(query_param("vs_currencies", "usd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "bitcoin": { "usd": 50100.5 } })))
        .mount(server)
        .await;
}

fn fetcher(venue: &MockServer, aggregator: &MockServer) -> FallbackPriceFetcher {
    let primary = BinancePriceSource::new(&venue.uri(), "USDT", TIMEOUT).unwrap();
    let ids = HashMap::from([("BTC".to_string(), "bitcoin".to_string())]);
    let fallback = CoinGeckoPriceSource::new(&aggregator.uri(), ids, TIMEOUT).unwrap();
    FallbackPriceFetcher::new(
        Arc::new(primary),
        Some(Arc::new(fallback)),
        3,
        Duration::from_millis(1),
    )
}

#[tokio::test]
async fn test_primary_price_wins() {
    let venue = MockServer::start().await;
    let aggregator = MockServer::start().await;
    mount_ticker(&venue, 200, json!({ "symbol": "BTCUSDT", "price": "50123.45000000" })).await;

    let price = fetcher(&venue, &aggregator).latest_price("btc").await.unwrap();
    assert_eq!(price, dec!(50123.45));
    assert!(aggregator.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_falls_back_after_retrying_primary() {
    let venue = MockServer::start().await;
    let aggregator = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/price"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&venue)
        .await;
    mount_aggregator(&aggregator).await;

    let price = fetcher(&venue, &aggregator).latest_price("BTC").await.unwrap();
    assert_eq!(price, dec!(50100.5));
}

#[tokio::test]
async fn test_unknown_symbol_is_not_retried() {
    let venue = MockServer::start().await;
    let aggregator = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/price"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "code": -1121, "msg": "Invalid symbol." })))
        .expect(1)
        .mount(&venue)
        .await;
    mount_aggregator(&aggregator).await;

    let price = fetcher(&venue, &aggregator).latest_price("BTC").await.unwrap();
    assert_eq!(price, dec!(50100.5));
}

#[tokio::test]
async fn test_all_sources_down() {
    let venue = MockServer::start().await;
    let aggregator = MockServer::start().await;
    mount_ticker(&venue, 500, json!({})).await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&aggregator)
        .await;

    let err = fetcher(&venue, &aggregator).latest_price("BTC").await.unwrap_err();
    assert!(err.is(ErrorKind::Unavailable));
    assert_eq!(err.reason(), "price.all_sources_failed");
}
