//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::common::types::Venue;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database configuration (in-memory store when absent)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Risk limits and ladder shape
    #[serde(default)]
    pub engine: EngineConfig,
    /// Signal parsing
    #[serde(default)]
    pub parser: ParserConfig,
    /// Reference price sources
    #[serde(default)]
    pub price: PriceConfig,
    /// Venue endpoints
    #[serde(default)]
    pub venues: VenuesConfig,
    /// Statically configured venue accounts
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Participation window timing
    #[serde(default)]
    pub window: WindowConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Database configuration for the trade store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    30
}

/// Execution guard rails and ladder tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Notional may not exceed this multiple of the balance
    #[serde(default = "default_max_risk_multiple")]
    pub max_risk_multiple: Decimal,
    /// Minimum available margin in the quote asset
    #[serde(default = "default_min_venue_margin")]
    pub min_venue_margin: Decimal,
    /// Balance at or above which the larger ladder is used
    #[serde(default = "default_rung_balance_threshold")]
    pub rung_balance_threshold: Decimal,
    #[serde(default = "default_rungs_below_threshold")]
    pub rungs_below_threshold: usize,
    #[serde(default = "default_rungs_at_or_above_threshold")]
    pub rungs_at_or_above_threshold: usize,
    /// Actor ids allowed to execute on behalf of participants
    #[serde(default)]
    pub authorized_actors: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_risk_multiple: default_max_risk_multiple(),
            min_venue_margin: default_min_venue_margin(),
            rung_balance_threshold: default_rung_balance_threshold(),
            rungs_below_threshold: default_rungs_below_threshold(),
            rungs_at_or_above_threshold: default_rungs_at_or_above_threshold(),
            authorized_actors: Vec::new(),
        }
    }
}

fn default_max_risk_multiple() -> Decimal {
    dec!(10.5)
}

fn default_min_venue_margin() -> Decimal {
    dec!(100)
}

fn default_rung_balance_threshold() -> Decimal {
    dec!(1000)
}

fn default_rungs_below_threshold() -> usize {
    5
}

fn default_rungs_at_or_above_threshold() -> usize {
    7
}

/// What to do when a message names no side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnspecifiedSidePolicy {
    DefaultLong,
    Reject,
}

impl Default for UnspecifiedSidePolicy {
    fn default() -> Self {
        UnspecifiedSidePolicy::DefaultLong
    }
}

/// A parser variant that can be placed in a channel chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    Dca,
    Default,
}

/// Signal parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Entries within this percentage of the reference price are market orders
    #[serde(default = "default_market_band_percent")]
    pub market_band_percent: Decimal,
    #[serde(default)]
    pub unspecified_side: UnspecifiedSidePolicy,
    /// Quote asset appended to every ticker
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    /// Parser chain per channel id
    #[serde(default)]
    pub channels: HashMap<String, Vec<ParserKind>>,
    /// Chain used for channels with no explicit entry
    #[serde(default = "default_chain")]
    pub default_chain: Vec<ParserKind>,
    /// Tradeable assets and the venues that list them; built-in list when empty
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    /// Extend the assets with the venue's live listings at startup
    #[serde(default = "default_true")]
    pub load_venue_assets: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            market_band_percent: default_market_band_percent(),
            unspecified_side: UnspecifiedSidePolicy::default(),
            quote_asset: default_quote_asset(),
            channels: HashMap::new(),
            default_chain: default_chain(),
            assets: Vec::new(),
            load_venue_assets: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_market_band_percent() -> Decimal {
    dec!(3)
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_chain() -> Vec<ParserKind> {
    vec![ParserKind::Dca, ParserKind::Default]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub ticker: String,
    #[serde(default = "default_asset_venues")]
    pub venues: Vec<Venue>,
    /// Aggregator id, e.g. `bitcoin`
    #[serde(default)]
    pub aggregator_id: Option<String>,
}

fn default_asset_venues() -> Vec<Venue> {
    vec![Venue::Binance]
}

/// Reference price sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    #[serde(default = "default_binance_price_url")]
    pub binance_url: String,
    #[serde(default = "default_coingecko_url")]
    pub aggregator_url: String,
    /// Attempts against the primary source before falling back
    #[serde(default = "default_price_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            binance_url: default_binance_price_url(),
            aggregator_url: default_coingecko_url(),
            max_retries: default_price_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_binance_price_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_price_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

/// Venue endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenuesConfig {
    #[serde(default)]
    pub binance: BinanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// USD-M futures REST base URL
    #[serde(default = "default_binance_futures_url")]
    pub futures_url: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            futures_url: default_binance_futures_url(),
            recv_window_ms: default_recv_window(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_binance_futures_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_recv_window() -> u64 {
    5000
}

/// Venue account for one user
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub user_id: String,
    pub venue: Venue,
    pub api_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub subaccount: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("user_id", &self.user_id)
            .field("venue", &self.venue)
            .finish_non_exhaustive()
    }
}

/// Participation window timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// How long a window stays open
    #[serde(default = "default_window_duration")]
    pub duration_seconds: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            duration_seconds: default_window_duration(),
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}

fn default_heartbeat_interval() -> u64 {
    300
}

fn default_window_duration() -> u64 {
    3600
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    10
}
