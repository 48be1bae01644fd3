//! Domain types shared by the parser, executors, router and store

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{EngineError, Result};

/// Direction of a trade call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Long => "long",
            TradeSide::Short => "short",
        }
    }

    /// Side of the orders that open the position
    pub fn entry_side(&self) -> OrderSide {
        match self {
            TradeSide::Long => OrderSide::Buy,
            TradeSide::Short => OrderSide::Sell,
        }
    }

    /// Side of the stop-loss and take-profit orders
    pub fn exit_side(&self) -> OrderSide {
        match self {
            TradeSide::Long => OrderSide::Sell,
            TradeSide::Short => OrderSide::Buy,
        }
    }

    /// True when `stop_loss` lies on the adverse side of `entry`
    pub fn is_beyond_stop(&self, stop_loss: Decimal, entry: Decimal) -> bool {
        match self {
            TradeSide::Long => stop_loss < entry,
            TradeSide::Short => stop_loss > entry,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(TradeSide::Long),
            "short" => Ok(TradeSide::Short),
            other => Err(EngineError::bad_param("trade_side.unknown").with("value", other)),
        }
    }
}

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Trading venue identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Ftx,
    Bybit,
    Deribit,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Ftx => "ftx",
            Venue::Bybit => "bybit",
            Venue::Deribit => "deribit",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "ftx" => Ok(Venue::Ftx),
            "bybit" => Ok(Venue::Bybit),
            "deribit" => Ok(Venue::Deribit),
            other => Err(EngineError::bad_param("venue.unknown").with("venue", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Spot,
    FuturePerpetual,
}

impl InstrumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::Spot => "spot",
            InstrumentType::FuturePerpetual => "future_perpetual",
        }
    }
}

impl std::fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spot" => Ok(InstrumentType::Spot),
            "future_perpetual" => Ok(InstrumentType::FuturePerpetual),
            other => Err(EngineError::bad_param("instrument_type.unknown").with("value", other)),
        }
    }
}

/// Who issued a trade call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Internal,
    External,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Internal => "internal",
            ActorType::External => "external",
        }
    }
}

impl FromStr for ActorType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "internal" => Ok(ActorType::Internal),
            "external" => Ok(ActorType::External),
            other => Err(EngineError::bad_param("actor_type.unknown").with("value", other)),
        }
    }
}

/// Order type inferred from the distance between entry and reference price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

impl FromStr for OrderType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            other => Err(EngineError::bad_param("order_type.unknown").with("value", other)),
        }
    }
}

/// Kind of a single venue order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    Limit,
    StopMarket,
    TakeProfitMarket,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::StopMarket => write!(f, "STOP_MARKET"),
            OrderKind::TakeProfitMarket => write!(f, "TAKE_PROFIT_MARKET"),
        }
    }
}

/// Price a trigger order is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkingType {
    MarkPrice,
    ContractPrice,
}

impl std::fmt::Display for WorkingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkingType::MarkPrice => write!(f, "MARK_PRICE"),
            WorkingType::ContractPrice => write!(f, "CONTRACT_PRICE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
        }
    }
}

/// Named execution algorithm for a trade strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategyKind {
    /// First rung at market, the rest as resting limits
    DcaFirstMarketRestLimit,
    /// Every rung as a resting limit
    DcaAllLimit,
    /// Single limit entry
    DmaLimit,
    /// Single market entry
    DmaMarket,
}

impl ExecutionStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategyKind::DcaFirstMarketRestLimit => "dca_first_market_rest_limit",
            ExecutionStrategyKind::DcaAllLimit => "dca_all_limit",
            ExecutionStrategyKind::DmaLimit => "dma_limit",
            ExecutionStrategyKind::DmaMarket => "dma_market",
        }
    }

    /// Pick the algorithm for a signal shape
    pub fn for_signal(is_dca: bool, order_type: OrderType) -> Self {
        match (is_dca, order_type) {
            (true, OrderType::Market) => ExecutionStrategyKind::DcaFirstMarketRestLimit,
            (true, OrderType::Limit) => ExecutionStrategyKind::DcaAllLimit,
            (false, OrderType::Market) => ExecutionStrategyKind::DmaMarket,
            (false, OrderType::Limit) => ExecutionStrategyKind::DmaLimit,
        }
    }

    pub fn is_dca(&self) -> bool {
        matches!(
            self,
            ExecutionStrategyKind::DcaFirstMarketRestLimit | ExecutionStrategyKind::DcaAllLimit
        )
    }
}

impl std::fmt::Display for ExecutionStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dca_first_market_rest_limit" => Ok(ExecutionStrategyKind::DcaFirstMarketRestLimit),
            "dca_all_limit" => Ok(ExecutionStrategyKind::DcaAllLimit),
            "dma_limit" => Ok(ExecutionStrategyKind::DmaLimit),
            "dma_market" => Ok(ExecutionStrategyKind::DmaMarket),
            other => Err(EngineError::bad_param("execution_strategy.unknown").with("value", other)),
        }
    }
}

/// Lifecycle of a trade strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Active,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Active => "active",
            TradeStatus::Closed => "closed",
        }
    }

    /// Allowed moves: pending -> active -> closed, pending -> closed.
    /// Re-applying the current status is a no-op and allowed.
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        use TradeStatus::*;
        matches!(
            (self, next),
            (Pending, Pending)
                | (Pending, Active)
                | (Pending, Closed)
                | (Active, Active)
                | (Active, Closed)
                | (Closed, Closed)
        )
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TradeStatus::Pending),
            "active" => Ok(TradeStatus::Active),
            "closed" => Ok(TradeStatus::Closed),
            other => Err(EngineError::bad_param("trade_status.unknown").with("value", other)),
        }
    }
}

/// Structured trade call produced by a parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub actor_id: String,
    pub humanized_actor_name: String,
    pub actor_type: ActorType,
    pub instrument_type: InstrumentType,
    pub side: TradeSide,
    /// Base asset ticker, upper case (e.g. `BTC`)
    pub asset: String,
    /// Quote asset, upper case (e.g. `USDT`)
    pub pair: String,
    /// Entry prices, nearest the stop-loss first
    pub entries: Vec<Decimal>,
    pub stop_loss: Decimal,
    pub take_profits: Vec<Decimal>,
    pub order_type: OrderType,
    pub execution_strategy: ExecutionStrategyKind,
    /// Price observed at parse time
    pub reference_price: Decimal,
    pub tradeable_venues: BTreeSet<Venue>,
}

impl TradeSignal {
    /// Venue symbol, e.g. `BTCUSDT`
    pub fn symbol(&self) -> String {
        format!("{}{}", self.asset, self.pair)
    }

    /// Check the structural invariants every persisted signal must hold
    pub fn validate(&self) -> Result<()> {
        if self.asset.is_empty() {
            return Err(EngineError::bad_param("signal.missing_asset"));
        }
        if self.entries.is_empty() {
            return Err(EngineError::bad_param("signal.missing_entry").with("asset", &self.asset));
        }
        if self.entries.iter().any(|e| *e <= Decimal::ZERO) || self.stop_loss <= Decimal::ZERO {
            return Err(EngineError::bad_param("signal.non_positive_price").with("asset", &self.asset));
        }
        if self.entries.contains(&self.stop_loss) {
            return Err(EngineError::precondition("signal.entry_equals_stop_loss")
                .with("asset", &self.asset)
                .with("stop_loss", self.stop_loss));
        }
        if !self
            .entries
            .iter()
            .all(|entry| self.side.is_beyond_stop(self.stop_loss, *entry))
        {
            return Err(EngineError::precondition("signal.stop_loss_on_wrong_side")
                .with("asset", &self.asset)
                .with("side", self.side)
                .with("stop_loss", self.stop_loss));
        }
        Ok(())
    }
}

/// Persisted trade strategy; only `status` and `last_updated` change after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStrategy {
    pub id: Uuid,
    pub idempotency_key: String,
    #[serde(flatten)]
    pub signal: TradeSignal,
    pub status: TradeStatus,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl TradeStrategy {
    pub fn new(signal: TradeSignal, idempotency_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            idempotency_key: idempotency_key.into(),
            signal,
            status: TradeStatus::Pending,
            created: now,
            last_updated: now,
        }
    }
}

/// One user's participation in a trade strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStrategyParticipant {
    pub id: Uuid,
    pub trade_strategy_id: Uuid,
    pub user_id: String,
    pub is_bot: bool,
    pub risk_percent: Decimal,
    pub venue: Venue,
    /// Notional size after execution
    pub size: Decimal,
    pub exchange_order_ids: Vec<String>,
    pub executed: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl TradeStrategyParticipant {
    pub fn new(
        trade_strategy_id: Uuid,
        user_id: impl Into<String>,
        risk_percent: Decimal,
        venue: Venue,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trade_strategy_id,
            user_id: user_id.into(),
            is_bot: false,
            risk_percent,
            venue,
            size: Decimal::ZERO,
            exchange_order_ids: Vec::new(),
            executed: None,
            created: Utc::now(),
        }
    }
}

/// A rung of a sized ladder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub price: Decimal,
    /// Fraction of the balance put at risk on this rung
    pub risk_coefficient: Decimal,
}

/// A single order bound for a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub venue: Venue,
    pub instrument_type: InstrumentType,
    pub asset: String,
    pub pair: String,
    pub kind: OrderKind,
    pub side: OrderSide,
    /// Limit price for `Limit` orders
    pub price: Option<Decimal>,
    /// Trigger price for stop and take-profit orders
    pub stop_price: Option<Decimal>,
    pub quantity: Decimal,
    pub reduce_only: bool,
    pub working_type: Option<WorkingType>,
    pub time_in_force: Option<TimeInForce>,
    pub created: DateTime<Utc>,
    /// Set once the venue accepted the order
    pub external_order_id: Option<String>,
}

impl Order {
    pub fn symbol(&self) -> String {
        format!("{}{}", self.asset, self.pair)
    }
}

/// Venue acknowledgement of a placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub external_order_id: String,
    pub placed_at: DateTime<Utc>,
}

/// The first order of a sequence that could not be placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// User-safe message
    pub message: String,
    pub failed_order: Order,
}

/// Outcome of executing a strategy for one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub notional_size: Decimal,
    pub venue: Venue,
    pub execution_strategy: ExecutionStrategyKind,
    pub asset: String,
    pub pair: String,
    pub user_id: String,
    pub number_of_executed_orders: usize,
    pub successful_orders: Vec<Order>,
    pub error: Option<ExecutionError>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_partial(&self) -> bool {
        self.error.is_some() && !self.successful_orders.is_empty()
    }

    pub fn external_order_ids(&self) -> Vec<String> {
        self.successful_orders
            .iter()
            .filter_map(|o| o.external_order_id.clone())
            .collect()
    }
}

/// API credentials for one user on one venue
#[derive(Clone)]
pub struct VenueCredentials {
    pub venue: Venue,
    pub api_key: String,
    pub secret_key: String,
    pub subaccount: Option<String>,
}

impl std::fmt::Debug for VenueCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueCredentials")
            .field("venue", &self.venue)
            .field("api_key", &"***")
            .field("secret_key", &"***")
            .field("subaccount", &self.subaccount)
            .finish()
    }
}

/// Quote-asset balance on a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueBalance {
    pub asset: String,
    pub total: Decimal,
    pub available_margin: Decimal,
}

/// Price tick and lot step a venue enforces for one symbol
///
/// A zero tick or step leaves the value unquantised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub tick_size: Decimal,
    pub step_size: Decimal,
}

impl SymbolFilters {
    /// Filters equivalent to fixed decimal places
    pub fn from_precision(price_decimals: u32, quantity_decimals: u32) -> Self {
        Self {
            tick_size: Decimal::new(1, price_decimals),
            step_size: Decimal::new(1, quantity_decimals),
        }
    }

    /// Nearest multiple of the tick
    pub fn round_price(&self, price: Decimal) -> Decimal {
        quantise(price, self.tick_size, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Largest step multiple not above `quantity`
    pub fn floor_quantity(&self, quantity: Decimal) -> Decimal {
        quantise(quantity, self.step_size, RoundingStrategy::ToZero)
    }

    /// Smallest step multiple not below `quantity`
    pub fn ceil_quantity(&self, quantity: Decimal) -> Decimal {
        quantise(quantity, self.step_size, RoundingStrategy::AwayFromZero)
    }
}

fn quantise(value: Decimal, increment: Decimal, strategy: RoundingStrategy) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }
    ((value / increment).round_dp_with_strategy(0, strategy) * increment).normalize()
}

/// Where a message came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelContext {
    pub channel_id: String,
    pub message_id: String,
}

/// Author of a trade call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorMetadata {
    pub id: String,
    pub username: String,
    pub actor_type: ActorType,
}

/// A participant request picked up from an opt-in source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptIn {
    pub user_id: String,
    pub risk_percent: Decimal,
    pub venue: Venue,
}
