//! Trait definitions for external collaborators
//!
//! Everything the engine talks to across a process boundary sits behind one of
//! these traits so executors and the engine can be exercised with mocks.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::errors::Result;
use super::types::{
    InstrumentType, OptIn, Order, PlacedOrder, SymbolFilters, Venue, VenueBalance,
    VenueCredentials,
};

/// Looks up venue credentials for a user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Read the API credentials a user registered for a venue
    ///
    /// # Arguments
    /// * `user_id` - Participant identifier
    /// * `venue` - Venue the credentials are for
    async fn read_credentials(&self, user_id: &str, venue: Venue) -> Result<VenueCredentials>;
}

/// Adapter for one (venue, instrument type) pair
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    fn instrument_type(&self) -> InstrumentType;

    /// Submit a single order. Never retried by callers.
    async fn place_order(&self, order: &Order, credentials: &VenueCredentials) -> Result<PlacedOrder>;

    /// Read the quote-asset balance
    async fn read_balance(&self, credentials: &VenueCredentials) -> Result<VenueBalance>;

    /// Price tick and lot step for a symbol such as `BTCUSDT`
    async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters>;
}

/// Lists the base assets a venue currently trades
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Upper-case base assets with a live market against `quote_asset`
    async fn tradeable_assets(&self, quote_asset: &str) -> Result<Vec<String>>;
}

/// Best-effort user and channel notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, user_id: &str, message: &str) -> Result<()>;

    async fn notify_channel(&self, channel_id: &str, message: &str) -> Result<()>;
}

/// Latest traded price for an asset, quoted in USDT
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// # Arguments
    /// * `asset` - Base asset ticker, e.g. `BTC`
    async fn latest_price(&self, asset: &str) -> Result<Decimal>;
}

/// Source of participant opt-ins for an open trade strategy
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParticipantSource: Send + Sync {
    /// Opt-ins not yet acknowledged
    async fn poll_opt_ins(&self, trade_strategy_id: Uuid) -> Result<Vec<OptIn>>;

    /// Mark an opt-in as handled so it is not returned again
    async fn acknowledge(&self, trade_strategy_id: Uuid, user_id: &str) -> Result<()>;
}
