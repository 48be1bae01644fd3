//! Order routing to venue adapters

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::common::errors::{EngineError, Result};
use crate::common::retry::ReadRetry;
use crate::common::traits::VenueAdapter;
use crate::common::types::{
    InstrumentType, Order, PlacedOrder, SymbolFilters, Venue, VenueBalance, VenueCredentials,
};

type AdapterKey = (Venue, InstrumentType);

/// Dispatches orders and balance reads to the adapter registered for a
/// (venue, instrument type) pair. Immutable once built.
pub struct OrderRouter {
    adapters: HashMap<AdapterKey, Arc<dyn VenueAdapter>>,
    read_retry: ReadRetry,
}

#[derive(Default)]
pub struct OrderRouterBuilder {
    adapters: HashMap<AdapterKey, Arc<dyn VenueAdapter>>,
    read_retry: ReadRetry,
}

impl OrderRouterBuilder {
    /// Register an adapter under its own venue and instrument type
    pub fn register(mut self, adapter: Arc<dyn VenueAdapter>) -> Result<Self> {
        let key = (adapter.venue(), adapter.instrument_type());
        if self.adapters.contains_key(&key) {
            return Err(EngineError::already_exists("order_router.duplicate_adapter")
                .with("venue", key.0)
                .with("instrument_type", key.1));
        }
        info!(venue = %key.0, instrument_type = %key.1, "registered venue adapter");
        self.adapters.insert(key, adapter);
        Ok(self)
    }

    pub fn read_retry(mut self, retry: ReadRetry) -> Self {
        self.read_retry = retry;
        self
    }

    pub fn build(self) -> OrderRouter {
        OrderRouter {
            adapters: self.adapters,
            read_retry: self.read_retry,
        }
    }
}

impl OrderRouter {
    pub fn builder() -> OrderRouterBuilder {
        OrderRouterBuilder::default()
    }

    pub fn supports(&self, venue: Venue, instrument_type: InstrumentType) -> bool {
        self.adapters.contains_key(&(venue, instrument_type))
    }

    fn adapter(&self, venue: Venue, instrument_type: InstrumentType) -> Result<&Arc<dyn VenueAdapter>> {
        self.adapters.get(&(venue, instrument_type)).ok_or_else(|| {
            EngineError::unimplemented("order_router.unsupported_venue")
                .with("venue", venue)
                .with("instrument_type", instrument_type)
        })
    }

    /// Place one order. Never retried.
    ///
    /// # Arguments
    /// * `order` - Order to place; its venue must match `venue`
    /// * `venue` - Target venue
    /// * `instrument_type` - Spot or perpetual
    /// * `credentials` - Participant credentials for the venue
    #[instrument(skip(self, order, credentials), fields(symbol = %order.symbol(), kind = %order.kind))]
    pub async fn route(
        &self,
        order: &Order,
        venue: Venue,
        instrument_type: InstrumentType,
        credentials: &VenueCredentials,
    ) -> Result<PlacedOrder> {
        if order.venue != venue || credentials.venue != venue {
            return Err(EngineError::bad_param("order_router.venue_mismatch")
                .with("venue", venue)
                .with("order_venue", order.venue)
                .with("credentials_venue", credentials.venue));
        }
        let adapter = self.adapter(venue, instrument_type)?;
        adapter.place_order(order, credentials).await
    }

    /// Read the participant's quote balance, retrying transient failures
    #[instrument(skip(self, credentials))]
    pub async fn read_balance(
        &self,
        venue: Venue,
        instrument_type: InstrumentType,
        credentials: &VenueCredentials,
    ) -> Result<VenueBalance> {
        let adapter = self.adapter(venue, instrument_type)?;
        self.read_retry
            .run("read_balance", || adapter.read_balance(credentials))
            .await
    }

    /// Read the symbol's price tick and lot step, retrying transient failures
    #[instrument(skip(self))]
    pub async fn symbol_filters(
        &self,
        venue: Venue,
        instrument_type: InstrumentType,
        symbol: &str,
    ) -> Result<SymbolFilters> {
        let adapter = self.adapter(venue, instrument_type)?;
        self.read_retry
            .run("symbol_filters", || adapter.symbol_filters(symbol))
            .await
    }
}
