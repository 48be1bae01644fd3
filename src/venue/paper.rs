//! In-process venue for dry runs and tests
//!
//! Accepts every order with a generated id unless scripted to reject the
//! n-th one, and reports a fixed balance.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::common::errors::{EngineError, Result};
use crate::common::traits::VenueAdapter;
use crate::common::types::{
    InstrumentType, Order, PlacedOrder, SymbolFilters, Venue, VenueBalance, VenueCredentials,
};

pub struct PaperVenue {
    venue: Venue,
    instrument_type: InstrumentType,
    balance: VenueBalance,
    filters: SymbolFilters,
    /// 1-based index of the order to reject
    reject_at: Option<usize>,
    attempts: AtomicUsize,
    placed: Mutex<Vec<Order>>,
}

impl PaperVenue {
    pub fn new(venue: Venue, instrument_type: InstrumentType, total: Decimal, available_margin: Decimal) -> Self {
        Self {
            venue,
            instrument_type,
            balance: VenueBalance {
                asset: "USDT".to_string(),
                total,
                available_margin,
            },
            filters: SymbolFilters::from_precision(4, 3),
            reject_at: None,
            attempts: AtomicUsize::new(0),
            placed: Mutex::new(Vec::new()),
        }
    }

    /// Reject the `n`-th order placed (1-based)
    pub fn reject_at(mut self, n: usize) -> Self {
        self.reject_at = Some(n);
        self
    }

    /// Filters reported for every symbol
    pub fn with_filters(mut self, filters: SymbolFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Orders accepted so far, in placement order
    pub async fn placed_orders(&self) -> Vec<Order> {
        self.placed.lock().await.clone()
    }
}

#[async_trait]
impl VenueAdapter for PaperVenue {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn instrument_type(&self) -> InstrumentType {
        self.instrument_type
    }

    async fn place_order(&self, order: &Order, _credentials: &VenueCredentials) -> Result<PlacedOrder> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(attempt) == self.reject_at {
            return Err(EngineError::precondition("paper.order_rejected")
                .with("attempt", attempt)
                .with("symbol", order.symbol()));
        }

        let external_order_id = Uuid::new_v4().to_string();
        info!(
            venue = %self.venue,
            symbol = %order.symbol(),
            kind = %order.kind,
            side = %order.side,
            quantity = %order.quantity,
            price = ?order.price,
            stop_price = ?order.stop_price,
            external_order_id = %external_order_id,
            "paper order accepted"
        );
        self.placed.lock().await.push(order.clone());

        Ok(PlacedOrder {
            external_order_id,
            placed_at: Utc::now(),
        })
    }

    async fn read_balance(&self, _credentials: &VenueCredentials) -> Result<VenueBalance> {
        Ok(self.balance.clone())
    }

    async fn symbol_filters(&self, _symbol: &str) -> Result<SymbolFilters> {
        Ok(self.filters)
    }
}
