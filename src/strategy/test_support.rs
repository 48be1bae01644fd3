//! Fixtures shared by executor tests

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::errors::EngineError;
use crate::common::traits::{MockAccountService, MockNotifier, MockVenueAdapter};
use crate::common::types::{
    ActorType, ExecutionStrategyKind, InstrumentType, OrderType, PlacedOrder, SymbolFilters,
    TradeSide, TradeSignal, TradeStrategy, Venue, VenueBalance, VenueCredentials,
};
use crate::router::OrderRouter;

use super::limits::ExecutionLimits;
use super::traits::{ExecutionContext, ExecutionRequest};

pub fn strategy(
    kind: ExecutionStrategyKind,
    instrument_type: InstrumentType,
    entries: Vec<Decimal>,
) -> TradeStrategy {
    let signal = TradeSignal {
        actor_id: "caller-1".into(),
        humanized_actor_name: "CALLER".into(),
        actor_type: ActorType::External,
        instrument_type,
        side: TradeSide::Long,
        asset: "BTC".into(),
        pair: "USDT".into(),
        entries,
        stop_loss: dec!(49000),
        take_profits: vec![dec!(52000), dec!(54000), dec!(58000)],
        order_type: if kind == ExecutionStrategyKind::DmaMarket {
            OrderType::Market
        } else {
            OrderType::Limit
        },
        execution_strategy: kind,
        reference_price: dec!(50600),
        tradeable_venues: BTreeSet::from([Venue::Binance]),
    };
    TradeStrategy::new(signal, "channel:message")
}

pub fn request(risk_percent: Decimal) -> ExecutionRequest {
    ExecutionRequest {
        actor_id: "caller-1".into(),
        user_id: "user-1".into(),
        venue: Venue::Binance,
        risk_percent,
    }
}

pub fn balance(total: Decimal, available_margin: Decimal) -> VenueBalance {
    VenueBalance {
        asset: "USDT".into(),
        total,
        available_margin,
    }
}

/// Adapter whose `fail_at`-th order (1-based) is rejected
pub fn adapter(
    instrument_type: InstrumentType,
    balance: VenueBalance,
    fail_at: Option<usize>,
) -> MockVenueAdapter {
    adapter_with_filters(instrument_type, balance, fail_at, SymbolFilters::from_precision(4, 3))
}

pub fn adapter_with_filters(
    instrument_type: InstrumentType,
    balance: VenueBalance,
    fail_at: Option<usize>,
    filters: SymbolFilters,
) -> MockVenueAdapter {
    let placed = Arc::new(AtomicUsize::new(0));
    let mut adapter = MockVenueAdapter::new();
    adapter.expect_venue().return_const(Venue::Binance);
    adapter.expect_instrument_type().return_const(instrument_type);
    adapter
        .expect_read_balance()
        .returning(move |_| Ok(balance.clone()));
    adapter
        .expect_symbol_filters()
        .returning(move |_| Ok(filters));
    adapter.expect_place_order().returning(move |_, _| {
        let n = placed.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(n) == fail_at {
            return Err(EngineError::precondition("binance.order_rejected").with("code", -2019));
        }
        Ok(PlacedOrder {
            external_order_id: format!("order-{}", n),
            placed_at: Utc::now(),
        })
    });
    adapter
}

pub fn context(adapter: MockVenueAdapter, notifier: MockNotifier) -> ExecutionContext {
    let mut accounts = MockAccountService::new();
    accounts.expect_read_credentials().returning(|_, venue| {
        Ok(VenueCredentials {
            venue,
            api_key: "key".into(),
            secret_key: "secret".into(),
            subaccount: None,
        })
    });
    let router = OrderRouter::builder()
        .register(Arc::new(adapter))
        .expect("register adapter")
        .build();

    ExecutionContext {
        accounts: Arc::new(accounts),
        router: Arc::new(router),
        notifier: Arc::new(notifier),
        limits: ExecutionLimits::default(),
    }
}
