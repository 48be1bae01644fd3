//! Order building and sequential placement shared by every executor

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::types::{
    ExecutionError, ExecutionResult, ExecutionStrategyKind, InstrumentType, Order, OrderKind,
    Position, SymbolFilters, TimeInForce, TradeStrategy, TradeStatus, VenueBalance,
    VenueCredentials, WorkingType,
};

use super::traits::{ExecutionContext, ExecutionRequest};

/// Credentials, balance and symbol filters read for one execution
pub(crate) struct Funding {
    pub credentials: VenueCredentials,
    pub balance: VenueBalance,
    pub filters: SymbolFilters,
}

/// An entry rung with its order kind and quantity
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EntryLeg {
    pub price: Decimal,
    pub quantity: Decimal,
    pub kind: OrderKind,
}

/// Reject requests that can never be executed
pub(crate) fn validate_request(
    label: &str,
    strategy: &TradeStrategy,
    request: &ExecutionRequest,
    min_entries: usize,
) -> Result<()> {
    let signal = &strategy.signal;
    if signal.entries.len() < min_entries {
        return Err(EngineError::precondition(format!("{}.not_enough_entries", label))
            .with("trade_strategy_id", strategy.id)
            .with("entries", signal.entries.len()));
    }
    if request.risk_percent <= Decimal::ZERO {
        return Err(EngineError::precondition(format!("{}.participant_nil_risk", label))
            .with("user_id", &request.user_id));
    }
    if !signal.tradeable_venues.is_empty() && !signal.tradeable_venues.contains(&request.venue) {
        return Err(EngineError::precondition(format!("{}.venue_not_tradeable", label))
            .with("venue", request.venue)
            .with("asset", &signal.asset));
    }
    if strategy.status == TradeStatus::Closed {
        return Err(EngineError::precondition(format!("{}.trade_strategy_closed", label))
            .with("trade_strategy_id", strategy.id));
    }
    signal.validate()
}

/// Read credentials, the live balance and the symbol's filters through the router
pub(crate) async fn fund(
    strategy: &TradeStrategy,
    request: &ExecutionRequest,
    ctx: &ExecutionContext,
) -> Result<Funding> {
    let credentials = ctx
        .accounts
        .read_credentials(&request.user_id, request.venue)
        .await?;
    let balance = ctx
        .router
        .read_balance(request.venue, strategy.signal.instrument_type, &credentials)
        .await?;
    let filters = ctx
        .router
        .symbol_filters(request.venue, strategy.signal.instrument_type, &strategy.signal.symbol())
        .await?;
    Ok(Funding {
        credentials,
        balance,
        filters,
    })
}

/// Quantity per rung so that hitting the stop loses `balance * coefficient`
///
/// Rungs are rounded down to the lot step; a rung that rounds to nothing is a
/// precondition failure.
pub(crate) fn rung_quantities(
    balance: Decimal,
    ladder: &[Position],
    stop_loss: Decimal,
    filters: &SymbolFilters,
) -> Result<Vec<Decimal>> {
    ladder
        .iter()
        .map(|p| {
            let distance = (p.price - stop_loss).abs();
            if distance.is_zero() {
                return Err(EngineError::precondition("rung_equals_stop_loss").with("price", p.price));
            }
            let quantity = filters.floor_quantity(balance * p.risk_coefficient / distance);
            if quantity.is_zero() {
                return Err(EngineError::precondition("quantity_below_lot_step")
                    .with("price", p.price)
                    .with("balance", balance)
                    .with("step_size", filters.step_size));
            }
            Ok(quantity)
        })
        .collect()
}

/// Sum of rung quantities rounded up to the lot step
pub(crate) fn total_quantity(quantities: &[Decimal], filters: &SymbolFilters) -> Decimal {
    filters.ceil_quantity(quantities.iter().copied().sum())
}

pub(crate) fn notional(legs: &[EntryLeg]) -> Decimal {
    legs.iter().map(|l| l.price * l.quantity).sum()
}

/// Index of the rung whose price is nearest the reference price
pub(crate) fn nearest_rung(ladder: &[Position], reference: Decimal) -> usize {
    ladder
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| (p.price - reference).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn base_order(strategy: &TradeStrategy, request: &ExecutionRequest, kind: OrderKind) -> Order {
    let signal = &strategy.signal;
    Order {
        venue: request.venue,
        instrument_type: signal.instrument_type,
        asset: signal.asset.clone(),
        pair: signal.pair.clone(),
        kind,
        side: signal.side.entry_side(),
        price: None,
        stop_price: None,
        quantity: Decimal::ZERO,
        reduce_only: false,
        working_type: None,
        time_in_force: None,
        created: Utc::now(),
        external_order_id: None,
    }
}

/// Stop-loss, entries, then take-profits, in placement order
///
/// Every price is snapped to the symbol's tick. Spot instruments carry no
/// reduce-only stop; the caller warns the participant.
pub(crate) fn build_orders(
    strategy: &TradeStrategy,
    request: &ExecutionRequest,
    legs: &[EntryLeg],
    total: Decimal,
    filters: &SymbolFilters,
) -> Vec<Order> {
    let signal = &strategy.signal;
    let exit_side = signal.side.exit_side();
    let mut orders = Vec::with_capacity(legs.len() + signal.take_profits.len() + 1);

    if has_stop_loss_order(strategy) {
        let mut stop = base_order(strategy, request, OrderKind::StopMarket);
        stop.side = exit_side;
        stop.stop_price = Some(filters.round_price(signal.stop_loss));
        stop.quantity = total;
        stop.reduce_only = true;
        stop.working_type = Some(WorkingType::MarkPrice);
        orders.push(stop);
    }

    for leg in legs {
        let mut entry = base_order(strategy, request, leg.kind);
        entry.quantity = leg.quantity;
        if leg.kind == OrderKind::Limit {
            entry.price = Some(filters.round_price(leg.price));
            entry.time_in_force = Some(TimeInForce::Gtc);
        }
        orders.push(entry);
    }

    for (price, quantity) in split_take_profits(total, &signal.take_profits, filters) {
        let mut tp = base_order(strategy, request, OrderKind::TakeProfitMarket);
        tp.side = exit_side;
        tp.stop_price = Some(filters.round_price(price));
        tp.quantity = quantity;
        tp.reduce_only = true;
        tp.working_type = Some(WorkingType::MarkPrice);
        orders.push(tp);
    }

    orders
}

pub(crate) fn has_stop_loss_order(strategy: &TradeStrategy) -> bool {
    strategy.signal.instrument_type != InstrumentType::Spot
}

/// Even split of the total across take-profits; the last absorbs rounding
fn split_take_profits(
    total: Decimal,
    take_profits: &[Decimal],
    filters: &SymbolFilters,
) -> Vec<(Decimal, Decimal)> {
    if take_profits.is_empty() {
        return Vec::new();
    }
    let share = filters.floor_quantity(total / Decimal::from(take_profits.len()));
    let mut remaining = total;

    take_profits
        .iter()
        .enumerate()
        .map(|(i, price)| {
            let quantity = if i == take_profits.len() - 1 { remaining } else { share };
            remaining -= quantity;
            (*price, quantity)
        })
        .filter(|(_, quantity)| !quantity.is_zero())
        .collect()
}

/// Warn a participant that no stop-loss will protect the position. Best effort.
pub(crate) async fn warn_missing_stop_loss(
    strategy: &TradeStrategy,
    request: &ExecutionRequest,
    ctx: &ExecutionContext,
) {
    warn!(
        trade_strategy_id = %strategy.id,
        user_id = %request.user_id,
        "executing without a stop loss"
    );
    let message = format!(
        "[{}] {} is being placed without a stop loss",
        strategy.signal.execution_strategy,
        strategy.signal.symbol()
    );
    if let Err(e) = ctx.notifier.notify_user(&request.user_id, &message).await {
        error!(user_id = %request.user_id, error = %e, "failed to notify user");
    }
}

/// Place orders one at a time, stopping at the first failure
pub(crate) async fn place_sequentially(
    orders: Vec<Order>,
    strategy: &TradeStrategy,
    funding: &Funding,
    ctx: &ExecutionContext,
) -> (Vec<Order>, Option<ExecutionError>) {
    let mut placed = Vec::with_capacity(orders.len());

    for mut order in orders {
        match ctx
            .router
            .route(&order, order.venue, strategy.signal.instrument_type, &funding.credentials)
            .await
        {
            Ok(ack) => {
                info!(
                    venue = %order.venue,
                    symbol = %order.symbol(),
                    kind = %order.kind,
                    external_order_id = %ack.external_order_id,
                    "order placed"
                );
                order.external_order_id = Some(ack.external_order_id);
                placed.push(order);
            }
            Err(e) => {
                error!(
                    venue = %order.venue,
                    symbol = %order.symbol(),
                    kind = %order.kind,
                    placed = placed.len(),
                    error = %e,
                    "failed to place order, stopping sequence"
                );
                let failure = ExecutionError {
                    message: e.user_message().to_string(),
                    failed_order: order,
                };
                return (placed, Some(failure));
            }
        }
    }

    (placed, None)
}

/// Guard rails, order building and sequential placement for sized entry legs
pub(crate) async fn execute_legs(
    kind: ExecutionStrategyKind,
    strategy: &TradeStrategy,
    request: &ExecutionRequest,
    ctx: &ExecutionContext,
    funding: &Funding,
    legs: Vec<EntryLeg>,
) -> Result<ExecutionResult> {
    let limits = &ctx.limits;
    let quantities: Vec<Decimal> = legs.iter().map(|l| l.quantity).collect();
    let total = total_quantity(&quantities, &funding.filters);
    let notional_size = notional(&legs);

    limits.check_risk_appetite(notional_size, funding.balance.total)?;
    limits.check_margin(&funding.balance)?;

    let orders = build_orders(strategy, request, &legs, total, &funding.filters);
    if !has_stop_loss_order(strategy) {
        warn_missing_stop_loss(strategy, request, ctx).await;
    }

    info!(
        trade_strategy_id = %strategy.id,
        user_id = %request.user_id,
        execution_strategy = %kind,
        orders = orders.len(),
        total_quantity = %total,
        notional = %notional_size,
        "placing orders"
    );
    let (placed, error) = place_sequentially(orders, strategy, funding, ctx).await;

    Ok(execution_result(kind, strategy, request, notional_size, placed, error))
}

pub(crate) fn execution_result(
    kind: ExecutionStrategyKind,
    strategy: &TradeStrategy,
    request: &ExecutionRequest,
    notional_size: Decimal,
    successful_orders: Vec<Order>,
    error: Option<ExecutionError>,
) -> ExecutionResult {
    ExecutionResult {
        notional_size,
        venue: request.venue,
        execution_strategy: kind,
        asset: strategy.signal.asset.clone(),
        pair: strategy.signal.pair.clone(),
        user_id: request.user_id.clone(),
        number_of_executed_orders: successful_orders.len(),
        successful_orders,
        error,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn three_decimals() -> SymbolFilters {
        SymbolFilters::from_precision(4, 3)
    }

    #[test]
    fn test_rung_quantities_risk_per_rung() {
        let ladder = vec![
            Position { price: dec!(100), risk_coefficient: dec!(0.03) },
            Position { price: dec!(200), risk_coefficient: dec!(0.01) },
        ];
        let quantities = rung_quantities(dec!(1000), &ladder, dec!(80), &three_decimals()).unwrap();
        // 1000 * 0.03 / 20 and 1000 * 0.01 / 120
        assert_eq!(quantities, vec![dec!(1.5), dec!(0.083)]);
        assert_eq!(total_quantity(&quantities, &three_decimals()), dec!(1.583));
        assert_eq!(total_quantity(&[dec!(0.0831), dec!(1)], &three_decimals()), dec!(1.084));
    }

    #[test]
    fn test_quantity_below_lot_step_rejected() {
        let ladder = vec![Position { price: dec!(50000), risk_coefficient: dec!(0.0001) }];
        let err = rung_quantities(dec!(100), &ladder, dec!(10000), &three_decimals()).unwrap_err();
        assert_eq!(err.reason(), "quantity_below_lot_step");
    }

    #[test]
    fn test_take_profit_split_absorbs_rounding() {
        let split = split_take_profits(dec!(1), &[dec!(52000), dec!(54000), dec!(58000)], &three_decimals());
        let quantities: Vec<Decimal> = split.iter().map(|(_, q)| *q).collect();
        assert_eq!(quantities, vec![dec!(0.333), dec!(0.333), dec!(0.334)]);
        assert!(split_take_profits(dec!(1), &[], &three_decimals()).is_empty());
    }

    #[test]
    fn test_whole_lot_symbols_round_to_units() {
        let whole_lots = SymbolFilters {
            tick_size: dec!(0.0001),
            step_size: dec!(1),
        };
        let ladder = vec![Position { price: dec!(0.5), risk_coefficient: dec!(0.02) }];
        // 10000 * 0.02 / 0.05 = 4000 exactly; 10000 * 0.02 / 0.07 = 2857.14..
        assert_eq!(rung_quantities(dec!(10000), &ladder, dec!(0.45), &whole_lots).unwrap(), vec![dec!(4000)]);
        assert_eq!(rung_quantities(dec!(10000), &ladder, dec!(0.43), &whole_lots).unwrap(), vec![dec!(2857)]);

        let split = split_take_profits(dec!(10), &[dec!(0.6), dec!(0.7), dec!(0.8)], &whole_lots);
        let quantities: Vec<Decimal> = split.iter().map(|(_, q)| *q).collect();
        assert_eq!(quantities, vec![dec!(3), dec!(3), dec!(4)]);
    }

    #[test]
    fn test_nearest_rung() {
        let ladder = vec![
            Position { price: dec!(50000), risk_coefficient: dec!(0.01) },
            Position { price: dec!(50500), risk_coefficient: dec!(0.01) },
            Position { price: dec!(51000), risk_coefficient: dec!(0.01) },
        ];
        assert_eq!(nearest_rung(&ladder, dec!(50600)), 1);
        assert_eq!(nearest_rung(&ladder, dec!(49000)), 0);
    }
}
