//! Direct market access executors: one entry order

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::common::errors::Result;
use crate::common::types::{ExecutionResult, ExecutionStrategyKind, OrderKind, TradeStrategy};

use super::orders::{self, EntryLeg};
use super::sizer::size_positions;
use super::traits::{ExecutionContext, ExecutionRequest, StrategyExecutor};

#[derive(Debug, Clone, Copy)]
pub struct DmaExecutor {
    at_market: bool,
}

impl DmaExecutor {
    pub fn limit() -> Self {
        Self { at_market: false }
    }

    pub fn market() -> Self {
        Self { at_market: true }
    }
}

#[async_trait]
impl StrategyExecutor for DmaExecutor {
    fn kind(&self) -> ExecutionStrategyKind {
        if self.at_market {
            ExecutionStrategyKind::DmaMarket
        } else {
            ExecutionStrategyKind::DmaLimit
        }
    }

    #[instrument(skip(self, strategy, ctx), fields(trade_strategy_id = %strategy.id, kind = %self.kind()))]
    async fn execute(
        &self,
        strategy: &TradeStrategy,
        request: &ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult> {
        let label = self.kind().as_str();
        orders::validate_request(label, strategy, request, 1)?;

        let funding = orders::fund(strategy, request, ctx).await?;
        let signal = &strategy.signal;

        let ladder = size_positions(
            &signal.entries,
            signal.stop_loss,
            request.risk_percent,
            1,
            signal.side,
        )
        .map_err(|e| e.augment(label))?;
        let quantities = orders::rung_quantities(
            funding.balance.total,
            &ladder,
            signal.stop_loss,
            &funding.filters,
        )
        .map_err(|e| e.augment(label))?;

        let kind = if self.at_market {
            OrderKind::Market
        } else {
            OrderKind::Limit
        };
        let legs: Vec<EntryLeg> = ladder
            .iter()
            .zip(quantities)
            .map(|(position, quantity)| EntryLeg {
                price: position.price,
                quantity,
                kind,
            })
            .collect();
        debug!(balance = %funding.balance.total, ?legs, "sized single entry");

        orders::execute_legs(self.kind(), strategy, request, ctx, &funding, legs)
            .await
            .map_err(|e| e.augment(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::{EngineError, ErrorKind};
    use crate::common::traits::MockNotifier;
    use crate::common::types::{InstrumentType, TimeInForce};
    use crate::strategy::test_support::{adapter, balance, context, request, strategy};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_market_entry_full_budget() {
        let ctx = context(
            adapter(InstrumentType::FuturePerpetual, balance(dec!(10000), dec!(5000)), None),
            MockNotifier::new(),
        );
        let strategy = strategy(
            ExecutionStrategyKind::DmaMarket,
            InstrumentType::FuturePerpetual,
            vec![dec!(50000)],
        );

        let result = DmaExecutor::market()
            .execute(&strategy, &request(dec!(2)), &ctx)
            .await
            .unwrap();

        // 10000 * 0.02 / (50000 - 49000)
        let kinds: Vec<OrderKind> = result.successful_orders.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OrderKind::StopMarket,
                OrderKind::Market,
                OrderKind::TakeProfitMarket,
                OrderKind::TakeProfitMarket,
                OrderKind::TakeProfitMarket,
            ]
        );
        assert_eq!(result.successful_orders[1].quantity, dec!(0.2));
        assert_eq!(result.notional_size, dec!(10000));
        assert_eq!(result.execution_strategy, ExecutionStrategyKind::DmaMarket);
    }

    #[tokio::test]
    async fn test_spot_skips_stop_and_warns_best_effort() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify_user()
            .times(1)
            .returning(|_, _| Err(EngineError::unavailable("notifier.down")));
        let ctx = context(
            adapter(InstrumentType::Spot, balance(dec!(10000), dec!(5000)), None),
            notifier,
        );
        let strategy = strategy(ExecutionStrategyKind::DmaLimit, InstrumentType::Spot, vec![dec!(50000)]);

        let result = DmaExecutor::limit()
            .execute(&strategy, &request(dec!(2)), &ctx)
            .await
            .unwrap();

        assert!(result.error.is_none());
        assert_eq!(result.number_of_executed_orders, 4);
        let entry = &result.successful_orders[0];
        assert_eq!(entry.kind, OrderKind::Limit);
        assert_eq!(entry.time_in_force, Some(TimeInForce::Gtc));
        assert_eq!(entry.price, Some(dec!(50000)));
    }

    #[tokio::test]
    async fn test_over_risk_appetite() {
        let ctx = context(
            adapter(InstrumentType::FuturePerpetual, balance(dec!(1000), dec!(1000)), None),
            MockNotifier::new(),
        );
        let strategy = strategy(
            ExecutionStrategyKind::DmaMarket,
            InstrumentType::FuturePerpetual,
            vec![dec!(50000)],
        );

        let err = DmaExecutor::market()
            .execute(&strategy, &request(dec!(100)), &ctx)
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::FailedPrecondition));
        assert_eq!(err.reason(), "dma_market.over_risk_appetite");
    }

    #[tokio::test]
    async fn test_first_order_failure_places_nothing() {
        let ctx = context(
            adapter(InstrumentType::FuturePerpetual, balance(dec!(10000), dec!(5000)), Some(1)),
            MockNotifier::new(),
        );
        let strategy = strategy(
            ExecutionStrategyKind::DmaLimit,
            InstrumentType::FuturePerpetual,
            vec![dec!(50000)],
        );

        let result = DmaExecutor::limit()
            .execute(&strategy, &request(dec!(2)), &ctx)
            .await
            .unwrap();
        assert_eq!(result.number_of_executed_orders, 0);
        assert!(!result.is_partial());
        assert_eq!(result.error.unwrap().failed_order.kind, OrderKind::StopMarket);
    }
}
