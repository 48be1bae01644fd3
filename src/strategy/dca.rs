//! Laddered (DCA) executors

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::common::errors::Result;
use crate::common::types::{ExecutionResult, ExecutionStrategyKind, OrderKind, TradeStrategy};

use super::orders::{self, EntryLeg};
use super::sizer::size_positions;
use super::traits::{ExecutionContext, ExecutionRequest, StrategyExecutor};

const MIN_ENTRIES: usize = 2;

/// Spreads the entry range over a risk-weighted ladder
///
/// With `first_at_market` the rung nearest the reference price is filled
/// immediately and the rest rest as limits; otherwise every rung is a limit.
#[derive(Debug, Clone, Copy)]
pub struct DcaExecutor {
    first_at_market: bool,
}

impl DcaExecutor {
    pub fn first_market_rest_limit() -> Self {
        Self {
            first_at_market: true,
        }
    }

    pub fn all_limit() -> Self {
        Self {
            first_at_market: false,
        }
    }
}

#[async_trait]
impl StrategyExecutor for DcaExecutor {
    fn kind(&self) -> ExecutionStrategyKind {
        if self.first_at_market {
            ExecutionStrategyKind::DcaFirstMarketRestLimit
        } else {
            ExecutionStrategyKind::DcaAllLimit
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
        orders::validate_request(label, strategy, request, MIN_ENTRIES)?;

        let funding = orders::fund(strategy, request, ctx).await?;
        let signal = &strategy.signal;
        let rungs = ctx.limits.rung_count(funding.balance.total);

        let ladder = size_positions(
            &signal.entries,
            signal.stop_loss,
            request.risk_percent,
            rungs,
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

        let market_rung = self
            .first_at_market
            .then(|| orders::nearest_rung(&ladder, signal.reference_price));
        debug!(rungs, balance = %funding.balance.total, ?market_rung, "sized ladder");

        // The market rung goes first so it fills before the resting limits.
        let mut legs: Vec<EntryLeg> = ladder
            .iter()
            .zip(quantities)
            .enumerate()
            .map(|(i, (position, quantity))| EntryLeg {
                price: position.price,
                quantity,
                kind: if Some(i) == market_rung {
                    OrderKind::Market
                } else {
                    OrderKind::Limit
                },
            })
            .collect();
        if let Some(i) = market_rung {
            let market = legs.remove(i);
            legs.insert(0, market);
        }

        orders::execute_legs(self.kind(), strategy, request, ctx, &funding, legs)
            .await
            .map_err(|e| e.augment(label))
    }
}
