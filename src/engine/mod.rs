//! Trade engine service
//!
//! Composition root for the core operations: parsing trade calls, creating
//! strategies, adding participants and executing for them. Everything it
//! holds is immutable after construction and shared by `Arc`.

pub mod notify;
pub mod optins;
pub mod window;

use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::common::errors::{EngineError, Result};
use crate::common::traits::PriceSource;
use crate::common::types::{
    AuthorMetadata, ChannelContext, ExecutionResult, TradeSignal, TradeStatus, TradeStrategy,
    TradeStrategyParticipant, Venue,
};
use crate::config::types::ParserConfig;
use crate::parser::{AssetCatalogue, ParseEnv, ParseError, ParserRegistry};
use crate::store::{ExecutionRecord, TradeStore};
use crate::strategy::{ExecutionContext, ExecutionRequest, StrategyRegistry};

pub use notify::LoggingNotifier;
pub use optins::MemoryOptIns;
pub use window::{WindowClose, WindowSummary, WindowSupervisor, WindowTiming};

/// Collaborators the engine is assembled from
pub struct EngineComponents {
    pub parsers: Arc<ParserRegistry>,
    pub catalogue: Arc<AssetCatalogue>,
    pub prices: Arc<dyn PriceSource>,
    pub parser_settings: ParserConfig,
    pub store: Arc<dyn TradeStore>,
    pub strategies: Arc<StrategyRegistry>,
    pub execution: ExecutionContext,
    /// Actors allowed to execute on behalf of other users; empty allows anyone
    pub authorized_actors: Vec<String>,
}

pub struct TradeEngine {
    parsers: Arc<ParserRegistry>,
    catalogue: Arc<AssetCatalogue>,
    prices: Arc<dyn PriceSource>,
    parser_settings: ParserConfig,
    store: Arc<dyn TradeStore>,
    strategies: Arc<StrategyRegistry>,
    execution: ExecutionContext,
    authorized_actors: HashSet<String>,
}

impl TradeEngine {
    pub fn new(components: EngineComponents) -> Self {
        Self {
            parsers: components.parsers,
            catalogue: components.catalogue,
            prices: components.prices,
            parser_settings: components.parser_settings,
            store: components.store,
            strategies: components.strategies,
            execution: components.execution,
            authorized_actors: components.authorized_actors.into_iter().collect(),
        }
    }

    /// Turn a raw chat message into a trade signal
    ///
    /// # Arguments
    /// * `channel` - Source channel and message ids
    /// * `raw` - Message text as posted
    /// * `author` - Who posted it
    pub async fn parse_trade_signal(
        &self,
        channel: &ChannelContext,
        raw: &str,
        author: &AuthorMetadata,
    ) -> std::result::Result<TradeSignal, ParseError> {
        let env = ParseEnv {
            author,
            catalogue: &self.catalogue,
            prices: self.prices.as_ref(),
            settings: &self.parser_settings,
        };
        let signal = self.parsers.parse(channel, raw, &env).await?;
        info!(
            channel = %channel.channel_id,
            symbol = %signal.symbol(),
            side = %signal.side,
            execution_strategy = %signal.execution_strategy,
            "parsed trade signal"
        );
        Ok(signal)
    }

    /// Persist a signal; repeating the call with the same key returns the
    /// existing strategy unchanged
    #[instrument(skip(self, signal), fields(symbol = %signal.symbol()))]
    pub async fn create_trade_strategy(
        &self,
        signal: TradeSignal,
        idempotency_key: &str,
    ) -> Result<TradeStrategy> {
        if idempotency_key.is_empty() {
            return Err(EngineError::bad_param("engine.missing_idempotency_key"));
        }
        signal.validate().map_err(|e| e.augment("engine"))?;
        if self.strategies.get(signal.execution_strategy).is_err() {
            return Err(EngineError::unimplemented("engine.unsupported_execution_strategy")
                .with("execution_strategy", signal.execution_strategy));
        }

        let strategy = self
            .store
            .create_trade_strategy(TradeStrategy::new(signal, idempotency_key))
            .await?;
        info!(trade_strategy_id = %strategy.id, "trade strategy stored");
        Ok(strategy)
    }

    pub async fn read_trade_strategy_by_id(&self, id: Uuid) -> Result<TradeStrategy> {
        self.store.read_trade_strategy_by_id(id).await
    }

    #[instrument(skip(self))]
    pub async fn update_trade_strategy_status(&self, id: Uuid, status: TradeStatus) -> Result<TradeStrategy> {
        let strategy = self.store.update_trade_strategy_status(id, status).await?;
        info!(trade_strategy_id = %id, status = %status, "trade strategy status updated");
        Ok(strategy)
    }

    pub async fn read_participant(&self, trade_strategy_id: Uuid, user_id: &str) -> Result<TradeStrategyParticipant> {
        self.store.read_participant(trade_strategy_id, user_id).await
    }

    /// Register a user on a strategy without executing
    #[instrument(skip(self))]
    pub async fn add_participant_to_trade_strategy(
        &self,
        trade_strategy_id: Uuid,
        user_id: &str,
        risk_percent: Decimal,
        venue: Venue,
    ) -> Result<TradeStrategyParticipant> {
        validate_participant(user_id, risk_percent)?;
        let strategy = self.store.read_trade_strategy_by_id(trade_strategy_id).await?;
        ensure_open(&strategy)?;

        self.store
            .add_participant(TradeStrategyParticipant::new(trade_strategy_id, user_id, risk_percent, venue))
            .await
    }

    /// Add a participant and execute the strategy for them
    ///
    /// The participant row is inserted before any order is placed, so a
    /// concurrent duplicate request fails with `AlreadyExists` instead of
    /// executing twice. If execution fails before any order reaches the venue
    /// the row is removed again and the user may retry. Partial execution is
    /// reported in the result, not as an error.
    ///
    /// # Arguments
    /// * `actor_id` - Who asked for the execution
    /// * `user_id` - Participant whose account trades
    /// * `trade_strategy_id` - Strategy to execute
    /// * `risk_percent` - Percentage of the balance at risk
    /// * `venue` - Venue to trade on
    #[instrument(skip(self))]
    pub async fn execute_trade_strategy_for_participant(
        &self,
        actor_id: &str,
        user_id: &str,
        trade_strategy_id: Uuid,
        risk_percent: Decimal,
        venue: Venue,
    ) -> Result<ExecutionResult> {
        validate_participant(user_id, risk_percent)?;
        self.authorize(actor_id, user_id)?;

        let strategy = self.store.read_trade_strategy_by_id(trade_strategy_id).await?;
        ensure_open(&strategy)?;
        let executor = self.strategies.get(strategy.signal.execution_strategy)?;

        self.store
            .add_participant(TradeStrategyParticipant::new(trade_strategy_id, user_id, risk_percent, venue))
            .await?;

        let request = ExecutionRequest {
            actor_id: actor_id.to_string(),
            user_id: user_id.to_string(),
            venue,
            risk_percent,
        };
        let result = match executor.execute(&strategy, &request, &self.execution).await {
            Ok(result) => result,
            Err(e) => {
                error!(trade_strategy_id = %trade_strategy_id, user_id, error = %e, "execution failed");
                self.release_participant(trade_strategy_id, user_id).await;
                return Err(e.with("trade_strategy_id", trade_strategy_id));
            }
        };

        if result.successful_orders.is_empty() {
            self.release_participant(trade_strategy_id, user_id).await;
            self.report(&strategy, &result).await;
            return Ok(result);
        }

        self.store
            .record_execution(
                trade_strategy_id,
                user_id,
                ExecutionRecord {
                    size: result.notional_size,
                    exchange_order_ids: result.external_order_ids(),
                    executed: result.timestamp,
                },
            )
            .await?;

        if strategy.status == TradeStatus::Pending {
            if let Err(e) = self
                .store
                .update_trade_strategy_status(trade_strategy_id, TradeStatus::Active)
                .await
            {
                warn!(trade_strategy_id = %trade_strategy_id, error = %e, "failed to activate trade strategy");
            }
        }

        self.report(&strategy, &result).await;
        Ok(result)
    }

    /// Drop the participant row of an execution that placed nothing
    async fn release_participant(&self, trade_strategy_id: Uuid, user_id: &str) {
        match self.store.remove_unexecuted_participant(trade_strategy_id, user_id).await {
            Ok(removed) => debug!(trade_strategy_id = %trade_strategy_id, user_id, removed, "released participant"),
            Err(e) => error!(
                trade_strategy_id = %trade_strategy_id,
                user_id,
                error = %e,
                "failed to release participant"
            ),
        }
    }

    fn authorize(&self, actor_id: &str, user_id: &str) -> Result<()> {
        if actor_id == user_id || self.authorized_actors.is_empty() || self.authorized_actors.contains(actor_id) {
            return Ok(());
        }
        Err(EngineError::unauthenticated("engine.actor_not_authorized")
            .with("actor_id", actor_id)
            .with("user_id", user_id))
    }

    /// Tell the participant how execution went. Best effort.
    async fn report(&self, strategy: &TradeStrategy, result: &ExecutionResult) {
        let message = match &result.error {
            None => format!(
                "{} {} executed: {} orders placed, notional {}",
                strategy.signal.symbol(),
                strategy.signal.side,
                result.number_of_executed_orders,
                result.notional_size.round_dp(2)
            ),
            Some(failure) => format!(
                "{} {} stopped after {} orders ({} order failed: {})",
                strategy.signal.symbol(),
                strategy.signal.side,
                result.number_of_executed_orders,
                failure.failed_order.kind,
                failure.message
            ),
        };

        match &result.error {
            None => info!(
                trade_strategy_id = %strategy.id,
                user_id = %result.user_id,
                orders = result.number_of_executed_orders,
                "execution complete"
            ),
            Some(_) => warn!(
                trade_strategy_id = %strategy.id,
                user_id = %result.user_id,
                orders = result.number_of_executed_orders,
                "execution stopped early"
            ),
        }

        if let Err(e) = self.execution.notifier.notify_user(&result.user_id, &message).await {
            error!(user_id = %result.user_id, error = %e, "failed to notify user");
        }
    }
}

fn validate_participant(user_id: &str, risk_percent: Decimal) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(EngineError::bad_param("engine.missing_user_id"));
    }
    if risk_percent <= Decimal::ZERO || risk_percent > Decimal::ONE_HUNDRED {
        return Err(EngineError::bad_param("engine.invalid_risk_percent").with("risk_percent", risk_percent));
    }
    Ok(())
}

fn ensure_open(strategy: &TradeStrategy) -> Result<()> {
    if strategy.status == TradeStatus::Closed {
        return Err(EngineError::precondition("engine.trade_strategy_closed")
            .with("trade_strategy_id", strategy.id));
    }
    Ok(())
}
