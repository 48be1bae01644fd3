use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::common::errors::Result;
use crate::common::traits::{AccountService, Notifier};
use crate::common::types::{ExecutionResult, ExecutionStrategyKind, TradeStrategy, Venue};
use crate::router::OrderRouter;
use crate::strategy::limits::ExecutionLimits;

/// One participant's request to execute a trade strategy
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    /// Who triggered the execution
    pub actor_id: String,
    pub user_id: String,
    pub venue: Venue,
    /// Percentage of the balance to put at risk, e.g. `2`
    pub risk_percent: Decimal,
}

/// Shared, read-only collaborators handed to every executor
#[derive(Clone)]
pub struct ExecutionContext {
    pub accounts: Arc<dyn AccountService>,
    pub router: Arc<OrderRouter>,
    pub notifier: Arc<dyn Notifier>,
    pub limits: ExecutionLimits,
}

/// An execution algorithm for a trade strategy
///
/// Executors turn a persisted strategy plus one participant's risk into an
/// ordered sequence of venue orders and place them strictly one after another.
///
/// # Implementation Notes
///
/// - Validation and guard-rail failures are returned as errors before any
///   order is placed
/// - A failure while placing orders is not an error: the result carries the
///   successful prefix and the first failed order
/// - The stop-loss is always placed first
#[async_trait]
pub trait StrategyExecutor: Send + Sync {
    /// The algorithm this executor implements
    fn kind(&self) -> ExecutionStrategyKind;

    /// Execute the strategy for one participant
    ///
    /// # Arguments
    /// * `strategy` - Persisted trade strategy, read-only
    /// * `request` - Participant, venue and risk
    /// * `ctx` - Accounts, router, notifier and limits
    async fn execute(
        &self,
        strategy: &TradeStrategy,
        request: &ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult>;
}

/// Shared executor for dynamic dispatch
pub type SharedExecutor = Arc<dyn StrategyExecutor>;
