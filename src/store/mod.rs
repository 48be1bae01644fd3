//! Persistence for trade strategies and their participants
//!
//! Both implementations enforce the same uniqueness rules: one strategy per
//! idempotency key and one participant per (strategy, user) pair. The
//! uniqueness check inside the store is authoritative; callers may pre-check
//! but must not rely on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::common::errors::Result;
use crate::common::types::{TradeStatus, TradeStrategy, TradeStrategyParticipant};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Outcome written to a participant row after execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub size: Decimal,
    pub exchange_order_ids: Vec<String>,
    pub executed: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert a strategy, or return the one already stored under the same
    /// idempotency key unchanged
    async fn create_trade_strategy(&self, strategy: TradeStrategy) -> Result<TradeStrategy>;

    async fn read_trade_strategy_by_id(&self, id: Uuid) -> Result<TradeStrategy>;

    async fn read_trade_strategy_by_idempotency_key(&self, key: &str) -> Result<TradeStrategy>;

    /// Move a strategy to `status`; illegal transitions are a precondition error
    async fn update_trade_strategy_status(&self, id: Uuid, status: TradeStatus) -> Result<TradeStrategy>;

    /// Insert a participant; a second row for the same pair is `AlreadyExists`
    async fn add_participant(&self, participant: TradeStrategyParticipant) -> Result<TradeStrategyParticipant>;

    async fn read_participant(&self, trade_strategy_id: Uuid, user_id: &str) -> Result<TradeStrategyParticipant>;

    async fn record_execution(
        &self,
        trade_strategy_id: Uuid,
        user_id: &str,
        record: ExecutionRecord,
    ) -> Result<TradeStrategyParticipant>;

    /// Delete a participant that never executed so the user can opt in
    /// again. Executed rows are kept. Returns whether a row was removed.
    async fn remove_unexecuted_participant(&self, trade_strategy_id: Uuid, user_id: &str) -> Result<bool>;
}
