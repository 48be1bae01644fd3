//! Postgres-backed store
//!
//! Uniqueness is enforced by the schema: `idempotency_key` on strategies and
//! `(trade_strategy_id, user_id)` on participants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{ExecutionRecord, TradeStore};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{TradeSignal, TradeStatus, TradeStrategy, TradeStrategyParticipant, Venue};
use crate::config::types::DatabaseConfig;

const STRATEGY_COLUMNS: &str = "id, idempotency_key, actor_id, humanized_actor_name, actor_type, \
    instrument_type, side, asset, pair, entries, stop_loss, take_profits, order_type, \
    execution_strategy, reference_price, tradeable_venues, status, created, last_updated";

const PARTICIPANT_COLUMNS: &str = "id, trade_strategy_id, user_id, is_bot, risk_percent, venue, size, \
    exchange_order_ids, executed, created";

#[derive(Debug, FromRow)]
struct StrategyRow {
    id: Uuid,
    idempotency_key: String,
    actor_id: String,
    humanized_actor_name: String,
    actor_type: String,
    instrument_type: String,
    side: String,
    asset: String,
    pair: String,
    entries: Json<Vec<Decimal>>,
    stop_loss: Decimal,
    take_profits: Json<Vec<Decimal>>,
    order_type: String,
    execution_strategy: String,
    reference_price: Decimal,
    tradeable_venues: Json<BTreeSet<Venue>>,
    status: String,
    created: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl StrategyRow {
    fn into_domain(self) -> Result<TradeStrategy> {
        Ok(TradeStrategy {
            id: self.id,
            idempotency_key: self.idempotency_key,
            signal: TradeSignal {
                actor_id: self.actor_id,
                humanized_actor_name: self.humanized_actor_name,
                actor_type: self.actor_type.parse()?,
                instrument_type: self.instrument_type.parse()?,
                side: self.side.parse()?,
                asset: self.asset,
                pair: self.pair,
                entries: self.entries.0,
                stop_loss: self.stop_loss,
                take_profits: self.take_profits.0,
                order_type: self.order_type.parse()?,
                execution_strategy: self.execution_strategy.parse()?,
                reference_price: self.reference_price,
                tradeable_venues: self.tradeable_venues.0,
            },
            status: self.status.parse()?,
            created: self.created,
            last_updated: self.last_updated,
        })
    }
}

#[derive(Debug, FromRow)]
struct ParticipantRow {
    id: Uuid,
    trade_strategy_id: Uuid,
    user_id: String,
    is_bot: bool,
    risk_percent: Decimal,
    venue: String,
    size: Decimal,
    exchange_order_ids: Json<Vec<String>>,
    executed: Option<DateTime<Utc>>,
    created: DateTime<Utc>,
}

impl ParticipantRow {
    fn into_domain(self) -> Result<TradeStrategyParticipant> {
        Ok(TradeStrategyParticipant {
            id: self.id,
            trade_strategy_id: self.trade_strategy_id,
            user_id: self.user_id,
            is_bot: self.is_bot,
            risk_percent: self.risk_percent,
            venue: self.venue.parse()?,
            size: self.size,
            exchange_order_ids: self.exchange_order_ids.0,
            executed: self.executed,
            created: self.created,
        })
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and run migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect(&config.url)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(max_connections = config.max_connections, "connected to trade store");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_strategies (
                id UUID PRIMARY KEY,
                idempotency_key TEXT NOT NULL UNIQUE,
                actor_id TEXT NOT NULL,
                humanized_actor_name TEXT NOT NULL,
                actor_type TEXT NOT NULL,
                instrument_type TEXT NOT NULL,
                side TEXT NOT NULL,
                asset TEXT NOT NULL,
                pair TEXT NOT NULL,
                entries JSONB NOT NULL,
                stop_loss NUMERIC NOT NULL,
                take_profits JSONB NOT NULL,
                order_type TEXT NOT NULL,
                execution_strategy TEXT NOT NULL,
                reference_price NUMERIC NOT NULL,
                tradeable_venues JSONB NOT NULL,
                status TEXT NOT NULL,
                created TIMESTAMPTZ NOT NULL,
                last_updated TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_strategy_participants (
                id UUID PRIMARY KEY,
                trade_strategy_id UUID NOT NULL REFERENCES trade_strategies(id),
                user_id TEXT NOT NULL,
                is_bot BOOLEAN NOT NULL DEFAULT FALSE,
                risk_percent NUMERIC NOT NULL,
                venue TEXT NOT NULL,
                size NUMERIC NOT NULL DEFAULT 0,
                exchange_order_ids JSONB NOT NULL DEFAULT '[]',
                executed TIMESTAMPTZ,
                created TIMESTAMPTZ NOT NULL,
                UNIQUE (trade_strategy_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("trade store migrations applied");
        Ok(())
    }

    async fn fetch_strategy(&self, id: Uuid) -> Result<Option<TradeStrategy>> {
        let sql = format!("SELECT {} FROM trade_strategies WHERE id = $1", STRATEGY_COLUMNS);
        sqlx::query_as::<_, StrategyRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(StrategyRow::into_domain)
            .transpose()
    }
}

fn strategy_not_found(id: Uuid) -> EngineError {
    EngineError::not_found("store.trade_strategy_not_found").with("trade_strategy_id", id)
}

fn participant_not_found(trade_strategy_id: Uuid, user_id: &str) -> EngineError {
    EngineError::not_found("store.participant_not_found")
        .with("trade_strategy_id", trade_strategy_id)
        .with("user_id", user_id)
}

#[async_trait]
impl TradeStore for PostgresStore {
    #[instrument(skip(self, strategy), fields(idempotency_key = %strategy.idempotency_key))]
    async fn create_trade_strategy(&self, strategy: TradeStrategy) -> Result<TradeStrategy> {
        let sql = format!(
            "INSERT INTO trade_strategies ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) \
             ON CONFLICT (idempotency_key) DO NOTHING \
             RETURNING {}",
            STRATEGY_COLUMNS, STRATEGY_COLUMNS
        );
        let signal = &strategy.signal;
        let inserted = sqlx::query_as::<_, StrategyRow>(&sql)
            .bind(strategy.id)
            .bind(&strategy.idempotency_key)
            .bind(&signal.actor_id)
            .bind(&signal.humanized_actor_name)
            .bind(signal.actor_type.as_str())
            .bind(signal.instrument_type.as_str())
            .bind(signal.side.as_str())
            .bind(&signal.asset)
            .bind(&signal.pair)
            .bind(Json(&signal.entries))
            .bind(signal.stop_loss)
            .bind(Json(&signal.take_profits))
            .bind(signal.order_type.as_str())
            .bind(signal.execution_strategy.as_str())
            .bind(signal.reference_price)
            .bind(Json(&signal.tradeable_venues))
            .bind(strategy.status.as_str())
            .bind(strategy.created)
            .bind(strategy.last_updated)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(row) => row.into_domain(),
            None => {
                debug!("idempotency key already stored, returning existing strategy");
                self.read_trade_strategy_by_idempotency_key(&strategy.idempotency_key)
                    .await
            }
        }
    }

    #[instrument(skip(self))]
    async fn read_trade_strategy_by_id(&self, id: Uuid) -> Result<TradeStrategy> {
        self.fetch_strategy(id).await?.ok_or_else(|| strategy_not_found(id))
    }

    #[instrument(skip(self))]
    async fn read_trade_strategy_by_idempotency_key(&self, key: &str) -> Result<TradeStrategy> {
        let sql = format!(
            "SELECT {} FROM trade_strategies WHERE idempotency_key = $1",
            STRATEGY_COLUMNS
        );
        sqlx::query_as::<_, StrategyRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("store.trade_strategy_not_found").with("idempotency_key", key))?
            .into_domain()
    }

    #[instrument(skip(self))]
    async fn update_trade_strategy_status(&self, id: Uuid, status: TradeStatus) -> Result<TradeStrategy> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM trade_strategies WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current: TradeStatus = current.ok_or_else(|| strategy_not_found(id))?.0.parse()?;
        if !current.can_transition_to(status) {
            return Err(EngineError::precondition("store.illegal_status_transition")
                .with("trade_strategy_id", id)
                .with("from", current)
                .with("to", status));
        }

        let sql = format!(
            "UPDATE trade_strategies SET status = $2, last_updated = $3 WHERE id = $1 RETURNING {}",
            STRATEGY_COLUMNS
        );
        let row = sqlx::query_as::<_, StrategyRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        row.into_domain()
    }

    #[instrument(skip(self, participant), fields(trade_strategy_id = %participant.trade_strategy_id, user_id = %participant.user_id))]
    async fn add_participant(&self, participant: TradeStrategyParticipant) -> Result<TradeStrategyParticipant> {
        if self.fetch_strategy(participant.trade_strategy_id).await?.is_none() {
            return Err(strategy_not_found(participant.trade_strategy_id));
        }

        let sql = format!(
            "INSERT INTO trade_strategy_participants ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {}",
            PARTICIPANT_COLUMNS, PARTICIPANT_COLUMNS
        );
        let row = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(participant.id)
            .bind(participant.trade_strategy_id)
            .bind(&participant.user_id)
            .bind(participant.is_bot)
            .bind(participant.risk_percent)
            .bind(participant.venue.as_str())
            .bind(participant.size)
            .bind(Json(&participant.exchange_order_ids))
            .bind(participant.executed)
            .bind(participant.created)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                EngineError::from(e)
                    .with("trade_strategy_id", participant.trade_strategy_id)
                    .with("user_id", &participant.user_id)
            })?;
        row.into_domain()
    }

    #[instrument(skip(self))]
    async fn read_participant(&self, trade_strategy_id: Uuid, user_id: &str) -> Result<TradeStrategyParticipant> {
        let sql = format!(
            "SELECT {} FROM trade_strategy_participants WHERE trade_strategy_id = $1 AND user_id = $2",
            PARTICIPANT_COLUMNS
        );
        sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(trade_strategy_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| participant_not_found(trade_strategy_id, user_id))?
            .into_domain()
    }

    #[instrument(skip(self, record))]
    async fn record_execution(
        &self,
        trade_strategy_id: Uuid,
        user_id: &str,
        record: ExecutionRecord,
    ) -> Result<TradeStrategyParticipant> {
        let sql = format!(
            "UPDATE trade_strategy_participants \
             SET size = $3, exchange_order_ids = $4, executed = $5 \
             WHERE trade_strategy_id = $1 AND user_id = $2 \
             RETURNING {}",
            PARTICIPANT_COLUMNS
        );
        sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(trade_strategy_id)
            .bind(user_id)
            .bind(record.size)
            .bind(Json(&record.exchange_order_ids))
            .bind(record.executed)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| participant_not_found(trade_strategy_id, user_id))?
            .into_domain()
    }

    #[instrument(skip(self))]
    async fn remove_unexecuted_participant(&self, trade_strategy_id: Uuid, user_id: &str) -> Result<bool> {
        let removed = sqlx::query(
            "DELETE FROM trade_strategy_participants \
             WHERE trade_strategy_id = $1 AND user_id = $2 AND executed IS NULL",
        )
        .bind(trade_strategy_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(removed.rows_affected() > 0)
    }
}
