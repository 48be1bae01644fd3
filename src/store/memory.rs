//! In-memory store for tests and dry runs

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ExecutionRecord, TradeStore};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{TradeStatus, TradeStrategy, TradeStrategyParticipant};

#[derive(Default)]
struct Tables {
    strategies: HashMap<Uuid, TradeStrategy>,
    by_idempotency_key: HashMap<String, Uuid>,
    participants: HashMap<(Uuid, String), TradeStrategyParticipant>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn participant_count(&self, trade_strategy_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .participants
            .keys()
            .filter(|(id, _)| *id == trade_strategy_id)
            .count()
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
impl TradeStore for MemoryStore {
    async fn create_trade_strategy(&self, strategy: TradeStrategy) -> Result<TradeStrategy> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .by_idempotency_key
            .get(&strategy.idempotency_key)
            .and_then(|id| tables.strategies.get(id))
        {
            return Ok(existing.clone());
        }
        tables
            .by_idempotency_key
            .insert(strategy.idempotency_key.clone(), strategy.id);
        tables.strategies.insert(strategy.id, strategy.clone());
        Ok(strategy)
    }

    async fn read_trade_strategy_by_id(&self, id: Uuid) -> Result<TradeStrategy> {
        self.tables
            .read()
            .await
            .strategies
            .get(&id)
            .cloned()
            .ok_or_else(|| strategy_not_found(id))
    }

    async fn read_trade_strategy_by_idempotency_key(&self, key: &str) -> Result<TradeStrategy> {
        let tables = self.tables.read().await;
        tables
            .by_idempotency_key
            .get(key)
            .and_then(|id| tables.strategies.get(id))
            .cloned()
            .ok_or_else(|| EngineError::not_found("store.trade_strategy_not_found").with("idempotency_key", key))
    }

    async fn update_trade_strategy_status(&self, id: Uuid, status: TradeStatus) -> Result<TradeStrategy> {
        let mut tables = self.tables.write().await;
        let strategy = tables.strategies.get_mut(&id).ok_or_else(|| strategy_not_found(id))?;
        if !strategy.status.can_transition_to(status) {
            return Err(EngineError::precondition("store.illegal_status_transition")
                .with("trade_strategy_id", id)
                .with("from", strategy.status)
                .with("to", status));
        }
        strategy.status = status;
        strategy.last_updated = Utc::now();
        Ok(strategy.clone())
    }

    async fn add_participant(&self, participant: TradeStrategyParticipant) -> Result<TradeStrategyParticipant> {
        let mut tables = self.tables.write().await;
        if !tables.strategies.contains_key(&participant.trade_strategy_id) {
            return Err(strategy_not_found(participant.trade_strategy_id));
        }
        let key = (participant.trade_strategy_id, participant.user_id.clone());
        if tables.participants.contains_key(&key) {
            return Err(EngineError::already_exists("store.participant_exists")
                .with("trade_strategy_id", participant.trade_strategy_id)
                .with("user_id", &participant.user_id));
        }
        tables.participants.insert(key, participant.clone());
        Ok(participant)
    }

    async fn read_participant(&self, trade_strategy_id: Uuid, user_id: &str) -> Result<TradeStrategyParticipant> {
        self.tables
            .read()
            .await
            .participants
            .get(&(trade_strategy_id, user_id.to_string()))
            .cloned()
            .ok_or_else(|| participant_not_found(trade_strategy_id, user_id))
    }

    async fn record_execution(
        &self,
        trade_strategy_id: Uuid,
        user_id: &str,
        record: ExecutionRecord,
    ) -> Result<TradeStrategyParticipant> {
        let mut tables = self.tables.write().await;
        let participant = tables
            .participants
            .get_mut(&(trade_strategy_id, user_id.to_string()))
            .ok_or_else(|| participant_not_found(trade_strategy_id, user_id))?;
        participant.size = record.size;
        participant.exchange_order_ids = record.exchange_order_ids;
        participant.executed = Some(record.executed);
        Ok(participant.clone())
    }

    async fn remove_unexecuted_participant(&self, trade_strategy_id: Uuid, user_id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let key = (trade_strategy_id, user_id.to_string());
        match tables.participants.get(&key) {
            Some(participant) if participant.executed.is_none() => {
                tables.participants.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::ErrorKind;
    use crate::common::types::{
        ActorType, ExecutionStrategyKind, InstrumentType, OrderType, TradeSide, TradeSignal, Venue,
    };
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn strategy(key: &str) -> TradeStrategy {
        TradeStrategy::new(
            TradeSignal {
                actor_id: "1".into(),
                humanized_actor_name: "CALLER".into(),
                actor_type: ActorType::External,
                instrument_type: InstrumentType::FuturePerpetual,
                side: TradeSide::Short,
                asset: "LINK".into(),
                pair: "USDT".into(),
                entries: vec![dec!(27.25), dec!(27)],
                stop_loss: dec!(27.66),
                take_profits: vec![],
                order_type: OrderType::Limit,
                execution_strategy: ExecutionStrategyKind::DcaAllLimit,
                reference_price: dec!(26),
                tradeable_venues: BTreeSet::from([Venue::Binance]),
            },
            key,
        )
    }

    #[tokio::test]
    async fn test_create_is_idempotent_on_key() {
        let store = MemoryStore::new();
        let first = store.create_trade_strategy(strategy("k1")).await.unwrap();
        let second = store.create_trade_strategy(strategy("k1")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.read_trade_strategy_by_idempotency_key("k1").await.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_duplicate_participant_rejected() {
        let store = MemoryStore::new();
        let s = store.create_trade_strategy(strategy("k1")).await.unwrap();
        let p = TradeStrategyParticipant::new(s.id, "u1", dec!(2), Venue::Binance);
        store.add_participant(p.clone()).await.unwrap();

        let err = store
            .add_participant(TradeStrategyParticipant::new(s.id, "u1", dec!(5), Venue::Binance))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::AlreadyExists));
        assert_eq!(store.participant_count(s.id).await, 1);
        assert_eq!(store.read_participant(s.id, "u1").await.unwrap().risk_percent, dec!(2));
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let store = MemoryStore::new();
        let s = store.create_trade_strategy(strategy("k1")).await.unwrap();

        let active = store.update_trade_strategy_status(s.id, TradeStatus::Active).await.unwrap();
        assert_eq!(active.status, TradeStatus::Active);
        assert!(active.last_updated >= s.last_updated);

        store.update_trade_strategy_status(s.id, TradeStatus::Closed).await.unwrap();
        let err = store
            .update_trade_strategy_status(s.id, TradeStatus::Active)
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::FailedPrecondition));
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let store = MemoryStore::new();
        assert!(store
            .read_trade_strategy_by_id(Uuid::new_v4())
            .await
            .unwrap_err()
            .is(ErrorKind::NotFound));
        let err = store
            .add_participant(TradeStrategyParticipant::new(Uuid::new_v4(), "u1", dec!(2), Venue::Binance))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_record_execution() {
        let store = MemoryStore::new();
        let s = store.create_trade_strategy(strategy("k1")).await.unwrap();
        store
            .add_participant(TradeStrategyParticipant::new(s.id, "u1", dec!(2), Venue::Binance))
            .await
            .unwrap();

        let executed = Utc::now();
        let p = store
            .record_execution(
                s.id,
                "u1",
                ExecutionRecord {
                    size: dec!(1500),
                    exchange_order_ids: vec!["1".into(), "2".into()],
                    executed,
                },
            )
            .await
            .unwrap();
        assert_eq!(p.size, dec!(1500));
        assert_eq!(p.executed, Some(executed));
        assert_eq!(p.exchange_order_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_only_unexecuted_participants_are_removed() {
        let store = MemoryStore::new();
        let s = store.create_trade_strategy(strategy("k1")).await.unwrap();
        for user_id in ["u1", "u2"] {
            store
                .add_participant(TradeStrategyParticipant::new(s.id, user_id, dec!(2), Venue::Binance))
                .await
                .unwrap();
        }
        store
            .record_execution(
                s.id,
                "u2",
                ExecutionRecord {
                    size: dec!(100),
                    exchange_order_ids: vec!["1".into()],
                    executed: Utc::now(),
                },
            )
            .await
            .unwrap();

        assert!(store.remove_unexecuted_participant(s.id, "u1").await.unwrap());
        assert!(!store.remove_unexecuted_participant(s.id, "u2").await.unwrap());
        assert!(!store.remove_unexecuted_participant(s.id, "u3").await.unwrap());
        assert_eq!(store.participant_count(s.id).await, 1);

        store
            .add_participant(TradeStrategyParticipant::new(s.id, "u1", dec!(3), Venue::Binance))
            .await
            .unwrap();
        assert_eq!(store.read_participant(s.id, "u1").await.unwrap().risk_percent, dec!(3));
    }
}
