//! In-process opt-in queue

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::common::errors::Result;
use crate::common::traits::ParticipantSource;
use crate::common::types::OptIn;

/// Opt-ins stay pending until acknowledged
#[derive(Default)]
pub struct MemoryOptIns {
    pending: RwLock<HashMap<Uuid, Vec<OptIn>>>,
}

impl MemoryOptIns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an opt-in; a repeat from the same user replaces the pending one
    pub async fn push(&self, trade_strategy_id: Uuid, opt_in: OptIn) {
        let mut pending = self.pending.write().await;
        let queue = pending.entry(trade_strategy_id).or_default();
        queue.retain(|o| o.user_id != opt_in.user_id);
        queue.push(opt_in);
    }

    pub async fn pending_count(&self, trade_strategy_id: Uuid) -> usize {
        self.pending
            .read()
            .await
            .get(&trade_strategy_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl ParticipantSource for MemoryOptIns {
    async fn poll_opt_ins(&self, trade_strategy_id: Uuid) -> Result<Vec<OptIn>> {
        Ok(self
            .pending
            .read()
            .await
            .get(&trade_strategy_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn acknowledge(&self, trade_strategy_id: Uuid, user_id: &str) -> Result<()> {
        if let Some(queue) = self.pending.write().await.get_mut(&trade_strategy_id) {
            queue.retain(|o| o.user_id != user_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Venue;
    use rust_decimal_macros::dec;

    fn opt_in(user_id: &str) -> OptIn {
        OptIn {
            user_id: user_id.into(),
            risk_percent: dec!(2),
            venue: Venue::Binance,
        }
    }

    #[tokio::test]
    async fn test_pending_until_acknowledged() {
        let source = MemoryOptIns::new();
        let id = Uuid::new_v4();
        source.push(id, opt_in("u1")).await;
        source.push(id, opt_in("u2")).await;
        source.push(id, opt_in("u1")).await;

        assert_eq!(source.poll_opt_ins(id).await.unwrap().len(), 2);
        assert_eq!(source.poll_opt_ins(id).await.unwrap().len(), 2);

        source.acknowledge(id, "u1").await.unwrap();
        let remaining = source.poll_opt_ins(id).await.unwrap();
        assert_eq!(remaining, vec![opt_in("u2")]);
        assert_eq!(source.pending_count(Uuid::new_v4()).await, 0);
    }
}
