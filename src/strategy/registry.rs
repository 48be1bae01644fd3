//! Execution-strategy kind to executor lookup

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::common::errors::{EngineError, Result};
use crate::common::types::ExecutionStrategyKind;

use super::dca::DcaExecutor;
use super::dma::DmaExecutor;
use super::traits::SharedExecutor;

/// Immutable executor registry, built once at startup and shared by `Arc`
pub struct StrategyRegistry {
    executors: HashMap<ExecutionStrategyKind, SharedExecutor>,
}

#[derive(Default)]
pub struct StrategyRegistryBuilder {
    executors: HashMap<ExecutionStrategyKind, SharedExecutor>,
}

impl StrategyRegistryBuilder {
    /// Register an executor under its own kind; a second executor for the
    /// same kind is rejected.
    pub fn register(mut self, executor: SharedExecutor) -> Result<Self> {
        let kind = executor.kind();
        if self.executors.contains_key(&kind) {
            return Err(EngineError::already_exists("strategy_registry.duplicate_executor")
                .with("execution_strategy", kind));
        }
        info!(execution_strategy = %kind, "registered strategy executor");
        self.executors.insert(kind, executor);
        Ok(self)
    }

    pub fn build(self) -> StrategyRegistry {
        StrategyRegistry {
            executors: self.executors,
        }
    }
}

impl StrategyRegistry {
    pub fn builder() -> StrategyRegistryBuilder {
        StrategyRegistryBuilder::default()
    }

    /// Registry with every built-in executor
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::builder()
            .register(Arc::new(DcaExecutor::first_market_rest_limit()))?
            .register(Arc::new(DcaExecutor::all_limit()))?
            .register(Arc::new(DmaExecutor::limit()))?
            .register(Arc::new(DmaExecutor::market()))?
            .build())
    }

    pub fn get(&self, kind: ExecutionStrategyKind) -> Result<SharedExecutor> {
        self.executors.get(&kind).cloned().ok_or_else(|| {
            EngineError::unimplemented("strategy_registry.unknown_execution_strategy")
                .with("execution_strategy", kind)
        })
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::ErrorKind;

    #[test]
    fn test_defaults_cover_every_kind() {
        let registry = StrategyRegistry::with_defaults().unwrap();
        assert_eq!(registry.len(), 4);
        for kind in [
            ExecutionStrategyKind::DcaFirstMarketRestLimit,
            ExecutionStrategyKind::DcaAllLimit,
            ExecutionStrategyKind::DmaLimit,
            ExecutionStrategyKind::DmaMarket,
        ] {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let err = StrategyRegistry::builder()
            .register(Arc::new(DmaExecutor::market()))
            .unwrap()
            .register(Arc::new(DmaExecutor::market()))
            .err()
            .unwrap();
        assert!(err.is(ErrorKind::AlreadyExists));
        assert_eq!(err.reason(), "strategy_registry.duplicate_executor");
    }

    #[test]
    fn test_missing_executor_is_unimplemented() {
        let registry = StrategyRegistry::builder()
            .register(Arc::new(DmaExecutor::limit()))
            .unwrap()
            .build();
        let err = registry.get(ExecutionStrategyKind::DmaMarket).err().unwrap();
        assert!(err.is(ErrorKind::Unimplemented));
    }
}
