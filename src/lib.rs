//! Signal Engine Library
//!
//! Turns free-text trade calls into risk-sized, multi-leg order sequences and
//! executes them on trading venues for many independent participants.

pub mod account;
pub mod common;
pub mod config;
pub mod engine;
pub mod parser;
pub mod router;
pub mod store;
pub mod strategy;
pub mod venue;

// Re-export commonly used types
pub use common::errors::{EngineError, ErrorKind, Result};
pub use common::traits::{
    AccountService, AssetSource, Notifier, ParticipantSource, PriceSource, VenueAdapter,
};
pub use common::types::{
    AuthorMetadata, ChannelContext, ExecutionResult, ExecutionStrategyKind, InstrumentType, OptIn,
    Order, OrderKind, TradeSide, TradeSignal, TradeStatus, TradeStrategy, TradeStrategyParticipant,
    Venue,
};
pub use config::types::AppConfig;
pub use engine::{EngineComponents, TradeEngine, WindowSupervisor};
pub use parser::{ParseError, ParserRegistry};
pub use router::OrderRouter;
pub use store::{MemoryStore, PostgresStore, TradeStore};
pub use strategy::{size_positions, StrategyRegistry};
