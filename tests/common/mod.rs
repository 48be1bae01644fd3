//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use signal_engine::account::ConfigAccountService;
use signal_engine::common::types::{ActorType, InstrumentType};
use signal_engine::config::types::{AccountConfig, ParserConfig};
use signal_engine::engine::LoggingNotifier;
use signal_engine::parser::AssetCatalogue;
use signal_engine::strategy::{ExecutionContext, ExecutionLimits};
use signal_engine::venue::PaperVenue;
use signal_engine::{
    AuthorMetadata, ChannelContext, EngineComponents, MemoryStore, OrderRouter, ParserRegistry,
    PriceSource, StrategyRegistry, TradeEngine, Venue,
};

/// Users with paper credentials on Binance
pub const USERS: &[&str] = &["alice", "bob", "carol"];

/// Sample trade calls
pub mod messages {
    pub const BTC_LONG: &str = "LONG BTC here. ENTRY: 50000 STOP: 49000 TP1: 52000 TP2: 54000 TP3: 58000";
    pub const LINK_SHORT_LIMIT: &str = "LINK LIMIT SHORT $27 - $27.25 SL $27.66";
    pub const BTC_DCA_LONG: &str = "long btc entry 51000 - 50000 stop 49000 tp 53000";
    pub const BTC_SPOT: &str = "btc spot long 50000 sl 49000 tp 52000";
}

/// Price source that always answers the same price
pub struct FixedPrice(pub Decimal);

#[async_trait]
impl PriceSource for FixedPrice {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn latest_price(&self, _asset: &str) -> signal_engine::Result<Decimal> {
        Ok(self.0)
    }
}

pub fn channel(message_id: &str) -> ChannelContext {
    ChannelContext {
        channel_id: "calls".to_string(),
        message_id: message_id.to_string(),
    }
}

pub fn author() -> AuthorMetadata {
    AuthorMetadata {
        id: "caller-1".to_string(),
        username: "caller".to_string(),
        actor_type: ActorType::External,
    }
}

/// Futures paper venue with `balance` as both total and available margin
pub fn paper_venue(balance: Decimal) -> PaperVenue {
    PaperVenue::new(Venue::Binance, InstrumentType::FuturePerpetual, balance, balance)
}

/// Engine over a memory store, one paper venue and a fixed reference price
pub struct Harness {
    pub engine: Arc<TradeEngine>,
    pub store: Arc<MemoryStore>,
    pub venue: Arc<PaperVenue>,
}

impl Harness {
    pub fn new(venue: PaperVenue, reference_price: Decimal) -> Self {
        let venue = Arc::new(venue);
        let store = Arc::new(MemoryStore::new());

        let accounts: Vec<AccountConfig> = USERS
            .iter()
            .map(|user| AccountConfig {
                user_id: user.to_string(),
                venue: Venue::Binance,
                api_key: format!("{}-key", user),
                secret_key: format!("{}-secret", user),
                subaccount: None,
            })
            .collect();

        let router = OrderRouter::builder()
            .register(venue.clone())
            .expect("Failed to register paper venue")
            .build();

        let engine = TradeEngine::new(EngineComponents {
            parsers: Arc::new(
                ParserRegistry::from_config(&ParserConfig::default()).expect("Failed to build parsers"),
            ),
            catalogue: Arc::new(AssetCatalogue::builtin()),
            prices: Arc::new(FixedPrice(reference_price)),
            parser_settings: ParserConfig::default(),
            store: store.clone(),
            strategies: Arc::new(StrategyRegistry::with_defaults().expect("Failed to build strategies")),
            execution: ExecutionContext {
                accounts: Arc::new(ConfigAccountService::new(&accounts)),
                router: Arc::new(router),
                notifier: Arc::new(LoggingNotifier),
                limits: ExecutionLimits::default(),
            },
            authorized_actors: Vec::new(),
        });

        Self {
            engine: Arc::new(engine),
            store,
            venue,
        }
    }

    /// Default harness: 10000 USDT balance, BTC at 50000
    pub fn btc() -> Self {
        Self::new(paper_venue(dec!(10000)), dec!(50000))
    }
}
