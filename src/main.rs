//! Signal Engine - Main Entry Point
//!
//! Parses a trade call, stores it as a trade strategy and executes it for
//! participants, either against Binance or an in-process paper venue.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use signal_engine::account::ConfigAccountService;
use signal_engine::common::retry::ReadRetry;
use signal_engine::common::types::{ActorType, InstrumentType, OptIn};
use signal_engine::config::types::{AccountConfig, AppConfig};
use signal_engine::config::load_config;
use signal_engine::engine::{LoggingNotifier, MemoryOptIns, WindowTiming};
use signal_engine::parser::{idempotency_key, AssetCatalogue, FallbackPriceFetcher};
use signal_engine::strategy::{ExecutionContext, ExecutionLimits};
use signal_engine::venue::{BinanceFuturesAdapter, BinancePriceSource, CoinGeckoPriceSource, PaperVenue};
use signal_engine::{
    AuthorMetadata, ChannelContext, EngineComponents, MemoryStore, OrderRouter, ParserRegistry,
    PostgresStore, PriceSource, StrategyRegistry, TradeEngine, TradeStore, Venue, VenueAdapter,
    WindowSupervisor,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "SIGNAL_ENGINE_CONFIG", default_value = "config.toml")]
    config: String,

    /// Log filter; overrides the configured level (e.g. `signal_engine=debug`)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Trade against an in-process paper venue instead of Binance
    #[arg(long)]
    dry_run: bool,

    /// Paper venue balance in USDT
    #[arg(long, default_value = "10000")]
    paper_balance: Decimal,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a trade call and print the signal
    Parse(MessageArgs),
    /// Parse a trade call and store it as a trade strategy
    Create(MessageArgs),
    /// Execute a stored trade strategy for one participant
    Execute {
        #[arg(long)]
        strategy_id: Uuid,
        #[arg(long)]
        user: String,
        /// Defaults to the participant
        #[arg(long)]
        actor: Option<String>,
        /// Percentage of the balance at risk
        #[arg(long)]
        risk: Decimal,
        #[arg(long, default_value = "binance")]
        venue: Venue,
    },
    /// Store a trade call and run a participation window over opt-ins read from a JSON file
    Window {
        #[command(flatten)]
        message: MessageArgs,
        /// JSON array of `{ "user_id", "risk_percent", "venue" }`
        #[arg(long)]
        opt_ins: String,
    },
}

#[derive(Args, Debug)]
struct MessageArgs {
    #[arg(long, default_value = "cli")]
    channel: String,
    #[arg(long)]
    message_id: String,
    #[arg(long, default_value = "cli")]
    author: String,
    /// Raw message text
    text: String,
}

impl MessageArgs {
    fn channel(&self) -> ChannelContext {
        ChannelContext {
            channel_id: self.channel.clone(),
            message_id: self.message_id.clone(),
        }
    }

    fn author(&self) -> AuthorMetadata {
        AuthorMetadata {
            id: self.author.clone(),
            username: self.author.clone(),
            actor_type: ActorType::External,
        }
    }
}

fn init_logging(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_new(filter).context("invalid log filter")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!(e))
}

fn price_source(config: &AppConfig, catalogue: &AssetCatalogue) -> Result<Arc<dyn PriceSource>> {
    let timeout = Duration::from_secs(config.price.request_timeout_seconds);
    let primary = BinancePriceSource::new(&config.price.binance_url, &config.parser.quote_asset, timeout)?;
    let fallback = CoinGeckoPriceSource::new(&config.price.aggregator_url, catalogue.aggregator_ids(), timeout)?;

    Ok(Arc::new(FallbackPriceFetcher::new(
        Arc::new(primary),
        Some(Arc::new(fallback)),
        config.price.max_retries,
        Duration::from_millis(config.price.initial_backoff_ms),
    )))
}

fn read_retry(config: &AppConfig) -> ReadRetry {
    ReadRetry::new(
        config.price.max_retries,
        Duration::from_millis(config.price.initial_backoff_ms),
    )
}

async fn catalogue(config: &AppConfig, binance: &BinanceFuturesAdapter) -> AssetCatalogue {
    if !config.parser.load_venue_assets {
        return AssetCatalogue::from_config(&config.parser.assets);
    }
    AssetCatalogue::load(&config.parser, Venue::Binance, binance, &read_retry(config)).await
}

fn router(
    config: &AppConfig,
    binance: Arc<BinanceFuturesAdapter>,
    dry_run: bool,
    paper_balance: Decimal,
) -> Result<OrderRouter> {
    let adapter: Arc<dyn VenueAdapter> = if dry_run {
        Arc::new(PaperVenue::new(
            Venue::Binance,
            InstrumentType::FuturePerpetual,
            paper_balance,
            paper_balance,
        ))
    } else {
        binance
    };

    Ok(OrderRouter::builder()
        .register(adapter)?
        .read_retry(read_retry(config))
        .build())
}

async fn store(config: &AppConfig) -> Result<Arc<dyn TradeStore>> {
    match &config.database {
        Some(database) => Ok(Arc::new(PostgresStore::connect(database).await?)),
        None => {
            info!("no database configured, using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Paper accounts for users that have none configured
fn paper_accounts(accounts: &mut Vec<AccountConfig>, users: &[(String, Venue)]) {
    for (user_id, venue) in users {
        if !accounts.iter().any(|a| &a.user_id == user_id && a.venue == *venue) {
            accounts.push(AccountConfig {
                user_id: user_id.clone(),
                venue: *venue,
                api_key: "paper".to_string(),
                secret_key: "paper".to_string(),
                subaccount: None,
            });
        }
    }
}

async fn build_engine(config: &AppConfig, cli: &Cli, users: &[(String, Venue)]) -> Result<TradeEngine> {
    let binance = Arc::new(BinanceFuturesAdapter::new(&config.venues.binance)?);
    let catalogue = catalogue(config, &binance).await;
    let prices = price_source(config, &catalogue)?;

    let mut accounts = config.accounts.clone();
    if cli.dry_run {
        paper_accounts(&mut accounts, users);
    }
    let accounts = ConfigAccountService::new(&accounts);
    info!(accounts = accounts.len(), dry_run = cli.dry_run, "account service ready");

    Ok(TradeEngine::new(EngineComponents {
        parsers: Arc::new(ParserRegistry::from_config(&config.parser)?),
        catalogue: Arc::new(catalogue),
        prices,
        parser_settings: config.parser.clone(),
        store: store(config).await?,
        strategies: Arc::new(StrategyRegistry::with_defaults()?),
        execution: ExecutionContext {
            accounts: Arc::new(accounts),
            router: Arc::new(router(config, binance, cli.dry_run, cli.paper_balance)?),
            notifier: Arc::new(LoggingNotifier),
            limits: ExecutionLimits::from(&config.engine),
        },
        authorized_actors: config.engine.authorized_actors.clone(),
    }))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(Some(&cli.config))?;

    let filter = cli.log_level.clone().unwrap_or_else(|| config.settings.log_level.clone());
    init_logging(&filter, cli.json_logs || config.settings.json_logs)?;

    info!("Starting signal engine");
    info!(config = %cli.config, dry_run = cli.dry_run, "configuration loaded");

    match &cli.command {
        Command::Parse(message) => {
            let engine = build_engine(&config, &cli, &[]).await?;
            let signal = engine
                .parse_trade_signal(&message.channel(), &message.text, &message.author())
                .await?;
            print_json(&signal)?;
        }
        Command::Create(message) => {
            let engine = build_engine(&config, &cli, &[]).await?;
            let channel = message.channel();
            let signal = engine
                .parse_trade_signal(&channel, &message.text, &message.author())
                .await?;
            let strategy = engine.create_trade_strategy(signal, &idempotency_key(&channel)).await?;
            print_json(&strategy)?;
        }
        Command::Execute {
            strategy_id,
            user,
            actor,
            risk,
            venue,
        } => {
            let engine = build_engine(&config, &cli, &[(user.clone(), *venue)]).await?;
            let actor = actor.as_deref().unwrap_or(user);
            let result = engine
                .execute_trade_strategy_for_participant(actor, user, *strategy_id, *risk, *venue)
                .await?;
            print_json(&result)?;
        }
        Command::Window { message, opt_ins } => {
            let raw = std::fs::read_to_string(opt_ins).with_context(|| format!("reading {}", opt_ins))?;
            let opt_ins: Vec<OptIn> = serde_json::from_str(&raw).context("parsing opt-ins")?;
            let users: Vec<(String, Venue)> = opt_ins.iter().map(|o| (o.user_id.clone(), o.venue)).collect();

            let engine = Arc::new(build_engine(&config, &cli, &users).await?);
            let channel = message.channel();
            let signal = engine
                .parse_trade_signal(&channel, &message.text, &message.author())
                .await?;
            let strategy = engine.create_trade_strategy(signal, &idempotency_key(&channel)).await?;

            let source = Arc::new(MemoryOptIns::new());
            for opt_in in opt_ins {
                source.push(strategy.id, opt_in).await;
            }

            let supervisor = WindowSupervisor::new(
                engine,
                source,
                Arc::new(LoggingNotifier),
                WindowTiming::from(&config.window),
            );
            let supervisor = Arc::new(supervisor);
            supervisor.open(strategy.id, &channel.channel_id).await?;

            let canceller = supervisor.clone();
            let trade_strategy_id = strategy.id;
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received shutdown signal, closing window...");
                    if let Err(e) = canceller.cancel(trade_strategy_id).await {
                        warn!(error = %e, "window already closed");
                    }
                }
            });

            let summary = supervisor.join(strategy.id).await?;
            print_json(&summary)?;
        }
    }

    Ok(())
}
