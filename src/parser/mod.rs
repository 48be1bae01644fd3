//! Trade signal parsing
//!
//! Free-text trade calls are cleaned, scanned for a ticker and candidate
//! prices, and the candidates are assigned to stop-loss, entry and
//! take-profit roles. Parsers are grouped into per-channel fallback chains.
//!
//! ```text
//! raw text ─► clean_content ─► chain[0].parse ─┬─► TradeSignal
//!                              chain[1].parse ◄┘ (on failure)
//! ```

mod catalogue;
mod clean;
mod dca;
mod default;
mod keywords;
mod numeric;
mod price;
mod registry;
mod roles;
mod signal;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::common::errors::{EngineError, ErrorKind};
use crate::common::traits::PriceSource;
use crate::common::types::{AuthorMetadata, ChannelContext, TradeSignal};
use crate::config::types::ParserConfig;

pub use catalogue::{AssetCatalogue, AssetListing};
pub use clean::clean_content;
pub use dca::DcaParser;
pub use default::DefaultParser;
pub use keywords::{detect_instrument_type, detect_side};
pub use numeric::extract_numbers;
pub use price::FallbackPriceFetcher;
pub use registry::{ParserRegistry, ParserRegistryBuilder};
pub use roles::{assign_roles, infer_order_type, within_range, Roles};

/// Why a message could not be turned into a trade signal
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("message is empty after cleaning")]
    EmptyContent,

    #[error("no tradeable ticker found")]
    MissingTicker,

    #[error("no side found in message")]
    MissingSide,

    #[error("invalid number: {token}")]
    InvalidNumber { token: String },

    #[error("not enough values for {role}: found {found}")]
    NotEnoughValues { role: &'static str, found: usize },

    #[error("{parser} parser does not apply: {reason}")]
    NotApplicable { parser: &'static str, reason: String },

    #[error("entry {entry} is implausibly far from reference price {reference}")]
    EntryOutOfRange { entry: Decimal, reference: Decimal },

    #[error("stop loss {stop_loss} equals an entry")]
    StopLossEqualsEntry { stop_loss: Decimal },

    #[error("reference price unavailable for {asset}: {reason}")]
    PriceUnavailable { asset: String, reason: String },

    #[error("no parser registered for channel {channel}")]
    UnknownChannel { channel: String },
}

impl ParseError {
    /// Dotted machine-readable code
    pub fn reason(&self) -> String {
        match self {
            ParseError::EmptyContent => "parse.empty_content".to_string(),
            ParseError::MissingTicker => "parse.missing_ticker".to_string(),
            ParseError::MissingSide => "parse.missing_side".to_string(),
            ParseError::InvalidNumber { .. } => "parse.invalid_number".to_string(),
            ParseError::NotEnoughValues { role, .. } => format!("parse.missing_{}", role),
            ParseError::NotApplicable { parser, .. } => format!("parse.{}_not_applicable", parser),
            ParseError::EntryOutOfRange { .. } => "parse.entry_out_of_range".to_string(),
            ParseError::StopLossEqualsEntry { .. } => "parse.stop_loss_equals_entry".to_string(),
            ParseError::PriceUnavailable { .. } => "parse.price_unavailable".to_string(),
            ParseError::UnknownChannel { .. } => "parse.unknown_channel".to_string(),
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            ParseError::EmptyContent | ParseError::InvalidNumber { .. } => ErrorKind::BadParam,
            ParseError::PriceUnavailable { .. } => ErrorKind::Unavailable,
            _ => ErrorKind::FailedPrecondition,
        }
    }

    /// Chain-level declines are expected and not worth surfacing over a real failure
    pub fn is_decline(&self) -> bool {
        matches!(self, ParseError::NotApplicable { .. })
    }
}

impl From<ParseError> for EngineError {
    fn from(err: ParseError) -> Self {
        let engine = EngineError::new(err.kind(), err.reason());
        match &err {
            ParseError::InvalidNumber { token } => engine.with("token", token),
            ParseError::NotEnoughValues { found, .. } => engine.with("found", found),
            ParseError::NotApplicable { reason, .. } => engine.with("detail", reason),
            ParseError::EntryOutOfRange { entry, reference } => {
                engine.with("entry", entry).with("reference_price", reference)
            }
            ParseError::StopLossEqualsEntry { stop_loss } => engine.with("stop_loss", stop_loss),
            ParseError::PriceUnavailable { asset, reason } => {
                engine.with("asset", asset).with("detail", reason)
            }
            ParseError::UnknownChannel { channel } => engine.with("channel", channel),
            _ => engine,
        }
    }
}

/// Everything a parser needs besides the message text
pub struct ParseEnv<'a> {
    pub author: &'a AuthorMetadata,
    pub catalogue: &'a AssetCatalogue,
    pub prices: &'a dyn PriceSource,
    pub settings: &'a ParserConfig,
}

/// A single trade-call format
///
/// Parsers receive content that already went through [`clean_content`].
#[async_trait]
pub trait TradeParser: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &'static str;

    /// Parse cleaned content into a trade signal
    ///
    /// # Arguments
    /// * `content` - Cleaned, lower-cased message text
    /// * `env` - Author, asset catalogue, price source and settings
    async fn parse(&self, content: &str, env: &ParseEnv<'_>) -> Result<TradeSignal, ParseError>;
}

/// Stable key for a source message; edits of the same message map to the same key
pub fn idempotency_key(channel: &ChannelContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(channel.channel_id.as_bytes());
    hasher.update(b":");
    hasher.update(channel.message_id.as_bytes());
    hex::encode(hasher.finalize())
}
