//! Single-entry trade calls

use async_trait::async_trait;

use crate::common::types::TradeSignal;

use super::numeric::extract_numbers;
use super::signal::build_signal;
use super::{ParseEnv, ParseError, TradeParser};

/// Parses calls with one entry, a stop-loss and optional take-profits,
/// e.g. `btc short 46650 sl 47801 tp 45800 44540`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultParser;

#[async_trait]
impl TradeParser for DefaultParser {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn parse(&self, content: &str, env: &ParseEnv<'_>) -> Result<TradeSignal, ParseError> {
        let listing = env.catalogue.detect(content).ok_or(ParseError::MissingTicker)?;
        let values = extract_numbers(content)?;
        build_signal(self.name(), content, listing, values, 1, env).await
    }
}
