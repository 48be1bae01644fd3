//! Two-entry laddered trade calls

use async_trait::async_trait;

use crate::common::types::TradeSignal;

use super::keywords::{contains_keyword, find_stop_loss_mark};
use super::numeric::extract_numbers;
use super::signal::build_signal;
use super::{ParseEnv, ParseError, TradeParser};

/// Parses calls with an entry range, e.g. `long btc entry 51000-50000 stop 49000`
///
/// The text before the first stop-loss marker must hold two prices or the
/// word `dca`; otherwise the parser declines so the chain can move on.
#[derive(Debug, Default, Clone, Copy)]
pub struct DcaParser;

impl DcaParser {
    const ENTRY_COUNT: usize = 2;
}

#[async_trait]
impl TradeParser for DcaParser {
    fn name(&self) -> &'static str {
        "dca"
    }

    async fn parse(&self, content: &str, env: &ParseEnv<'_>) -> Result<TradeSignal, ParseError> {
        let listing = env.catalogue.detect(content).ok_or(ParseError::MissingTicker)?;

        let entries_segment = match find_stop_loss_mark(content) {
            Some(idx) => &content[..idx],
            None => content,
        };

        if !contains_keyword(entries_segment, "dca") {
            let entries = extract_numbers(entries_segment)?;
            if entries.len() < Self::ENTRY_COUNT {
                return Err(ParseError::NotApplicable {
                    parser: self.name(),
                    reason: format!("found {} entries before the stop loss", entries.len()),
                });
            }
        }

        let values = extract_numbers(content)?;
        build_signal(self.name(), content, listing, values, Self::ENTRY_COUNT, env).await
    }
}
