//! Per-channel parser chains

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::common::errors::{EngineError, Result};
use crate::common::types::{ChannelContext, TradeSignal};
use crate::config::types::{ParserConfig, ParserKind};

use super::clean::clean_content;
use super::{DcaParser, DefaultParser, ParseEnv, ParseError, TradeParser};

type ParserChain = Vec<Arc<dyn TradeParser>>;

/// Immutable map of channel id to an ordered parser chain
pub struct ParserRegistry {
    chains: HashMap<String, ParserChain>,
    fallback: Option<ParserChain>,
}

/// Builder for [`ParserRegistry`]; registering a channel twice is an error
#[derive(Default)]
pub struct ParserRegistryBuilder {
    chains: HashMap<String, ParserChain>,
    fallback: Option<ParserChain>,
}

impl ParserRegistryBuilder {
    pub fn register(mut self, channel: impl Into<String>, chain: ParserChain) -> Result<Self> {
        let channel = channel.into();
        if chain.is_empty() {
            return Err(EngineError::bad_param("parser_registry.empty_chain").with("channel", channel));
        }
        if self.chains.contains_key(&channel) {
            return Err(
                EngineError::already_exists("parser_registry.duplicate_channel").with("channel", channel)
            );
        }
        info!(channel = %channel, parsers = chain.len(), "registered parser chain");
        self.chains.insert(channel, chain);
        Ok(self)
    }

    /// Chain used for channels with no explicit registration
    pub fn fallback(mut self, chain: ParserChain) -> Self {
        self.fallback = Some(chain);
        self
    }

    pub fn build(self) -> ParserRegistry {
        ParserRegistry {
            chains: self.chains,
            fallback: self.fallback,
        }
    }
}

fn chain_from_kinds(kinds: &[ParserKind]) -> ParserChain {
    kinds
        .iter()
        .map(|kind| -> Arc<dyn TradeParser> {
            match kind {
                ParserKind::Dca => Arc::new(DcaParser),
                ParserKind::Default => Arc::new(DefaultParser),
            }
        })
        .collect()
}

impl ParserRegistry {
    pub fn builder() -> ParserRegistryBuilder {
        ParserRegistryBuilder::default()
    }

    /// Build chains from configuration
    pub fn from_config(config: &ParserConfig) -> Result<Self> {
        let mut builder = Self::builder().fallback(chain_from_kinds(&config.default_chain));
        for (channel, kinds) in &config.channels {
            builder = builder.register(channel.clone(), chain_from_kinds(kinds))?;
        }
        Ok(builder.build())
    }

    fn chain_for(&self, channel: &str) -> Option<&ParserChain> {
        self.chains.get(channel).or(self.fallback.as_ref())
    }

    /// Clean the raw text and try each parser of the channel's chain in order
    ///
    /// The first success wins. When every parser fails the last real failure
    /// is returned, preferring it over a parser merely declining.
    #[instrument(skip_all, fields(channel = %channel.channel_id, message = %channel.message_id))]
    pub async fn parse(
        &self,
        channel: &ChannelContext,
        raw: &str,
        env: &ParseEnv<'_>,
    ) -> std::result::Result<TradeSignal, ParseError> {
        let chain = self
            .chain_for(&channel.channel_id)
            .ok_or_else(|| ParseError::UnknownChannel {
                channel: channel.channel_id.clone(),
            })?;

        let content = clean_content(raw);
        if content.is_empty() {
            return Err(ParseError::EmptyContent);
        }

        let mut failure: Option<ParseError> = None;
        for parser in chain {
            match parser.parse(&content, env).await {
                Ok(signal) => return Ok(signal),
                Err(e) => {
                    debug!(parser = parser.name(), error = %e, "parser failed");
                    let keep_previous = e.is_decline()
                        && failure.as_ref().map_or(false, |prev| !prev.is_decline());
                    if !keep_previous {
                        failure = Some(e);
                    }
                }
            }
        }

        Err(failure.unwrap_or(ParseError::MissingTicker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ActorType, AuthorMetadata};
    use crate::common::traits::MockPriceSource;
    use crate::parser::AssetCatalogue;
    use rust_decimal_macros::dec;

    fn author() -> AuthorMetadata {
        AuthorMetadata {
            id: "1".into(),
            username: "eli".into(),
            actor_type: ActorType::External,
        }
    }

    fn channel(id: &str) -> ChannelContext {
        ChannelContext {
            channel_id: id.into(),
            message_id: "m1".into(),
        }
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let err = ParserRegistry::builder()
            .register("calls", vec![Arc::new(DefaultParser)])
            .unwrap()
            .register("calls", vec![Arc::new(DcaParser)])
            .err()
            .unwrap();
        assert_eq!(err.reason(), "parser_registry.duplicate_channel");
    }

    #[tokio::test]
    async fn test_unknown_channel_without_fallback() {
        let registry = ParserRegistry::builder()
            .register("calls", vec![Arc::new(DefaultParser)])
            .unwrap()
            .build();
        let prices = MockPriceSource::new();
        let catalogue = AssetCatalogue::builtin();
        let settings = ParserConfig::default();
        let author = author();
        let env = ParseEnv {
            author: &author,
            catalogue: &catalogue,
            prices: &prices,
            settings: &settings,
        };

        let err = registry.parse(&channel("other"), "btc 1 2", &env).await.unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownChannel {
                channel: "other".into()
            }
        );
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_default() {
        let registry = ParserRegistry::from_config(&ParserConfig::default()).unwrap();
        let mut prices = MockPriceSource::new();
        prices.expect_latest_price().returning(|_| Ok(dec!(10.9)));
        let catalogue = AssetCatalogue::builtin();
        let settings = ParserConfig::default();
        let author = author();
        let env = ParseEnv {
            author: &author,
            catalogue: &catalogue,
            prices: &prices,
            settings: &settings,
        };

        let signal = registry
            .parse(&channel("calls"), "SRM LIMIT LONG 9.80 stop 8.90 tp 13 18", &env)
            .await
            .unwrap();
        assert_eq!(signal.entries, vec![dec!(9.80)]);
        assert!(!signal.execution_strategy.is_dca());
    }

    #[tokio::test]
    async fn test_real_failure_preferred_over_decline() {
        let registry = ParserRegistry::from_config(&ParserConfig::default()).unwrap();
        let prices = MockPriceSource::new();
        let catalogue = AssetCatalogue::builtin();
        let settings = ParserConfig::default();
        let author = author();
        let env = ParseEnv {
            author: &author,
            catalogue: &catalogue,
            prices: &prices,
            settings: &settings,
        };

        let err = registry
            .parse(
                &channel("calls"),
                "if i ever get ftt at 50 again im gonna put entire portfolio there",
                &env,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::NotEnoughValues {
                role: "entry",
                found: 0
            }
        );
    }
}
