//! Tradeable asset catalogue

use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use crate::common::retry::ReadRetry;
use crate::common::traits::AssetSource;
use crate::common::types::Venue;
use crate::config::types::{AssetConfig, ParserConfig};

use super::clean::tokens;

const STABLECOINS: &[&str] = &["usd", "usdt", "usdc", "busd"];

/// Longest suffix first so `busd` is not read as `b` + `usd`
const STABLE_SUFFIXES: &[&str] = &["usdt", "usdc", "busd", "usd"];

/// (ticker, aggregator id, also listed on FTX)
const BUILTIN_ASSETS: &[(&str, &str, bool)] = &[
    ("btc", "bitcoin", true),
    ("eth", "ethereum", true),
    ("sol", "solana", true),
    ("bnb", "binancecoin", true),
    ("ada", "cardano", true),
    ("xrp", "ripple", true),
    ("dot", "polkadot", true),
    ("doge", "dogecoin", true),
    ("avax", "avalanche-2", true),
    ("matic", "matic-network", true),
    ("link", "chainlink", true),
    ("ltc", "litecoin", true),
    ("uni", "uniswap", true),
    ("atom", "cosmos", true),
    ("aave", "aave", true),
    ("ftt", "ftx-token", true),
    ("srm", "serum", true),
    ("ftm", "fantom", true),
    ("lrc", "loopring", false),
    ("rsr", "reserve-rights-token", false),
    ("xtz", "tezos", false),
    ("crv", "curve-dao-token", false),
    ("sushi", "sushi", false),
    ("snx", "havven", false),
    ("fil", "filecoin", false),
    ("axs", "axie-infinity", false),
    ("sand", "the-sandbox", false),
    ("mana", "decentraland", false),
    ("egld", "elrond-erd-2", false),
];

/// A tradeable asset and where it can be traded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetListing {
    /// Upper-case ticker
    pub ticker: String,
    pub venues: BTreeSet<Venue>,
    pub aggregator_id: Option<String>,
}

/// Known tradeable assets keyed by lower-case ticker
#[derive(Debug, Clone, Default)]
pub struct AssetCatalogue {
    assets: HashMap<String, AssetListing>,
}

impl AssetCatalogue {
    pub fn new(listings: impl IntoIterator<Item = AssetListing>) -> Self {
        let assets = listings
            .into_iter()
            .map(|l| (l.ticker.to_lowercase(), l))
            .collect();
        Self { assets }
    }

    /// Built-in list of commonly traded perpetuals
    pub fn builtin() -> Self {
        Self::new(BUILTIN_ASSETS.iter().map(|(ticker, id, on_ftx)| {
            let mut venues = BTreeSet::from([Venue::Binance]);
            if *on_ftx {
                venues.insert(Venue::Ftx);
            }
            AssetListing {
                ticker: ticker.to_uppercase(),
                venues,
                aggregator_id: Some(id.to_string()),
            }
        }))
    }

    /// Configured assets, or the built-in list when none are configured
    pub fn from_config(assets: &[AssetConfig]) -> Self {
        if assets.is_empty() {
            return Self::builtin();
        }
        Self::new(assets.iter().map(|a| AssetListing {
            ticker: a.ticker.to_uppercase(),
            venues: a.venues.iter().copied().collect(),
            aggregator_id: a.aggregator_id.clone(),
        }))
    }

    /// Catalogue from configuration extended with a venue's live listings
    ///
    /// Listings are read with backoff. When the venue cannot be read the
    /// configured (or built-in) catalogue is used unchanged.
    pub async fn load(
        config: &ParserConfig,
        venue: Venue,
        source: &dyn AssetSource,
        retry: &ReadRetry,
    ) -> Self {
        let catalogue = Self::from_config(&config.assets);
        match retry
            .run("tradeable_assets", || source.tradeable_assets(&config.quote_asset))
            .await
        {
            Ok(tickers) => {
                let catalogue = catalogue.with_listed(venue, tickers);
                info!(venue = %venue, assets = catalogue.len(), "asset catalogue loaded");
                catalogue
            }
            Err(e) => {
                warn!(venue = %venue, error = %e, assets = catalogue.len(), "venue listings unavailable, using configured assets");
                catalogue
            }
        }
    }

    /// Mark `tickers` as tradeable on `venue`, adding the ones not yet known
    pub fn with_listed(mut self, venue: Venue, tickers: impl IntoIterator<Item = String>) -> Self {
        for ticker in tickers {
            let key = ticker.to_lowercase();
            if key.is_empty() || STABLECOINS.contains(&key.as_str()) {
                continue;
            }
            self.assets
                .entry(key)
                .or_insert_with(|| AssetListing {
                    ticker: ticker.to_uppercase(),
                    venues: BTreeSet::new(),
                    aggregator_id: None,
                })
                .venues
                .insert(venue);
        }
        self
    }

    pub fn lookup(&self, ticker: &str) -> Option<&AssetListing> {
        self.assets.get(&ticker.to_lowercase())
    }

    /// Aggregator ids keyed by upper-case ticker
    pub fn aggregator_ids(&self) -> HashMap<String, String> {
        self.assets
            .values()
            .filter_map(|l| l.aggregator_id.clone().map(|id| (l.ticker.clone(), id)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// First token in the content that names a known asset
    ///
    /// Stablecoins are never the asset; `avaxusdt` resolves to `avax` and
    /// `btc/usdt` is split and each half retried.
    pub fn detect(&self, content: &str) -> Option<&AssetListing> {
        tokens(content).find_map(|token| self.resolve_token(token))
    }

    fn resolve_token(&self, token: &str) -> Option<&AssetListing> {
        if STABLECOINS.contains(&token) {
            return None;
        }
        if token.contains('/') {
            return token
                .split('/')
                .filter(|half| !half.is_empty())
                .find_map(|half| self.resolve_token(half));
        }
        if let Some(listing) = self.assets.get(token) {
            return Some(listing);
        }
        STABLE_SUFFIXES
            .iter()
            .find_map(|suffix| token.strip_suffix(*suffix))
            .filter(|base| !base.is_empty())
            .and_then(|base| self.assets.get(base))
    }
}
