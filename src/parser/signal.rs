//! Shared tail of every parser: side, reference price, roles, order type

use rust_decimal::Decimal;
use tracing::debug;

use crate::common::types::{ExecutionStrategyKind, TradeSide, TradeSignal};
use crate::config::types::UnspecifiedSidePolicy;

use super::catalogue::AssetListing;
use super::keywords::{contains_keyword, detect_instrument_type, detect_side};
use super::roles::{assign_roles, infer_order_type, sort_for_side};
use super::{ParseEnv, ParseError};

pub(crate) async fn build_signal(
    parser: &'static str,
    content: &str,
    listing: &AssetListing,
    mut values: Vec<Decimal>,
    entry_count: usize,
    env: &ParseEnv<'_>,
) -> Result<TradeSignal, ParseError> {
    let side = match (detect_side(content), env.settings.unspecified_side) {
        (Some(side), _) => side,
        (None, UnspecifiedSidePolicy::DefaultLong) => TradeSide::Long,
        (None, UnspecifiedSidePolicy::Reject) => return Err(ParseError::MissingSide),
    };

    // Fail before the network round trip when roles cannot possibly be filled.
    if values.len() < 1 + entry_count {
        let role = if values.is_empty() { "stop_loss" } else { "entry" };
        return Err(ParseError::NotEnoughValues {
            role,
            found: values.len().saturating_sub(1),
        });
    }

    let reference = env
        .prices
        .latest_price(&listing.ticker)
        .await
        .map_err(|e| ParseError::PriceUnavailable {
            asset: listing.ticker.clone(),
            reason: e.reason().to_string(),
        })?;

    sort_for_side(&mut values, side);
    let roles = assign_roles(&values, entry_count, reference)?;

    let order_type = infer_order_type(
        &roles.entries,
        reference,
        env.settings.market_band_percent,
        contains_keyword(content, "limit"),
    );
    let execution_strategy = ExecutionStrategyKind::for_signal(entry_count > 1, order_type);

    debug!(
        parser,
        asset = %listing.ticker,
        %side,
        %reference,
        strategy = %execution_strategy,
        "parsed trade signal"
    );

    Ok(TradeSignal {
        actor_id: env.author.id.clone(),
        humanized_actor_name: env.author.username.to_uppercase(),
        actor_type: env.author.actor_type,
        instrument_type: detect_instrument_type(content),
        side,
        asset: listing.ticker.clone(),
        pair: env.settings.quote_asset.to_uppercase(),
        entries: roles.entries,
        stop_loss: roles.stop_loss,
        take_profits: roles.take_profits,
        order_type,
        execution_strategy,
        reference_price: reference,
        tradeable_venues: listing.venues.clone(),
    })
}
