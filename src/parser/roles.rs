//! Role assignment and order-type inference

use rust_decimal::Decimal;

use crate::common::types::{OrderType, TradeSide};

use super::ParseError;

/// Entries must sit within this band of the reference price
const ENTRY_BAND_PERCENT: u32 = 50;
/// Take-profits outside this band are dropped
const TAKE_PROFIT_BAND_PERCENT: u32 = 300;

/// Candidate prices split into their roles
#[derive(Debug, Clone, PartialEq)]
pub struct Roles {
    pub stop_loss: Decimal,
    /// Nearest the stop-loss first
    pub entries: Vec<Decimal>,
    pub take_profits: Vec<Decimal>,
}

/// Sort candidates ascending for long and descending for short
pub fn sort_for_side(values: &mut [Decimal], side: TradeSide) {
    match side {
        TradeSide::Long => values.sort(),
        TradeSide::Short => values.sort_by(|a, b| b.cmp(a)),
    }
}

/// Strictly inside `truth ± truth * percent / 100`
pub fn within_range(value: Decimal, truth: Decimal, percent: u32) -> bool {
    let boundary = truth * Decimal::from(percent) / Decimal::ONE_HUNDRED;
    value > truth - boundary && value < truth + boundary
}

/// Assign side-sorted candidates to stop-loss, `entry_count` entries and take-profits
///
/// The first candidate is the stop-loss since it lies beyond every entry in the
/// adverse direction. When at least one candidate is near the reference price,
/// leading candidates far from it are discarded (labels such as `entry 2:`),
/// entries far from it are rejected and distant take-profits are dropped.
pub fn assign_roles(
    sorted: &[Decimal],
    entry_count: usize,
    reference: Decimal,
) -> Result<Roles, ParseError> {
    let filter = reference > Decimal::ZERO
        && sorted
            .iter()
            .any(|v| within_range(*v, reference, ENTRY_BAND_PERCENT));

    let start = if filter {
        sorted
            .iter()
            .position(|v| within_range(*v, reference, ENTRY_BAND_PERCENT))
            .unwrap_or(0)
    } else {
        0
    };
    let candidates = &sorted[start..];

    if candidates.is_empty() {
        return Err(ParseError::NotEnoughValues {
            role: "stop_loss",
            found: 0,
        });
    }
    if candidates.len() < 1 + entry_count {
        return Err(ParseError::NotEnoughValues {
            role: "entry",
            found: candidates.len() - 1,
        });
    }

    let stop_loss = candidates[0];
    let entries = candidates[1..=entry_count].to_vec();

    if filter {
        if let Some(entry) = entries
            .iter()
            .find(|e| !within_range(**e, reference, ENTRY_BAND_PERCENT))
        {
            return Err(ParseError::EntryOutOfRange {
                entry: *entry,
                reference,
            });
        }
    }

    if entries.contains(&stop_loss) {
        return Err(ParseError::StopLossEqualsEntry { stop_loss });
    }

    let take_profits = candidates[1 + entry_count..]
        .iter()
        .copied()
        .filter(|tp| !filter || within_range(*tp, reference, TAKE_PROFIT_BAND_PERCENT))
        .collect();

    Ok(Roles {
        stop_loss,
        entries,
        take_profits,
    })
}

/// Market when the entry nearest the reference is within `band_percent` of it
pub fn infer_order_type(
    entries: &[Decimal],
    reference: Decimal,
    band_percent: Decimal,
    explicit_limit: bool,
) -> OrderType {
    if explicit_limit || reference <= Decimal::ZERO {
        return OrderType::Limit;
    }
    let nearest = entries
        .iter()
        .map(|e| (*e - reference).abs())
        .min();

    match nearest {
        Some(distance) if distance <= reference * band_percent / Decimal::ONE_HUNDRED => {
            OrderType::Market
        }
        _ => OrderType::Limit,
    }
}
