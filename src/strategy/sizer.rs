//! Risk-weighted price ladders

use rust_decimal::Decimal;

use crate::common::errors::{EngineError, Result};
use crate::common::types::{Position, TradeSide};

/// Largest rung weight relative to the smallest
const RAMP_RATIO: u32 = 3;

/// Spread a risk budget over `rung_count` evenly spaced prices
///
/// The rung nearest the stop-loss carries the largest weight and the ramp
/// falls linearly to a third of that at the far end. Coefficients are
/// fractions of the balance and sum to `risk_percent / 100`; the last rung
/// absorbs rounding. Ladders are price-ascending for long and
/// price-descending for short, so the first rung is always nearest the stop.
///
/// # Arguments
/// * `price_bounds` - One or more entry prices; only the extremes are used
/// * `stop_loss` - Must sit beyond every bound on the adverse side
/// * `risk_percent` - Budget as a percentage of the balance, e.g. `10`
/// * `rung_count` - Number of rungs, at least one
/// * `side` - Trade direction
pub fn size_positions(
    price_bounds: &[Decimal],
    stop_loss: Decimal,
    risk_percent: Decimal,
    rung_count: usize,
    side: TradeSide,
) -> Result<Vec<Position>> {
    let (low, high) = validate(price_bounds, stop_loss, risk_percent, rung_count, side)?;
    let budget = risk_percent / Decimal::ONE_HUNDRED;

    let (start, end) = match side {
        TradeSide::Long => (low, high),
        TradeSide::Short => (high, low),
    };

    if rung_count == 1 {
        return Ok(vec![Position {
            price: start,
            risk_coefficient: budget,
        }]);
    }

    let n = Decimal::from(rung_count);
    let last = Decimal::from(rung_count - 1);
    let ratio = Decimal::from(RAMP_RATIO);
    // w_i = smallest * (ratio - (ratio - 1) * i / last); sum = smallest * n * (ratio + 1) / 2
    let smallest = budget * Decimal::TWO / (n * (ratio + Decimal::ONE));

    let mut ladder = Vec::with_capacity(rung_count);
    let mut allocated = Decimal::ZERO;

    for i in 0..rung_count {
        let step = Decimal::from(i) / last;
        let price = start + (end - start) * step;
        let risk_coefficient = if i == rung_count - 1 {
            budget - allocated
        } else {
            smallest * (ratio - (ratio - Decimal::ONE) * step)
        };
        allocated += risk_coefficient;
        ladder.push(Position {
            price,
            risk_coefficient,
        });
    }

    Ok(ladder)
}

fn validate(
    price_bounds: &[Decimal],
    stop_loss: Decimal,
    risk_percent: Decimal,
    rung_count: usize,
    side: TradeSide,
) -> Result<(Decimal, Decimal)> {
    let (Some(low), Some(high)) = (price_bounds.iter().min(), price_bounds.iter().max()) else {
        return Err(EngineError::bad_param("sizer.missing_price_bounds"));
    };
    if *low <= Decimal::ZERO || stop_loss <= Decimal::ZERO {
        return Err(EngineError::bad_param("sizer.non_positive_price")
            .with("low", low)
            .with("stop_loss", stop_loss));
    }
    if rung_count == 0 {
        return Err(EngineError::bad_param("sizer.zero_rungs"));
    }
    if risk_percent <= Decimal::ZERO {
        return Err(EngineError::bad_param("sizer.non_positive_risk").with("risk_percent", risk_percent));
    }
    if price_bounds.contains(&stop_loss) {
        return Err(EngineError::precondition("sizer.stop_loss_equals_entry").with("stop_loss", stop_loss));
    }
    let adverse = match side {
        TradeSide::Long => stop_loss < *low,
        TradeSide::Short => stop_loss > *high,
    };
    if !adverse {
        return Err(EngineError::precondition("sizer.stop_loss_on_wrong_side")
            .with("side", side)
            .with("stop_loss", stop_loss));
    }
    Ok((*low, *high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::ErrorKind;
    use rust_decimal_macros::dec;

    fn total(ladder: &[Position]) -> Decimal {
        ladder.iter().map(|p| p.risk_coefficient).sum()
    }

    #[test]
    fn test_five_rung_long_ladder() {
        let ladder =
            size_positions(&[dec!(100), dec!(200)], dec!(80), dec!(10), 5, TradeSide::Long).unwrap();

        let prices: Vec<Decimal> = ladder.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(125), dec!(150), dec!(175), dec!(200)]);

        let weights: Vec<Decimal> = ladder.iter().map(|p| p.risk_coefficient).collect();
        assert_eq!(
            weights,
            vec![dec!(0.03), dec!(0.025), dec!(0.02), dec!(0.015), dec!(0.01)]
        );
        assert_eq!(total(&ladder), dec!(0.10));
    }

    #[test]
    fn test_short_ladder_is_mirrored() {
        let ladder =
            size_positions(&[dec!(100), dec!(200)], dec!(220), dec!(10), 5, TradeSide::Short).unwrap();

        assert_eq!(ladder.first().unwrap().price, dec!(200));
        assert_eq!(ladder.last().unwrap().price, dec!(100));
        assert!(ladder[0].risk_coefficient > ladder[4].risk_coefficient);
        assert_eq!(total(&ladder), dec!(0.10));
    }

    #[test]
    fn test_sum_holds_for_awkward_rung_counts() {
        for rungs in 1..=9 {
            let ladder =
                size_positions(&[dec!(0.395), dec!(0.404)], dec!(0.38), dec!(7), rungs, TradeSide::Long)
                    .unwrap();
            assert_eq!(ladder.len(), rungs);
            assert!((total(&ladder) - dec!(0.07)).abs() < dec!(0.0001));
            assert!(ladder.windows(2).all(|w| w[0].price <= w[1].price));
        }
    }

    #[test]
    fn test_single_rung_sits_on_best_entry() {
        let long = size_positions(&[dec!(50000), dec!(51000)], dec!(49000), dec!(2), 1, TradeSide::Long)
            .unwrap();
        assert_eq!(long, vec![Position { price: dec!(50000), risk_coefficient: dec!(0.02) }]);

        let short = size_positions(&[dec!(27), dec!(27.25)], dec!(27.66), dec!(2), 1, TradeSide::Short)
            .unwrap();
        assert_eq!(short[0].price, dec!(27.25));
    }

    #[test]
    fn test_invalid_inputs() {
        let err = size_positions(&[], dec!(80), dec!(10), 5, TradeSide::Long).unwrap_err();
        assert!(err.is(ErrorKind::BadParam));

        let err = size_positions(&[dec!(100)], dec!(100), dec!(10), 5, TradeSide::Long).unwrap_err();
        assert_eq!(err.reason(), "sizer.stop_loss_equals_entry");
        assert!(err.is(ErrorKind::FailedPrecondition));

        let err = size_positions(&[dec!(100)], dec!(120), dec!(10), 5, TradeSide::Long).unwrap_err();
        assert_eq!(err.reason(), "sizer.stop_loss_on_wrong_side");

        let err = size_positions(&[dec!(100)], dec!(80), dec!(10), 0, TradeSide::Long).unwrap_err();
        assert_eq!(err.reason(), "sizer.zero_rungs");

        let err = size_positions(&[dec!(100)], dec!(80), dec!(0), 3, TradeSide::Long).unwrap_err();
        assert_eq!(err.reason(), "sizer.non_positive_risk");
    }
}
