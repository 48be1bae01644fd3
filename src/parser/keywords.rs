//! Keyword scans over cleaned content

use crate::common::types::{InstrumentType, TradeSide};

use super::clean::tokens;

pub(crate) const STOP_LOSS_MARKS: &[&str] = &["sl", "stop", "stoploss", "stop-loss"];

/// Words that mark a derivatives call even when `spot` is mentioned
const DERIVATIVE_MARKS: &[&str] = &["perp", "perps", "futures", "lev", "leverage", "leveraged"];

/// First `long` or `short` keyword in the content
pub fn detect_side(content: &str) -> Option<TradeSide> {
    tokens(content).find_map(|t| match t {
        "long" => Some(TradeSide::Long),
        "short" => Some(TradeSide::Short),
        _ => None,
    })
}

/// `spot` selects spot unless a derivatives marker is also present
pub fn detect_instrument_type(content: &str) -> InstrumentType {
    let mut spot = false;
    for token in tokens(content) {
        if DERIVATIVE_MARKS.contains(&token) {
            return InstrumentType::FuturePerpetual;
        }
        if token == "spot" {
            spot = true;
        }
    }
    if spot {
        InstrumentType::Spot
    } else {
        InstrumentType::FuturePerpetual
    }
}

pub(crate) fn contains_keyword(content: &str, keyword: &str) -> bool {
    tokens(content).any(|t| t == keyword)
}

/// Byte offset of the first stop-loss marker
pub(crate) fn find_stop_loss_mark(content: &str) -> Option<usize> {
    let mut offset = 0;
    for raw in content.split(' ') {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
        if STOP_LOSS_MARKS.contains(&token) {
            return Some(offset);
        }
        offset += raw.len() + 1;
    }
    None
}
