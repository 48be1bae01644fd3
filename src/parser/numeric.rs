//! Candidate price extraction

use rust_decimal::Decimal;
use std::str::FromStr;

use super::ParseError;

/// Words that turn a preceding number into a duration or ratio
const EXCLUDING_WORDS: &[&str] = &[
    "percent", "rr", "r", "h", "hr", "hrs", "hour", "hours", "d", "day", "days", "m", "min",
    "mins", "minute", "minutes", "w", "week", "weeks",
];

/// Extract every standalone number from cleaned content, in order of appearance
///
/// Excluded: numbers glued to letters (`tp1`, `4h`, `3x`, `4.5rr`),
/// percentages (`57%`, `5 percent`), ratios (`1:3`, `1/3`), durations written
/// as separate words (`2 hrs`, `3 days`) and anything touching a `/`.
pub fn extract_numbers(content: &str) -> Result<Vec<Decimal>, ParseError> {
    let chars: Vec<char> = content.chars().collect();
    let mut values = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let starts_number = chars[i].is_ascii_digit()
            || (chars[i] == '.' && chars.get(i + 1).map_or(false, |c| c.is_ascii_digit()));
        if !starts_number {
            i += 1;
            continue;
        }

        let start = i;
        let mut end = i;
        while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
            end += 1;
        }
        i = end;

        // A trailing dot ends a sentence, not the number.
        let mut num_end = end;
        while num_end > start && chars[num_end - 1] == '.' {
            num_end -= 1;
        }

        if !left_boundary(&chars, start) || excluded_by_suffix(&chars[num_end..]) {
            continue;
        }

        let token: String = chars[start..num_end].iter().collect();
        values.push(parse_decimal(&token)?);
    }

    Ok(values)
}

fn left_boundary(chars: &[char], start: usize) -> bool {
    if start == 0 {
        return true;
    }
    let prev = chars[start - 1];
    if prev.is_alphanumeric() || prev == '/' {
        return false;
    }
    // second half of a ratio such as 1:3
    if prev == ':' && start >= 2 && chars[start - 2].is_ascii_digit() {
        return false;
    }
    true
}

fn excluded_by_suffix(rest: &[char]) -> bool {
    match rest.first() {
        None => false,
        Some(c) if c.is_alphanumeric() => true,
        Some('%') | Some('/') => true,
        Some(':') => rest.get(1).map_or(false, |c| c.is_ascii_digit()),
        Some(c) if c.is_whitespace() => {
            let word: String = rest
                .iter()
                .skip_while(|c| c.is_whitespace())
                .take_while(|c| c.is_alphanumeric() || **c == '%')
                .collect();
            word.starts_with('%') || EXCLUDING_WORDS.contains(&word.as_str())
        }
        Some(_) => false,
    }
}

fn parse_decimal(token: &str) -> Result<Decimal, ParseError> {
    let invalid = || ParseError::InvalidNumber {
        token: token.to_string(),
    };
    if token.matches('.').count() > 1 {
        return Err(invalid());
    }
    let normalised = if token.starts_with('.') {
        format!("0{}", token)
    } else {
        token.to_string()
    };
    Decimal::from_str(&normalised).map_err(|_| invalid())
}
