//! Message normalisation

const REPLY_MARKER: &str = "--- message was a reply to ---";
const EDIT_MARKER: &str = "---new---";
const ATTACHMENTS_MARKER: &str = "[attachments]";

/// Normalise raw message text before any parser sees it
///
/// Lower-cases, keeps only the newest edit, drops quoted replies and
/// attachment listings, strips `$`, removes thousands separators
/// (`50,000` becomes `50000`, other commas become spaces), drops links and
/// collapses whitespace.
pub fn clean_content(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut content = lowered.as_str();

    if let Some(idx) = content.find(REPLY_MARKER) {
        content = &content[..idx];
    }
    if let Some(idx) = content.rfind(EDIT_MARKER) {
        content = &content[idx + EDIT_MARKER.len()..];
    }
    if let Some(idx) = content.find(ATTACHMENTS_MARKER) {
        content = &content[..idx];
    }

    let content = strip_commas(content).replace('$', " ");

    content
        .split_whitespace()
        .filter(|token| !is_link(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whitespace tokens with surrounding punctuation removed; `/` is kept for pairs
pub(crate) fn tokens(content: &str) -> impl Iterator<Item = &str> {
    content
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '/'))
        .filter(|t| !t.is_empty())
}

fn strip_commas(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len());

    for (i, c) in chars.iter().enumerate() {
        if *c != ',' {
            out.push(*c);
            continue;
        }
        let after_digit = i > 0 && chars[i - 1].is_ascii_digit();
        let group = chars.get(i + 1..i + 4);
        let three_digits = group.map_or(false, |g| g.iter().all(|d| d.is_ascii_digit()));
        let group_ends = chars.get(i + 4).map_or(true, |d| !d.is_ascii_digit());

        if !(after_digit && three_digits && group_ends) {
            out.push(' ');
        }
    }
    out
}

fn is_link(token: &str) -> bool {
    token.starts_with("http://") || token.starts_with("https://") || token.starts_with("www.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollars_and_thousands() {
        assert_eq!(clean_content("BTC $50,000 SL $49,500"), "btc 50000 sl 49500");
        assert_eq!(clean_content("TP: 50, 52 ,55"), "tp: 50 52 55");
        assert_eq!(clean_content("1,000,000"), "1000000");
    }

    #[test]
    fn test_reply_and_edits() {
        let raw = "old call 10 ---NEW--- btc long 50000 --- message was a reply to --- eth 3000";
        assert_eq!(clean_content(raw), "btc long 50000");
    }

    #[test]
    fn test_attachments_and_links_dropped() {
        let raw = "aave long 343\nstop 323\n[Attachments]\nhttps://cdn.example.com/1/2/unknown.png";
        assert_eq!(clean_content(raw), "aave long 343 stop 323");
        assert_eq!(clean_content("see https://x.io/123 btc"), "see btc");
    }

    #[test]
    fn test_tokens_trim_punctuation() {
        let toks: Vec<&str> = tokens("entry: 46.64 (btc/usdt), stop:").collect();
        assert_eq!(toks, vec!["entry", "46.64", "btc/usdt", "stop"]);
    }
}
