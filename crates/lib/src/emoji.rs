//! Emoji canonicalization for cross-network text.
//!
//! WhatsApp carries emoji as Unicode; Slack renders `:shortcode:` aliases.
//! Text crossing to Slack has its Unicode emoji demojized to shortcodes,
//! and text crossing to WhatsApp has its aliases emojized to Unicode, so
//! both sides see native rendering. Both passes are idempotent: demojized
//! text has no Unicode emoji left, emojized text has no known aliases left.

/// Longest emoji sequence we try to match, in chars (covers ZWJ families
/// and flag/keycap sequences in the shortcode registry).
const MAX_SEQUENCE_CHARS: usize = 8;

/// Replace Unicode emoji with `:shortcode:` form. Emoji without a known
/// shortcode are passed through unchanged.
pub fn demojize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        if let Some((emoji, len)) = match_emoji(rest) {
            match emoji.shortcode() {
                Some(code) => {
                    out.push(':');
                    out.push_str(code);
                    out.push(':');
                }
                None => out.push_str(emoji.as_str()),
            }
            rest = &rest[len..];
        } else {
            let ch = rest.chars().next().expect("non-empty remainder");
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }
    out
}

/// Replace `:alias:` codes with their Unicode emoji. Unknown aliases and
/// stray colons are passed through unchanged.
pub fn emojize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(':') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(':') {
            Some(end) if end > 0 && is_shortcode(&after[..end]) => {
                match emojis::get_by_shortcode(&after[..end]) {
                    Some(emoji) => {
                        out.push_str(emoji.as_str());
                        rest = &after[end + 1..];
                    }
                    None => {
                        // Not an alias; keep the opening colon and rescan
                        // from the closing one, which may open a real alias.
                        out.push(':');
                        rest = after;
                    }
                }
            }
            _ => {
                out.push(':');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Longest match first, so ZWJ sequences win over their first component.
fn match_emoji(s: &str) -> Option<(&'static emojis::Emoji, usize)> {
    let ends: Vec<usize> = s
        .char_indices()
        .take(MAX_SEQUENCE_CHARS)
        .map(|(i, c)| i + c.len_utf8())
        .collect();
    for &end in ends.iter().rev() {
        if let Some(emoji) = emojis::get(&s[..end]) {
            return Some((emoji, end));
        }
    }
    None
}

fn is_shortcode(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'))
}
