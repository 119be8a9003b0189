use once_cell::sync::Lazy;
use regex::Regex;

/// Standalone `Rs`/`Rs.` followed by whitespace and a numeric token. The word
/// boundary keeps the pattern away from letter runs like "worst"; requiring
/// whitespace before the number means `Rs500` is deliberately left alone.
static CURRENCY_RS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\brs\.?\s+(\d[\d,]*(?:\.\d+)?)").expect("valid currency regex")
});

/// Emphasis markup with matched markers flanking a contiguous run of
/// letters, e.g. `wo**rs**t` or `*breaking*`. Markers must pair up so a
/// stray asterisk is left untouched.
static STAR_EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(\p{L}+)\*\*|\*(\p{L}+)\*").expect("valid emphasis regex"));

/// Underscore emphasis is only stripped at word edges; interior underscores
/// as in `snake_case_name` are part of the token, not markup.
static UNDERSCORE_EMPHASIS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\p{L}\p{N}_])(?:__(\p{L}+)__|_(\p{L}+)_)([^\p{L}\p{N}_]|$)")
        .expect("valid emphasis regex")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("₹", "INR "),
    ("₨", "INR "),
    ("$", "USD "),
    ("€", "EUR "),
    ("£", "GBP "),
    ("¥", "JPY "),
    ("₩", "KRW "),
    ("₽", "RUB "),
];

const EDGE_NOISE: &[char] = &['|', '-', '–', '—', ':', ';', ',', '·', '#'];

/// Produces the display form of a raw feed title.
///
/// Rules run in a fixed priority order: HTML entities are decoded, currency
/// symbols and the textual `Rs <number>` form are rewritten to ISO codes, and
/// only then is emphasis markup stripped. Running the currency rule first is
/// what keeps a marker-wrapped `rs` inside a word (as in `wo**rs**t`) from
/// ever being treated as a currency token.
pub fn normalize_title(raw: &str) -> String {
    let mut text = unescape_entities(raw);

    for (symbol, code) in CURRENCY_SYMBOLS {
        if text.contains(symbol) {
            text = text.replace(symbol, code);
        }
    }
    text = CURRENCY_RS.replace_all(&text, "INR ${1}").into_owned();
    text = STAR_EMPHASIS.replace_all(&text, "${1}${2}").into_owned();
    text = UNDERSCORE_EMPHASIS
        .replace_all(&text, "${1}${2}${3}${4}")
        .into_owned();

    let collapsed = WHITESPACE.replace_all(&text, " ");
    collapsed
        .trim_matches(|ch: char| ch.is_whitespace() || EDGE_NOISE.contains(&ch))
        .to_string()
}

/// Case- and whitespace-folded form of a normalized title, used as the
/// secondary dedup key for near-duplicate headlines.
pub fn dedup_key(normalized: &str) -> String {
    WHITESPACE
        .replace_all(normalized.trim(), " ")
        .to_lowercase()
}

fn unescape_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_token_with_space_is_converted() {
        assert_eq!(normalize_title("Rs 500"), "INR 500");
        assert_eq!(normalize_title("rs. 1,200 raised"), "INR 1,200 raised");
        assert_eq!(normalize_title("Sensex up RS 42.5"), "Sensex up INR 42.5");
    }

    #[test]
    fn currency_token_without_space_is_left_alone() {
        assert_eq!(normalize_title("Rs500 crore deal"), "Rs500 crore deal");
    }

    #[test]
    fn emphasis_markers_are_stripped() {
        assert_eq!(normalize_title("wo**rs**t day for markets"), "worst day for markets");
        assert_eq!(normalize_title("a _quiet_ session"), "a quiet session");
        assert_eq!(normalize_title("__breaking__ update"), "breaking update");
    }

    #[test]
    fn interior_underscores_are_not_markup() {
        assert_eq!(
            normalize_title("snake_case_name hits the index"),
            "snake_case_name hits the index"
        );
    }

    #[test]
    fn marked_rs_inside_word_is_never_currency() {
        // regression: the currency rule must win the priority race, so the
        // emphasis-stripped "worst" is never rewritten to "woINRt"
        let out = normalize_title("The wo*rs*t crash since 2020");
        assert_eq!(out, "The worst crash since 2020");
        assert!(!out.contains("INR"));
    }

    #[test]
    fn currency_and_emphasis_combined() {
        assert_eq!(
            normalize_title("wo**rs**t quarter: Rs 900 wiped out"),
            "worst quarter: INR 900 wiped out"
        );
    }

    #[test]
    fn currency_symbols_are_mapped() {
        assert_eq!(normalize_title("Gold at ₹62,000"), "Gold at INR 62,000");
        assert_eq!(normalize_title("Oil near $80"), "Oil near USD 80");
    }

    #[test]
    fn entities_whitespace_and_edge_noise() {
        assert_eq!(normalize_title("  M&amp;M  profit | "), "M&M profit");
        assert_eq!(normalize_title("| Top stories –"), "Top stories");
        assert_eq!(normalize_title("A\t\nB"), "A B");
    }

    #[test]
    fn dedup_key_folds_case_and_whitespace() {
        assert_eq!(dedup_key("Markets  Rally Today"), "markets rally today");
        assert_eq!(dedup_key(" markets rally TODAY "), "markets rally today");
    }
}
