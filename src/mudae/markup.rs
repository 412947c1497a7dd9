//! Chat markup stripping.
//!
//! Emphasis, spoiler, code and quote markers are removed. Custom emoji and
//! mention tokens (`<:kakera:123>`, `<@42>`) are left untouched because the
//! classifiers anchor on them.

use std::sync::LazyLock;

use regex::Regex;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:a?:\w+:\d+|@!?\d+|#\d+|@&\d+)>").expect("token pattern"));

static MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*+|~~|\|\||`+|__").expect("marker pattern"));

static QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:>>>|>) ").expect("quote pattern"));

static UNDERSCORE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\W)_(\w)").expect("underscore pattern"));

static UNDERSCORE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w)_(\W|$)").expect("underscore pattern"));

/// Remove chat markup, keeping emoji and mention tokens intact.
pub fn strip(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for token in TOKEN.find_iter(text) {
        out.push_str(&strip_plain(&text[last..token.start()]));
        out.push_str(token.as_str());
        last = token.end();
    }
    out.push_str(&strip_plain(&text[last..]));
    out
}

fn strip_plain(text: &str) -> String {
    let text = QUOTE.replace_all(text, "");
    let text = MARKERS.replace_all(&text, "");
    let text = UNDERSCORE_OPEN.replace_all(&text, "$1$2");
    UNDERSCORE_CLOSE.replace_all(&text, "$1$2").into_owned()
}
