//! Pulls the sold item and its price out of a sale confirmation email.
//!
//! The item sits in the first `<span>` of the paragraph reading
//! "Your sale of ... was completed"; the price is the cell following the
//! "Item price:" cell. Missing elements give empty strings, which the ledger
//! rejects as malformed.

use regex::Regex;
use sales_ledger::RawSale;
use std::sync::OnceLock;

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").expect("valid regex"))
}

fn span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<span\b[^>]*>(.*?)</span>").expect("valid regex"))
}

fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<td\b[^>]*>\s*Item price:\s*</td>\s*<td\b[^>]*>(.*?)</td>")
            .expect("valid regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// Visible text of an HTML fragment with the common entities decoded
fn text_of(fragment: &str) -> String {
    let stripped = tag_re().replace_all(fragment, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_item_name(html: &str) -> String {
    for paragraph in paragraph_re().captures_iter(html) {
        let inner = &paragraph[1];
        if !text_of(inner).contains("Your sale of") {
            continue;
        }
        return span_re()
            .captures(inner)
            .map(|span| {
                let text = text_of(&span[1]);
                text.split("was completed")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            })
            .unwrap_or_default();
    }
    String::new()
}

fn extract_price(html: &str) -> String {
    price_re()
        .captures(html)
        .map(|c| text_of(&c[1]))
        .unwrap_or_default()
}

/// Item name and raw price of a sale confirmation body
pub fn extract_sale(html: &str) -> RawSale {
    RawSale::new(extract_item_name(html), extract_price(html))
}
