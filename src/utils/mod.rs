//! Utility functions and helpers.

pub mod http;

use unicode_segmentation::UnicodeSegmentation;
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Percent-decoded last path segment of a URL, or `"arquivo"` when empty.
pub fn filename_from_url(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or("").to_string());
    let last = path.rsplit('/').next().unwrap_or("");
    let decoded = urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string());
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        "arquivo".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Truncate to at most `max` user-perceived characters.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    text.graphemes(true).take(max).collect()
}

/// Escape text for inclusion in HTML content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
