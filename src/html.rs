//! HTML to plain-text derivation.
//!
//! Produces the text part of an email when only an HTML body was supplied,
//! so text-only clients still get readable content. The transformation is
//! deterministic and never fails; malformed or empty HTML yields an empty
//! string.

use regex::Regex;
use std::sync::LazyLock;

// Alternation rather than a shared tag group, so a stray </style> inside a
// script block cannot terminate the script region early.
static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*?>.*?</script\s*>|<style[^>]*?>.*?</style\s*>").unwrap()
});

static BLOCK_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(br|p|div|li)(\s[^>]*)?/?>").unwrap());

static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<blockquote(\s[^>]*)?>").unwrap());

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap());

/// Convert HTML content into plain text.
///
/// Strips script/style regions, maps block boundaries to newlines, decodes
/// character entities, and normalizes line whitespace.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let text = SCRIPT_STYLE.replace_all(html, "");
    let text = BLOCK_TAGS.replace_all(&text, "\n");
    let text = BLOCKQUOTE.replace_all(&text, "\n> ");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode HTML character entities to their literal characters.
///
/// Handles the common named entities plus decimal and hexadecimal numeric
/// forms. Unrecognized entities pass through untouched.
fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let body = &caps[1];
        let code = if let Some(hex) = body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()
        } else {
            body.parse::<u32>().ok()
        };
        match code.and_then(char::from_u32) {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    });

    // &amp; last, so "&amp;lt;" decodes to "&lt;" and not "<".
    text.replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
