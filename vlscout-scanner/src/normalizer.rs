//! Canonicalisation of URLs and fetched documents.
//!
//! URLs are reduced to a query-less key used by the dedup ledger, repository
//! links are rewritten to their raw form, and fetched text is unwrapped from a
//! single layer of base64 and repaired where line wrapping split a config URI.

use crate::error::{Result, ScanError};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

/// Documents shorter than this are never treated as whole-document base64.
const MIN_ENCODED_LEN: usize = 50;

static WRAPPED_QUERY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ \t]*\r?\n\s*([?&])").expect("Invalid wrapped-line regex")
});

static BASE64_BODY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/_\-]+=*$").expect("Invalid base64 body regex"));

fn lenient(alphabet: &alphabet::Alphabet) -> GeneralPurpose {
    GeneralPurpose::new(
        alphabet,
        GeneralPurposeConfig::new()
            .with_decode_padding_mode(DecodePaddingMode::Indifferent)
            .with_decode_allow_trailing_bits(true),
    )
}

static STANDARD_LENIENT: Lazy<GeneralPurpose> = Lazy::new(|| lenient(&alphabet::STANDARD));
static URL_SAFE_LENIENT: Lazy<GeneralPurpose> = Lazy::new(|| lenient(&alphabet::URL_SAFE));

/// Fetched text after canonicalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedContent {
    pub text: String,
    /// True when the body was a base64 envelope that has been unwrapped.
    pub decoded: bool,
}

/// Dedup key for a URL: scheme, host and path with query and fragment removed.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or(trimmed)
            .to_string(),
    }
}

/// Rewrite GitHub blob and gist page links to the raw document they render.
pub fn to_raw_url(url: &str) -> String {
    if url.contains("raw.githubusercontent.com") || url.contains("gist.githubusercontent.com") {
        return url.to_string();
    }

    if let Ok(parsed) = Url::parse(url) {
        match parsed.host_str() {
            Some("github.com") if parsed.path().contains("/blob/") => {
                let path = parsed.path().replacen("/blob/", "/", 1);
                return format!("https://raw.githubusercontent.com{}", path);
            }
            Some("gist.github.com") => {
                let path = parsed.path().trim_end_matches('/');
                if !path.ends_with("/raw") && path.matches('/').count() >= 2 {
                    return format!("https://gist.github.com{}/raw", path);
                }
            }
            _ => {}
        }
    }

    url.to_string()
}

/// Canonicalise fetched text.
///
/// A body without `marker` that looks like one base64 blob is decoded, and the
/// decoded form is kept only if it contains `marker`. Line breaks inserted in
/// front of `?` or `&` are then removed.
pub fn normalize_content(raw: &str, marker: &str) -> NormalizedContent {
    let mut decoded = false;

    let text = if raw.contains(marker) {
        raw.to_string()
    } else {
        match decode_whole_document(raw) {
            Ok(plain) if plain.contains(marker) => {
                decoded = true;
                plain
            }
            Ok(_) => raw.to_string(),
            Err(e) => {
                debug!("Keeping body as plain text: {}", e);
                raw.to_string()
            }
        }
    };

    NormalizedContent {
        text: repair_wrapped_lines(&text),
        decoded,
    }
}

/// Decode a document that is a single base64 blob (optionally line wrapped).
pub fn decode_whole_document(raw: &str) -> Result<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    if compact.len() <= MIN_ENCODED_LEN {
        return Err(ScanError::Decode("body too short to be encoded".to_string()));
    }
    if !BASE64_BODY_REGEX.is_match(&compact) {
        return Err(ScanError::Decode("body is not base64".to_string()));
    }

    let bytes = STANDARD_LENIENT
        .decode(compact.as_bytes())
        .or_else(|_| URL_SAFE_LENIENT.decode(compact.as_bytes()))
        .map_err(|e| ScanError::Decode(e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| ScanError::Decode(e.to_string()))
}

/// Join lines that were split immediately before a query delimiter.
pub fn repair_wrapped_lines(text: &str) -> String {
    WRAPPED_QUERY_REGEX.replace_all(text, "$1").into_owned()
}
