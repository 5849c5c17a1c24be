//! Link discovery inside fetched documents.
//!
//! Besides plain URL extraction this guesses sibling documents: numbered
//! neighbours of `name<N>.txt` style files, well-known filenames next to a file
//! on an object-storage host, and links hidden inside base64 tokens.

use crate::normalizer::to_raw_url;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"'`|\\\]\[]+"#).expect("Invalid URL regex"));

static NUMBERED_FILE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<stem>.*?)(?P<index>\d+)(?P<ext>\.(?:txt|json|yaml|yml|conf))$")
        .expect("Invalid numbered file regex")
});

static BASE64_TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9+/_\-]{24,}={0,2}").expect("Invalid base64 token regex"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', ')', '(', '!', '?', '\'', '"'];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Path fragments that mark a URL as a listing document.
    pub listing_markers: Vec<String>,
    /// Host fragments of object-storage providers.
    pub storage_hosts: Vec<String>,
    /// Filenames probed next to a document on an object-storage host.
    pub common_filenames: Vec<String>,
    /// Smallest upper bound of the numbered-sibling window.
    pub sibling_min_window: u64,
    /// How far past the current index the window extends.
    pub sibling_lookahead: u64,
    /// Files numbered above this are not treated as a series (dates, ids).
    pub sibling_max_index: u64,
    /// Extensions that are never worth fetching.
    pub skip_extensions: Vec<String>,
    /// Filename keywords that are never worth fetching.
    pub skip_keywords: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            listing_markers: strings(&[".txt", ".json", ".yaml", ".yml", "raw", "gist"]),
            storage_hosts: strings(&[
                "storage.yandexcloud.net",
                "s3.amazonaws.com",
                "storage.googleapis.com",
                "blob.core.windows.net",
                "digitaloceanspaces.com",
                "r2.dev",
                "backblazeb2.com",
                "hb.bizmrg.com",
            ]),
            common_filenames: strings(&[
                "sub.txt",
                "nodes.txt",
                "config.txt",
                "vless.txt",
                "list.txt",
                "all.txt",
                "ru.txt",
                "config.json",
                "sub",
            ]),
            sibling_min_window: 50,
            sibling_lookahead: 10,
            sibling_max_index: 200,
            skip_extensions: strings(&[
                ".sh", ".md", ".py", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".zip", ".tar.gz",
            ]),
            skip_keywords: strings(&[
                "readme",
                "install",
                "tutorial",
                "instruction",
                "changelog",
                "license",
            ]),
        }
    }
}

/// All http(s) URLs in `text`, in order of appearance, without duplicates.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_REGEX
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION).to_string())
        .filter(|url| Url::parse(url).is_ok())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Whether `url` looks like a listing document or lives on object storage.
pub fn is_listing_link(url: &str, config: &LinkConfig) -> bool {
    let lower = url.to_lowercase();
    let Ok(parsed) = Url::parse(&lower) else {
        return false;
    };
    let path = parsed.path();
    let host = parsed.host_str().unwrap_or_default();

    config.listing_markers.iter().any(|m| path.contains(m.as_str()) || host.contains(m.as_str()))
        || is_storage_host(host, config)
}

/// Listing-style links in `text`, converted to their raw form.
pub fn listing_links(text: &str, config: &LinkConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    extract_urls(text)
        .into_iter()
        .filter(|url| is_listing_link(url, config))
        .map(|url| to_raw_url(&url))
        .filter(|url| !should_skip_url(url, config))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Pre-fetch filter on extension and filename keywords.
pub fn should_skip_url(url: &str, config: &LinkConfig) -> bool {
    let lower = url.to_lowercase();
    let path = Url::parse(&lower)
        .map(|u| u.path().to_string())
        .unwrap_or(lower);

    if config.skip_extensions.iter().any(|ext| path.ends_with(ext.as_str())) {
        return true;
    }

    let filename = path.rsplit('/').next().unwrap_or_default();
    config.skip_keywords.iter().any(|kw| filename.contains(kw.as_str()))
}

/// Neighbouring indices of a numbered file, e.g. `list7.txt` → `list1.txt`..`list50.txt`.
///
/// The window is `1..=max(sibling_min_window, index + sibling_lookahead)`,
/// excluding the index itself. Zero padding of the original index is kept.
/// Indices above `sibling_max_index` yield no guesses.
pub fn sibling_urls(url: &str, config: &LinkConfig) -> Vec<String> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    let path = parsed.path();
    let Some(caps) = NUMBERED_FILE_REGEX.captures(path) else {
        return Vec::new();
    };

    let digits = &caps["index"];
    let Ok(index) = digits.parse::<u64>() else {
        return Vec::new();
    };
    if index > config.sibling_max_index {
        return Vec::new();
    }
    let width = if digits.starts_with('0') { digits.len() } else { 0 };
    let upper = config
        .sibling_min_window
        .max(index.saturating_add(config.sibling_lookahead));

    (1..=upper)
        .filter(|n| *n != index)
        .map(|n| {
            let mut sibling = parsed.clone();
            sibling.set_query(None);
            sibling.set_fragment(None);
            sibling.set_path(&format!("{}{:0width$}{}", &caps["stem"], n, &caps["ext"], width = width));
            sibling.to_string()
        })
        .collect()
}

/// Common filenames under the same prefix when `url` is on an object-storage host.
pub fn storage_guesses(url: &str, config: &LinkConfig) -> Vec<String> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    if !is_storage_host(parsed.host_str().unwrap_or_default(), config) {
        return Vec::new();
    }

    let path = parsed.path();
    let prefix = &path[..path.rfind('/').map(|i| i + 1).unwrap_or(path.len())];

    config
        .common_filenames
        .iter()
        .map(|name| {
            let mut guess = parsed.clone();
            guess.set_query(None);
            guess.set_fragment(None);
            guess.set_path(&format!("{}{}", prefix, name));
            guess.to_string()
        })
        .filter(|guess| guess.as_str() != url)
        .collect()
}

/// URLs that only appear once base64 tokens in `text` are decoded.
pub fn hidden_links(text: &str) -> Vec<String> {
    let visible: HashSet<String> = extract_urls(text).into_iter().collect();
    let mut seen = HashSet::new();

    BASE64_TOKEN_REGEX
        .find_iter(text)
        .filter_map(|m| {
            let token = m.as_str();
            STANDARD
                .decode(token)
                .or_else(|_| URL_SAFE_NO_PAD.decode(token.trim_end_matches('=')))
                .ok()
        })
        .filter_map(|bytes| String::from_utf8(bytes).ok())
        .flat_map(|decoded| extract_urls(&decoded))
        .map(|url| to_raw_url(&url))
        .filter(|url| !visible.contains(url))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn is_storage_host(host: &str, config: &LinkConfig) -> bool {
    config.storage_hosts.iter().any(|h| host.contains(h.as_str()))
}
