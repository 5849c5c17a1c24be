//! Seed providers: where candidate URLs come from before the crawl starts.

use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;
use vlscout_scanner::Fetcher;
use vlscout_scanner::normalizer::{normalize_url, to_raw_url};

pub const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub url: String,
    pub source_tag: String,
}

impl Seed {
    pub fn new(url: impl Into<String>, source_tag: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_tag: source_tag.into(),
        }
    }
}

#[async_trait]
pub trait SeedProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn seeds(&self) -> Result<Vec<Seed>>;
}

/// URLs supplied up front, e.g. from the command line or a file.
pub struct StaticSeeds {
    tag: String,
    urls: Vec<String>,
}

impl StaticSeeds {
    pub fn new(tag: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            tag: tag.into(),
            urls,
        }
    }

    /// One URL per line; blank lines and `#` comments are skipped.
    pub fn from_text(tag: impl Into<String>, text: &str) -> Self {
        let urls = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self::new(tag, urls)
    }
}

#[async_trait]
impl SeedProvider for StaticSeeds {
    fn name(&self) -> &str {
        &self.tag
    }

    async fn seeds(&self) -> Result<Vec<Seed>> {
        Ok(self
            .urls
            .iter()
            .map(|url| Seed::new(to_raw_url(url), self.tag.clone()))
            .collect())
    }
}

#[derive(Deserialize)]
struct CodeSearchPage {
    #[serde(default)]
    items: Vec<CodeSearchItem>,
}

#[derive(Deserialize)]
struct CodeSearchItem {
    html_url: String,
}

/// GitHub code search over a list of queries, newest files first.
pub struct GitHubCodeSearch {
    fetcher: Arc<Fetcher>,
    api_base: String,
    queries: Vec<String>,
    per_page: u32,
    query_delay: Duration,
}

impl GitHubCodeSearch {
    pub fn new(fetcher: Arc<Fetcher>, queries: Vec<String>) -> Self {
        Self {
            fetcher,
            api_base: GITHUB_API.to_string(),
            queries,
            per_page: 15,
            query_delay: Duration::from_secs(2),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    fn search_url(&self, query: &str) -> Result<String> {
        let base = format!("{}/search/code", self.api_base.trim_end_matches('/'));
        let per_page = self.per_page.to_string();
        let url = Url::parse_with_params(
            &base,
            &[
                ("q", query),
                ("sort", "indexed"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ],
        )
        .map_err(|e| ScoutError::Config(format!("invalid API base {}: {}", self.api_base, e)))?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl SeedProvider for GitHubCodeSearch {
    fn name(&self) -> &str {
        "github"
    }

    async fn seeds(&self) -> Result<Vec<Seed>> {
        let mut found = Vec::new();

        for (idx, query) in self.queries.iter().enumerate() {
            if idx > 0 && !self.query_delay.is_zero() {
                tokio::time::sleep(self.query_delay).await;
            }

            let url = self.search_url(query)?;
            match self.fetcher.get_json::<CodeSearchPage>(&url).await {
                Ok(page) => {
                    info!("Query '{}': +{} files", query, page.items.len());
                    found.extend(
                        page.items
                            .into_iter()
                            .map(|item| Seed::new(to_raw_url(&item.html_url), "github")),
                    );
                }
                Err(e) => warn!("Code search '{}' failed: {}", query, e),
            }
        }

        Ok(found)
    }
}

#[derive(Deserialize)]
struct Gist {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Deserialize)]
struct GistFile {
    #[serde(default)]
    raw_url: Option<String>,
}

/// Public gist feed, keeping gists whose description or filenames mention a keyword.
pub struct PublicGistFeed {
    fetcher: Arc<Fetcher>,
    api_base: String,
    keywords: Vec<String>,
    per_page: u32,
}

impl PublicGistFeed {
    pub fn new(fetcher: Arc<Fetcher>, keywords: Vec<String>) -> Self {
        Self {
            fetcher,
            api_base: GITHUB_API.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            per_page: 50,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn is_relevant(&self, gist: &Gist) -> bool {
        let description = gist.description.as_deref().unwrap_or_default().to_lowercase();
        let mentions = |text: &str| self.keywords.iter().any(|k| text.contains(k.as_str()));
        mentions(&description) || gist.files.keys().any(|name| mentions(&name.to_lowercase()))
    }
}

#[async_trait]
impl SeedProvider for PublicGistFeed {
    fn name(&self) -> &str {
        "gist"
    }

    async fn seeds(&self) -> Result<Vec<Seed>> {
        let url = format!(
            "{}/gists/public?per_page={}",
            self.api_base.trim_end_matches('/'),
            self.per_page
        );
        let gists: Vec<Gist> = self.fetcher.get_json(&url).await?;

        let found: Vec<Seed> = gists
            .iter()
            .filter(|gist| self.is_relevant(gist))
            .flat_map(|gist| gist.files.values())
            .filter_map(|file| file.raw_url.clone())
            .map(|raw| Seed::new(raw, "gist"))
            .collect();

        info!("Gist feed: {} candidates", found.len());
        Ok(found)
    }
}

/// Run providers in order. A failing provider is logged and skipped;
/// seeds are deduplicated by normalized URL.
pub async fn collect_seeds(providers: &[Box<dyn SeedProvider>]) -> Vec<Seed> {
    let mut seen = HashSet::new();
    let mut seeds = Vec::new();

    for provider in providers {
        match provider.seeds().await {
            Ok(found) => {
                for seed in found {
                    if seen.insert(normalize_url(&seed.url)) {
                        seeds.push(seed);
                    }
                }
            }
            Err(e) => warn!("Seed provider {} failed: {}", provider.name(), e),
        }
    }

    info!("Collected {} unique seeds", seeds.len());
    seeds
}
