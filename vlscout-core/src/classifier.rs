//! Document classification as an ordered chain of stages.
//!
//! Each stage either settles the document or defers to the next one. The
//! last stage always settles, either with a final verdict or by marking the
//! document as suspect, which [`Classifier::resolve`] hands to the oracle.

use crate::config::ClassifierConfig;
use crate::entry::ConfigEntry;
use crate::error::{Result, ScoutError};
use crate::oracle::{OracleGate, OracleVerdict};
use crate::tables::Tables;
use crate::verdict::{Classification, TrashReason, Verdict};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use vlscout_scanner::DedupLedger;
use vlscout_scanner::links::{LinkConfig, listing_links};
use vlscout_scanner::normalizer::normalize_url;

/// A normalized document on its way through the chain.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    pub url: &'a str,
    pub depth: usize,
    pub text: &'a str,
}

/// Facts gathered by earlier stages for later ones.
#[derive(Debug, Default)]
pub struct Assessment {
    pub valid_nodes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Final(Classification),
    Suspect {
        snippet: String,
        valid_nodes: usize,
        bad_ratio: f64,
        regional: bool,
    },
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` defers to the next stage.
    fn evaluate(&self, doc: &Document<'_>, assessment: &mut Assessment) -> Option<Decision>;
}

fn trash(reason: TrashReason) -> Option<Decision> {
    Some(Decision::Final(Classification::trash(reason)))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ScoutError::Config(format!("bad pattern {:?}: {}", pattern, e)))
}

/// Allowlist markers and blocked keywords, lowercased once.
pub struct Markers {
    allowlist: Vec<String>,
    regional_script: Regex,
    regional_indicators: Vec<String>,
    blocked_keywords: Vec<String>,
}

impl Markers {
    pub fn new(tables: &Tables) -> Result<Self> {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Ok(Self {
            allowlist: lower(&tables.allowlist),
            regional_script: compile(&tables.regional_script)?,
            regional_indicators: lower(&tables.regional_indicators),
            blocked_keywords: lower(&tables.blocked_keywords),
        })
    }

    /// Any allowlisted hostname or regional script character.
    pub fn has_allowlist_marker(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.allowlist.iter().any(|m| lower.contains(m.as_str())) || self.regional_script.is_match(text)
    }

    pub fn is_regional(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.has_allowlist_marker(text)
            || self.regional_indicators.iter().any(|m| lower.contains(m.as_str()))
    }

    /// Lowercased text with every allowlisted hostname blanked out, so a
    /// trusted name never counts as a blocked keyword it happens to contain.
    fn masked(&self, text: &str) -> String {
        let mut masked = text.to_lowercase();
        for marker in &self.allowlist {
            if masked.contains(marker.as_str()) {
                masked = masked.replace(marker.as_str(), &" ".repeat(marker.len()));
            }
        }
        masked
    }

    /// Distinct blocked keywords present outside allowlisted names.
    pub fn blocked_hits(&self, text: &str) -> Vec<&str> {
        let masked = self.masked(text);
        self.blocked_keywords
            .iter()
            .filter(|k| masked.contains(k.as_str()))
            .map(|k| k.as_str())
            .collect()
    }
}

/// `bad / max(1, chars / line_length)`, scaled by `allowlist_boost` when an
/// allowlist marker is present.
pub fn bad_ratio(text: &str, markers: &Markers, config: &ClassifierConfig) -> f64 {
    let bad = markers.blocked_hits(text).len() as f64;
    let estimated_lines = (text.chars().count() as f64 / config.line_length_estimate).max(1.0);
    let ratio = bad / estimated_lines;

    if markers.has_allowlist_marker(text) {
        ratio * config.allowlist_boost
    } else {
        ratio
    }
}

/// Number of distinct instructional phrases in `text`.
pub fn count_guide_phrases(text: &str, phrases: &[String]) -> usize {
    let lower = text.to_lowercase();
    phrases
        .iter()
        .filter(|p| !p.is_empty() && lower.contains(&p.to_lowercase()))
        .count()
}

/// Stage 1: banned scripts and domains, plus pages that are not documents at all.
pub struct HardBlock {
    banned_script: Regex,
    banned_domains: Vec<String>,
    min_content_len: usize,
}

impl HardBlock {
    pub fn new(tables: &Tables, config: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            banned_script: compile(&tables.banned_script)?,
            banned_domains: tables
                .banned_domains
                .iter()
                .map(|d| d.to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            min_content_len: config.min_content_len,
        })
    }

    fn banned_domain<'a>(&'a self, lower: &str) -> Option<&'a str> {
        self.banned_domains
            .iter()
            .find(|domain| {
                if domain.starts_with('.') {
                    contains_tld(lower, domain)
                } else {
                    lower.contains(domain.as_str())
                }
            })
            .map(|d| d.as_str())
    }
}

/// `.ir` matches `host.ir/` or `host.ir:443` but not `host.irish.com`.
fn contains_tld(text: &str, tld: &str) -> bool {
    text.match_indices(tld).any(|(i, _)| {
        text[i + tld.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '-'))
    })
}

fn is_html(lower: &str) -> bool {
    let head = lower.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html") || lower.contains("<html")
}

fn is_weak_worker(lower: &str) -> bool {
    lower.contains("workers.dev") && lower.contains("type=ws") && !lower.contains("security=reality")
}

impl Stage for HardBlock {
    fn name(&self) -> &'static str {
        "hard-block"
    }

    fn evaluate(&self, doc: &Document<'_>, _assessment: &mut Assessment) -> Option<Decision> {
        if doc.text.trim().len() < self.min_content_len {
            return trash(TrashReason::Empty);
        }

        let lower = doc.text.to_lowercase();
        if is_html(&lower) {
            return trash(TrashReason::HtmlPage);
        }
        if self.banned_script.is_match(doc.text) {
            return trash(TrashReason::Blocked("script".to_string()));
        }
        if let Some(domain) = self.banned_domain(&lower) {
            return trash(TrashReason::Blocked(domain.to_string()));
        }
        if is_weak_worker(&lower) {
            return trash(TrashReason::WeakWorker);
        }
        None
    }
}

/// Stage 2: tutorials and channel adverts without any entries.
pub struct GuideHeuristic {
    phrases: Vec<String>,
    threshold: usize,
    marker: String,
}

impl GuideHeuristic {
    pub fn new(tables: &Tables, config: &ClassifierConfig) -> Self {
        Self {
            phrases: tables.guide_phrases.clone(),
            threshold: config.guide_phrase_threshold,
            marker: config.scheme_marker.to_lowercase(),
        }
    }
}

impl Stage for GuideHeuristic {
    fn name(&self) -> &'static str {
        "guide"
    }

    fn evaluate(&self, doc: &Document<'_>, _assessment: &mut Assessment) -> Option<Decision> {
        if doc.text.to_lowercase().contains(&self.marker) {
            return None;
        }
        let hits = count_guide_phrases(doc.text, &self.phrases);
        (hits >= self.threshold).then(|| Decision::Final(Classification::trash(TrashReason::Guide)))
    }
}

/// Matches entry candidates for a scheme marker.
struct EntryScanner {
    pattern: Regex,
    marker: String,
}

impl EntryScanner {
    fn new(marker: &str) -> Result<Self> {
        let pattern = compile(&format!(r#"(?i){}[^\s"'<>`,]+"#, regex::escape(marker)))?;
        Ok(Self {
            pattern,
            marker: marker.to_string(),
        })
    }

    fn entries<'t>(&'t self, text: &'t str) -> impl Iterator<Item = ConfigEntry> + 't {
        self.pattern
            .find_iter(text)
            .filter_map(|m| ConfigEntry::parse(m.as_str(), &self.marker))
    }
}

/// Stage 3: documents that only list further documents.
pub struct AggregatorCheck {
    scanner: EntryScanner,
    links: LinkConfig,
    threshold: usize,
    max_depth: usize,
}

impl AggregatorCheck {
    pub fn new(config: &ClassifierConfig, links: &LinkConfig) -> Result<Self> {
        Ok(Self {
            scanner: EntryScanner::new(&config.scheme_marker)?,
            links: links.clone(),
            threshold: config.aggregator_threshold,
            max_depth: config.max_recursion_depth,
        })
    }
}

impl Stage for AggregatorCheck {
    fn name(&self) -> &'static str {
        "aggregator"
    }

    fn evaluate(&self, doc: &Document<'_>, _assessment: &mut Assessment) -> Option<Decision> {
        if self.scanner.entries(doc.text).next().is_some() {
            return None;
        }

        let own = normalize_url(doc.url);
        let links: Vec<String> = listing_links(doc.text, &self.links)
            .into_iter()
            .filter(|link| normalize_url(link) != own)
            .collect();
        if links.len() < self.threshold {
            return None;
        }

        if doc.depth + 1 > self.max_depth {
            debug!("Aggregator {} at depth {} not expanded", doc.url, doc.depth);
            return trash(TrashReason::MaxRecursion);
        }
        Some(Decision::Final(Classification::new(Verdict::Aggregator(links), 0)))
    }
}

/// Stage 4: per-entry validation and fingerprint dedup.
///
/// With a ledger, fingerprints are deduplicated across every document of the
/// run; without one, only within the document itself.
pub struct EntryExtraction {
    scanner: EntryScanner,
    tables: Tables,
    markers: Arc<Markers>,
    min_distinct_chars: usize,
    ledger: Option<Arc<DedupLedger>>,
}

impl EntryExtraction {
    pub fn new(
        tables: &Tables,
        config: &ClassifierConfig,
        markers: Arc<Markers>,
        ledger: Option<Arc<DedupLedger>>,
    ) -> Result<Self> {
        Ok(Self {
            scanner: EntryScanner::new(&config.scheme_marker)?,
            tables: tables.clone(),
            markers,
            min_distinct_chars: config.min_distinct_credential_chars,
            ledger,
        })
    }

    /// Whether an entry is usable, before fingerprint dedup.
    pub fn is_valid(&self, entry: &ConfigEntry) -> bool {
        if !entry.has_required_params(&self.tables.required_params) {
            return false;
        }
        let routing = entry.routing_names().join(" ");
        if !self.markers.blocked_hits(&routing).is_empty() {
            return false;
        }
        !entry.is_placeholder(&self.tables) && entry.credential_entropy() >= self.min_distinct_chars
    }
}

impl Stage for EntryExtraction {
    fn name(&self) -> &'static str {
        "entries"
    }

    fn evaluate(&self, doc: &Document<'_>, assessment: &mut Assessment) -> Option<Decision> {
        let mut valid = 0;
        let mut fresh = 0;
        let mut local = HashSet::new();

        for entry in self.scanner.entries(doc.text) {
            if !self.is_valid(&entry) {
                continue;
            }
            valid += 1;
            // Recorded even if scoring later trashes this document, so a
            // clean repeat of these entries counts as nothing new.
            let fingerprint = entry.fingerprint();
            let is_new = match &self.ledger {
                Some(ledger) => ledger.record_fingerprint(&fingerprint),
                None => local.insert(fingerprint),
            };
            if is_new {
                fresh += 1;
            }
        }

        if valid == 0 {
            return trash(TrashReason::NoValidEntries);
        }
        if fresh == 0 {
            return trash(TrashReason::NoNewEntries);
        }
        assessment.valid_nodes = fresh;
        None
    }
}

/// Stage 5: bad-keyword density decides clean, trash or suspect.
pub struct Scoring {
    markers: Arc<Markers>,
    config: ClassifierConfig,
}

impl Scoring {
    pub fn new(markers: Arc<Markers>, config: &ClassifierConfig) -> Self {
        Self {
            markers,
            config: config.clone(),
        }
    }
}

impl Stage for Scoring {
    fn name(&self) -> &'static str {
        "scoring"
    }

    fn evaluate(&self, doc: &Document<'_>, assessment: &mut Assessment) -> Option<Decision> {
        let ratio = bad_ratio(doc.text, &self.markers, &self.config);
        let regional = self.markers.is_regional(doc.text);

        if ratio < self.config.clean_ratio {
            let verdict = if regional { Verdict::Ru } else { Verdict::Global };
            return Some(Decision::Final(Classification::new(verdict, assessment.valid_nodes)));
        }
        if ratio > self.config.trash_ratio {
            return trash(TrashReason::HighBadRatio(ratio));
        }

        let snippet = doc.text.chars().take(self.config.oracle_snippet_len).collect();
        Some(Decision::Suspect {
            snippet,
            valid_nodes: assessment.valid_nodes,
            bad_ratio: ratio,
            regional,
        })
    }
}

pub struct Classifier {
    stages: Vec<Box<dyn Stage>>,
}

impl Classifier {
    /// The standard chain: hard block, guide, aggregator, entries, scoring.
    pub fn new(
        config: &ClassifierConfig,
        tables: &Tables,
        links: &LinkConfig,
        ledger: Arc<DedupLedger>,
    ) -> Result<Self> {
        Self::build(config, tables, links, Some(ledger))
    }

    /// The standard chain judging each document on its own: entries seen in
    /// other documents still count as new.
    pub fn isolated(config: &ClassifierConfig, tables: &Tables, links: &LinkConfig) -> Result<Self> {
        Self::build(config, tables, links, None)
    }

    fn build(
        config: &ClassifierConfig,
        tables: &Tables,
        links: &LinkConfig,
        ledger: Option<Arc<DedupLedger>>,
    ) -> Result<Self> {
        let markers = Arc::new(Markers::new(tables)?);
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(HardBlock::new(tables, config)?),
            Box::new(GuideHeuristic::new(tables, config)),
            Box::new(AggregatorCheck::new(config, links)?),
            Box::new(EntryExtraction::new(tables, config, markers.clone(), ledger)?),
            Box::new(Scoring::new(markers, config)),
        ];
        Ok(Self { stages })
    }

    pub fn classify(&self, doc: &Document<'_>) -> Decision {
        let mut assessment = Assessment::default();
        for stage in &self.stages {
            if let Some(decision) = stage.evaluate(doc, &mut assessment) {
                debug!("{} settled by {}", doc.url, stage.name());
                return decision;
            }
        }
        Decision::Final(Classification::new(Verdict::Manual, assessment.valid_nodes))
    }

    /// Turn a decision into a classification, asking the oracle for suspects.
    pub async fn resolve(&self, decision: Decision, oracle: &OracleGate) -> Classification {
        match decision {
            Decision::Final(classification) => classification,
            Decision::Suspect {
                snippet,
                valid_nodes,
                bad_ratio,
                ..
            } => {
                debug!("Suspect document (bad ratio {:.2}), asking oracle", bad_ratio);
                match oracle.judge(&snippet).await {
                    OracleVerdict::Ru => Classification::new(Verdict::Ru, valid_nodes),
                    OracleVerdict::Global => Classification::new(Verdict::Global, valid_nodes),
                    OracleVerdict::Spam | OracleVerdict::Guide => {
                        Classification::trash(TrashReason::OracleRejected)
                    }
                    OracleVerdict::Unknown => Classification::new(Verdict::Manual, valid_nodes),
                }
            }
        }
    }
}
