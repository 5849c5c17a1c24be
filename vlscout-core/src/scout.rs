use crate::classifier::{Classifier, Document};
use crate::config::ScoutConfig;
use crate::error::Result;
use crate::oracle::OracleGate;
use crate::seeds::Seed;
use crate::sink::{MergeStats, ResultSink, Tag};
use crate::stats::{RunStats, VerdictCounts};
use crate::verdict::{Classification, Verdict};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use vlscout_scanner::ledger::LedgerCounts;
use vlscout_scanner::links::{LinkConfig, hidden_links, should_skip_url, sibling_urls, storage_guesses};
use vlscout_scanner::normalizer::normalize_content;
use vlscout_scanner::{
    CredentialPool, DedupLedger, Discovered, FetchOutcome, Fetcher, Frontier, FrontierItem,
    ItemProcessor, WorkerPool,
};

/// Options for one pipeline run
pub struct ScoutOptions {
    pub seeds: Vec<Seed>,
    pub config: ScoutConfig,
    pub show_progress_bars: bool,
}

/// Callback for reporting pipeline phases
pub type ScoutProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// A document that made it into one of the persisted lists.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub url: String,
    pub source_tag: String,
    pub tag: Tag,
    pub valid_nodes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScoutReport {
    pub accepted: Vec<Accepted>,
    pub counts: VerdictCounts,
    pub ledger: LedgerCounts,
}

impl ScoutReport {
    pub fn urls_by_tag(&self) -> HashMap<Tag, Vec<String>> {
        let mut by_tag: HashMap<Tag, Vec<String>> = HashMap::new();
        for accepted in &self.accepted {
            by_tag.entry(accepted.tag).or_default().push(accepted.url.clone());
        }
        by_tag
    }

    pub fn tag_of(&self, url: &str) -> Option<Tag> {
        self.accepted.iter().find(|a| a.url == url).map(|a| a.tag)
    }
}

/// Fetcher with a fresh ledger and a credential pool built from `tokens`.
pub fn build_fetcher<I, S>(config: &ScoutConfig, tokens: I) -> Result<Arc<Fetcher>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let ledger = Arc::new(DedupLedger::with_digest_prefix(config.classifier.digest_prefix));
    let credentials = Arc::new(CredentialPool::new(tokens));
    Ok(Arc::new(Fetcher::new(config.fetcher.clone(), credentials, ledger)?))
}

/// How documents are fetched and deduplicated during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Run-wide URL, content and fingerprint dedup.
    Scout,
    /// Every seed is fetched and judged on its own.
    Recheck,
}

struct DocumentProcessor {
    mode: Mode,
    fetcher: Arc<Fetcher>,
    classifier: Classifier,
    oracle: Arc<OracleGate>,
    links: LinkConfig,
    marker: String,
    max_depth: usize,
    stats: Arc<RunStats>,
    accepted: Mutex<Vec<Accepted>>,
}

impl DocumentProcessor {
    fn admit(&self, url: &str) -> bool {
        !should_skip_url(url, &self.links) && !self.fetcher.ledger().is_visited(url)
    }

    fn discover(&self, item: &FrontierItem, text: &str, verdict: &Verdict) -> Discovered {
        let mut discovered = Discovered::default();
        if item.depth + 1 > self.max_depth {
            return discovered;
        }

        if let Verdict::Aggregator(links) = verdict {
            discovered
                .links
                .extend(links.iter().filter(|l| self.admit(l)).map(|l| item.child(l.as_str())));
        }
        discovered.links.extend(
            hidden_links(text)
                .into_iter()
                .filter(|l| self.admit(l))
                .map(|l| item.child(l)),
        );

        discovered.speculative.extend(
            sibling_urls(&item.url, &self.links)
                .into_iter()
                .chain(storage_guesses(&item.url, &self.links))
                .filter(|l| self.admit(l))
                .map(|l| item.child(l)),
        );
        discovered
    }

    fn accept(&self, item: &FrontierItem, classification: &Classification) {
        let Some(tag) = Tag::for_verdict(&classification.verdict) else {
            return;
        };
        info!(
            "[{}] {} ({} nodes)",
            classification.verdict.tag(),
            item.url,
            classification.valid_nodes
        );
        let mut accepted = self.accepted.lock().unwrap_or_else(|p| p.into_inner());
        accepted.push(Accepted {
            url: item.url.clone(),
            source_tag: item.source_tag.clone(),
            tag,
            valid_nodes: classification.valid_nodes,
        });
    }
}

#[async_trait]
impl ItemProcessor for DocumentProcessor {
    async fn process(&self, item: FrontierItem, worker_id: usize) -> Discovered {
        let outcome = match self.mode {
            Mode::Scout => self.fetcher.fetch(&item.url).await,
            Mode::Recheck => self.fetcher.recheck(&item.url).await,
        };
        let document = match outcome {
            FetchOutcome::Content(document) => document,
            FetchOutcome::Duplicate => {
                self.stats.record(&Classification::new(Verdict::Duplicate, 0));
                return Discovered::default();
            }
            FetchOutcome::Dead(status) => {
                self.stats.record(&Classification::new(Verdict::Dead(status), 0));
                return Discovered::default();
            }
            FetchOutcome::Error(e) => {
                self.stats.record(&Classification::new(Verdict::Error(e), 0));
                return Discovered::default();
            }
        };

        let normalized = normalize_content(&document.body, &self.marker);
        if normalized.decoded {
            debug!("Worker {}: decoded base64 body of {}", worker_id, item.url);
        }

        let decision = self.classifier.classify(&Document {
            url: &item.url,
            depth: item.depth,
            text: &normalized.text,
        });
        let classification = self.classifier.resolve(decision, &self.oracle).await;
        debug!("Worker {}: {} -> {}", worker_id, item.url, classification.verdict);

        self.stats.record(&classification);
        self.accept(&item, &classification);
        self.discover(&item, &normalized.text, &classification.verdict)
    }
}

/// Crawl from `options.seeds` until the frontier drains, classifying every
/// fetched document. An empty seed set is a no-op.
pub async fn execute_scout(
    options: ScoutOptions,
    fetcher: Arc<Fetcher>,
    oracle: Arc<OracleGate>,
    progress_callback: Option<ScoutProgressCallback>,
) -> Result<ScoutReport> {
    run_pipeline(Mode::Scout, options, fetcher, oracle, progress_callback).await
}

async fn run_pipeline(
    mode: Mode,
    options: ScoutOptions,
    fetcher: Arc<Fetcher>,
    oracle: Arc<OracleGate>,
    progress_callback: Option<ScoutProgressCallback>,
) -> Result<ScoutReport> {
    let ScoutOptions {
        seeds,
        config,
        show_progress_bars,
    } = options;

    if seeds.is_empty() {
        info!("No seeds, nothing to do");
        return Ok(ScoutReport::default());
    }

    let max_depth = config.classifier.max_recursion_depth;
    let frontier = Arc::new(Frontier::new(max_depth));
    for seed in &seeds {
        if should_skip_url(&seed.url, &config.links) {
            debug!("Skipping seed {}", seed.url);
            continue;
        }
        frontier.enqueue(FrontierItem::seed(seed.url.as_str(), seed.source_tag.as_str()));
    }

    if let Some(ref callback) = progress_callback {
        callback(format!(
            "Scouting {} seeds with {} workers (max depth {})",
            frontier.pending(),
            config.workers,
            max_depth
        ));
    }

    let classifier = match mode {
        Mode::Scout => Classifier::new(
            &config.classifier,
            &config.tables,
            &config.links,
            fetcher.ledger().clone(),
        )?,
        Mode::Recheck => Classifier::isolated(&config.classifier, &config.tables, &config.links)?,
    };
    let stats = Arc::new(RunStats::new());
    let processor = Arc::new(DocumentProcessor {
        mode,
        fetcher: fetcher.clone(),
        classifier,
        oracle,
        links: config.links.clone(),
        marker: config.classifier.scheme_marker.clone(),
        max_depth,
        stats: stats.clone(),
        accepted: Mutex::new(Vec::new()),
    });

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Starting scout...");
        Some(pb)
    } else {
        None
    };

    let processed_count = Arc::new(AtomicUsize::new(0));
    let mut pool = WorkerPool::new(config.workers);
    if let Some(ref pb) = progress_bar {
        let pb = pb.clone();
        let count = processed_count.clone();
        pool = pool.with_progress_callback(Arc::new(move |_worker_id: usize, _url: String| {
            let n = count.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_message(format!("Scouting... {} documents processed", n));
            pb.tick();
        }));
    }

    pool.run(frontier, processor.clone()).await?;

    if let Some(ref pb) = progress_bar {
        let total = processed_count.load(Ordering::Relaxed);
        pb.finish_with_message(format!("Scout complete! {} documents processed", total));
    }

    let accepted = std::mem::take(&mut *processor.accepted.lock().unwrap_or_else(|p| p.into_inner()));
    Ok(ScoutReport {
        accepted,
        counts: stats.counts(),
        ledger: fetcher.ledger().counts(),
    })
}

#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub checked: usize,
    pub kept: usize,
    pub removed: Vec<String>,
    pub stats: MergeStats,
}

/// Re-classify every URL of one persisted list and keep only those that still
/// land on the same tag. Aggregators are not expanded, and each URL is judged
/// on its own, so mirrors of the same list all survive.
pub async fn execute_prune(
    tag: Tag,
    sink: &ResultSink,
    mut config: ScoutConfig,
    fetcher: Arc<Fetcher>,
    oracle: Arc<OracleGate>,
    show_progress_bars: bool,
) -> Result<PruneReport> {
    let existing = sink.load(tag)?;
    if existing.is_empty() {
        info!("{} is empty, nothing to prune", tag.file_name());
        return Ok(PruneReport::default());
    }

    config.classifier.max_recursion_depth = 0;
    let seeds = existing.iter().map(|url| Seed::new(url.as_str(), "prune")).collect();
    let report = run_pipeline(
        Mode::Recheck,
        ScoutOptions {
            seeds,
            config,
            show_progress_bars,
        },
        fetcher,
        oracle,
        None,
    )
    .await?;

    let (kept, removed): (Vec<String>, Vec<String>) = existing
        .into_iter()
        .partition(|url| report.tag_of(url) == Some(tag));

    let stats = sink.replace(tag, &kept)?;
    info!(
        "Pruned {}: kept {}, removed {}",
        tag.file_name(),
        kept.len(),
        removed.len()
    );

    Ok(PruneReport {
        checked: kept.len() + removed.len(),
        kept: kept.len(),
        removed,
        stats,
    })
}
