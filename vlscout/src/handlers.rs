use crate::commands::ListArg;
use anyhow::{Context, anyhow};
use chrono::Local;
use clap::ArgMatches;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use url::Url;
use vlscout_core::scout::{PruneReport, ScoutProgressCallback};
use vlscout_core::{
    GitHubCodeSearch, HuggingFaceOracle, OracleGate, PublicGistFeed, ResultSink, RunSummary,
    ScoutConfig, ScoutOptions, ScoutReport, Seed, SeedProvider, StaticSeeds, Tag, build_fetcher,
    collect_seeds, execute_prune, execute_scout,
};
use vlscout_scanner::Fetcher;

/// Comma-separated GitHub tokens feeding the credential pool.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
/// Enables the HuggingFace oracle when set.
pub const HF_TOKEN_ENV: &str = "HF_TOKEN";
/// File that receives `COMMIT_MSG=...` at the end of a merging run.
pub const GITHUB_OUTPUT_ENV: &str = "GITHUB_OUTPUT";

// Helper functions for seed loading

/// Load and parse seed URLs from a newline-delimited file
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read seeds file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content.lines().filter_map(parse_url_line).collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add https:// if needed.
/// Blank lines and `#` comments yield `None`.
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    eprintln!("⚠️  Skipping invalid URL '{}'", line);
    None
}

/// Split a comma-separated token list, dropping blanks.
pub fn parse_token_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Initialise the fmt subscriber. Logs go to stderr so `--json-summary`
/// output stays machine-readable.
pub fn init_logging(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => LevelFilter::WARN,
        (false, 0) => LevelFilter::INFO,
        (false, 1) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file (if any) and apply command-line overrides.
pub fn build_config(matches: &ArgMatches) -> anyhow::Result<ScoutConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            ScoutConfig::from_file(Path::new(&expanded))
                .with_context(|| format!("Failed to load config {}", expanded))?
        }
        None => ScoutConfig::default(),
    };

    if let Some(&threads) = matches.get_one::<usize>("threads") {
        config.workers = threads;
    }
    if let Some(&depth) = matches.get_one::<usize>("max-depth") {
        config.classifier.max_recursion_depth = depth;
    }
    if let Some(&concurrency) = matches.get_one::<usize>("oracle-concurrency") {
        config.oracle_concurrency = concurrency;
    }
    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config.fetcher.timeout_secs = timeout;
    }

    config.validate()?;
    Ok(config)
}

/// Resolve `--output-dir`, expanding `~` and creating it when missing.
pub fn output_dir(matches: &ArgMatches) -> anyhow::Result<PathBuf> {
    let raw = matches
        .get_one::<String>("output-dir")
        .map(String::as_str)
        .unwrap_or(".");
    let dir = PathBuf::from(shellexpand::tilde(raw).as_ref());
    fs::create_dir_all(&dir)
        .with_context(|| format!("Cannot create output directory {}", dir.display()))?;
    Ok(dir)
}

/// The oracle gate: HuggingFace when a token is given, otherwise every
/// suspect document goes to manual review.
pub fn build_oracle(config: &ScoutConfig, hf_token: Option<String>) -> anyhow::Result<Arc<OracleGate>> {
    let gate = match hf_token.filter(|t| !t.trim().is_empty()) {
        Some(token) => OracleGate::new(
            Arc::new(HuggingFaceOracle::new(token.trim())?),
            config.oracle_concurrency,
            config.classifier.oracle_snippet_len,
        ),
        None => OracleGate::disabled(),
    };
    Ok(Arc::new(gate))
}

/// Everything a run needs, assembled from flags and the environment.
struct RunContext {
    config: ScoutConfig,
    output: PathBuf,
    sink: ResultSink,
    fetcher: Arc<Fetcher>,
    oracle: Arc<OracleGate>,
    quiet: bool,
    json_summary: bool,
}

impl RunContext {
    fn from_matches(matches: &ArgMatches) -> anyhow::Result<Self> {
        let config = build_config(matches)?;
        let output = output_dir(matches)?;
        let sink = ResultSink::new(&output);
        let tokens = std::env::var(GITHUB_TOKEN_ENV)
            .map(|raw| parse_token_list(&raw))
            .unwrap_or_default();
        let token_count = tokens.len();
        let fetcher = build_fetcher(&config, tokens)?;
        let oracle = build_oracle(&config, std::env::var(HF_TOKEN_ENV).ok())?;

        info!(
            "{} GitHub token(s), oracle: {}",
            token_count,
            oracle.oracle_name()
        );

        Ok(Self {
            config,
            output,
            sink,
            fetcher,
            oracle,
            quiet: matches.get_flag("quiet"),
            json_summary: matches.get_flag("json-summary"),
        })
    }

    fn print_settings(&self, seeds: usize) {
        if self.quiet {
            return;
        }
        println!("\n🔎 Scouting {} seed(s)", seeds);
        println!("Workers: {}", self.config.workers);
        println!("Max depth: {}", self.config.classifier.max_recursion_depth);
        println!(
            "Oracle: {} (concurrency {})",
            self.oracle.oracle_name(),
            self.config.oracle_concurrency
        );
        println!("Output: {}\n", self.output.display());
    }

    /// Crawl the seeds, merge accepted URLs into the tag files and emit the
    /// run-end signal.
    async fn scout_and_merge(self, seeds: Vec<Seed>) -> anyhow::Result<()> {
        if seeds.is_empty() {
            if !self.quiet {
                println!("{} No seeds found, nothing to do", "→".blue());
            }
            return Ok(());
        }
        self.print_settings(seeds.len());

        let progress_callback: Option<ScoutProgressCallback> = if self.quiet {
            None
        } else {
            Some(Arc::new(|msg: String| {
                println!("{}", msg);
            }))
        };

        let options = ScoutOptions {
            seeds,
            config: self.config.clone(),
            show_progress_bars: !self.quiet,
        };
        let report = execute_scout(options, self.fetcher.clone(), self.oracle.clone(), progress_callback)
            .await
            .context("Scout failed")?;

        let merged = self
            .sink
            .merge_all(&report.urls_by_tag())
            .context("Failed to write result lists")?;
        let summary = RunSummary::new(report.counts.clone(), &merged, Local::now());

        self.emit_summary(&report, &summary)
    }

    fn emit_summary(&self, report: &ScoutReport, summary: &RunSummary) -> anyhow::Result<()> {
        if let Ok(target) = std::env::var(GITHUB_OUTPUT_ENV)
            && !target.is_empty()
        {
            summary
                .write_github_output(Path::new(&target))
                .with_context(|| format!("Failed to append to {}", target))?;
        }

        if self.json_summary {
            println!("{}", serde_json::to_string(summary)?);
        } else if !self.quiet {
            print_summary(report, summary);
        }
        Ok(())
    }
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub fn print_summary(report: &ScoutReport, summary: &RunSummary) {
    let counts = &summary.verdicts;

    println!();
    print_divider();
    println!("{}", "  SCOUT SUMMARY".bright_white().bold());
    print_divider();
    println!();
    println!(
        "{} {} documents processed, {} valid nodes",
        "✓".green().bold(),
        counts.processed(),
        counts.valid_nodes
    );
    println!(
        "  {} RU: {}   {} Global: {}   {} Manual: {}",
        "•".green(),
        counts.ru.to_string().bright_green(),
        "•".cyan(),
        counts.global.to_string().bright_cyan(),
        "•".yellow(),
        counts.manual.to_string().bright_yellow()
    );
    println!(
        "  {} Trash: {}   Aggregators: {}   Duplicates: {}   Dead: {}   Errors: {}",
        "•".red(),
        counts.trash,
        counts.aggregators,
        counts.duplicates,
        counts.dead,
        counts.errors
    );
    println!(
        "  {} Ledger: {} URLs, {} digests, {} fingerprints",
        "→".blue(),
        report.ledger.visited,
        report.ledger.digests,
        report.ledger.fingerprints
    );
    println!();
    for (tag, stats) in [
        (Tag::Ru, summary.ru),
        (Tag::Global, summary.global),
        (Tag::Manual, summary.manual),
    ] {
        println!(
            "  {} {:<22} +{} ({} total)",
            "→".blue(),
            tag.file_name(),
            stats.added.to_string().bright_white().bold(),
            stats.total
        );
    }
    println!();
    println!("{} {}", "✓".green().bold(), summary.commit_message.bright_white());
    print_divider();
}

fn print_prune_report(tag: Tag, report: &PruneReport) {
    println!();
    print_divider();
    println!(
        "{}",
        format!("  PRUNE {}", tag.file_name()).bright_white().bold()
    );
    print_divider();
    println!(
        "{} Checked {}, kept {}, removed {}",
        "✓".green().bold(),
        report.checked,
        report.kept.to_string().bright_green(),
        report.removed.len().to_string().bright_red()
    );
    for url in &report.removed {
        println!("  {} {}", "✗".red(), url);
    }
    print_divider();
}

/// `hunt`: GitHub code search and the public gist feed, plus an optional
/// seed file, then crawl and merge.
pub async fn handle_hunt(sub_matches: &ArgMatches) -> anyhow::Result<()> {
    let ctx = RunContext::from_matches(sub_matches)?;

    let mut providers: Vec<Box<dyn SeedProvider>> = Vec::new();
    if let Some(path) = sub_matches.get_one::<PathBuf>("seeds-file") {
        let urls = load_urls_from_file(path).map_err(|e| anyhow!(e))?;
        providers.push(Box::new(StaticSeeds::new("file", urls)));
    }
    if !sub_matches.get_flag("no-search") {
        if ctx.fetcher.credentials().is_empty() {
            warn!(
                "{} is not set; code search will run unauthenticated and hit rate limits quickly",
                GITHUB_TOKEN_ENV
            );
        }
        providers.push(Box::new(GitHubCodeSearch::new(
            ctx.fetcher.clone(),
            ctx.config.tables.search_queries.clone(),
        )));
    }
    if !sub_matches.get_flag("no-gists") {
        providers.push(Box::new(PublicGistFeed::new(
            ctx.fetcher.clone(),
            ctx.config.tables.gist_keywords.clone(),
        )));
    }

    let seeds = collect_seeds(&providers).await;
    info!("Collected {} seed(s)", seeds.len());
    ctx.scout_and_merge(seeds).await
}

/// `crawl`: explicit seeds from `--url` and/or `--seeds-file`, then merge.
pub async fn handle_crawl(sub_matches: &ArgMatches) -> anyhow::Result<()> {
    let urls: Vec<String> = sub_matches
        .get_many::<Url>("url")
        .map(|values| values.map(|u| u.as_str().to_string()).collect())
        .unwrap_or_default();
    let seeds_file = sub_matches.get_one::<PathBuf>("seeds-file");

    if urls.is_empty() && seeds_file.is_none() {
        return Err(anyhow!("Either --url or --seeds-file must be provided"));
    }

    let mut providers: Vec<Box<dyn SeedProvider>> = Vec::new();
    if !urls.is_empty() {
        providers.push(Box::new(StaticSeeds::new("cli", urls)));
    }
    if let Some(path) = seeds_file {
        let file_urls = load_urls_from_file(path).map_err(|e| anyhow!(e))?;
        providers.push(Box::new(StaticSeeds::new("file", file_urls)));
    }

    let ctx = RunContext::from_matches(sub_matches)?;
    let seeds = collect_seeds(&providers).await;
    ctx.scout_and_merge(seeds).await
}

/// `prune`: re-check one persisted list and rewrite it with the survivors.
pub async fn handle_prune(sub_matches: &ArgMatches) -> anyhow::Result<()> {
    let tag: Tag = sub_matches
        .get_one::<ListArg>("TAG")
        .copied()
        .unwrap_or(ListArg::Global)
        .into();

    let ctx = RunContext::from_matches(sub_matches)?;
    if !ctx.quiet {
        println!(
            "\n🧹 Pruning {}",
            ctx.sink.path(tag).display().to_string().bright_white()
        );
    }

    let report = execute_prune(
        tag,
        &ctx.sink,
        ctx.config.clone(),
        ctx.fetcher.clone(),
        ctx.oracle.clone(),
        !ctx.quiet,
    )
    .await
    .with_context(|| format!("Failed to prune {}", tag.file_name()))?;

    if ctx.json_summary {
        println!(
            "{}",
            serde_json::json!({
                "list": tag.file_name(),
                "checked": report.checked,
                "kept": report.kept,
                "removed": report.removed,
            })
        );
    } else if !ctx.quiet {
        print_prune_report(tag, &report);
    }
    Ok(())
}
