pub mod classifier;
pub mod config;
pub mod entry;
pub mod error;
pub mod oracle;
pub mod scout;
pub mod seeds;
pub mod sink;
pub mod stats;
pub mod tables;
pub mod verdict;

pub use classifier::{Classifier, Decision, Document};
pub use config::{ClassifierConfig, ScoutConfig};
pub use entry::ConfigEntry;
pub use error::ScoutError;
pub use oracle::{DisabledOracle, HuggingFaceOracle, Oracle, OracleGate, OracleVerdict};
pub use scout::{ScoutOptions, ScoutReport, build_fetcher, execute_prune, execute_scout};
pub use seeds::{GitHubCodeSearch, PublicGistFeed, Seed, SeedProvider, StaticSeeds, collect_seeds};
pub use sink::{MergeStats, ResultSink, Tag};
pub use stats::{RunStats, RunSummary};
pub use tables::Tables;
pub use verdict::{Classification, TrashReason, Verdict};
