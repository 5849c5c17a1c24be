// Run statistics and the run-end summary

use crate::error::Result;
use crate::sink::{MergeStats, Tag};
use crate::verdict::{Classification, Verdict};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-verdict counters, updated concurrently by workers. Not authoritative.
#[derive(Debug, Default)]
pub struct RunStats {
    ru: AtomicUsize,
    global: AtomicUsize,
    manual: AtomicUsize,
    trash: AtomicUsize,
    aggregators: AtomicUsize,
    duplicates: AtomicUsize,
    dead: AtomicUsize,
    errors: AtomicUsize,
    valid_nodes: AtomicUsize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub ru: usize,
    pub global: usize,
    pub manual: usize,
    pub trash: usize,
    pub aggregators: usize,
    pub duplicates: usize,
    pub dead: usize,
    pub errors: usize,
    pub valid_nodes: usize,
}

impl VerdictCounts {
    pub fn processed(&self) -> usize {
        self.ru
            + self.global
            + self.manual
            + self.trash
            + self.aggregators
            + self.duplicates
            + self.dead
            + self.errors
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, classification: &Classification) {
        let counter = match classification.verdict {
            Verdict::Ru => &self.ru,
            Verdict::Global => &self.global,
            Verdict::Manual => &self.manual,
            Verdict::Trash(_) => &self.trash,
            Verdict::Aggregator(_) => &self.aggregators,
            Verdict::Duplicate => &self.duplicates,
            Verdict::Dead(_) => &self.dead,
            Verdict::Error(_) => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.valid_nodes
            .fetch_add(classification.valid_nodes, Ordering::Relaxed);
    }

    pub fn counts(&self) -> VerdictCounts {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        VerdictCounts {
            ru: get(&self.ru),
            global: get(&self.global),
            manual: get(&self.manual),
            trash: get(&self.trash),
            aggregators: get(&self.aggregators),
            duplicates: get(&self.duplicates),
            dead: get(&self.dead),
            errors: get(&self.errors),
            valid_nodes: get(&self.valid_nodes),
        }
    }

    pub fn summary(&self, merged: &HashMap<Tag, MergeStats>) -> RunSummary {
        RunSummary::new(self.counts(), merged, Local::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub finished_at: String,
    pub ru: MergeStats,
    pub global: MergeStats,
    pub manual: MergeStats,
    pub verdicts: VerdictCounts,
    pub commit_message: String,
}

impl RunSummary {
    pub fn new(
        verdicts: VerdictCounts,
        merged: &HashMap<Tag, MergeStats>,
        at: DateTime<Local>,
    ) -> Self {
        let stats = |tag| merged.get(&tag).copied().unwrap_or_default();
        let ru = stats(Tag::Ru);
        let global = stats(Tag::Global);
        Self {
            finished_at: at.to_rfc3339(),
            ru,
            global,
            manual: stats(Tag::Manual),
            verdicts,
            commit_message: commit_message(at, ru.added, global.added),
        }
    }

    /// Append `COMMIT_MSG=<message>` to a CI output file.
    pub fn write_github_output(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "COMMIT_MSG={}", self.commit_message)?;
        Ok(())
    }
}

pub fn commit_message(at: DateTime<Local>, ru_added: usize, global_added: usize) -> String {
    format!(
        "Scout Update: {} (+{} RU, +{} Global)",
        at.format("%d-%m-%Y %H:%M"),
        ru_added,
        global_added
    )
}
