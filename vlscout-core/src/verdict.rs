use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a document was thrown away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrashReason {
    Blocked(String),
    HtmlPage,
    Empty,
    WeakWorker,
    Guide,
    MaxRecursion,
    NoValidEntries,
    NoNewEntries,
    HighBadRatio(f64),
    OracleRejected,
}

impl fmt::Display for TrashReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrashReason::Blocked(what) => write!(f, "blocked ({})", what),
            TrashReason::HtmlPage => write!(f, "html page"),
            TrashReason::Empty => write!(f, "empty"),
            TrashReason::WeakWorker => write!(f, "weak worker"),
            TrashReason::Guide => write!(f, "guide"),
            TrashReason::MaxRecursion => write!(f, "max recursion"),
            TrashReason::NoValidEntries => write!(f, "no valid entries"),
            TrashReason::NoNewEntries => write!(f, "no new entries"),
            TrashReason::HighBadRatio(ratio) => write!(f, "high bad ratio ({:.2})", ratio),
            TrashReason::OracleRejected => write!(f, "oracle-rejected"),
        }
    }
}

/// Outcome for one fetched document. Produced once, never revised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    Ru,
    Global,
    Trash(TrashReason),
    Aggregator(Vec<String>),
    Manual,
    Duplicate,
    Dead(u16),
    Error(String),
}

impl Verdict {
    pub fn tag(&self) -> &'static str {
        match self {
            Verdict::Ru => "RU",
            Verdict::Global => "GL",
            Verdict::Trash(_) => "TRASH",
            Verdict::Aggregator(_) => "AGGR",
            Verdict::Manual => "MANUAL",
            Verdict::Duplicate => "DUP",
            Verdict::Dead(_) => "DEAD",
            Verdict::Error(_) => "ERR",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Trash(reason) => write!(f, "TRASH: {}", reason),
            Verdict::Aggregator(links) => write!(f, "AGGR: {} links", links.len()),
            Verdict::Dead(status) => write!(f, "DEAD: {}", status),
            Verdict::Error(e) => write!(f, "ERR: {}", e),
            other => f.write_str(other.tag()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub verdict: Verdict,
    /// Entries counted for the first time by this document.
    pub valid_nodes: usize,
}

impl Classification {
    pub fn new(verdict: Verdict, valid_nodes: usize) -> Self {
        Self {
            verdict,
            valid_nodes,
        }
    }

    pub fn trash(reason: TrashReason) -> Self {
        Self::new(Verdict::Trash(reason), 0)
    }
}
