use serde::{Deserialize, Serialize};

/// A successfully fetched document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedDocument {
    pub url: String,
    pub status_code: u16,
    pub body: String,
}

/// What a single fetch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FetchOutcome {
    Content(FetchedDocument),
    /// URL already claimed, or body identical to an earlier document.
    Duplicate,
    /// Non-success status code.
    Dead(u16),
    /// Transport failure or exhausted rate-limit retries.
    Error(String),
}

impl FetchOutcome {
    pub fn is_content(&self) -> bool {
        matches!(self, FetchOutcome::Content(_))
    }
}
