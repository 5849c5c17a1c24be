//! External judgment for documents the heuristics cannot settle.

use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub const DEFAULT_HF_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleVerdict {
    Ru,
    Global,
    Spam,
    Guide,
    Unknown,
}

impl OracleVerdict {
    /// Map free-form model output to a verdict by whole-word match.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

        if has(&["spam", "junk"]) {
            OracleVerdict::Spam
        } else if has(&["guide", "tutorial"]) {
            OracleVerdict::Guide
        } else if has(&["ru", "russian"]) {
            OracleVerdict::Ru
        } else if has(&["global"]) {
            OracleVerdict::Global
        } else {
            OracleVerdict::Unknown
        }
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;

    async fn judge(&self, snippet: &str) -> Result<OracleVerdict>;
}

/// Used when no oracle is configured; every suspect goes to manual review.
pub struct DisabledOracle;

#[async_trait]
impl Oracle for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn judge(&self, _snippet: &str) -> Result<OracleVerdict> {
        Ok(OracleVerdict::Unknown)
    }
}

#[derive(Serialize)]
struct InferenceRequest {
    inputs: String,
    parameters: InferenceParameters,
}

#[derive(Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    return_full_text: bool,
}

#[derive(Deserialize)]
struct Generation {
    generated_text: String,
}

/// Text-generation model behind the HuggingFace inference API.
pub struct HuggingFaceOracle {
    client: Client,
    endpoint: String,
    token: String,
    max_new_tokens: u32,
}

impl HuggingFaceOracle {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(token, DEFAULT_HF_ENDPOINT)
    }

    pub fn with_endpoint(token: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
            max_new_tokens: 20,
        })
    }

    fn prompt(snippet: &str) -> String {
        format!(
            "Analyze this VPN config list.\n\
             Does it contain mostly Russian services (RU), Global services, Spam/Junk, or an instructional Guide?\n\
             Answer one word: 'Global', 'RU', 'Spam' or 'Guide'.\n\
             Snippet: {}\n",
            snippet
        )
    }
}

#[async_trait]
impl Oracle for HuggingFaceOracle {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn judge(&self, snippet: &str) -> Result<OracleVerdict> {
        let request = InferenceRequest {
            inputs: Self::prompt(snippet),
            parameters: InferenceParameters {
                max_new_tokens: self.max_new_tokens,
                return_full_text: false,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoutError::Oracle(format!("inference endpoint returned {}", status)));
        }

        let generations: Vec<Generation> = response.json().await?;
        let text = generations
            .first()
            .map(|g| g.generated_text.as_str())
            .ok_or_else(|| ScoutError::Oracle("empty generation list".to_string()))?;

        debug!("Oracle answered {:?}", text.trim());
        Ok(OracleVerdict::from_text(text))
    }
}

/// Bounds concurrent oracle calls and folds every failure into `Unknown`.
pub struct OracleGate {
    oracle: Arc<dyn Oracle>,
    permits: Semaphore,
    snippet_len: usize,
}

impl OracleGate {
    pub fn new(oracle: Arc<dyn Oracle>, concurrency: usize, snippet_len: usize) -> Self {
        Self {
            oracle,
            permits: Semaphore::new(concurrency.max(1)),
            snippet_len,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledOracle), 1, 0)
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    pub async fn judge(&self, text: &str) -> OracleVerdict {
        let snippet: String = text.chars().take(self.snippet_len).collect();

        let Ok(_permit) = self.permits.acquire().await else {
            return OracleVerdict::Unknown;
        };

        match self.oracle.judge(&snippet).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Oracle {} failed: {}", self.oracle.name(), e);
                OracleVerdict::Unknown
            }
        }
    }
}
