use crate::error::{Result, ScoutError};
use crate::tables::Tables;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use vlscout_scanner::{FetcherConfig, LinkConfig};

/// Thresholds of the classification chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// URI prefix of the config entries being hunted.
    pub scheme_marker: String,
    /// Hops past the seed set an aggregator may be expanded.
    pub max_recursion_depth: usize,
    /// Listing links needed before a document counts as an aggregator.
    pub aggregator_threshold: usize,
    pub guide_phrase_threshold: usize,
    /// Bad ratio below which a document is clean.
    pub clean_ratio: f64,
    /// Bad ratio above which a document is trash.
    pub trash_ratio: f64,
    /// Characters assumed per line when estimating line count.
    pub line_length_estimate: f64,
    /// Multiplier applied to the bad ratio when an allowlist marker is present.
    pub allowlist_boost: f64,
    pub min_distinct_credential_chars: usize,
    pub min_content_len: usize,
    pub oracle_snippet_len: usize,
    pub digest_prefix: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            scheme_marker: "vless://".to_string(),
            max_recursion_depth: 1,
            aggregator_threshold: 3,
            guide_phrase_threshold: 2,
            clean_ratio: 0.3,
            trash_ratio: 0.8,
            line_length_estimate: 150.0,
            allowlist_boost: 0.5,
            min_distinct_credential_chars: 5,
            min_content_len: 50,
            oracle_snippet_len: 800,
            digest_prefix: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub workers: usize,
    pub oracle_concurrency: usize,
    pub fetcher: FetcherConfig,
    pub classifier: ClassifierConfig,
    pub links: LinkConfig,
    pub tables: Tables,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            oracle_concurrency: 2,
            fetcher: FetcherConfig::default(),
            classifier: ClassifierConfig::default(),
            links: LinkConfig::default(),
            tables: Tables::default(),
        }
    }
}

impl ScoutConfig {
    /// Load a JSON config; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ScoutConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.classifier;
        if self.workers == 0 {
            return Err(ScoutError::Config("workers must be at least 1".to_string()));
        }
        if self.oracle_concurrency == 0 {
            return Err(ScoutError::Config("oracle_concurrency must be at least 1".to_string()));
        }
        if self.oracle_concurrency > self.workers {
            return Err(ScoutError::Config(
                "oracle_concurrency must not exceed workers".to_string(),
            ));
        }
        if c.clean_ratio > c.trash_ratio {
            return Err(ScoutError::Config(format!(
                "clean_ratio ({}) exceeds trash_ratio ({})",
                c.clean_ratio, c.trash_ratio
            )));
        }
        if c.line_length_estimate <= 0.0 {
            return Err(ScoutError::Config("line_length_estimate must be positive".to_string()));
        }
        if !(c.allowlist_boost > 0.0 && c.allowlist_boost <= 1.0) {
            return Err(ScoutError::Config("allowlist_boost must be in (0, 1]".to_string()));
        }
        if c.scheme_marker.is_empty() {
            return Err(ScoutError::Config("scheme_marker must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ScoutConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"workers": 4, "classifier": {{"max_recursion_depth": 2}}, "tables": {{"allowlist": ["example.ru"]}}}}"#
        )
        .unwrap();

        let config = ScoutConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.classifier.max_recursion_depth, 2);
        assert_eq!(config.classifier.aggregator_threshold, 3);
        assert_eq!(config.tables.allowlist, vec!["example.ru"]);
        assert!(!config.tables.blocked_keywords.is_empty());
    }

    #[test]
    fn test_inverted_ratios_rejected() {
        let mut config = ScoutConfig::default();
        config.classifier.clean_ratio = 0.9;
        assert!(matches!(config.validate(), Err(ScoutError::Config(_))));
    }
}
