//! The parsed configuration record.
//!
//! The CLI owns file loading and flag overrides; the pipeline consumes this
//! already-parsed record. Every group has serde defaults so a missing
//! config file means "all defaults"; unknown keys are rejected at parse
//! time so typos fail preflight instead of silently doing nothing.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use polish_similarity::SimilarityMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Mechanical,
    Enhanced,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TopicSimilarityConfig {
    pub method: SimilarityMethod,
    pub threshold: f64,
    /// `"auto"` or an explicit model name.
    pub model: String,
    pub dimensions: usize,
}

impl Default for TopicSimilarityConfig {
    fn default() -> Self {
        Self {
            method: SimilarityMethod::Levenshtein,
            threshold: 0.8,
            model: "auto".to_string(),
            dimensions: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AdvancedConfig {
    pub lookback_days: i64,
    pub min_tag_frequency: usize,
    pub topics_directory: String,
    pub archive_directory: String,
    pub cache_directory: String,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            min_tag_frequency: 2,
            topics_directory: "Topics".to_string(),
            archive_directory: "Archive".to_string(),
            cache_directory: ".polish-cache".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub grace_period_days: i64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_period_days: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RecoveryConfig {
    pub enable_checkpoints: bool,
    pub checkpoint_file: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enable_checkpoints: true,
            checkpoint_file: "checkpoint.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub report_location: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            report_location: ".polish-reports".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceConfig {
    pub batch_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CleanupConfig {
    pub auto_cleanup: bool,
    /// Hours, not days.
    pub keep_session_cache_hours: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            auto_cleanup: true,
            keep_session_cache_hours: 168,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PolishConfig {
    pub execution_mode: ExecutionMode,
    pub topic_similarity: TopicSimilarityConfig,
    /// Ordered rules: `[preferred, alt1, alt2, …]`.
    pub synonyms: Vec<Vec<String>>,
    pub advanced: AdvancedConfig,
    pub archive: ArchiveConfig,
    pub recovery: RecoveryConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub cleanup: CleanupConfig,
}

impl PolishConfig {
    /// The similarity method this run should use: `enhanced` execution mode
    /// implies embeddings even when `topic_similarity.method` was left at
    /// its default.
    pub fn effective_method(&self) -> SimilarityMethod {
        if self.execution_mode == ExecutionMode::Enhanced {
            SimilarityMethod::Embedding
        } else {
            self.topic_similarity.method
        }
    }

    /// Preflight validation; failures abort before any change is made.
    pub fn validate(&self) -> Result<()> {
        let t = self.topic_similarity.threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(anyhow!("topic_similarity.threshold must be in (0, 1], got {t}"));
        }
        if self.advanced.lookback_days < 1 {
            return Err(anyhow!(
                "advanced.lookback_days must be at least 1, got {}",
                self.advanced.lookback_days
            ));
        }
        if self.advanced.min_tag_frequency < 1 {
            return Err(anyhow!("advanced.min_tag_frequency must be at least 1"));
        }
        if self.archive.grace_period_days < 0 {
            return Err(anyhow!("archive.grace_period_days must not be negative"));
        }
        if self.performance.batch_size < 1 {
            return Err(anyhow!("performance.batch_size must be at least 1"));
        }
        for (key, value) in [
            ("advanced.topics_directory", &self.advanced.topics_directory),
            ("advanced.archive_directory", &self.advanced.archive_directory),
            ("advanced.cache_directory", &self.advanced.cache_directory),
            ("recovery.checkpoint_file", &self.recovery.checkpoint_file),
            ("logging.report_location", &self.logging.report_location),
        ] {
            if value.is_empty()
                || value.contains("..")
                || value.contains('/')
                || value.contains('\\')
            {
                return Err(anyhow!("{key} must be a plain directory or file name, got {value:?}"));
            }
        }
        for rule in &self.synonyms {
            if rule.len() < 2 {
                return Err(anyhow!("synonym rules need at least two entries, got {rule:?}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PolishConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.advanced.lookback_days, 7);
        assert_eq!(config.advanced.min_tag_frequency, 2);
        assert_eq!(config.archive.grace_period_days, 3);
        assert_eq!(config.topic_similarity.threshold, 0.8);
        assert_eq!(config.performance.batch_size, 10);
    }

    #[test]
    fn empty_json_object_parses_to_defaults() {
        let config: PolishConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config, PolishConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = serde_json::from_str::<PolishConfig>(r#"{"archve": {"enabled": false}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn nested_overrides_parse() {
        let config: PolishConfig = serde_json::from_str(
            r#"{
                "execution_mode": "enhanced",
                "topic_similarity": {"method": "embedding", "threshold": 0.75},
                "synonyms": [["trading", "trade", "trades"]],
                "advanced": {"lookback_days": 14}
            }"#,
        )
        .expect("parse");
        assert_eq!(config.execution_mode, ExecutionMode::Enhanced);
        assert_eq!(config.topic_similarity.method, SimilarityMethod::Embedding);
        assert_eq!(config.topic_similarity.threshold, 0.75);
        assert_eq!(config.advanced.lookback_days, 14);
        // Untouched groups keep defaults.
        assert_eq!(config.archive.grace_period_days, 3);
    }

    #[test]
    fn path_traversal_in_directory_names_fails_preflight() {
        let mut config = PolishConfig::default();
        config.advanced.topics_directory = "../outside".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn enhanced_mode_implies_embedding_method() {
        let mut config = PolishConfig::default();
        assert_eq!(config.effective_method(), SimilarityMethod::Levenshtein);
        config.execution_mode = ExecutionMode::Enhanced;
        assert_eq!(config.effective_method(), SimilarityMethod::Embedding);
    }

    #[test]
    fn out_of_range_threshold_fails_preflight() {
        let mut config = PolishConfig::default();
        config.topic_similarity.threshold = 1.5;
        assert!(config.validate().is_err());
        config.topic_similarity.threshold = 0.0;
        assert!(config.validate().is_err());
    }
}
