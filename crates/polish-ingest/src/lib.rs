//! Daily-log ingestion for memory-polish.
//!
//! This crate owns everything that reads the workspace without changing it:
//!
//! - `scanner`: locate daily logs (recursively, skipping generated
//!   directories) with an optional date-range filter,
//! - `sections`: split a markdown file into `##+`-delimited sections with
//!   exact 1-indexed line spans (the update phase replaces those spans, so
//!   they must be stable between extraction and replacement),
//! - `hashtags`: find and validate `#tag` occurrences with surrounding
//!   context.
//!
//! The `Extraction` record (one section copied out of a daily log,
//! addressed by the SHA-256 of its content) is defined here because it is
//! the ingestion layer's output contract; the pipeline phases construct,
//! persist and consume it.

use serde::{Deserialize, Serialize};

pub mod hashtags;
pub mod scanner;
pub mod sections;

pub use hashtags::{detect_tags, extract_hashtags, normalize_tag, HashtagOccurrence, TagStats};
pub use scanner::{find_daily_logs, parse_log_date};
pub use sections::{parse_sections, Section};

/// A content-addressed record of one section extracted from a daily log.
///
/// `id` is `YYYYMMDD-NN`: the log's date (file-name date, or the run date
/// for undated files) plus the zero-padded section index within the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Extraction {
    pub id: String,
    pub source_file: String,
    pub source_line_start: usize,
    pub source_line_end: usize,
    pub section_title: String,
    pub primary_topic: String,
    pub secondary_topics: Vec<String>,
    pub full_content: String,
    pub content_hash: String,
    pub extracted_at: String,
}

impl Extraction {
    /// Build the `YYYYMMDD-NN` extraction id.
    pub fn make_id(date: chrono::NaiveDate, section_index: usize) -> String {
        format!("{}-{:02}", date.format("%Y%m%d"), section_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_id_is_dated_and_zero_padded() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 2, 5).expect("date");
        assert_eq!(Extraction::make_id(date, 0), "20260205-00");
        assert_eq!(Extraction::make_id(date, 12), "20260205-12");
    }
}
