//! Workspace scanning for daily logs.
//!
//! Walks the memory directory recursively, pruning the generated
//! subdirectories (topic files, archives, caches, reports) and anything
//! dot-prefixed, and returns workspace-relative `.md` paths in lexicographic
//! order. Files whose name carries a `YYYY-MM-DD` date can additionally be
//! filtered to a date range; undated `.md` notes are always included.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use walkdir::WalkDir;

/// Directory names never descended into.
pub const EXCLUDED_DIR_NAMES: &[&str] = &[
    "Topics",
    "topics",
    "Archive",
    "archive",
    ".polish-cache",
    ".polish-reports",
];

fn is_excluded_dir(name: &str) -> bool {
    name.starts_with('.') || EXCLUDED_DIR_NAMES.contains(&name)
}

/// Parse the date out of a daily-log file name.
///
/// Accepts `memory-YYYY-MM-DD.md` and `YYYY-MM-DD.md`; anything else
/// (including calendar-invalid dates) yields `None`.
pub fn parse_log_date(file_name: &str) -> Option<NaiveDate> {
    let re = Regex::new(r"^(?:memory-)?(\d{4})-(\d{2})-(\d{2})\.md$").expect("static regex");
    let caps = re.captures(file_name)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Find daily logs under `dir`.
///
/// With `range = Some((start, end))`, dated files outside `[start, end]`
/// (inclusive) are dropped; undated files pass through unconditionally.
/// Returns paths relative to `dir`, sorted lexicographically.
pub fn find_daily_logs(
    dir: &Path,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<String>> {
    let mut logs = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            !is_excluded_dir(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(".md") {
            continue;
        }
        if let (Some((start, end)), Some(date)) = (range, parse_log_date(&name)) {
            if date < start || date > end {
                continue;
            }
        }

        let rel = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("path {} escapes {}", entry.path().display(), dir.display()))?;
        logs.push(rel.to_string_lossy().replace('\\', "/"));
    }

    logs.sort();
    Ok(logs)
}
