//! Line-based markdown section parsing.
//!
//! The contract is deliberately line-oriented rather than AST-based: the
//! update phase rewrites `[line_start, line_end]` spans in place, so the
//! spans recorded here must refer to the file exactly as read.
//!
//! A section header is any line matching `^(#{2,})\s+(.+)$`. A section runs
//! from its header line to the line before the next header (or end of
//! file), with trailing blank lines trimmed. Sections with no content below
//! the header are dropped. A file with content but no headers produces one
//! synthetic section covering the whole file, titled after the file name.

use regex::Regex;

/// One parsed section. `line_start`/`line_end` are 1-indexed and inclusive;
/// `content` includes the header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub index: usize,
    pub title: String,
    pub level: usize,
    pub line_start: usize,
    pub line_end: usize,
    pub content: String,
}

/// Split `text` into sections. `file_name` titles the synthetic section for
/// header-less files.
pub fn parse_sections(text: &str, file_name: &str) -> Vec<Section> {
    let header_re = Regex::new(r"^(#{2,})\s+(.+)$").expect("static regex");
    let lines: Vec<&str> = text.lines().collect();

    let mut headers: Vec<(usize, usize, String)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(caps) = header_re.captures(line) {
            headers.push((i, caps[1].len(), caps[2].trim().to_string()));
        }
    }

    if headers.is_empty() {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let last = last_non_blank_line(&lines, lines.len());
        let title = file_name
            .rsplit('/')
            .next()
            .unwrap_or(file_name)
            .trim_end_matches(".md")
            .to_string();
        return vec![Section {
            index: 0,
            title,
            level: 0,
            line_start: 1,
            line_end: last,
            content: lines[..last].join("\n"),
        }];
    }

    let mut sections = Vec::new();
    for (h, (start_line, level, title)) in headers.iter().enumerate() {
        let span_end = match headers.get(h + 1) {
            Some((next_start, _, _)) => *next_start,
            None => lines.len(),
        };
        let trimmed_end = last_non_blank_line(&lines, span_end);
        let body_is_empty = lines[start_line + 1..trimmed_end]
            .iter()
            .all(|l| l.trim().is_empty());
        if body_is_empty {
            continue;
        }

        sections.push(Section {
            index: sections.len(),
            title: title.clone(),
            level: *level,
            line_start: start_line + 1,
            line_end: trimmed_end,
            content: lines[*start_line..trimmed_end].join("\n"),
        });
    }
    sections
}

/// 1-indexed line number of the last non-blank line at or before `limit`
/// (a 0-indexed exclusive bound); 0 when every line in range is blank.
fn last_non_blank_line(lines: &[&str], limit: usize) -> usize {
    let mut end = limit;
    while end > 0 && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_level_two_headers_with_line_spans() {
        let text = "# Journal\n\n## Morning Routine\n#health\nran 5k\n\n## Trading Analysis\n#trading #python\nbacktest notes\n";
        let sections = parse_sections(text, "memory-2026-02-05.md");

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "Morning Routine");
        assert_eq!(sections[0].level, 2);
        assert_eq!(sections[0].line_start, 3);
        assert_eq!(sections[0].line_end, 5);
        assert_eq!(sections[0].content, "## Morning Routine\n#health\nran 5k");

        assert_eq!(sections[1].title, "Trading Analysis");
        assert_eq!(sections[1].line_start, 7);
        assert_eq!(sections[1].line_end, 9);
    }

    #[test]
    fn top_level_heading_is_not_a_section_boundary() {
        let text = "# Title only\nintro prose\n";
        let sections = parse_sections(text, "notes.md");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "notes");
        assert_eq!(sections[0].level, 0);
        assert_eq!(sections[0].line_start, 1);
        assert_eq!(sections[0].line_end, 2);
    }

    #[test]
    fn trailing_blank_lines_are_trimmed_from_spans() {
        let text = "## A\nbody\n\n\n\n## B\nmore\n";
        let sections = parse_sections(text, "x.md");
        assert_eq!(sections[0].line_start, 1);
        assert_eq!(sections[0].line_end, 2);
        assert_eq!(sections[0].content, "## A\nbody");
    }

    #[test]
    fn empty_sections_are_dropped_and_indexes_stay_dense() {
        let text = "## Empty\n\n## Full\ncontent\n## Also Empty\n\n\n";
        let sections = parse_sections(text, "x.md");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].index, 0);
        assert_eq!(sections[0].title, "Full");
    }

    #[test]
    fn blank_file_yields_no_sections() {
        assert!(parse_sections("", "x.md").is_empty());
        assert!(parse_sections("\n\n  \n", "x.md").is_empty());
    }

    #[test]
    fn deeper_headers_also_delimit_sections() {
        let text = "### Deep One\na\n#### Deeper\nb\n";
        let sections = parse_sections(text, "x.md");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].level, 3);
        assert_eq!(sections[1].level, 4);
    }
}
