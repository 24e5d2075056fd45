//! Analysis output format.
//!
//! An analyzer answers with named sections terminated by a sentinel line:
//! - Sections: `## Section Name` followed by free-text lines
//! - Text before the first heading is ignored
//! - Parsing stops at a line reading `---END---`; anything after it is ignored

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use docweave_shared::Section;

/// Line marking the end of an analyzer's answer.
pub const END_SENTINEL: &str = "---END---";

// ---------------------------------------------------------------------------
// Well-known section names
// ---------------------------------------------------------------------------

pub const PROGRAMS: &str = "Programs";
pub const BATCH_VS_CICS: &str = "Batch vs CICS";
pub const COPYBOOKS_USED: &str = "Copybooks Used";
pub const IO_FILES: &str = "Input/Output Files";
pub const DATABASE_TABLES: &str = "Database Tables";
pub const CALLED_PROGRAMS: &str = "Called Programs";
pub const CALL_LINKAGES: &str = "Call Linkages";

/// Sections every analyzer is asked for, in report order.
pub const STANDARD_SECTIONS: [&str; 7] = [
    PROGRAMS,
    BATCH_VS_CICS,
    COPYBOOKS_USED,
    IO_FILES,
    DATABASE_TABLES,
    CALLED_PROGRAMS,
    CALL_LINKAGES,
];

/// Answer used when a single-answer section has nothing to say.
pub const UNKNOWN: &str = "Unknown";

/// Body of a list section with no entries.
pub const EMPTY_LIST: &str = "None.";

/// How a section's bodies combine across chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionPolicy {
    /// Line-wise union, deduplicated, first occurrence wins.
    List,
    /// One answer; the earliest informative one wins.
    Classification,
}

/// Policy for a section name (case-insensitive).
pub fn policy_for(name: &str) -> SectionPolicy {
    let classification = [BATCH_VS_CICS, IO_FILES, DATABASE_TABLES];
    if classification.iter().any(|c| c.eq_ignore_ascii_case(name.trim())) {
        SectionPolicy::Classification
    } else {
        SectionPolicy::List
    }
}

/// `None` / `None.` placeholder lines.
pub fn is_placeholder(line: &str) -> bool {
    let line = line.trim().trim_end_matches('.');
    line.eq_ignore_ascii_case("none")
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Matches `## Section Title`.
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+(.+?)\s*#*$").expect("heading regex"));

/// Parse an analyzer answer into sections, in heading order.
///
/// A heading repeated within one answer continues the earlier section.
pub fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<usize> = None;
    let mut terminated = false;

    for line in text.lines() {
        if line.trim() == END_SENTINEL {
            terminated = true;
            break;
        }

        if let Some(caps) = HEADING_RE.captures(line.trim()) {
            let name = caps[1].trim().to_string();
            let existing = sections
                .iter()
                .position(|s| s.name.eq_ignore_ascii_case(&name));
            current = Some(match existing {
                Some(index) => index,
                None => {
                    sections.push(Section::new(name, String::new()));
                    sections.len() - 1
                }
            });
            continue;
        }

        // Text before the first heading is preamble.
        let Some(index) = current else { continue };
        let body = &mut sections[index].body;
        if body.is_empty() && line.trim().is_empty() {
            continue;
        }
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str(line.trim_end());
    }

    if !terminated {
        debug!("analysis output has no end sentinel, using full text");
    }

    for section in &mut sections {
        let trimmed = section.body.trim_end().len();
        section.body.truncate(trimmed);
    }

    sections
}

/// Render sections back into the analysis output format, sentinel included.
pub fn render_sections(sections: &[Section]) -> String {
    let mut out = String::new();
    for section in sections {
        out.push_str("## ");
        out.push_str(&section.name);
        out.push('\n');
        if !section.body.is_empty() {
            out.push_str(&section.body);
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str(END_SENTINEL);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headings_and_stops_at_sentinel() {
        let text = "Sure, here is the analysis.\n\
                    ## Programs\n\
                    - MAIN (MAIN.cbl)\n\
                    \n\
                    ## Batch vs CICS\n\
                    Batch\n\
                    ---END---\n\
                    ## Ignored\n\
                    - trailing chatter\n";
        let sections = parse_sections(text);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "Programs");
        assert_eq!(sections[0].body, "- MAIN (MAIN.cbl)");
        assert_eq!(sections[1].name, "Batch vs CICS");
        assert_eq!(sections[1].body, "Batch");
    }

    #[test]
    fn keeps_inner_blank_lines_and_trims_edges() {
        let text = "## Copybooks Used\n\n- WS\n\n- DATES\n\n\n## Called Programs\n- SUB\n---END---";
        let sections = parse_sections(text);
        assert_eq!(sections[0].body, "- WS\n\n- DATES");
        assert_eq!(sections[1].body, "- SUB");
    }

    #[test]
    fn missing_sentinel_uses_whole_text() {
        let sections = parse_sections("## Programs\n- A (A.cbl)\n- B (B.cbl)");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].body, "- A (A.cbl)\n- B (B.cbl)");
    }

    #[test]
    fn repeated_heading_continues_section() {
        let sections = parse_sections("## Programs\n- A (A.cbl)\n## programs\n- B (B.cbl)\n---END---");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].body, "- A (A.cbl)\n- B (B.cbl)");
    }

    #[test]
    fn sentinel_must_be_its_own_line() {
        let sections = parse_sections("## Notes\nthe marker ---END--- inline\n---END---");
        assert_eq!(sections[0].body, "the marker ---END--- inline");
    }

    #[test]
    fn rendered_sections_parse_back() {
        let sections = vec![
            Section::new(PROGRAMS, "- A (A.cbl)"),
            Section::new(BATCH_VS_CICS, UNKNOWN),
            Section::new(CALLED_PROGRAMS, ""),
        ];
        let text = render_sections(&sections);
        assert!(text.ends_with("---END---\n"));
        assert_eq!(parse_sections(&text), sections);
    }

    #[test]
    fn policy_table() {
        assert_eq!(policy_for("Batch vs CICS"), SectionPolicy::Classification);
        assert_eq!(policy_for("database tables"), SectionPolicy::Classification);
        assert_eq!(policy_for(IO_FILES), SectionPolicy::Classification);
        assert_eq!(policy_for(PROGRAMS), SectionPolicy::List);
        assert_eq!(policy_for("Anything Else"), SectionPolicy::List);
    }

    #[test]
    fn placeholders() {
        assert!(is_placeholder("None."));
        assert!(is_placeholder("  none "));
        assert!(!is_placeholder("- None of the above"));
    }
}
