//! Structured record derived from merged section text.
//!
//! Each list section is read line by line against a small table of named line
//! patterns. A line no pattern recognizes is dropped from the record, counted,
//! and logged; it stays in the narrative text.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use docweave_shared::{Section, find_section};

use crate::sections::{
    BATCH_VS_CICS, CALL_LINKAGES, CALLED_PROGRAMS, COPYBOOKS_USED, DATABASE_TABLES, IO_FILES,
    PROGRAMS, is_placeholder,
};

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// A program and the file declaring it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub name: String,
    pub path: String,
}

/// One caller → callee relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub callee: String,
}

/// A line no pattern recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedLine {
    pub section: String,
    pub line: String,
}

/// Machine-readable view of a merged result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub programs: Vec<ProgramRecord>,
    pub copybooks: Vec<String>,
    /// Every name appearing in a call statement, resolved or not.
    pub called_names: Vec<String>,
    pub calls: Vec<CallEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_files: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_tables: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_lines: Vec<DroppedLine>,
}

// ---------------------------------------------------------------------------
// Line patterns
// ---------------------------------------------------------------------------

/// What one line of a list section parsed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Program { name: String, path: String },
    Name(String),
    Linkage {
        caller: String,
        path: Option<String>,
        callees: Vec<String>,
    },
}

/// Outcome of matching one line against a section's pattern table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Recognized(Record),
    Unrecognized(String),
}

/// `- NAME (path)`
static PROGRAM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-*]\s+([A-Za-z0-9_$#@-]+)\.?\s+\(([^()]+)\)\s*$").expect("program line regex")
});

/// `- CALLER (path) calls: A, B` with the path optional.
static LINKAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[-*]\s+([A-Za-z0-9_$#@-]+)(?:\s+\(([^()]+)\))?\s+calls:\s*(.+?)\s*$")
        .expect("linkage line regex")
});

/// `- NAME`
static NAME_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-*]\s+([A-Za-z0-9_$#@-]+)\.?\s*$").expect("name line regex")
});

#[derive(Debug, Clone, Copy)]
enum LineShape {
    Program,
    Linkage,
    Name,
}

impl LineShape {
    fn regex(self) -> &'static Regex {
        match self {
            Self::Program => &PROGRAM_LINE,
            Self::Linkage => &LINKAGE_LINE,
            Self::Name => &NAME_LINE,
        }
    }

    fn parse(self, line: &str) -> Option<Record> {
        let caps = self.regex().captures(line)?;
        let record = match self {
            Self::Program => Record::Program {
                name: caps[1].to_string(),
                path: caps[2].trim().to_string(),
            },
            Self::Name => Record::Name(caps[1].to_string()),
            Self::Linkage => {
                let callees: Vec<String> = caps[3]
                    .split(',')
                    .map(|c| c.trim().trim_end_matches('.').to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                if callees.is_empty() {
                    return None;
                }
                Record::Linkage {
                    caller: caps[1].to_string(),
                    path: caps.get(2).map(|m| m.as_str().trim().to_string()),
                    callees,
                }
            }
        };
        Some(record)
    }
}

/// Patterns tried, in priority order, for lines of a structured section.
/// `None` for sections that stay narrative only.
fn shapes_for(section: &str) -> Option<&'static [LineShape]> {
    let is = |name: &str| section.eq_ignore_ascii_case(name);
    if is(PROGRAMS) {
        Some(&[LineShape::Program])
    } else if is(COPYBOOKS_USED) || is(CALLED_PROGRAMS) {
        Some(&[LineShape::Name])
    } else if is(CALL_LINKAGES) {
        Some(&[LineShape::Linkage])
    } else {
        None
    }
}

/// Match one non-blank line of `section` against its pattern table.
pub fn parse_line(section: &str, line: &str) -> ParsedLine {
    let trimmed = line.trim();
    shapes_for(section)
        .into_iter()
        .flatten()
        .find_map(|shape| shape.parse(trimmed))
        .map_or_else(|| ParsedLine::Unrecognized(trimmed.to_string()), ParsedLine::Recognized)
}

// ---------------------------------------------------------------------------
// Re-parse
// ---------------------------------------------------------------------------

/// Derive the structured record from section text. Pure; never fails.
pub fn reparse(sections: &[Section]) -> StructuredRecord {
    let mut record = StructuredRecord::default();
    let mut seen_calls: BTreeSet<(String, String)> = BTreeSet::new();

    for section in sections {
        if shapes_for(&section.name).is_none() {
            continue;
        }
        for line in section.body.lines() {
            if line.trim().is_empty() || is_placeholder(line) {
                continue;
            }
            match parse_line(&section.name, line) {
                ParsedLine::Recognized(Record::Program { name, path }) => {
                    record.programs.push(ProgramRecord { name, path });
                }
                ParsedLine::Recognized(Record::Name(name)) => {
                    if section.name.eq_ignore_ascii_case(COPYBOOKS_USED) {
                        record.copybooks.push(name);
                    } else {
                        record.called_names.push(name);
                    }
                }
                ParsedLine::Recognized(Record::Linkage {
                    caller,
                    path,
                    callees,
                }) => {
                    for callee in callees {
                        let key = (caller.to_uppercase(), callee.to_uppercase());
                        if seen_calls.insert(key) {
                            record.calls.push(CallEdge {
                                caller: caller.clone(),
                                path: path.clone(),
                                callee,
                            });
                        }
                    }
                }
                ParsedLine::Unrecognized(raw) => {
                    warn!(section = %section.name, line = %raw, "dropping unrecognized result line");
                    record.dropped_lines.push(DroppedLine {
                        section: section.name.clone(),
                        line: raw,
                    });
                }
            }
        }
    }

    record.classification = single_answer(sections, BATCH_VS_CICS);
    record.io_files = single_answer(sections, IO_FILES);
    record.db_tables = single_answer(sections, DATABASE_TABLES);

    record
}

fn single_answer(sections: &[Section], name: &str) -> Option<String> {
    find_section(sections, name).map(|s| s.body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_each_line_shape() {
        assert_eq!(
            parse_line(PROGRAMS, "- PAYROLL (src/PAYROLL.cbl)"),
            ParsedLine::Recognized(Record::Program {
                name: "PAYROLL".into(),
                path: "src/PAYROLL.cbl".into()
            })
        );
        assert_eq!(
            parse_line(COPYBOOKS_USED, "- WS-DATE"),
            ParsedLine::Recognized(Record::Name("WS-DATE".into()))
        );
        assert_eq!(
            parse_line(CALL_LINKAGES, "- MAIN (MAIN.cbl) calls: SUB, DATEUTIL"),
            ParsedLine::Recognized(Record::Linkage {
                caller: "MAIN".into(),
                path: Some("MAIN.cbl".into()),
                callees: vec!["SUB".into(), "DATEUTIL".into()],
            })
        );
        assert_eq!(
            parse_line(CALL_LINKAGES, "* MAIN CALLS: SUB."),
            ParsedLine::Recognized(Record::Linkage {
                caller: "MAIN".into(),
                path: None,
                callees: vec!["SUB".into()],
            })
        );
    }

    #[test]
    fn unrecognized_lines_are_tagged_not_fatal() {
        assert_eq!(
            parse_line(PROGRAMS, "MAIN is the entry point"),
            ParsedLine::Unrecognized("MAIN is the entry point".into())
        );
        assert!(matches!(
            parse_line(CALL_LINKAGES, "- MAIN (MAIN.cbl) calls:"),
            ParsedLine::Unrecognized(_)
        ));
    }

    #[test]
    fn reparse_builds_record_and_counts_drops() {
        let sections = vec![
            Section::new(PROGRAMS, "- MAIN (MAIN.cbl)\nthis line is chatter\n\n- SUB (SUB.cbl)"),
            Section::new(BATCH_VS_CICS, "Batch"),
            Section::new(COPYBOOKS_USED, "- WS"),
            Section::new(CALLED_PROGRAMS, "- SUB\n- EXTERNALSVC"),
            Section::new(
                CALL_LINKAGES,
                "- MAIN (MAIN.cbl) calls: SUB\n- MAIN (MAIN.cbl) calls: SUB, WORKER",
            ),
            Section::new("Notes", "free text is never parsed"),
        ];
        let record = reparse(&sections);

        assert_eq!(record.programs.len(), 2);
        assert_eq!(record.programs[1].name, "SUB");
        assert_eq!(record.copybooks, vec!["WS"]);
        assert_eq!(record.called_names, vec!["SUB", "EXTERNALSVC"]);
        let callees: Vec<_> = record
            .calls
            .iter()
            .filter(|e| e.caller == "MAIN")
            .map(|e| e.callee.as_str())
            .collect();
        assert_eq!(callees, vec!["SUB", "WORKER"]);
        assert_eq!(record.classification.as_deref(), Some("Batch"));
        assert_eq!(record.io_files, None);
        assert_eq!(record.dropped_lines.len(), 1);
        assert_eq!(record.dropped_lines[0].section, PROGRAMS);
        assert_eq!(record.dropped_lines[0].line, "this line is chatter");
    }

    #[test]
    fn placeholders_are_neither_records_nor_drops() {
        let sections = vec![
            Section::new(COPYBOOKS_USED, "None."),
            Section::new(CALL_LINKAGES, "None"),
        ];
        let record = reparse(&sections);
        assert!(record.copybooks.is_empty());
        assert!(record.calls.is_empty());
        assert!(record.dropped_lines.is_empty());
    }
}
