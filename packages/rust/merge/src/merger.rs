//! Result merger: folds per-chunk partial results, in chunk order, into one
//! deduplicated result whose structured record is re-derived from its text.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use docweave_shared::{DocweaveError, PartialResult, Result, Section, find_section};

use crate::sections::{EMPTY_LIST, SectionPolicy, UNKNOWN, is_placeholder, policy_for};
use crate::structured::{StructuredRecord, reparse};

/// The run's canonical output: narrative sections plus the record parsed
/// from them.
///
/// Fields are private so the record can only come from the sections.
/// Deserializing reads the sections alone and re-parses the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredResult")]
pub struct MergedResult {
    sections: Vec<Section>,
    structured: StructuredRecord,
}

/// On-disk shape read back from `result.json`; any stored record is ignored.
#[derive(Deserialize)]
struct StoredResult {
    sections: Vec<Section>,
}

impl From<StoredResult> for MergedResult {
    fn from(stored: StoredResult) -> Self {
        Self::from_sections(stored.sections)
    }
}

impl MergedResult {
    /// Build a result from final section text.
    pub fn from_sections(sections: Vec<Section>) -> Self {
        let structured = reparse(&sections);
        Self {
            sections,
            structured,
        }
    }

    /// Result of a run over an empty corpus.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        find_section(&self.sections, name)
    }

    pub fn structured(&self) -> &StructuredRecord {
        &self.structured
    }

    pub fn dropped_lines(&self) -> usize {
        self.structured.dropped_lines.len()
    }
}

/// Merge partial results in the order given, which must be chunk order.
///
/// Fails only when `partials` is empty.
#[instrument(skip_all, fields(partials = partials.len()))]
pub fn merge(partials: &[PartialResult]) -> Result<MergedResult> {
    if partials.is_empty() {
        return Err(DocweaveError::EmptyMerge);
    }

    let names = section_names(partials);
    let mut sections = Vec::with_capacity(names.len());

    for name in names {
        let bodies: Vec<&str> = partials
            .iter()
            .filter_map(|p| p.section(&name))
            .map(|s| s.body.as_str())
            .collect();

        let body = match policy_for(&name) {
            SectionPolicy::List => merge_list(&bodies),
            SectionPolicy::Classification => merge_classification(&bodies),
        };
        debug!(section = %name, inputs = bodies.len(), "section merged");
        sections.push(Section::new(name, body));
    }

    let merged = MergedResult::from_sections(sections);
    info!(
        sections = merged.sections.len(),
        programs = merged.structured.programs.len(),
        dropped_lines = merged.dropped_lines(),
        "partial results merged"
    );
    Ok(merged)
}

/// Section names in order of first appearance; the first spelling wins.
fn section_names(partials: &[PartialResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    partials
        .iter()
        .flat_map(|p| p.sections.iter())
        .filter(|s| seen.insert(s.name.to_lowercase()))
        .map(|s| s.name.clone())
        .collect()
}

/// Union of lines, deduplicated case-insensitively with first occurrence
/// winning. Blank lines separate paragraphs; runs of them collapse to one.
pub fn merge_list(bodies: &[&str]) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut lines: Vec<&str> = Vec::new();
    let mut pending_break = false;

    for body in bodies {
        for line in body.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                pending_break = !lines.is_empty();
                continue;
            }
            if is_placeholder(trimmed) || !seen.insert(trimmed.to_lowercase()) {
                continue;
            }
            if pending_break {
                lines.push("");
                pending_break = false;
            }
            lines.push(line.trim_end());
        }
    }

    if lines.is_empty() {
        EMPTY_LIST.to_string()
    } else {
        lines.join("\n")
    }
}

/// First answer that is present and not `Unknown`; else the first non-empty
/// answer; else `Unknown`.
pub fn merge_classification(bodies: &[&str]) -> String {
    let answers: Vec<&str> = bodies
        .iter()
        .map(|b| b.trim())
        .filter(|b| !b.is_empty())
        .collect();

    answers
        .iter()
        .find(|a| !is_unknown(a))
        .or_else(|| answers.first())
        .map_or_else(|| UNKNOWN.to_string(), |a| a.to_string())
}

fn is_unknown(answer: &str) -> bool {
    answer.trim_end_matches('.').eq_ignore_ascii_case(UNKNOWN)
}
