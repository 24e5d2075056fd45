//! Core domain types shared by the planner, merger and pipeline.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the run manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Source units
// ---------------------------------------------------------------------------

/// Kind of a corpus file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// A callable, entry-point-like unit.
    Program,
    /// A shared definition pulled in by include statements.
    Copybook,
}

impl UnitKind {
    /// Packing rank: copybooks are placed before programs.
    pub fn pack_rank(self) -> u8 {
        match self {
            Self::Copybook => 0,
            Self::Program => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Program => "program",
            Self::Copybook => "copybook",
        }
    }
}

/// One file of the corpus. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Path relative to the corpus root, `/`-separated.
    pub id: String,
    /// Full text content.
    pub content: String,
    pub kind: UnitKind,
}

impl SourceUnit {
    pub fn new(id: impl Into<String>, content: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            kind,
        }
    }

    /// Size counted against the chunk budget.
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Upper-cased file stem, used as the symbolic name of the unit.
    pub fn stem(&self) -> String {
        unit_stem(&self.id)
    }
}

/// Upper-cased file stem of a unit id (`src/PAYROLL.cbl` → `PAYROLL`).
pub fn unit_stem(id: &str) -> String {
    let file = id.rsplit(['/', '\\']).next().unwrap_or(id);
    let stem = match file.rfind('.') {
        Some(0) | None => file,
        Some(pos) => &file[..pos],
    };
    stem.to_uppercase()
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// A size-bounded, ordered bundle of whole units sent as one analysis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the plan; also the merge order.
    pub index: usize,
    /// Member unit ids in payload order.
    pub units: Vec<String>,
    /// Sum of member content sizes.
    pub total_size: usize,
    /// True when a single unit alone exceeds the budget.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub oversized: bool,
}

impl Chunk {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            units: Vec::new(),
            total_size: 0,
            oversized: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.iter().any(|u| u == id)
    }
}

/// Relationships crossing a chunk boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkContext {
    pub chunk: usize,
    /// Units in other chunks that reference a unit inside this chunk.
    pub external_callers: BTreeSet<String>,
    /// Units in other chunks referenced from inside this chunk.
    pub external_callees: BTreeSet<String>,
}

impl ChunkContext {
    pub fn is_isolated(&self) -> bool {
        self.external_callers.is_empty() && self.external_callees.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Analysis results
// ---------------------------------------------------------------------------

/// A named block of free-text lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub body: String,
}

impl Section {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Look up a section by name (case-insensitive).
pub fn find_section<'a>(sections: &'a [Section], name: &str) -> Option<&'a Section> {
    sections.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

/// The sections produced by analyzing one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResult {
    pub chunk: usize,
    pub sections: Vec<Section>,
}

impl PartialResult {
    pub fn section(&self, name: &str) -> Option<&Section> {
        find_section(&self.sections, name)
    }
}

// ---------------------------------------------------------------------------
// RunManifest
// ---------------------------------------------------------------------------

/// The `manifest.json` structure stored at the root of each run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    pub run_id: RunId,
    /// Corpus root that was analyzed.
    pub corpus_root: String,
    /// Tool version that produced this run.
    pub tool_version: String,
    /// Analyzer backend identifier (e.g. `inventory`, `ollama:llama3`).
    pub analyzer: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub unit_count: usize,
    pub chunk_count: usize,
    pub budget: usize,
    /// Symbolic names that matched no unit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
    /// Chunks holding a single unit larger than the budget.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub oversized_chunks: Vec<usize>,
    /// Result lines no structured pattern recognized.
    #[serde(default)]
    pub dropped_lines: usize,
    #[serde(default)]
    pub cache_hits: usize,
    #[serde(default)]
    pub cache_misses: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn stem_strips_directories_and_extension() {
        assert_eq!(unit_stem("src/batch/PAYROLL.cbl"), "PAYROLL");
        assert_eq!(unit_stem("copy\\ws-date.cpy"), "WS-DATE");
        assert_eq!(unit_stem("NOEXT"), "NOEXT");
        assert_eq!(unit_stem(".hidden"), ".HIDDEN");
    }

    #[test]
    fn copybooks_rank_before_programs() {
        assert!(UnitKind::Copybook.pack_rank() < UnitKind::Program.pack_rank());
    }

    #[test]
    fn oversized_flag_is_omitted_when_false() {
        let mut chunk = Chunk::new(0);
        chunk.units.push("A.cbl".into());
        let json = serde_json::to_string(&chunk).expect("serialize");
        assert!(!json.contains("oversized"));

        chunk.oversized = true;
        let json = serde_json::to_string(&chunk).expect("serialize");
        let parsed: Chunk = serde_json::from_str(&json).expect("deserialize");
        assert!(parsed.oversized);
    }

    #[test]
    fn section_lookup_ignores_case() {
        let partial = PartialResult {
            chunk: 0,
            sections: vec![Section::new("Programs", "- A (A.cbl)")],
        };
        assert!(partial.section("programs").is_some());
        assert!(partial.section("Copybooks Used").is_none());
    }
}
