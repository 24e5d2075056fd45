//! Analysis output parsing and result merging for docweave.
//!
//! - [`sections`] reads and writes the sectioned, sentinel-terminated answer format
//! - [`merger`] combines per-chunk answers into one [`MergedResult`]
//! - [`structured`] derives the machine-readable record from merged text

pub mod merger;
pub mod sections;
pub mod structured;

pub use merger::{MergedResult, merge, merge_classification, merge_list};
pub use sections::{
    END_SENTINEL, SectionPolicy, STANDARD_SECTIONS, parse_sections, policy_for, render_sections,
};
pub use structured::{
    CallEdge, DroppedLine, ParsedLine, ProgramRecord, Record, StructuredRecord, parse_line,
    reparse,
};
