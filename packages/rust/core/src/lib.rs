//! Core pipeline orchestration for docweave.
//!
//! This crate ties together corpus loading, chunk planning, analyzer
//! dispatch, result merging and run output into end-to-end workflows
//! (e.g., [`run_pipeline`]).

pub mod analyzer;
pub mod corpus;
pub mod dispatch;
pub mod ollama;
pub mod pipeline;
pub mod report;

pub use analyzer::{Analyzer, InventoryAnalyzer, build_analyzer};
pub use corpus::load_corpus;
pub use dispatch::{DispatchOptions, dispatch};
pub use ollama::OllamaAnalyzer;
pub use pipeline::{
    ProgressReporter, RunConfig, RunResult, SilentProgress, payload_hash, plan_corpus,
    run_pipeline,
};
pub use report::{load_result, render_markdown, validate_run, write_run};
