//! Shared types, error model, and configuration for docweave.
//!
//! This crate is the foundation depended on by all other docweave crates.
//! It provides:
//! - [`DocweaveError`]: the unified error type
//! - Domain types ([`SourceUnit`], [`Chunk`], [`ChunkContext`], [`PartialResult`], [`RunManifest`])
//! - Configuration ([`AppConfig`], [`RunSettings`], [`ReferencePatterns`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, BackendKind, CacheConfig, DefaultsConfig, PatternsConfig,
    ReferencePatterns, RunSettings, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{ChunkFailure, DocweaveError, Result};
pub use types::{
    CURRENT_SCHEMA_VERSION, Chunk, ChunkContext, PartialResult, RunId, RunManifest, Section,
    SourceUnit, UnitKind, find_section, unit_stem,
};
