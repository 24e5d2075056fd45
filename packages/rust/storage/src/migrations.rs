//! SQL migration definitions for the docweave database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, analysis_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Run history
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    corpus_root TEXT NOT NULL,
    analyzer    TEXT NOT NULL,
    status      TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT,
    error       TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_corpus_root ON runs(corpus_root);

-- Analyzer output per chunk payload
CREATE TABLE IF NOT EXISTS analysis_cache (
    payload_hash TEXT NOT NULL,
    analyzer_id  TEXT NOT NULL,
    output       TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    PRIMARY KEY (payload_hash, analyzer_id)
);

CREATE INDEX IF NOT EXISTS idx_analysis_cache_analyzer ON analysis_cache(analyzer_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
