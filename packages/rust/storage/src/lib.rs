//! libSQL storage layer (local file).
//!
//! The [`Storage`] struct wraps a libSQL database holding the run history and
//! the analysis cache. The cache maps `(payload hash, analyzer id)` to the raw
//! analyzer output, so re-running an unchanged chunk skips the backend call.

mod migrations;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docweave_shared::{DocweaveError, Result, config_dir};
use libsql::{Connection, Database, params};

/// Database file name inside the config directory.
const DB_FILE_NAME: &str = "docweave.db";

/// Default database location (`~/.docweave/docweave.db`).
pub fn default_db_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(DB_FILE_NAME))
}

fn db_err(e: libsql::Error) -> DocweaveError {
    DocweaveError::Storage(e.to_string())
}

/// Lifecycle state of a recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DocweaveError::Storage(format!("unknown run status: {other}"))),
        }
    }
}

/// A row of the `runs` table.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub corpus_root: String,
    pub analyzer: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats_json: Option<String>,
    pub error: Option<String>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocweaveError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DocweaveError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record the start of a run.
    pub async fn insert_run(&self, run_id: &str, corpus_root: &str, analyzer: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, corpus_root, analyzer, status, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run_id,
                    corpus_root,
                    analyzer,
                    RunStatus::Running.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Mark a run finished with its final status and statistics.
    pub async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        stats_json: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn
            .execute(
                "UPDATE runs SET status = ?1, finished_at = ?2, stats_json = ?3, error = ?4
                 WHERE id = ?5",
                params![status.as_str(), now.as_str(), stats_json, error, run_id],
            )
            .await
            .map_err(db_err)?;
        if updated == 0 {
            return Err(DocweaveError::Storage(format!("run not found: {run_id}")));
        }
        Ok(())
    }

    /// Get a run by id.
    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, corpus_root, analyzer, status, started_at, finished_at, stats_json, error
                 FROM runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, corpus_root, analyzer, status, started_at, finished_at, stats_json, error
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Analysis cache
    // -----------------------------------------------------------------------

    /// Get cached analyzer output for a payload.
    pub async fn get_cached_analysis(
        &self,
        payload_hash: &str,
        analyzer_id: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT output FROM analysis_cache WHERE payload_hash = ?1 AND analyzer_id = ?2",
                params![payload_hash, analyzer_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(db_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Store analyzer output for a payload (upserts).
    pub async fn set_cached_analysis(
        &self,
        payload_hash: &str,
        analyzer_id: &str,
        output: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO analysis_cache (payload_hash, analyzer_id, output, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(payload_hash, analyzer_id) DO UPDATE SET
                   output = excluded.output,
                   created_at = excluded.created_at",
                params![payload_hash, analyzer_id, output, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Drop every cached output of one analyzer. Returns the number removed.
    pub async fn invalidate_analysis_cache(&self, analyzer_id: &str) -> Result<u64> {
        self.conn
            .execute(
                "DELETE FROM analysis_cache WHERE analyzer_id = ?1",
                params![analyzer_id],
            )
            .await
            .map_err(db_err)
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DocweaveError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`RunRecord`].
fn row_to_run(row: &libsql::Row) -> Result<RunRecord> {
    let status: String = row.get(3).map_err(db_err)?;
    let started_at: String = row.get(4).map_err(db_err)?;
    let finished_at = match row.get::<String>(5).ok() {
        Some(s) => Some(parse_time(&s)?),
        None => None,
    };

    Ok(RunRecord {
        id: row.get::<String>(0).map_err(db_err)?,
        corpus_root: row.get::<String>(1).map_err(db_err)?,
        analyzer: row.get::<String>(2).map_err(db_err)?,
        status: RunStatus::parse(&status)?,
        started_at: parse_time(&started_at)?,
        finished_at,
        stats_json: row.get::<String>(6).ok(),
        error: row.get::<String>(7).ok(),
    })
}
