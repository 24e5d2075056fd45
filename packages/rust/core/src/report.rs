//! Run directory writer.
//!
//! Layout:
//! ```text
//! <output_root>/<run_id>/
//! ├── manifest.json   run metadata and counts
//! ├── plan.json       chunks, clusters and cross-chunk references
//! ├── result.json     merged sections + structured record
//! └── report.md       merged sections as Markdown
//! ```
//!
//! Every file is written to a temp name first and renamed into place.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use docweave_merge::{MergedResult, StructuredRecord};
use docweave_partition::PlanReport;
use docweave_shared::{CURRENT_SCHEMA_VERSION, DocweaveError, Result, RunManifest};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const PLAN_FILE: &str = "plan.json";
pub const RESULT_FILE: &str = "result.json";
pub const REPORT_FILE: &str = "report.md";

/// Write a complete run directory and return its path.
#[instrument(skip_all, fields(run_id = %manifest.run_id, chunks = manifest.chunk_count))]
pub fn write_run(
    output_root: &Path,
    manifest: &RunManifest,
    plan: &PlanReport,
    result: &MergedResult,
) -> Result<PathBuf> {
    let run_dir = output_root.join(manifest.run_id.to_string());
    std::fs::create_dir_all(&run_dir).map_err(|e| DocweaveError::io(&run_dir, e))?;

    // result.json first: a manifest never points at a missing result.
    write_json(&run_dir.join(RESULT_FILE), result)?;
    write_atomic(&run_dir.join(REPORT_FILE), &render_markdown(manifest, result))?;
    write_json(&run_dir.join(PLAN_FILE), plan)?;
    write_json(&run_dir.join(MANIFEST_FILE), manifest)?;

    info!(path = %run_dir.display(), "run output written");
    Ok(run_dir)
}

/// Render the merged sections as a Markdown report.
pub fn render_markdown(manifest: &RunManifest, result: &MergedResult) -> String {
    let mut out = format!(
        "# Corpus analysis: {}\n\n\
         Run `{}` with `{}`: {} units in {} chunks.\n",
        manifest.corpus_root,
        manifest.run_id,
        manifest.analyzer,
        manifest.unit_count,
        manifest.chunk_count,
    );

    if !manifest.unresolved.is_empty() {
        out.push_str(&format!(
            "\nUnresolved names: {}\n",
            manifest.unresolved.join(", ")
        ));
    }

    if result.sections().is_empty() {
        out.push_str("\nThe corpus contained no source units.\n");
    }
    for section in result.sections() {
        out.push_str(&format!("\n## {}\n\n{}\n", section.name, section.body));
    }
    out
}

/// Check that a run directory is complete and its result is self-consistent.
pub fn validate_run(run_dir: &Path) -> Result<RunManifest> {
    for file in [MANIFEST_FILE, PLAN_FILE, RESULT_FILE] {
        if !run_dir.join(file).exists() {
            return Err(DocweaveError::validation(format!("missing {file}")));
        }
    }

    let manifest: RunManifest = read_json(&run_dir.join(MANIFEST_FILE))?;
    if manifest.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(DocweaveError::validation(format!(
            "unsupported schema_version: {} (expected {})",
            manifest.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }

    let result = load_result(run_dir)?;
    let stored: StoredRecord = read_json(&run_dir.join(RESULT_FILE))?;
    if &stored.structured != result.structured() {
        return Err(DocweaveError::validation(
            "result.json structured record does not match its sections",
        ));
    }

    Ok(manifest)
}

/// Read `result.json` back. The structured record is re-parsed from the
/// stored sections, never taken from the file.
pub fn load_result(run_dir: &Path) -> Result<MergedResult> {
    read_json(&run_dir.join(RESULT_FILE))
}

#[derive(serde::Deserialize)]
struct StoredRecord {
    structured: StructuredRecord,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| DocweaveError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, &json)?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| DocweaveError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| DocweaveError::io(path, e))?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| DocweaveError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| DocweaveError::validation(format!("invalid {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use docweave_partition::{Corpus, PlanOptions, plan};
    use docweave_shared::{ReferencePatterns, RunId, Section, SourceUnit, UnitKind};

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docweave_report_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    fn manifest() -> RunManifest {
        let now = Utc::now();
        RunManifest {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_id: RunId::new(),
            corpus_root: "/src/cobol".into(),
            tool_version: "0.1.0".into(),
            analyzer: "inventory".into(),
            started_at: now,
            finished_at: now,
            unit_count: 1,
            chunk_count: 1,
            budget: 40_000,
            unresolved: vec!["AUDITLOG".into()],
            oversized_chunks: vec![],
            dropped_lines: 0,
            cache_hits: 0,
            cache_misses: 1,
        }
    }

    fn plan_report() -> PlanReport {
        let corpus = Corpus::from_units([SourceUnit::new(
            "MAIN.cbl",
            "PROGRAM-ID. MAIN.\n",
            UnitKind::Program,
        )]);
        plan(&corpus, &ReferencePatterns::default(), PlanOptions::default())
            .expect("plan")
            .report()
    }

    fn result() -> MergedResult {
        MergedResult::from_sections(vec![
            Section::new("Programs", "- MAIN (MAIN.cbl)"),
            Section::new("Batch vs CICS", "Batch"),
        ])
    }

    #[test]
    fn write_run_creates_all_files() {
        let tmp = temp_dir();
        let manifest = manifest();
        let run_dir = write_run(&tmp, &manifest, &plan_report(), &result()).expect("write");

        assert_eq!(run_dir, tmp.join(manifest.run_id.to_string()));
        for file in [MANIFEST_FILE, PLAN_FILE, RESULT_FILE, REPORT_FILE] {
            assert!(run_dir.join(file).exists(), "{file} missing");
        }
        // No temp files left behind.
        let leftovers = std::fs::read_dir(&run_dir)
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn result_round_trips_with_sections_and_structured_together() {
        let tmp = temp_dir();
        let run_dir = write_run(&tmp, &manifest(), &plan_report(), &result()).expect("write");

        let raw = std::fs::read_to_string(run_dir.join(RESULT_FILE)).expect("read");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert!(json.get("sections").is_some());
        assert!(json.get("structured").is_some());

        let loaded = load_result(&run_dir).expect("load");
        assert_eq!(loaded, result());
        assert_eq!(loaded.structured().programs[0].name, "MAIN");
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn validate_accepts_written_run() {
        let tmp = temp_dir();
        let manifest = manifest();
        let run_dir = write_run(&tmp, &manifest, &plan_report(), &result()).expect("write");
        let read = validate_run(&run_dir).expect("valid");
        assert_eq!(read.run_id, manifest.run_id);
        assert_eq!(read.unresolved, vec!["AUDITLOG".to_string()]);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn validate_rejects_missing_result() {
        let tmp = temp_dir();
        let run_dir = write_run(&tmp, &manifest(), &plan_report(), &result()).expect("write");
        std::fs::remove_file(run_dir.join(RESULT_FILE)).expect("rm");
        let err = validate_run(&run_dir).unwrap_err();
        assert!(err.to_string().contains("result.json"));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn validate_rejects_tampered_structured_record() {
        let tmp = temp_dir();
        let run_dir = write_run(&tmp, &manifest(), &plan_report(), &result()).expect("write");

        let path = run_dir.join(RESULT_FILE);
        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        json["structured"]["programs"] = serde_json::json!([]);
        std::fs::write(&path, serde_json::to_string(&json).expect("ser")).expect("write");

        assert!(matches!(
            validate_run(&run_dir),
            Err(DocweaveError::Validation { .. })
        ));

        // Loading still yields the record parsed from the sections.
        let loaded = load_result(&run_dir).expect("load");
        assert_eq!(loaded, result());
        assert_eq!(loaded.structured().programs.len(), 1);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn markdown_lists_sections_and_unresolved_names() {
        let md = render_markdown(&manifest(), &result());
        assert!(md.starts_with("# Corpus analysis: /src/cobol"));
        assert!(md.contains("Unresolved names: AUDITLOG"));
        assert!(md.contains("## Programs\n\n- MAIN (MAIN.cbl)\n"));
    }

    #[test]
    fn markdown_for_empty_result() {
        let md = render_markdown(&manifest(), &MergedResult::empty());
        assert!(md.contains("no source units"));
    }
}
