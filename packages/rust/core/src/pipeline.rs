//! End-to-end `run` pipeline: corpus → plan → analyze → merge → run directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use docweave_merge::{MergedResult, merge, parse_sections};
use docweave_partition::{ChunkPayload, Corpus, Plan, PlanOptions, plan};
use docweave_shared::{
    CURRENT_SCHEMA_VERSION, PartialResult, ReferencePatterns, Result, RunId, RunManifest,
    RunSettings,
};
use docweave_storage::{RunStatus, Storage};

use crate::analyzer::Analyzer;
use crate::corpus::load_corpus;
use crate::dispatch::{DispatchOptions, dispatch};
use crate::report::write_run;

/// Configuration for one `run`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory holding the source corpus.
    pub corpus_root: PathBuf,
    /// Root under which `<run_id>/` is created.
    pub output_root: PathBuf,
    pub settings: RunSettings,
    pub patterns: ReferencePatterns,
    /// Tool version string.
    pub tool_version: String,
    /// Run history and analysis cache; `None` disables both.
    pub db_path: Option<PathBuf>,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct RunResult {
    pub run_id: RunId,
    /// Path to the written run directory.
    pub run_dir: PathBuf,
    pub manifest: RunManifest,
    pub result: MergedResult,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each chunk's analysis is collected, in chunk order.
    fn chunk_analyzed(&self, chunk: usize, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn chunk_analyzed(&self, _chunk: usize, _current: usize, _total: usize) {}
    fn done(&self, _result: &RunResult) {}
}

/// Load a corpus and partition it without analyzing anything.
#[instrument(skip_all, fields(root = %corpus_root.display()))]
pub fn plan_corpus(
    corpus_root: &Path,
    settings: &RunSettings,
    patterns: &ReferencePatterns,
) -> Result<(Corpus, Plan)> {
    settings.validate()?;
    let corpus = load_corpus(corpus_root, patterns)?;
    let plan = plan(&corpus, patterns, PlanOptions::from(settings))?;
    Ok((corpus, plan))
}

/// Run the full pipeline.
///
/// 1. Load and partition the corpus
/// 2. Serve cached chunk analyses, dispatch the rest
/// 3. Merge partial results in chunk order
/// 4. Write the run directory
///
/// A chunk that still fails after its retries fails the whole run; nothing
/// is merged or written in that case.
#[instrument(skip_all, fields(root = %config.corpus_root.display(), analyzer = %analyzer.id()))]
pub async fn run_pipeline(
    config: &RunConfig,
    analyzer: Arc<dyn Analyzer>,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();
    let run_id = RunId::new();
    let analyzer_id = analyzer.id();

    info!(%run_id, analyzer = %analyzer_id, "starting run");

    // --- Phase 1: Storage ---
    let storage = match &config.db_path {
        Some(path) => {
            progress.phase("Opening run history");
            let storage = Storage::open(path).await?;
            storage
                .insert_run(
                    &run_id.to_string(),
                    &config.corpus_root.display().to_string(),
                    &analyzer_id,
                )
                .await?;
            Some(storage)
        }
        None => None,
    };

    let outcome = execute(config, &run_id, analyzer, storage.as_ref(), progress).await;

    if let Some(storage) = &storage {
        let recorded = match &outcome {
            Ok((manifest, _, _)) => {
                let stats = serde_json::json!({
                    "unit_count": manifest.unit_count,
                    "chunk_count": manifest.chunk_count,
                    "unresolved": manifest.unresolved.len(),
                    "dropped_lines": manifest.dropped_lines,
                    "cache_hits": manifest.cache_hits,
                    "cache_misses": manifest.cache_misses,
                })
                .to_string();
                storage
                    .finish_run(&run_id.to_string(), RunStatus::Completed, Some(&stats), None)
                    .await
            }
            Err(e) => {
                storage
                    .finish_run(&run_id.to_string(), RunStatus::Failed, None, Some(&e.to_string()))
                    .await
            }
        };
        if let Err(e) = recorded {
            warn!(error = %e, "failed to record run status");
        }
    }

    let (manifest, result, run_dir) = outcome?;
    let run_result = RunResult {
        run_id,
        run_dir,
        manifest,
        result,
        elapsed: start.elapsed(),
    };

    info!(
        run_id = %run_result.run_id,
        chunks = run_result.manifest.chunk_count,
        elapsed_ms = run_result.elapsed.as_millis() as u64,
        "run complete"
    );
    progress.done(&run_result);
    Ok(run_result)
}

type Outcome = (RunManifest, MergedResult, PathBuf);

async fn execute(
    config: &RunConfig,
    run_id: &RunId,
    analyzer: Arc<dyn Analyzer>,
    storage: Option<&Storage>,
    progress: &dyn ProgressReporter,
) -> Result<Outcome> {
    let started_at = Utc::now();
    let analyzer_id = analyzer.id();

    // --- Phase 2: Plan ---
    progress.phase("Planning chunks");
    let (corpus, plan) = plan_corpus(&config.corpus_root, &config.settings, &config.patterns)?;

    // --- Phase 3: Analyze ---
    let (result, cache_hits, cache_misses) = if plan.is_empty() {
        info!("empty corpus, nothing to analyze");
        (MergedResult::empty(), 0, 0)
    } else {
        let payloads = plan.payloads(&corpus);
        let cache = if config.settings.cache_enabled {
            storage
        } else {
            None
        };

        progress.phase("Analyzing chunks");
        let outputs = analyze_chunks(analyzer, payloads, &config.settings, cache, progress).await?;

        // --- Phase 4: Merge ---
        progress.phase("Merging results");
        let partials: Vec<PartialResult> = outputs
            .texts
            .iter()
            .enumerate()
            .map(|(chunk, text)| PartialResult {
                chunk,
                sections: parse_sections(text),
            })
            .collect();
        (merge(&partials)?, outputs.hits, outputs.misses)
    };

    if result.dropped_lines() > 0 {
        warn!(dropped = result.dropped_lines(), "result lines matched no structured pattern");
    }

    // --- Phase 5: Write ---
    progress.phase("Writing run output");
    let report = plan.report();
    let manifest = RunManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        run_id: run_id.clone(),
        corpus_root: config.corpus_root.display().to_string(),
        tool_version: config.tool_version.clone(),
        analyzer: analyzer_id,
        started_at,
        finished_at: Utc::now(),
        unit_count: corpus.len(),
        chunk_count: plan.chunks().len(),
        budget: plan.options.budget,
        unresolved: report.unresolved.clone(),
        oversized_chunks: report.oversized_chunks.clone(),
        dropped_lines: result.dropped_lines(),
        cache_hits,
        cache_misses,
    };
    let run_dir = write_run(&config.output_root, &manifest, &report, &result)?;

    Ok((manifest, result, run_dir))
}

/// Analyzer output for every chunk, in chunk order.
struct ChunkOutputs {
    texts: Vec<String>,
    hits: usize,
    misses: usize,
}

/// Serve what the cache holds and dispatch the remaining chunks.
async fn analyze_chunks(
    analyzer: Arc<dyn Analyzer>,
    payloads: Vec<ChunkPayload>,
    settings: &RunSettings,
    cache: Option<&Storage>,
    progress: &dyn ProgressReporter,
) -> Result<ChunkOutputs> {
    let analyzer_id = analyzer.id();
    let total = payloads.len();
    let mut texts: Vec<Option<String>> = vec![None; total];
    let mut pending = Vec::new();
    let mut pending_hashes = Vec::new();

    for (slot, payload) in payloads.into_iter().enumerate() {
        let hash = payload_hash(&payload.text);
        let cached = match cache {
            Some(storage) => storage.get_cached_analysis(&hash, &analyzer_id).await?,
            None => None,
        };
        match cached {
            Some(text) => {
                debug!(chunk = payload.index(), "analysis cache hit");
                texts[slot] = Some(text);
            }
            None => {
                pending_hashes.push((slot, hash));
                pending.push(payload);
            }
        }
    }

    let hits = total - pending.len();
    let misses = pending.len();
    info!(hits, misses, "analysis cache checked");

    if !pending.is_empty() {
        let options = DispatchOptions::from(settings);
        let outputs = dispatch(analyzer, pending, &options, progress).await?;

        for ((slot, hash), text) in pending_hashes.into_iter().zip(outputs) {
            if let Some(storage) = cache {
                storage.set_cached_analysis(&hash, &analyzer_id, &text).await?;
            }
            texts[slot] = Some(text);
        }
    }

    Ok(ChunkOutputs {
        texts: texts.into_iter().flatten().collect(),
        hits,
        misses,
    })
}

/// SHA-256 of a chunk payload, hex-encoded.
pub fn payload_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
