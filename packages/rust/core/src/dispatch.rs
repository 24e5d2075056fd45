//! Bounded parallel dispatch of chunk payloads to an analyzer.
//!
//! One task per chunk, gated by a semaphore. Every task owns one result slot;
//! slots are read back in payload order, never completion order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use docweave_partition::ChunkPayload;
use docweave_shared::{ChunkFailure, DocweaveError, Result, RunSettings};

use crate::analyzer::Analyzer;
use crate::pipeline::ProgressReporter;

/// Concurrency and retry knobs.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum analyzer calls in flight.
    pub concurrency: usize,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_base_delay: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl From<&RunSettings> for DispatchOptions {
    fn from(settings: &RunSettings) -> Self {
        Self {
            concurrency: settings.concurrency as usize,
            max_retries: settings.max_retries,
            retry_base_delay: Duration::from_millis(settings.retry_base_delay_ms),
        }
    }
}

/// Analyze every payload and return the outputs in payload order.
///
/// Fails with [`DocweaveError::ChunkAnalysis`] naming every chunk that still
/// failed after its retries; no partial output is returned in that case.
#[instrument(skip_all, fields(payloads = payloads.len(), concurrency = options.concurrency))]
pub async fn dispatch(
    analyzer: Arc<dyn Analyzer>,
    payloads: Vec<ChunkPayload>,
    options: &DispatchOptions,
    progress: &dyn ProgressReporter,
) -> Result<Vec<String>> {
    let total = payloads.len();
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut handles = Vec::with_capacity(total);

    for payload in payloads {
        let chunk = payload.index();
        let analyzer = Arc::clone(&analyzer);
        let sem = Arc::clone(&semaphore);
        let options = options.clone();

        handles.push((
            chunk,
            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.map_err(|e| ChunkFailure {
                    chunk,
                    attempts: 0,
                    message: format!("dispatch closed: {e}"),
                })?;
                analyze_with_retry(analyzer.as_ref(), &payload, &options).await
            }),
        ));
    }

    let mut slots: Vec<Option<String>> = vec![None; total];
    let mut failed = Vec::new();

    for (slot, (chunk, handle)) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(text)) => slots[slot] = Some(text),
            Ok(Err(failure)) => failed.push(failure),
            Err(e) => failed.push(ChunkFailure {
                chunk,
                attempts: 0,
                message: format!("analysis task aborted: {e}"),
            }),
        }
        progress.chunk_analyzed(chunk, slot + 1, total);
    }

    if !failed.is_empty() {
        failed.sort_by_key(|f| f.chunk);
        warn!(failed = failed.len(), "chunk analysis failed");
        return Err(DocweaveError::ChunkAnalysis { failed });
    }

    info!(chunks = total, "all chunks analyzed");
    Ok(slots.into_iter().flatten().collect())
}

/// Call the analyzer, retrying with exponential backoff.
async fn analyze_with_retry(
    analyzer: &dyn Analyzer,
    payload: &ChunkPayload,
    options: &DispatchOptions,
) -> std::result::Result<String, ChunkFailure> {
    let mut retry_delay = options.retry_base_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match analyzer.analyze(payload).await {
            Ok(text) => return Ok(text),
            Err(e) if attempt <= options.max_retries => {
                warn!(
                    chunk = payload.index(),
                    attempt,
                    delay_ms = retry_delay.as_millis() as u64,
                    error = %e,
                    "analysis failed, retrying"
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }
            Err(e) => {
                return Err(ChunkFailure {
                    chunk: payload.index(),
                    attempts: attempt,
                    message: e.to_string(),
                });
            }
        }
    }
}
