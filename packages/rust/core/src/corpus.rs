//! Corpus loading from a directory tree.

use std::path::Path;

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use docweave_partition::Corpus;
use docweave_shared::{DocweaveError, ReferencePatterns, Result, SourceUnit};

/// Load every program and copybook under `root`.
///
/// Unit ids are `/`-separated paths relative to `root`. Files whose extension
/// maps to no unit kind are skipped. Content is decoded lossily.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn load_corpus(root: &Path, patterns: &ReferencePatterns) -> Result<Corpus> {
    if !root.is_dir() {
        return Err(DocweaveError::validation(format!(
            "corpus root is not a directory: {}",
            root.display()
        )));
    }

    let mut corpus = Corpus::new();
    let mut skipped = 0usize;

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(id) = unit_id(root, entry.path()) else {
            continue;
        };
        let Some(kind) = patterns.kind_for_path(&id) else {
            skipped += 1;
            continue;
        };

        let bytes = std::fs::read(entry.path()).map_err(|e| DocweaveError::io(entry.path(), e))?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        debug!(id = %id, kind = kind.as_str(), size = content.len(), "loaded unit");
        corpus.insert(SourceUnit::new(id, content, kind));
    }

    info!(
        units = corpus.len(),
        skipped,
        bytes = corpus.total_size(),
        "corpus loaded"
    );
    Ok(corpus)
}

/// `/`-separated path of `path` relative to `root`.
fn unit_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
