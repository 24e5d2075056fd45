//! Analyzer backends: turn one chunk payload into sectioned answer text.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use docweave_merge::sections::{
    BATCH_VS_CICS, CALL_LINKAGES, CALLED_PROGRAMS, COPYBOOKS_USED, DATABASE_TABLES, EMPTY_LIST,
    IO_FILES, PROGRAMS, UNKNOWN,
};
use docweave_merge::render_sections;
use docweave_partition::{ChunkPayload, resolver::scan_unit};
use docweave_shared::{
    BackendConfig, BackendKind, ReferencePatterns, Result, Section, UnitKind, unit_stem,
};

use crate::ollama::OllamaAnalyzer;

/// A backend that analyzes one chunk at a time.
///
/// The returned text uses the `## Section` format terminated by the end
/// sentinel; the caller parses it.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Stable identifier, used as part of the cache key.
    fn id(&self) -> String;

    /// Analyze one chunk.
    async fn analyze(&self, payload: &ChunkPayload) -> Result<String>;
}

/// Construct the analyzer selected by `[backend].kind`.
pub fn build_analyzer(
    backend: &BackendConfig,
    patterns: &ReferencePatterns,
) -> Result<Arc<dyn Analyzer>> {
    let analyzer: Arc<dyn Analyzer> = match backend.kind {
        BackendKind::Inventory => Arc::new(InventoryAnalyzer::new(patterns.clone())),
        BackendKind::Ollama => Arc::new(OllamaAnalyzer::new(backend)?),
    };
    info!(analyzer = %analyzer.id(), "analyzer ready");
    Ok(analyzer)
}

// ---------------------------------------------------------------------------
// Inventory analyzer
// ---------------------------------------------------------------------------

/// Deterministic, parser-only backend.
///
/// Lists programs, copybooks, called names and call linkages straight from
/// the source text. Single-answer sections are left `Unknown`.
#[derive(Debug, Clone, Default)]
pub struct InventoryAnalyzer {
    patterns: ReferencePatterns,
}

impl InventoryAnalyzer {
    pub fn new(patterns: ReferencePatterns) -> Self {
        Self { patterns }
    }

    /// Build the answer sections for a payload.
    pub fn sections(&self, payload: &ChunkPayload) -> Vec<Section> {
        let mut programs = Vec::new();
        let mut copybooks = BTreeSet::new();
        let mut called = BTreeSet::new();
        let mut linkages = Vec::new();

        // Program-kind units a call may resolve to: chunk members plus the
        // external callees named in the context.
        let reachable: BTreeSet<String> = payload
            .units
            .iter()
            .filter(|u| u.kind == UnitKind::Program)
            .map(|u| u.stem())
            .chain(payload.context.external_callees.iter().map(|id| unit_stem(id.as_str())))
            .collect();

        for unit in &payload.units {
            let symbols = scan_unit(unit, &self.patterns);
            copybooks.extend(symbols.includes.iter().map(|n| n.to_uppercase()));
            called.extend(symbols.calls.iter().map(|n| n.to_uppercase()));

            if unit.kind != UnitKind::Program {
                continue;
            }
            let name = symbols.program_id.clone().unwrap_or_else(|| unit.stem());
            programs.push(format!("- {name} ({})", unit.id));

            let callees: BTreeSet<String> = symbols
                .calls
                .iter()
                .map(|n| n.to_uppercase())
                .filter(|n| reachable.contains(n))
                .collect();
            if !callees.is_empty() {
                let callees: Vec<String> = callees.into_iter().collect();
                linkages.push(format!("- {name} ({}) calls: {}", unit.id, callees.join(", ")));
            }
        }

        let list = |lines: Vec<String>| {
            if lines.is_empty() {
                EMPTY_LIST.to_string()
            } else {
                lines.join("\n")
            }
        };
        let bullets = |names: BTreeSet<String>| -> Vec<String> {
            names.into_iter().map(|n| format!("- {n}")).collect()
        };

        vec![
            Section::new(PROGRAMS, list(programs)),
            Section::new(BATCH_VS_CICS, UNKNOWN),
            Section::new(COPYBOOKS_USED, list(bullets(copybooks))),
            Section::new(IO_FILES, UNKNOWN),
            Section::new(DATABASE_TABLES, UNKNOWN),
            Section::new(CALLED_PROGRAMS, list(bullets(called))),
            Section::new(CALL_LINKAGES, list(linkages)),
        ]
    }
}

#[async_trait]
impl Analyzer for InventoryAnalyzer {
    fn id(&self) -> String {
        "inventory".to_string()
    }

    async fn analyze(&self, payload: &ChunkPayload) -> Result<String> {
        Ok(render_sections(&self.sections(payload)))
    }
}

#[cfg(test)]
mod tests {
    use docweave_merge::parse_sections;
    use docweave_partition::{Corpus, PlanOptions, plan};
    use docweave_shared::SourceUnit;

    use super::*;

    fn payloads(units: Vec<SourceUnit>, budget: usize) -> Vec<ChunkPayload> {
        let corpus = Corpus::from_units(units);
        let options = PlanOptions {
            budget,
            ..PlanOptions::default()
        };
        let plan = plan(&corpus, &ReferencePatterns::default(), options).expect("plan");
        plan.payloads(&corpus)
    }

    #[tokio::test]
    async fn inventory_lists_resolved_and_unresolved_calls() {
        let payloads = payloads(
            vec![
                SourceUnit::new(
                    "MAIN.cbl",
                    "PROGRAM-ID. MAIN.\nCOPY WS.\nCALL 'SUB'.\nCALL 'EXTERNALSVC'.\n",
                    UnitKind::Program,
                ),
                SourceUnit::new("SUB.cbl", "PROGRAM-ID. SUB.\n", UnitKind::Program),
                SourceUnit::new("WS.cpy", "01 WS-REC.\n", UnitKind::Copybook),
            ],
            10_000,
        );
        let analyzer = InventoryAnalyzer::default();
        let text = analyzer.analyze(&payloads[0]).await.expect("analyze");
        assert!(text.ends_with("---END---\n"));

        let sections = parse_sections(&text);
        let body = |name: &str| {
            sections
                .iter()
                .find(|s| s.name == name)
                .map(|s| s.body.clone())
                .expect("section")
        };
        assert_eq!(body(PROGRAMS), "- SUB (SUB.cbl)\n- MAIN (MAIN.cbl)");
        assert_eq!(body(COPYBOOKS_USED), "- WS");
        assert_eq!(body(CALLED_PROGRAMS), "- EXTERNALSVC\n- SUB");
        assert_eq!(body(CALL_LINKAGES), "- MAIN (MAIN.cbl) calls: SUB");
        assert_eq!(body(BATCH_VS_CICS), UNKNOWN);
    }

    #[test]
    fn linkages_resolve_across_chunks_through_context() {
        // A tiny budget puts MAIN and SUB in different chunks.
        let payloads = payloads(
            vec![
                SourceUnit::new("MAIN.cbl", "PROGRAM-ID. MAIN.\nCALL 'SUB'.\n", UnitKind::Program),
                SourceUnit::new("SUB.cbl", "PROGRAM-ID. SUB.\n", UnitKind::Program),
            ],
            20,
        );
        assert_eq!(payloads.len(), 2);
        let analyzer = InventoryAnalyzer::default();
        let main_payload = payloads
            .iter()
            .find(|p| p.chunk.contains("MAIN.cbl"))
            .expect("main chunk");
        let sections = analyzer.sections(main_payload);
        let linkages = sections.iter().find(|s| s.name == CALL_LINKAGES).expect("linkages");
        assert_eq!(linkages.body, "- MAIN (MAIN.cbl) calls: SUB");
    }

    #[test]
    fn factory_follows_backend_kind() {
        let mut backend = BackendConfig::default();
        let patterns = ReferencePatterns::default();
        assert_eq!(build_analyzer(&backend, &patterns).expect("inventory").id(), "inventory");

        backend.kind = BackendKind::Ollama;
        backend.model = "codellama".into();
        assert_eq!(build_analyzer(&backend, &patterns).expect("ollama").id(), "ollama:codellama");

        backend.base_url = "::nope::".into();
        assert!(build_analyzer(&backend, &patterns).is_err());
    }

    #[test]
    fn empty_lists_render_placeholder() {
        let payloads = payloads(vec![SourceUnit::new("LONE.cpy", "01 X.\n", UnitKind::Copybook)], 100);
        let sections = InventoryAnalyzer::default().sections(&payloads[0]);
        let programs = sections.iter().find(|s| s.name == PROGRAMS).expect("programs");
        assert_eq!(programs.body, EMPTY_LIST);
    }
}
