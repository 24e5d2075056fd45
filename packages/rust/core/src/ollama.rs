//! Ollama-backed analyzer (`POST /api/generate`, non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use docweave_merge::{END_SENTINEL, STANDARD_SECTIONS};
use docweave_partition::ChunkPayload;
use docweave_shared::{BackendConfig, DocweaveError, Result};

use crate::analyzer::Analyzer;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Analyzer calling a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaAnalyzer {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    temperature: f32,
}

impl OllamaAnalyzer {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut base = Url::parse(&config.base_url).map_err(|e| {
            DocweaveError::config(format!("invalid backend base_url {}: {e}", config.base_url))
        })?;
        // Keep a path prefix such as `/ollama` when joining.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("api/generate")
            .map_err(|e| DocweaveError::config(format!("invalid backend base_url: {e}")))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("docweave/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocweaveError::Backend(format!("client build: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Instructions prepended to every chunk payload.
pub fn build_prompt(payload: &ChunkPayload) -> String {
    let headings: Vec<String> = STANDARD_SECTIONS.iter().map(|s| format!("## {s}")).collect();
    format!(
        "You are a COBOL analyst. The files below are one part of a larger codebase; \
         the context block names related files that live in other parts.\n\n\
         Answer with exactly these headings, in this order:\n{headings}\n\n\
         Rules:\n\
         - Programs: one line per program, `- NAME (path)`.\n\
         - Copybooks Used and Called Programs: one line per name, `- NAME`.\n\
         - Call Linkages: `- CALLER (path) calls: A, B`.\n\
         - Batch vs CICS: one word (Batch, CICS or Unknown).\n\
         - Input/Output Files and Database Tables: a short answer, or Unknown.\n\
         - Write `None.` under a list heading with nothing to report.\n\
         - End your answer with a line containing only {END_SENTINEL}\n\n\
         {text}",
        headings = headings.join("\n"),
        text = payload.text,
    )
}

#[async_trait]
impl Analyzer for OllamaAnalyzer {
    fn id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    #[instrument(skip_all, fields(chunk = payload.index(), model = %self.model))]
    async fn analyze(&self, payload: &ChunkPayload) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(payload),
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| DocweaveError::Backend(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocweaveError::Backend(format!(
                "ollama returned {status}: {}",
                body.trim()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DocweaveError::Backend(format!("invalid ollama response: {e}")))?;

        debug!(chars = body.response.len(), "analysis received");
        Ok(body.response)
    }
}
