//! Application configuration for docweave.
//!
//! User config lives at `~/.docweave/docweave.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DocweaveError, Result};
use crate::types::UnitKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docweave.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docweave";

// ---------------------------------------------------------------------------
// Config structs (matching docweave.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Analysis backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Reference-scanning patterns for the source format in use.
    #[serde(default)]
    pub patterns: PatternsConfig,

    /// Analysis cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default run output directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Chunk budget in bytes of source content.
    #[serde(default = "default_budget")]
    pub budget: usize,

    /// Maximum concurrent analysis calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Retries per chunk after the first failed call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff between retries; doubles on each attempt.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Reference hops followed outward from each cluster root.
    #[serde(default = "default_cluster_hops")]
    pub cluster_hops: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            budget: default_budget(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            cluster_hops: default_cluster_hops(),
        }
    }
}

fn default_output_dir() -> String {
    "docweave-runs".into()
}
fn default_budget() -> usize {
    40_000
}
fn default_concurrency() -> u32 {
    4
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_base_delay() -> u64 {
    500
}
fn default_cluster_hops() -> usize {
    2
}

/// Which analyzer turns a chunk payload into sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Deterministic, parser-only inventory (no model call).
    Inventory,
    /// A local Ollama server.
    Ollama,
}

impl std::str::FromStr for BackendKind {
    type Err = DocweaveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inventory" => Ok(Self::Inventory),
            "ollama" => Ok(Self::Ollama),
            other => Err(DocweaveError::config(format!(
                "unknown backend '{other}': expected 'inventory' or 'ollama'"
            ))),
        }
    }
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,

    /// Base URL of the model server.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier passed to the server.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Inventory
}
fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "llama3.1:8b".into()
}
fn default_timeout_secs() -> u64 {
    600
}

/// `[patterns]` section.
///
/// Each regex must expose the symbolic name as its first capture group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternsConfig {
    #[serde(default = "default_program_id_pattern")]
    pub program_id: String,

    /// Copy-style inclusion of a shared definition.
    #[serde(default = "default_include_pattern")]
    pub include: String,

    /// Invocation of another unit by name.
    #[serde(default = "default_call_pattern")]
    pub call: String,

    #[serde(default = "default_program_extensions")]
    pub program_extensions: Vec<String>,

    #[serde(default = "default_copybook_extensions")]
    pub copybook_extensions: Vec<String>,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            program_id: default_program_id_pattern(),
            include: default_include_pattern(),
            call: default_call_pattern(),
            program_extensions: default_program_extensions(),
            copybook_extensions: default_copybook_extensions(),
        }
    }
}

fn default_program_id_pattern() -> String {
    r"(?i)PROGRAM-ID\.\s*([A-Za-z0-9_-]+)".into()
}
fn default_include_pattern() -> String {
    r"(?i)(?:^|[^A-Za-z0-9_-])COPY\s+([A-Za-z0-9_-]+)".into()
}
fn default_call_pattern() -> String {
    r#"(?i)(?:^|[^A-Za-z0-9_-])CALL\s+['"]?([A-Za-z0-9_-]+)['"]?"#.into()
}
fn default_program_extensions() -> Vec<String> {
    vec!["cbl".into(), "cob".into()]
}
fn default_copybook_extensions() -> Vec<String> {
    vec!["cpy".into()]
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Compiled patterns (runtime, built from [patterns])
// ---------------------------------------------------------------------------

/// Compiled reference patterns and the extension → kind mapping.
#[derive(Debug, Clone)]
pub struct ReferencePatterns {
    pub program_id: Regex,
    pub include: Regex,
    pub call: Regex,
    program_extensions: Vec<String>,
    copybook_extensions: Vec<String>,
}

impl ReferencePatterns {
    /// Compile the configured patterns, rejecting regexes without a capture group.
    pub fn compile(config: &PatternsConfig) -> Result<Self> {
        Ok(Self {
            program_id: compile_named("program_id", &config.program_id)?,
            include: compile_named("include", &config.include)?,
            call: compile_named("call", &config.call)?,
            program_extensions: lowercase_all(&config.program_extensions),
            copybook_extensions: lowercase_all(&config.copybook_extensions),
        })
    }

    /// Classify a path by extension; `None` means the file is not part of the corpus.
    pub fn kind_for_path(&self, path: &str) -> Option<UnitKind> {
        let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let (_, ext) = file.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        if self.program_extensions.contains(&ext) {
            Some(UnitKind::Program)
        } else if self.copybook_extensions.contains(&ext) {
            Some(UnitKind::Copybook)
        } else {
            None
        }
    }
}

impl Default for ReferencePatterns {
    fn default() -> Self {
        // The built-in patterns are constants and always compile.
        Self::compile(&PatternsConfig::default()).expect("default reference patterns")
    }
}

fn compile_named(field: &str, pattern: &str) -> Result<Regex> {
    let regex = Regex::new(pattern)
        .map_err(|e| DocweaveError::config(format!("invalid [patterns].{field} regex: {e}")))?;
    if regex.captures_len() < 2 {
        return Err(DocweaveError::config(format!(
            "[patterns].{field} must contain a capture group for the symbolic name"
        )));
    }
    Ok(regex)
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Planning and dispatch knobs for a single run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub budget: usize,
    pub concurrency: u32,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub cluster_hops: usize,
    pub cache_enabled: bool,
}

impl From<&AppConfig> for RunSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            budget: config.defaults.budget,
            concurrency: config.defaults.concurrency,
            max_retries: config.defaults.max_retries,
            retry_base_delay_ms: config.defaults.retry_base_delay_ms,
            cluster_hops: config.defaults.cluster_hops,
            cache_enabled: config.cache.enabled,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<()> {
        if self.budget == 0 {
            return Err(DocweaveError::config("budget must be greater than zero"));
        }
        if self.concurrency == 0 {
            return Err(DocweaveError::config("concurrency must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docweave/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocweaveError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docweave/docweave.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocweaveError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocweaveError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocweaveError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocweaveError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocweaveError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("budget"));
        assert!(toml_str.contains("http://localhost:11434"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.budget, 40_000);
        assert_eq!(parsed.defaults.cluster_hops, 2);
        assert_eq!(parsed.backend.kind, BackendKind::Inventory);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
budget = 1200

[backend]
kind = "ollama"
model = "codellama"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.budget, 1200);
        assert_eq!(config.defaults.concurrency, 4);
        assert_eq!(config.backend.kind, BackendKind::Ollama);
        assert_eq!(config.backend.model, "codellama");
        assert!(config.cache.enabled);
    }

    #[test]
    fn run_settings_from_app_config() {
        let app = AppConfig::default();
        let settings = RunSettings::from(&app);
        assert_eq!(settings.budget, 40_000);
        assert_eq!(settings.max_retries, 2);
        assert!(settings.validate().is_ok());

        let zero = RunSettings { budget: 0, ..settings };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("Ollama".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert!("gpt".parse::<BackendKind>().is_err());
    }

    #[test]
    fn kind_for_path_uses_extensions() {
        let patterns = ReferencePatterns::default();
        assert_eq!(patterns.kind_for_path("src/MAIN.CBL"), Some(UnitKind::Program));
        assert_eq!(patterns.kind_for_path("src/old.cob"), Some(UnitKind::Program));
        assert_eq!(patterns.kind_for_path("copy/WS.cpy"), Some(UnitKind::Copybook));
        assert_eq!(patterns.kind_for_path("README.md"), None);
        assert_eq!(patterns.kind_for_path("Makefile"), None);
    }

    #[test]
    fn patterns_without_capture_group_are_rejected() {
        let config = PatternsConfig {
            call: r"CALL\s+\w+".into(),
            ..PatternsConfig::default()
        };
        let err = ReferencePatterns::compile(&config).unwrap_err();
        assert!(err.to_string().contains("capture group"));
    }

    #[test]
    fn default_patterns_capture_names() {
        let p = ReferencePatterns::default();
        let caps = p.call.captures("    CALL 'SUBPGM' USING WS-AREA").expect("call");
        assert_eq!(&caps[1], "SUBPGM");
        let caps = p.include.captures("       COPY WSDATE.").expect("copy");
        assert_eq!(&caps[1], "WSDATE");
        let caps = p.program_id.captures("       PROGRAM-ID. PAYROLL.").expect("id");
        assert_eq!(&caps[1], "PAYROLL");
    }
}
