//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docweave_core::pipeline::{ProgressReporter, RunConfig, RunResult};
use docweave_core::{build_analyzer, plan_corpus, run_pipeline};
use docweave_shared::{
    AppConfig, BackendKind, ReferencePatterns, RunSettings, init_config, load_config,
    load_config_from,
};
use docweave_storage::{Storage, default_db_path};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docweave: analyze a COBOL codebase that is too large for one model call.
#[derive(Parser)]
#[command(
    name = "docweave",
    version,
    about = "Partition a COBOL corpus into chunks, analyze them and merge the answers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.docweave/docweave.toml.
    #[arg(long, global = true, env = "DOCWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Planning flags shared by `plan` and `run`.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct PlanArgs {
    /// Chunk budget in bytes of source content.
    #[arg(long)]
    pub budget: Option<usize>,

    /// Reference hops followed from each cluster root.
    #[arg(long)]
    pub hops: Option<usize>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Show how a corpus would be split into chunks, without analyzing it.
    Plan {
        /// Corpus root directory.
        corpus: PathBuf,

        #[command(flatten)]
        plan: PlanArgs,

        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Analyze a corpus end to end and write a run directory.
    Run {
        /// Corpus root directory.
        corpus: PathBuf,

        #[command(flatten)]
        plan: PlanArgs,

        /// Output root (defaults to `[defaults].output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Analyzer backend: inventory or ollama.
        #[arg(long)]
        backend: Option<String>,

        /// Model name for the ollama backend.
        #[arg(long)]
        model: Option<String>,

        /// Maximum concurrent analysis calls.
        #[arg(long)]
        concurrency: Option<u32>,

        /// Retries per chunk after the first failed call.
        #[arg(long)]
        retries: Option<u32>,

        /// Skip the analysis cache.
        #[arg(long)]
        no_cache: bool,
    },

    /// List recent runs, or show one run in detail.
    History {
        /// Run id to show; omit to list recent runs.
        run_id: Option<String>,

        /// Maximum number of runs to show.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Analysis cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Drop cached analyses for one analyzer id (e.g. `inventory`, `ollama:llama3.1:8b`).
    Clear {
        #[arg(long)]
        analyzer: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docweave=info",
        1 => "docweave=debug",
        _ => "docweave=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Plan { corpus, plan, json } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_plan(&config, &corpus, &plan, json)
        }
        Command::Run {
            corpus,
            plan,
            out,
            backend,
            model,
            concurrency,
            retries,
            no_cache,
        } => {
            let mut config = resolve_config(config_path.as_deref())?;
            if let Some(kind) = backend {
                config.backend.kind = kind.parse::<BackendKind>()?;
            }
            if let Some(model) = model {
                config.backend.model = model;
            }
            if let Some(concurrency) = concurrency {
                config.defaults.concurrency = concurrency;
            }
            if let Some(retries) = retries {
                config.defaults.max_retries = retries;
            }
            if no_cache {
                config.cache.enabled = false;
            }
            cmd_run(&config, &corpus, &plan, out).await
        }
        Command::History { run_id, limit } => cmd_history(run_id.as_deref(), limit).await,
        Command::Cache { action } => match action {
            CacheAction::Clear { analyzer } => cmd_cache_clear(&analyzer).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Config values with `plan`/`run` flag overrides applied.
fn run_settings(config: &AppConfig, plan: &PlanArgs) -> RunSettings {
    let mut settings = RunSettings::from(config);
    if let Some(budget) = plan.budget {
        settings.budget = budget;
    }
    if let Some(hops) = plan.hops {
        settings.cluster_hops = hops;
    }
    settings
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_plan(config: &AppConfig, corpus: &Path, args: &PlanArgs, json: bool) -> Result<()> {
    let settings = run_settings(config, args);
    let patterns = ReferencePatterns::compile(&config.patterns)?;
    let (corpus_units, plan) = plan_corpus(corpus, &settings, &patterns)?;
    let report = plan.report();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  Units:     {}", corpus_units.len());
    println!("  Edges:     {}", report.edge_count);
    println!("  Clusters:  {}", report.clusters.len());
    println!(
        "  Chunks:    {} (budget {}, hops {})",
        report.chunks.len(),
        report.budget,
        report.hops
    );
    println!();

    for chunk in &report.chunks {
        let flag = if chunk.chunk.oversized { "  OVERSIZED" } else { "" };
        println!(
            "  chunk {:>3}  {:>8} bytes{flag}",
            chunk.chunk.index, chunk.chunk.total_size
        );
        for unit in &chunk.chunk.units {
            println!("      {unit}");
        }
        if !chunk.external_callers.is_empty() {
            println!("      referenced from: {}", chunk.external_callers.join(", "));
        }
        if !chunk.external_callees.is_empty() {
            println!("      references:      {}", chunk.external_callees.join(", "));
        }
    }

    if !report.unresolved.is_empty() {
        println!();
        println!("  Unresolved: {}", report.unresolved.join(", "));
    }
    println!();
    Ok(())
}

async fn cmd_run(
    config: &AppConfig,
    corpus: &Path,
    args: &PlanArgs,
    out: Option<PathBuf>,
) -> Result<()> {
    let settings = run_settings(config, args);
    let patterns = ReferencePatterns::compile(&config.patterns)?;
    let analyzer = build_analyzer(&config.backend, &patterns)?;

    let output_root = out.unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));
    let run_config = RunConfig {
        corpus_root: corpus.to_path_buf(),
        output_root,
        settings,
        patterns,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        db_path: Some(default_db_path()?),
    };

    info!(corpus = %corpus.display(), backend = ?config.backend.kind, "starting run");

    let reporter = CliProgress::new();
    let result = match run_pipeline(&run_config, analyzer, &reporter).await {
        Ok(result) => result,
        Err(e) => {
            reporter.spinner.finish_and_clear();
            let failed = e.failed_chunks();
            if !failed.is_empty() {
                return Err(eyre!(e).wrap_err(format!(
                    "run aborted; chunks {failed:?} could not be analyzed"
                )));
            }
            return Err(e.into());
        }
    };

    let manifest = &result.manifest;
    println!();
    println!("  Run complete!");
    println!("  ID:         {}", result.run_id);
    println!("  Analyzer:   {}", manifest.analyzer);
    println!("  Units:      {}", manifest.unit_count);
    println!("  Chunks:     {}", manifest.chunk_count);
    println!(
        "  Cache:      {} hit(s), {} miss(es)",
        manifest.cache_hits, manifest.cache_misses
    );
    if !manifest.unresolved.is_empty() {
        println!("  Unresolved: {}", manifest.unresolved.join(", "));
    }
    if !manifest.oversized_chunks.is_empty() {
        println!("  Oversized:  chunks {:?}", manifest.oversized_chunks);
    }
    if manifest.dropped_lines > 0 {
        println!("  Dropped:    {} unrecognized line(s)", manifest.dropped_lines);
    }
    println!("  Path:       {}", result.run_dir.display());
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn chunk_analyzed(&self, chunk: usize, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Analyzing [{current}/{total}] chunk {chunk}"));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_history(run_id: Option<&str>, limit: u32) -> Result<()> {
    let storage = Storage::open(&default_db_path()?).await?;

    if let Some(id) = run_id {
        let run = storage
            .get_run(id)
            .await?
            .ok_or_else(|| eyre!("run not found: {id}"))?;
        println!("Run {}", run.id);
        println!("  Status:   {}", run.status.as_str());
        println!("  Analyzer: {}", run.analyzer);
        println!("  Corpus:   {}", run.corpus_root);
        println!("  Started:  {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
        if let Some(finished) = run.finished_at {
            println!("  Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
        }
        if let Some(stats) = run.stats_json {
            println!("  Stats:    {stats}");
        }
        if let Some(error) = run.error {
            println!("  Error:    {error}");
        }
        return Ok(());
    }

    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    for run in runs {
        let finished = run
            .finished_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {:<9}  {:<20}  {}  {}",
            run.id,
            run.status.as_str(),
            run.analyzer,
            finished,
            run.corpus_root
        );
        if let Some(error) = run.error {
            println!("    {error}");
        }
    }
    Ok(())
}

async fn cmd_cache_clear(analyzer: &str) -> Result<()> {
    let storage = Storage::open(&default_db_path()?).await?;
    let removed = storage.invalidate_analysis_cache(analyzer).await?;
    println!("Removed {removed} cached analysis entr{}", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "docweave",
            "-v",
            "run",
            "corpus",
            "--budget",
            "1000",
            "--backend",
            "ollama",
            "--no-cache",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Run {
                corpus,
                plan,
                backend,
                no_cache,
                ..
            } => {
                assert_eq!(corpus, PathBuf::from("corpus"));
                assert_eq!(plan.budget, Some(1000));
                assert_eq!(backend.as_deref(), Some("ollama"));
                assert!(no_cache);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn plan_flags_override_config() {
        let config = AppConfig::default();
        let args = PlanArgs {
            budget: Some(123),
            hops: None,
        };
        let settings = run_settings(&config, &args);
        assert_eq!(settings.budget, 123);
        assert_eq!(settings.cluster_hops, config.defaults.cluster_hops);
    }

    #[test]
    fn history_takes_optional_run_id() {
        let cli = Cli::try_parse_from(["docweave", "history"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::History {
                run_id: None,
                limit: 20
            }
        ));

        let cli = Cli::try_parse_from(["docweave", "history", "0192-run"]).expect("parse");
        match cli.command {
            Command::History { run_id, .. } => assert_eq!(run_id.as_deref(), Some("0192-run")),
            _ => panic!("expected history"),
        }
    }

    #[test]
    fn plan_requires_corpus() {
        assert!(Cli::try_parse_from(["docweave", "plan"]).is_err());
    }
}
