//! graphenv - environment versioning for node-graph workflows
//!
//! ## Commands
//!
//! - `init`: Create the tracked directory and its repository
//! - `status`: Show which live workflows differ from the tracked copies
//! - `analyze`: List the dependencies of one or every workflow
//! - `resolve`: Resolve dependencies against the configured registries
//! - `sync`: Copy live workflows into the tracked directory
//! - `commit`: Sync, then record a version
//! - `log`: Show version history
//! - `rollback`: Restore a previous version
//! - `normalize` / `identity`: Inspect the comparison and identity rules

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

use graphenv_core::{
    normalize_for_comparison, BatchResolution, Dependencies, EnvConfig, Environment,
    ModelLookup, ResolutionResult, SessionContext, WorkflowStatus, WorkflowSyncReport,
};
use node_registry::{mapping_source, model_lookup, MappingTableSource, ModelIndex, RegistryError};

#[derive(Parser)]
#[command(name = "graphenv")]
#[command(author = "graphenv contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Versioned environments for node-graph workflows", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Live application directory
    #[arg(long, global = true, env = "GRAPHENV_LIVE_DIR")]
    live_dir: Option<PathBuf>,

    /// Tracked environment directory
    #[arg(long, global = true, env = "GRAPHENV_TRACKED_DIR")]
    tracked_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the tracked directory
    Init,

    /// Show uncommitted workflow changes
    Status,

    /// List the dependencies of a workflow (all workflows if omitted)
    Analyze {
        workflow: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Resolve dependencies against the mapping table and model registry
    Resolve {
        workflow: Option<String>,

        /// Extension-node-map document (overrides GRAPHENV_MAPPING_FILE)
        #[arg(long)]
        mapping_file: Option<PathBuf>,

        /// Build the model index by scanning this directory
        #[arg(long)]
        models_dir: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Copy live workflows into the tracked directory without committing
    Sync,

    /// Record the live workflows as a new version
    Commit {
        #[arg(short, long)]
        message: String,
    },

    /// Show version history
    Log {
        /// Maximum number of versions to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Roll the environment back to a previous version
    Rollback {
        /// Version id or unique prefix
        version: String,

        /// Discard uncommitted changes
        #[arg(short, long)]
        force: bool,
    },

    /// Print the comparison form of a workflow file
    Normalize { file: PathBuf },

    /// Print the canonical identity of a repository URL
    Identity { url: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    graphenv_core::telemetry::init_tracing(cli.json, level);

    let config = build_config(cli.live_dir, cli.tracked_dir);
    let mut session = SessionContext::new();

    match cli.command {
        Commands::Init => cmd_init(config),
        Commands::Status => cmd_status(config).await,
        Commands::Analyze { workflow, format } => cmd_analyze(config, workflow.as_deref(), format),
        Commands::Resolve {
            workflow,
            mapping_file,
            models_dir,
            format,
        } => {
            let mut config = config;
            if let Some(path) = mapping_file {
                config.registry = config.registry.with_mapping_file(path);
            }
            cmd_resolve(
                config,
                workflow.as_deref(),
                models_dir.as_deref(),
                format,
                &mut session,
            )
            .await
        }
        Commands::Sync => cmd_sync(config),
        Commands::Commit { message } => cmd_commit(config, &message).await,
        Commands::Log { limit } => cmd_log(config, limit).await,
        Commands::Rollback { version, force } => cmd_rollback(config, &version, force).await,
        Commands::Normalize { file } => cmd_normalize(&file),
        Commands::Identity { url } => {
            println!("{}", graphenv_core::normalize(Some(&url)));
            Ok(())
        }
    }
}

fn build_config(live_dir: Option<PathBuf>, tracked_dir: Option<PathBuf>) -> EnvConfig {
    let mut config = EnvConfig::from_env();
    if let Some(path) = live_dir {
        config = config.with_live_dir(path);
    }
    if let Some(path) = tracked_dir {
        config = config.with_tracked_dir(path);
    }
    config
}

fn open(config: EnvConfig) -> Result<Environment> {
    let tracked = config.tracked_dir.clone();
    Environment::open(config).with_context(|| {
        format!(
            "{} is not a graphenv environment (run `graphenv init`)",
            tracked.display()
        )
    })
}

fn cmd_init(config: EnvConfig) -> Result<()> {
    let env = Environment::init(config).context("Failed to initialize environment")?;
    println!(
        "Initialized graphenv environment at {}",
        env.config().tracked_dir.display()
    );
    println!(
        "Tracking workflows from {}",
        env.config().live_workflows_dir().display()
    );
    Ok(())
}

async fn cmd_status(config: EnvConfig) -> Result<()> {
    let env = open(config)?;
    let status = env.status().await?;

    match &status.head {
        Some(head) => println!("On version {}", head.short()),
        None => println!("No versions yet"),
    }
    if status.is_clean() {
        println!("Nothing to commit, environment clean");
        return Ok(());
    }
    if status.tracked_dirty {
        println!("Tracked directory has uncommitted changes");
    }
    for workflow in &status.workflows {
        let label = match workflow.status {
            WorkflowStatus::New => "new",
            WorkflowStatus::Modified => "modified",
            WorkflowStatus::Deleted => "deleted",
            WorkflowStatus::Synced => continue,
        };
        println!("  {label:>9}: {}", workflow.name);
    }
    Ok(())
}

fn cmd_analyze(config: EnvConfig, workflow: Option<&str>, format: OutputFormat) -> Result<()> {
    let manager = graphenv_core::WorkflowManager::from_config(&config);

    let analyzed: Vec<(String, Dependencies)> = match workflow {
        Some(name) => vec![(name.to_string(), manager.analyze_workflow(name)?)],
        None => {
            let batch = manager.analyze_all()?;
            for failure in &batch.failures {
                eprintln!("skipped {}: {}", failure.name, failure.error);
            }
            batch.workflows
        }
    };

    match format {
        OutputFormat::Json => {
            let doc: serde_json::Map<String, Value> = analyzed
                .iter()
                .map(|(name, deps)| Ok((name.clone(), serde_json::to_value(deps)?)))
                .collect::<Result<_>>()?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        OutputFormat::Text => {
            for (name, deps) in &analyzed {
                print!("{}", render_dependencies(name, deps));
            }
        }
    }
    Ok(())
}

async fn cmd_resolve(
    config: EnvConfig,
    workflow: Option<&str>,
    models_dir: Option<&Path>,
    format: OutputFormat,
    session: &mut SessionContext,
) -> Result<()> {
    let mapping = mapping_source(&config.registry)?
        .fetch()
        .await
        .context("Failed to load node mapping table")?;
    let lookup = load_model_lookup(&config, models_dir).await?;

    let manager = graphenv_core::WorkflowManager::from_config(&config);
    let batch = match workflow {
        Some(name) => {
            let deps = manager.analyze_workflow(name)?;
            let result = manager
                .resolve_workflow(&deps, &mapping, lookup.as_ref())
                .await;
            BatchResolution {
                workflows: vec![(name.to_string(), result)],
                failures: Vec::new(),
            }
        }
        None => manager.resolve_all(&mapping, lookup.as_ref()).await?,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&batch_json(&batch)?)?),
        OutputFormat::Text => {
            for (name, result) in &batch.workflows {
                print!("{}", render_resolution(name, result));
            }
            for failure in &batch.failures {
                println!("{}: failed: {}", failure.name, failure.error);
            }
            if batch.workflows.len() > 1 {
                println!("total {}", batch.aggregate());
            }
        }
    }

    let legacy = batch.aggregate().legacy_node_matches();
    if legacy > 0 && session.take_legacy_notice() {
        println!();
        println!(
            "note: {legacy} node(s) were matched by type alone. Re-save these workflows \
             with current custom nodes installed so they record their package."
        );
    }
    Ok(())
}

/// Model lookup from `--models-dir`, else from the registry configuration.
/// With neither, every model stays unresolved.
async fn load_model_lookup(
    config: &EnvConfig,
    models_dir: Option<&Path>,
) -> Result<Box<dyn ModelLookup>> {
    if let Some(dir) = models_dir {
        let index = ModelIndex::scan(dir)
            .with_context(|| format!("Failed to index models in {}", dir.display()))?;
        info!(models = index.len(), "indexed model directory");
        return Ok(Box::new(index));
    }
    match model_lookup(&config.registry).await {
        Ok(lookup) => Ok(lookup),
        Err(RegistryError::NotConfigured(hint)) => {
            warn!(%hint, "no model registry configured");
            Ok(Box::new(ModelIndex::new(Vec::new())))
        }
        Err(e) => Err(e).context("Failed to load model registry"),
    }
}

fn cmd_sync(config: EnvConfig) -> Result<()> {
    let env = open(config)?;
    let report = env.workflows().copy_all_workflows()?;
    print_sync(&report, "updated");
    if !report.changed() {
        println!("Tracked workflows already up to date");
    }
    Ok(())
}

fn print_sync(report: &WorkflowSyncReport, verb: &str) {
    for name in &report.copied {
        println!("  {verb}: {name}");
    }
    for name in &report.removed {
        println!("  removed: {name}");
    }
}

async fn cmd_commit(config: EnvConfig, message: &str) -> Result<()> {
    let mut env = open(config)?;
    let outcome = env.commit(message).await?;

    print_sync(&outcome.sync, "updated");
    match outcome.version {
        Some(version) => println!("[{}] {}", version.short(), message),
        None => println!("Nothing to commit"),
    }
    Ok(())
}

async fn cmd_log(config: EnvConfig, limit: usize) -> Result<()> {
    let env = open(config)?;
    let history = env.history(Some(limit)).await?;

    if history.is_empty() {
        println!("No versions yet");
        return Ok(());
    }

    for version in history {
        println!("version {}", version.id);
        println!(
            "Date:    {}",
            version.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!();
        println!("    {}", version.message);
        println!();
    }
    Ok(())
}

async fn cmd_rollback(config: EnvConfig, version: &str, force: bool) -> Result<()> {
    let mut env = open(config)?;
    let outcome = env
        .rollback(version, force)
        .await
        .with_context(|| format!("Rollback to {version} failed"))?;

    if outcome.discarded_uncommitted {
        println!("Discarded uncommitted changes");
    }
    print_sync(&outcome.sync, "restored");
    match outcome.recorded {
        Some(recorded) => println!(
            "Rolled back to {} (recorded as {})",
            outcome.target.short(),
            recorded.short()
        ),
        None => println!("Already at {}", outcome.target.short()),
    }
    Ok(())
}

fn cmd_normalize(file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read workflow file: {}", file.display()))?;
    let workflow: Value = serde_json::from_str(&raw).context("Failed to parse workflow as JSON")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&normalize_for_comparison(&workflow))?
    );
    Ok(())
}

fn render_dependencies(name: &str, deps: &Dependencies) -> String {
    let mut out = format!(
        "{name}: {} custom node(s), {} builtin node(s), {} model(s)\n",
        deps.nodes.len(),
        deps.builtin_nodes.len(),
        deps.models.len()
    );
    for node in &deps.nodes {
        match &node.provenance {
            Some(p) => out.push_str(&format!("  {node} from {}\n", p.package_id)),
            None => out.push_str(&format!("  {node}\n")),
        }
    }
    for model in &deps.models {
        out.push_str(&format!("  {model}\n"));
    }
    out
}

fn render_resolution(name: &str, result: &ResolutionResult) -> String {
    let mut out = format!("{name}: {result}\n");
    for node in &result.nodes_resolved {
        out.push_str(&format!(
            "  {} -> {} [{}]\n",
            node.reference,
            node.source_id,
            node.matched_by.as_str()
        ));
    }
    for model in &result.models_resolved {
        out.push_str(&format!(
            "  {} -> {} [{}]\n",
            model.reference,
            model.source_id,
            model.matched_by.as_str()
        ));
    }
    for node in &result.nodes_unresolved {
        out.push_str(&format!("  unresolved {node}\n"));
    }
    for model in &result.models_unresolved {
        out.push_str(&format!("  unresolved {model}\n"));
    }
    for node in &result.nodes_ambiguous {
        out.push_str(&format!(
            "  ambiguous {}: {}\n",
            node.reference,
            node.candidates.join(", ")
        ));
    }
    for model in &result.models_ambiguous {
        out.push_str(&format!(
            "  ambiguous {}: {}\n",
            model.reference,
            model.candidates.join(", ")
        ));
    }
    for failure in &result.lookup_failures {
        out.push_str(&format!("  lookup failed: {failure}\n"));
    }
    out
}

fn batch_json(batch: &BatchResolution) -> Result<Value> {
    let mut workflows = serde_json::Map::new();
    for (name, result) in &batch.workflows {
        workflows.insert(name.clone(), serde_json::to_value(result)?);
    }
    let failures: Vec<Value> = batch
        .failures
        .iter()
        .map(|f| json!({"workflow": f.name, "error": f.error.to_string()}))
        .collect();
    Ok(json!({
        "workflows": workflows,
        "failures": failures,
        "has_issues": batch.has_issues(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphenv_core::{MatchKind, ModelReference, NodeReference, Provenance, Resolved};

    #[test]
    fn test_rollback_parses_force_flag() {
        let cli = Cli::try_parse_from(["graphenv", "rollback", "abc123", "--force"]).unwrap();
        match cli.command {
            Commands::Rollback { version, force } => {
                assert_eq!(version, "abc123");
                assert!(force);
            }
            _ => panic!("expected rollback"),
        }
    }

    #[test]
    fn test_global_directories_after_subcommand() {
        let cli = Cli::try_parse_from([
            "graphenv",
            "status",
            "--live-dir",
            "/srv/comfy",
            "--tracked-dir",
            "/srv/env",
        ])
        .unwrap();
        let config = build_config(cli.live_dir, cli.tracked_dir);
        assert_eq!(config.live_dir, PathBuf::from("/srv/comfy"));
        assert_eq!(config.tracked_dir, PathBuf::from("/srv/env"));
    }

    #[test]
    fn test_commit_requires_message() {
        assert!(Cli::try_parse_from(["graphenv", "commit"]).is_err());
    }

    #[test]
    fn test_render_resolution_lists_every_outcome() {
        let mut result = ResolutionResult::default();
        result.nodes_resolved.push(Resolved {
            reference: NodeReference::new("3", "SAMLoader")
                .with_provenance(Provenance::new("comfyui-impact-pack")),
            source_id: "https://github.com/ltdrdata/ComfyUI-Impact-Pack".to_string(),
            matched_by: MatchKind::Provenance,
        });
        result
            .nodes_unresolved
            .push(NodeReference::new("6", "NoSuchNode"));
        result
            .models_unresolved
            .push(ModelReference::new("missing.safetensors", "4", "ckpt_name"));

        let text = render_resolution("portrait", &result);
        assert!(text.starts_with("portrait: "));
        assert!(text.contains("ComfyUI-Impact-Pack [provenance]"));
        assert!(text.contains("unresolved node 6 (NoSuchNode)"));
        assert!(text.contains("missing.safetensors"));
    }

    #[tokio::test]
    async fn test_commit_then_rollback_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = EnvConfig::new(dir.path().join("ComfyUI"), dir.path().join("env"));
        let live = config.live_workflows_dir();
        std::fs::create_dir_all(&live).unwrap();

        cmd_init(config.clone()).unwrap();
        std::fs::write(live.join("a.json"), r#"{"nodes": [], "links": []}"#).unwrap();
        cmd_commit(config.clone(), "first").await.unwrap();

        let env = open(config.clone()).unwrap();
        let first = env.history(Some(1)).await.unwrap().remove(0).id;

        std::fs::write(live.join("b.json"), r#"{"nodes": [], "links": []}"#).unwrap();
        assert!(cmd_rollback(config.clone(), first.as_str(), false)
            .await
            .is_err());
        assert!(live.join("b.json").exists());

        cmd_rollback(config.clone(), first.as_str(), true)
            .await
            .unwrap();
        assert!(!live.join("b.json").exists());
        assert!(live.join("a.json").exists());
    }

    #[test]
    fn test_open_without_init_explains() {
        let dir = tempfile::tempdir().unwrap();
        let config = EnvConfig::new(dir.path().join("ComfyUI"), dir.path().join("env"));
        let err = open(config).err().unwrap();
        assert!(err.to_string().contains("graphenv init"));
    }
}
