use anyhow::Result;
use artifact_patcher::config::{load_for_extension, load_from_path, PatcherConfig};
use artifact_patcher::module::{ApplyOptions, PatchOutcome, Reason, Target};
use artifact_patcher::patches;
use artifact_patcher::pipeline::{FileReport, MarkerStatus, Pipeline, PipelineReport};
use artifact_patcher::PatchError;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "artifact-patcher")]
#[command(about = "Idempotent, fail-fast patching of bundled extension artifacts", long_about = None)]
#[command(version)]
struct Cli {
    /// Patcher config (defaults to <EXTENSION_DIR>/artifact-patcher.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct RunFlags {
    /// Dry run - compute every patch without writing files
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show unified diff of changes
    #[arg(short, long)]
    diff: bool,
}

impl RunFlags {
    fn options(self) -> ApplyOptions {
        ApplyOptions {
            dry_run: self.dry_run,
            preview: self.diff,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every configured module to an extension directory
    Apply {
        /// Unpacked extension directory
        extension: PathBuf,

        /// Run only these modules (repeatable); canonical order is kept
        #[arg(long = "only", value_name = "MODULE")]
        only: Vec<String>,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Report which module markers are present, without modifying anything
    Status {
        /// Unpacked extension directory
        extension: PathBuf,
    },

    /// List available modules, their targets and markers
    List,

    /// Route official-backend calls through the BYOK official connection
    OfficialOverrides {
        /// Extension bundle (out/extension.js)
        path: PathBuf,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Default the remember tool's memory size cap
    MemoriesUpperBoundSize {
        /// Extension bundle (out/extension.js)
        path: PathBuf,

        /// Fallback when feature flags carry no upper bound
        #[arg(long, value_name = "BYTES")]
        default_upper_bound_size: Option<u64>,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Create the conversation's root task list on demand
    TasklistAutoRoot {
        /// Extension bundle (out/extension.js)
        path: PathBuf,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Drop blank parent/after task ids in add_tasks
    TasklistAddTasksSanitizeEmptyIds {
        /// Extension bundle (out/extension.js)
        path: PathBuf,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Report per-task failures from add_tasks
    TasklistAddTasksErrors {
        /// Extension bundle (out/extension.js)
        path: PathBuf,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Fall back to structured tool-use nodes in AugmentMessage assets
    WebviewTooluseFallback {
        /// Unpacked extension directory
        extension: PathBuf,

        #[command(flatten)]
        run: RunFlags,
    },

    /// Store history summaries as slim TEXT nodes in webview state
    WebviewHistorySummaryNode {
        /// Unpacked extension directory
        extension: PathBuf,

        #[command(flatten)]
        run: RunFlags,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(error) = run(cli) {
        report_failure(&error);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let explicit = cli.config.as_deref();
    let json = cli.json;

    match cli.command {
        Commands::Apply {
            extension,
            only,
            run,
        } => cmd_apply(explicit, &extension, only, run, json),

        Commands::Status { extension } => cmd_status(explicit, &extension, json),

        Commands::List => cmd_list(json),

        Commands::OfficialOverrides { path, run } => {
            cmd_bundle_module("official-overrides", explicit, &path, None, run, json)
        }
        Commands::MemoriesUpperBoundSize {
            path,
            default_upper_bound_size,
            run,
        } => cmd_bundle_module(
            "memories-upper-bound-size",
            explicit,
            &path,
            default_upper_bound_size,
            run,
            json,
        ),
        Commands::TasklistAutoRoot { path, run } => {
            cmd_bundle_module("tasklist-auto-root", explicit, &path, None, run, json)
        }
        Commands::TasklistAddTasksSanitizeEmptyIds { path, run } => cmd_bundle_module(
            "tasklist-add-tasks-sanitize-empty-ids",
            explicit,
            &path,
            None,
            run,
            json,
        ),
        Commands::TasklistAddTasksErrors { path, run } => {
            cmd_bundle_module("tasklist-add-tasks-errors", explicit, &path, None, run, json)
        }

        Commands::WebviewTooluseFallback { extension, run } => {
            cmd_asset_module("webview-tooluse-fallback", explicit, &extension, run, json)
        }
        Commands::WebviewHistorySummaryNode { extension, run } => {
            cmd_asset_module("webview-history-summary-node", explicit, &extension, run, json)
        }
    }
}

fn cmd_apply(
    explicit: Option<&Path>,
    extension: &Path,
    only: Vec<String>,
    run: RunFlags,
    json: bool,
) -> Result<()> {
    let mut config = load_for_extension(explicit, extension)?;
    if !only.is_empty() {
        config.pipeline.modules = only;
    }

    let pipeline = Pipeline::from_config(&config, run.options())?;
    if !json {
        println!("Extension: {}", extension.display());
        if run.dry_run {
            println!("{}", "[DRY RUN - nothing will be written]".cyan());
        }
        println!();
    }

    let report = pipeline.run_extension(extension)?;
    print_report(&report, run.diff, json)
}

fn cmd_bundle_module(
    name: &str,
    explicit: Option<&Path>,
    path: &Path,
    default_upper_bound_size: Option<u64>,
    run: RunFlags,
    json: bool,
) -> Result<()> {
    let mut config = match explicit {
        Some(file) => load_from_path(file)?,
        None => PatcherConfig::default(),
    };
    if let Some(size) = default_upper_bound_size {
        config.memories.default_upper_bound_size = size;
    }
    config.pipeline.modules = vec![name.to_string()];

    let file = Pipeline::from_config(&config, run.options())?.run_file(path)?;
    let report = PipelineReport {
        changed: file.outcomes.iter().any(|o| o.changed),
        dry_run: run.dry_run,
        files: vec![file],
    };
    print_report(&report, run.diff, json)
}

fn cmd_asset_module(
    name: &str,
    explicit: Option<&Path>,
    extension: &Path,
    run: RunFlags,
    json: bool,
) -> Result<()> {
    let mut config = load_for_extension(explicit, extension)?;
    config.pipeline.modules = vec![name.to_string()];

    let report = Pipeline::from_config(&config, run.options())?.run_extension(extension)?;
    print_report(&report, run.diff, json)
}

fn cmd_status(explicit: Option<&Path>, extension: &Path, json: bool) -> Result<()> {
    let config = load_for_extension(explicit, extension)?;
    let statuses = Pipeline::from_config(&config, ApplyOptions::default())?.status(extension)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!("{}", "Patch Status Report".bold());
    println!("Extension: {}", extension.display());
    println!();

    let (applied, pending): (Vec<&MarkerStatus>, Vec<&MarkerStatus>) =
        statuses.iter().partition(|s| s.applied);

    if !applied.is_empty() {
        println!(
            "{} {} ({} targets)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for status in &applied {
            println!("  - {} ({})", status.module, status.file.display());
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} targets)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            pending.len()
        );
        for status in &pending {
            println!("  - {} ({})", status.module, status.file.display());
        }
        println!();
    }

    Ok(())
}

#[derive(Serialize)]
struct ModuleInfo {
    name: &'static str,
    target: Target,
    marker: &'static str,
}

fn cmd_list(json: bool) -> Result<()> {
    let modules: Vec<ModuleInfo> = patches::build_selected(&[], &PatcherConfig::default())?
        .iter()
        .map(|m| ModuleInfo {
            name: m.name(),
            target: m.target(),
            marker: m.marker(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    println!("{}", "Available modules (canonical order):".bold());
    for module in &modules {
        let target = match module.target {
            Target::Bundle => "bundle".to_string(),
            Target::WebviewAsset { prefix } => format!("assets {prefix}*.js"),
        };
        println!("  {} [{}]", module.name, target.cyan());
        println!("    {}", module.marker.dimmed());
    }
    Ok(())
}

fn print_report(report: &PipelineReport, show_diff: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let mut applied = 0;
    let mut already_applied = 0;

    for FileReport { path, outcomes } in &report.files {
        println!("{}", path.display().to_string().bold());
        for outcome in outcomes {
            match outcome.reason {
                Reason::Patched => {
                    let verb = if report.dry_run { "Would apply" } else { "Applied" };
                    println!("  {} {}: {}{}", "✓".green(), outcome.module, verb, details(outcome));
                    applied += 1;

                    if show_diff {
                        if let Some(preview) = &outcome.preview {
                            display_diff(&outcome.file, &preview.before, &preview.after);
                        }
                    }
                }
                Reason::AlreadyPatched => {
                    println!("  {} {}: Already applied", "⊙".yellow(), outcome.module);
                    already_applied += 1;
                }
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", applied).green());
    println!("  {} already applied", format!("{}", already_applied).yellow());
    Ok(())
}

fn details(outcome: &PatchOutcome) -> String {
    if outcome.details.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = outcome
        .details
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    format!(" {}", format!("({})", pairs.join(", ")).dimmed())
}

/// Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
    println!();
}

fn report_failure(error: &anyhow::Error) {
    eprintln!("{} {}", "✗".red(), error);

    let Some(patch_error) = error.downcast_ref::<PatchError>() else {
        return;
    };
    if patch_error.is_drift() {
        eprintln!("  {}", "CONFLICT: the artifact no longer matches this module's anchors".red());
        eprintln!("  Possible causes:");
        eprintln!("    - upstream renamed or re-minified the targeted code");
        eprintln!("    - the extension version is outside the supported range");
        eprintln!("  Nothing was written for the failing module.");
    }
}
