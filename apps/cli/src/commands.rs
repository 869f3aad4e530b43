//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docsmith_core::{
    BuildOutcome, BuildRequest, CoordinatorOptions, Pipeline, ProgressReporter, TaskCoordinator,
};
use docsmith_shared::{
    AppConfig, DocType, PackageIdentity, config_dir, init_config, load_config, load_config_from,
};
use docsmith_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Status database file under the config directory.
const DATABASE_FILE: &str = "docsmith.db";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// DocSmith: build and cache browsable documentation for Python packages.
#[derive(Parser)]
#[command(
    name = "docsmith",
    version,
    about = "Build and cache browsable documentation for package versions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.docsmith/docsmith.toml.
    #[arg(long, env = "DOCSMITH_CONFIG", global = true)]
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build the docset for a package version (attaches to a running build).
    Build(BuildArgs),

    /// Show the docset status for a package version.
    Status(PackageArgs),

    /// Delete the docset for a package version.
    Delete(PackageArgs),

    /// Delete and rebuild the docset for a package version.
    Regenerate(BuildArgs),

    /// List docsets present in the docset directory.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub(crate) struct PackageArgs {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
}

#[derive(Args)]
pub(crate) struct BuildArgs {
    #[command(flatten)]
    pub package: PackageArgs,

    /// Repository URL (discovered from package metadata when omitted).
    #[arg(long)]
    pub vcs_url: Option<String>,

    /// Documentation-host project slug (defaults to the package name).
    #[arg(long)]
    pub slug: Option<String>,

    /// Default-branch hint for clone fallbacks.
    #[arg(long)]
    pub branch: Option<String>,

    /// Force a documentation type: sphinx, mkdocs, pdoc, readthedocs.
    #[arg(long)]
    pub doc_type: Option<String>,

    /// Document a local source tree instead of fetching one.
    #[arg(long)]
    pub source: Option<PathBuf>,
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
        0 => "docsmith=info",
        1 => "docsmith=debug",
        _ => "docsmith=trace",
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
        Command::Build(args) => cmd_build(config_path, args, false).await,
        Command::Regenerate(args) => cmd_build(config_path, args, true).await,
        Command::Status(args) => cmd_status(config_path, &args).await,
        Command::Delete(args) => cmd_delete(config_path, &args).await,
        Command::List { json } => cmd_list(config_path, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    })
}

/// Open the status database, build the coordinator and reconcile it with
/// the docset directory.
async fn open_coordinator(
    config: &AppConfig,
    progress: Option<Arc<dyn ProgressReporter>>,
) -> Result<TaskCoordinator> {
    let pipeline = Pipeline::from_config(config)?;
    let store = Storage::open(&config_dir()?.join(DATABASE_FILE)).await?;
    let mut coordinator =
        TaskCoordinator::new(pipeline, Arc::new(store), CoordinatorOptions::from(config));
    if let Some(progress) = progress {
        coordinator = coordinator.with_progress(progress);
    }
    coordinator.refresh().await?;
    Ok(coordinator)
}

fn identity(args: &PackageArgs) -> Result<PackageIdentity> {
    Ok(PackageIdentity::new(&args.name, &args.version)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(config_path: Option<PathBuf>, args: BuildArgs, regenerate: bool) -> Result<()> {
    let config = resolve_config(config_path)?;

    let mut request = BuildRequest::new(identity(&args.package)?);
    request.vcs_url = args.vcs_url;
    request.project_slug = args.slug;
    request.default_branch = args.branch;
    request.source_path = args.source;
    if let Some(doc_type) = args.doc_type.as_deref() {
        request.doc_type_hint = doc_type.parse::<DocType>()?;
    }

    info!(identity = %request.identity, regenerate, "building docset");

    let progress = Arc::new(CliProgress::new()?);
    let reporter: Arc<dyn ProgressReporter> = progress.clone();
    let coordinator = open_coordinator(&config, Some(reporter)).await?;
    let handle = if regenerate {
        coordinator.regenerate(request).await?
    } else {
        coordinator.submit(request).await?
    };
    let outcome = handle.wait().await;
    progress.finish();
    coordinator.shutdown().await;

    report(&outcome)
}

fn report(outcome: &BuildOutcome) -> Result<()> {
    if !outcome.success {
        return Err(eyre!("build failed for {}: {}", outcome.identity, outcome.message));
    }
    println!();
    println!("  Docset ready!");
    println!("  Package: {}", outcome.identity);
    if let Some(path) = &outcome.artifact_path {
        println!("  Path:    {}", path.display());
    }
    println!();
    Ok(())
}

async fn cmd_status(config_path: Option<PathBuf>, args: &PackageArgs) -> Result<()> {
    let config = resolve_config(config_path)?;
    let id = identity(args)?;
    let coordinator = open_coordinator(&config, None).await?;

    let status = coordinator.status(&id).await;
    println!("{id}: {status}");
    if let Some(error) = coordinator.last_error(&id).await {
        println!("  last error: {error}");
    }
    Ok(())
}

async fn cmd_delete(config_path: Option<PathBuf>, args: &PackageArgs) -> Result<()> {
    let config = resolve_config(config_path)?;
    let id = identity(args)?;
    let coordinator = open_coordinator(&config, None).await?;

    coordinator.delete(&id).await?;
    println!("Deleted docset for {id}");
    Ok(())
}

async fn cmd_list(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let coordinator = open_coordinator(&config, None).await?;
    let docsets = coordinator.list_docsets().await?;

    if json {
        let entries: Vec<serde_json::Value> = docsets
            .iter()
            .map(|(id, path)| {
                serde_json::json!({
                    "name": id.name(),
                    "version": id.version(),
                    "path": path.display().to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if docsets.is_empty() {
        println!("No docsets in {}", coordinator.base_dir().display());
        return Ok(());
    }
    for (id, path) in &docsets {
        println!("  {:<32} {:<16} {}", id.name(), id.version(), path.display());
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
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
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, identity: &PackageIdentity, name: &str) {
        self.spinner.set_message(format!("{identity}: {name}"));
    }
}
