//! promptfill: fill generated regions of source files from `@prompt` directives.
//!
//! - `promptfill process src/main/java/app` fills every region of every `.java` file
//! - `promptfill scan Calc.java --json` lists directives without calling a backend
//! - `promptfill export Calc.java --method compute` copies a filled region into a `.cdiag` model

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use promptfill::config::{ConfigFile, Overrides, Settings};
use promptfill::{
    create_backend, diagram, scanner, BackendKind, BatchReport, CancellationFlag, InteractionMode,
    Orchestrator, ProcessError,
};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "promptfill",
    version,
    about = "Fill generated regions of source files with backend-generated method bodies"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: promptfill.toml in the processed folder)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Source file extension to recognize (default: java)
    #[arg(long, global = true)]
    extension: Option<String>,

    /// Log debug events
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fill every generated region of a file, or of every source file in a folder
    Process {
        /// Source file or folder
        path: PathBuf,

        #[command(flatten)]
        backend: BackendArgs,
    },

    /// List directives and their regions without calling a backend
    Scan {
        file: PathBuf,

        /// Print the scanned directives as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy a method's generated region into a structured model file
    Export {
        file: PathBuf,

        /// Method to export (default: the only method with a generated region)
        #[arg(long)]
        method: Option<String>,

        /// Model file (default: first *.cdiag under --root)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Where to look for a model file
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Language tag written into the implementation block
        #[arg(long)]
        language: Option<String>,
    },
}

#[derive(Args)]
struct BackendArgs {
    /// Backend to use
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Backend endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Model name sent to the serving backend
    #[arg(long)]
    model: Option<String>,

    /// Interaction mode of the serving backend
    #[arg(long, value_enum)]
    mode: Option<InteractionMode>,

    /// Extra system instruction appended to the body-only constraint
    #[arg(long)]
    system_prompt: Option<String>,

    /// Bearer credential for the serving backend
    #[arg(long, env = "PROMPTFILL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Process { path, backend } => {
            let overrides = Overrides {
                kind: backend.backend,
                endpoint: backend.endpoint,
                model: backend.model,
                mode: backend.mode,
                system_prompt: backend.system_prompt,
                api_key: backend.api_key,
                extension: cli.extension,
            };
            process(path, cli.config.as_deref(), overrides).await
        }
        Command::Scan { file, json } => scan(&file, json),
        Command::Export {
            file,
            method,
            model,
            root,
            language,
        } => {
            let folder = parent_folder(&file);
            let settings = load_settings(
                cli.config.as_deref(),
                &folder,
                Overrides {
                    extension: cli.extension,
                    ..Overrides::default()
                },
            )?;
            let language = language.unwrap_or(settings.language);
            export(&file, method.as_deref(), model, &root, &language)
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new("promptfill=debug")
    } else if quiet {
        EnvFilter::new("promptfill=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("promptfill=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(config: Option<&Path>, folder: &Path, overrides: Overrides) -> Result<Settings> {
    let file = ConfigFile::discover(config, folder).context("failed to load configuration")?;
    Ok(file.resolve(overrides))
}

/// Folder a single file's context comes from.
fn parent_folder(file: &Path) -> PathBuf {
    match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn process(path: PathBuf, config: Option<&Path>, overrides: Overrides) -> Result<()> {
    let single_file = if path.is_dir() {
        false
    } else if path.is_file() {
        true
    } else {
        bail!("{} does not exist", path.display());
    };
    let folder = if single_file {
        parent_folder(&path)
    } else {
        path.clone()
    };
    let settings = load_settings(config, &folder, overrides)?;
    info!(
        backend = settings.backend.kind.as_str(),
        endpoint = %settings.backend.endpoint,
        "using backend"
    );

    let cancel = CancellationFlag::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if watch_interrupts(&cancel, tokio::signal::ctrl_c).await {
                std::process::exit(130);
            }
        })
    };

    let report = tokio::task::spawn_blocking(move || {
        run_batch(&path, single_file, &folder, &settings, cancel)
    })
    .await
    .context("processing worker stopped unexpectedly")??;
    watcher.abort();

    info!(
        files = report.files.len(),
        completed = report.completed(),
        failed = report.failed(),
        skipped = report.skipped(),
        cancelled = report.cancelled,
        "batch finished"
    );
    println!("{report}");
    Ok(())
}

/// First interrupt requests cancellation, a second one asks to abort.
///
/// Returns `true` when the caller should exit without waiting for the
/// task in flight (a backend call can block for a long time).
async fn watch_interrupts<F, Fut>(cancel: &CancellationFlag, mut interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    warn!("interrupt received, stopping after the current task (Ctrl-C again aborts)");
    cancel.cancel();
    if interrupt().await.is_err() {
        return false;
    }
    warn!("second interrupt, aborting");
    true
}

fn run_batch(
    path: &Path,
    single_file: bool,
    folder: &Path,
    settings: &Settings,
    cancel: CancellationFlag,
) -> Result<BatchReport, ProcessError> {
    let backend = create_backend(&settings.backend);
    let orchestrator = Orchestrator::new(backend.as_ref()).with_cancellation(cancel);
    if !single_file {
        return orchestrator.process_folder(folder, &settings.extension);
    }
    let file = orchestrator.process(path, folder, &settings.extension)?;
    Ok(BatchReport {
        cancelled: file.cancelled,
        files: vec![file],
    })
}

fn scan(file: &Path, json: bool) -> Result<()> {
    let text =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let scanned = scanner::scan(&text);

    if json {
        let out = serde_json::to_string_pretty(&scanned).context("failed to serialize scan")?;
        println!("{out}");
        return Ok(());
    }

    if scanned.is_empty() {
        println!("no @prompt directives in {}", file.display());
        return Ok(());
    }
    for directive in &scanned {
        let region = if directive.has_region() {
            "region"
        } else {
            "no region"
        };
        println!(
            "#{} {} [{}] {}",
            directive.ordinal, directive.method_name, region, directive.directive.payload
        );
    }
    let filled = diagram::methods_with_regions(&text);
    if !filled.is_empty() {
        println!("methods with generated regions: {}", filled.join(", "));
    }
    Ok(())
}

fn export(
    file: &Path,
    method: Option<&str>,
    model: Option<PathBuf>,
    root: &Path,
    language: &str,
) -> Result<()> {
    let source =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let method = diagram::choose_method(file, &source, method)?;
    let model = match model {
        Some(path) => path,
        None => diagram::find_model_file(root)?,
    };
    diagram::export_to_model(file, &method, &model, language)
        .with_context(|| format!("failed to export {method} into {}", model.display()))?;
    println!("inserted {method} into {}", model.display());
    Ok(())
}
