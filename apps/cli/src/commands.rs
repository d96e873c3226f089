//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use everythingpdf_core::{
    ArtifactSummary, BaseDocument, Classification, RawInput, Session, classify, page_count,
};
use everythingpdf_publish::{HttpPublisher, suggested_name};
use everythingpdf_shared::{
    AppConfig, InputKind, KeyValueStore, TIER_STORAGE_KEY, Tier, init_config, load_config,
};
use everythingpdf_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// EverythingPDF: merge PDFs and images into one document.
#[derive(Parser)]
#[command(
    name = "everythingpdf",
    version,
    about = "Merge PDFs and PNG/JPEG images into a single PDF, optionally publishing a share link.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Build one PDF from the given inputs, in order.
    Build {
        /// PDF, PNG, or JPEG files. Queue order is page order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Existing PDF to append the inputs to.
        #[arg(long)]
        base: Option<PathBuf>,

        /// Output file (defaults to `defaults.output_file` from config).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Reorder before building, e.g. `--move 3:1` (1-based, repeatable).
        #[arg(long = "move", value_name = "FROM:TO", value_parser = parse_move)]
        moves: Vec<(usize, usize)>,

        /// Upload the result and print a public link.
        #[arg(long)]
        share: bool,

        /// Print the build summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show or change the plan (Free or Pro).
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Show how a single file would be treated.
    Inspect {
        /// File to inspect.
        file: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Plan subcommands.
#[derive(Subcommand)]
pub(crate) enum PlanAction {
    /// Print the current plan.
    Show,
    /// Switch to Pro (unlimited uploads).
    Upgrade,
    /// Switch to Free (two uploads per build).
    Downgrade,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// Parse `FROM:TO` with 1-based positions into 0-based indices.
fn parse_move(raw: &str) -> std::result::Result<(usize, usize), String> {
    let (from, to) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got '{raw}'"))?;
    let parse = |s: &str| -> std::result::Result<usize, String> {
        match s.trim().parse::<usize>() {
            Ok(n) if n >= 1 => Ok(n - 1),
            _ => Err(format!("'{s}' is not a position (positions start at 1)")),
        }
    };
    Ok((parse(from)?, parse(to)?))
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "everythingpdf=info",
        1 => "everythingpdf=debug",
        _ => "everythingpdf=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Build {
            inputs,
            base,
            out,
            moves,
            share,
            json,
        } => {
            cmd_build(BuildArgs {
                inputs,
                base,
                out,
                moves,
                share,
                json,
            })
            .await
        }
        Command::Plan { action } => match action {
            PlanAction::Show => cmd_plan_show().await,
            PlanAction::Upgrade => cmd_plan_set(Tier::Pro).await,
            PlanAction::Downgrade => cmd_plan_set(Tier::Free).await,
        },
        Command::Inspect { file } => cmd_inspect(&file).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

struct BuildArgs {
    inputs: Vec<PathBuf>,
    base: Option<PathBuf>,
    out: Option<PathBuf>,
    moves: Vec<(usize, usize)>,
    share: bool,
    json: bool,
}

async fn cmd_build(args: BuildArgs) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;

    let mut session = Session::open(store).await?;
    if args.share {
        let publisher = HttpPublisher::from_config(&config.publish)?.ok_or_else(|| {
            eyre!("--share needs [publish].endpoint in the config file (see `everythingpdf config init`)")
        })?;
        session = session.with_publisher(Arc::new(publisher));
    }

    if let Some(base_path) = &args.base {
        let bytes = tokio::fs::read(base_path)
            .await
            .wrap_err_with(|| format!("failed to read base document '{}'", base_path.display()))?;
        session.load_base(BaseDocument::new(file_label(base_path), bytes));
    }

    let mut raw = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        raw.push(RawInput::from_path(path).await?);
    }

    info!(inputs = raw.len(), tier = %session.tier(), "adding inputs");
    let outcome = session.add_inputs(raw);
    for notice in outcome.notices() {
        eprintln!("  ! {notice}");
    }
    if session.queue().is_empty() && session.base().is_none() {
        return Err(match outcome.to_error() {
            Some(err) => err.into(),
            None => eyre!("nothing to build: no input was accepted"),
        });
    }

    for (from, to) in &args.moves {
        session
            .move_item(*from, *to)
            .wrap_err_with(|| format!("cannot move {}:{}", from + 1, to + 1))?;
    }

    let spinner = CliProgress::new();
    spinner.set_message(format!("Building PDF from {} input(s)...", session.queue().len()));
    let result = session.build().await;
    spinner.finish();
    let artifact = result?;

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_file));
    session.save_artifact(&out).await?;

    let share_url = if args.share {
        let spinner = CliProgress::new();
        spinner.set_message("Uploading...".to_string());
        let shared = session.share(suggested_name()).await;
        spinner.finish();
        match shared {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "share failed");
                eprintln!("  ! Share failed: {e}. The PDF was still saved locally.");
                None
            }
        }
    } else {
        None
    };

    if args.json {
        let summary = BuildSummary {
            output: out.display().to_string(),
            share_url,
            artifact: artifact.summary(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("  PDF built successfully!");
    println!("  Pages:  {}", artifact.page_count);
    println!("  Inputs: {}", artifact.input_count);
    println!("  Size:   {} bytes", artifact.size());
    println!("  Path:   {}", out.display());
    if let Some(url) = share_url {
        println!("  Link:   {url}");
    }
    println!();

    Ok(())
}

#[derive(serde::Serialize)]
struct BuildSummary {
    output: String,
    share_url: Option<String>,
    #[serde(flatten)]
    artifact: ArtifactSummary,
}

// ---------------------------------------------------------------------------
// CLI progress spinner
// ---------------------------------------------------------------------------

/// Spinner shown while a build or upload runs.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn set_message(&self, msg: String) {
        self.spinner.set_message(msg);
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

async fn cmd_plan_show() -> Result<()> {
    let config = load_config()?;
    let db_path = config.defaults.state_db_path()?;

    let tier = if db_path.exists() {
        let storage = Storage::open_readonly(&db_path).await?;
        Tier::from_storage_value(storage.get(TIER_STORAGE_KEY).await?.as_deref())
    } else {
        Tier::Free
    };

    print_plan(tier);
    Ok(())
}

async fn cmd_plan_set(tier: Tier) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let mut session = Session::open(store).await?;

    match tier {
        Tier::Pro => session.upgrade().await?,
        Tier::Free => {
            session.downgrade().await?;
        }
    }

    info!(%tier, "plan changed");
    print_plan(session.tier());
    Ok(())
}

fn print_plan(tier: Tier) {
    match tier.cap() {
        Some(cap) => println!("Plan: {tier} (max {cap} uploads per build)"),
        None => println!("Plan: {tier} (unlimited uploads)"),
    }
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

async fn cmd_inspect(file: &Path) -> Result<()> {
    let input = RawInput::from_path(file).await?;
    let payload = input.payload.clone();
    let media_type = input.media_type.clone();

    match classify(input) {
        Classification::Rejected(rejected) => {
            println!("{}", rejected.message());
        }
        Classification::Accepted(item) => {
            println!("  Name:  {}", item.display_name);
            println!("  Type:  {media_type}");
            println!("  Kind:  {}", item.kind.label());
            println!("  Size:  {} bytes", item.byte_size);
            if item.kind == InputKind::Document {
                let bytes = payload.read().await?;
                match page_count(&bytes) {
                    Ok(n) => println!("  Pages: {n}"),
                    Err(e) => println!("  Pages: unreadable ({e})"),
                }
            } else {
                println!("  Pages: 1");
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Open the state database that holds the plan.
async fn open_store(config: &AppConfig) -> Result<Arc<dyn KeyValueStore>> {
    let path = config.defaults.state_db_path()?;
    let storage = Storage::open(&path)
        .await
        .wrap_err_with(|| format!("failed to open state database '{}'", path.display()))?;
    Ok(Arc::new(storage))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
