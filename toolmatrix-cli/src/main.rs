mod config;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use config::{CliOverrides, ConfigMerger};
use std::process::ExitCode;
use std::sync::Arc;
use toolmatrix_core::adapters::{
    FsDefinitionsSource, FsInventorySource, FsUsageSource, FsWritePort,
};
use toolmatrix_core::executor::{Executor, ExecutorPorts};
use toolmatrix_core::pipeline::{CycleError, CycleSources, run_cycle, write_registry_artifacts};
use toolmatrix_core::settings::ReconcileSettings;
use toolmatrix_core::{ToolFilter, ToolRegistry};
use toolmatrix_render::{render_cycle_md, render_stats_text, render_tool_text, render_tools_text};
use toolmatrix_types::report::CycleReport;
use toolmatrix_types::tool::{Category, ToolState};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "toolmatrix",
    version,
    about = "Reconciles CNC tool inventory exports with machine usage logs."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one reconciliation cycle and write the registry artifacts.
    Scan(ScanArgs),
    /// Reconcile on every change to the inputs until interrupted.
    Watch(WatchArgs),
    /// List tools matching a filter.
    Query(QueryArgs),
    /// Show one tool by matrix code.
    Show(ShowArgs),
    /// Print registry counters.
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Working root; toolmatrix.toml and default input paths are resolved against it.
    #[arg(long, default_value = ".")]
    root: Utf8PathBuf,

    /// Inventory snapshot (default: <root>/data/inventory.json).
    #[arg(long, env = "TOOLMATRIX_INVENTORY")]
    inventory: Option<Utf8PathBuf>,

    /// Directory of per-job usage logs (default: <root>/data/usage).
    #[arg(long, env = "TOOLMATRIX_USAGE_DIR")]
    usage_dir: Option<Utf8PathBuf>,

    /// Definitions table (default: <root>/data/definitions.json; absent means built-in patterns).
    #[arg(long)]
    definitions: Option<Utf8PathBuf>,
}

impl SourceArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            inventory: self.inventory.clone(),
            usage_dir: self.usage_dir.clone(),
            definitions: self.definitions.clone(),
            ..CliOverrides::default()
        }
    }
}

#[derive(Debug, Parser)]
struct ScanArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// Output directory for registry artifacts (default: <root>/artifacts/toolmatrix).
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,

    /// Do not write registry artifacts.
    #[arg(long, default_value_t = false)]
    no_write: bool,

    /// Output format for the cycle report (text, json).
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Parser)]
struct WatchArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// Output directory for registry artifacts (default: <root>/artifacts/toolmatrix).
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Parser)]
struct QueryArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// Only tools in this state (free, in-use).
    #[arg(long)]
    status: Option<ToolState>,

    /// Only tools in the matrix view (category other than OTHER).
    #[arg(long, default_value_t = false)]
    matrix: bool,

    /// Only tools of this category (ECUT, MFC, XF, XFEED, OTHER).
    #[arg(long)]
    category: Option<Category>,

    /// Only tools the latest snapshot no longer lists.
    #[arg(long, default_value_t = false)]
    stale: bool,

    /// Only tools at or below their warning threshold.
    #[arg(long, default_value_t = false)]
    low_stock: bool,

    /// Output format (text, json).
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Parser)]
struct ShowArgs {
    /// Matrix code, exactly as in the inventory snapshot (e.g. "RT-8400300_1").
    matrix_code: String,

    #[command(flatten)]
    sources: SourceArgs,

    /// Output format (text, json).
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Parser)]
struct StatsArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// Output format (text, json).
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        error!("{:?}", e);
        eprintln!("error: {:#}", e);
        let code = e
            .downcast_ref::<CycleError>()
            .map(CycleError::exit_code)
            .unwrap_or(1);
        return ExitCode::from(code as u8);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Scan(args) => cmd_scan(args),
        Command::Watch(args) => cmd_watch(args),
        Command::Query(args) => cmd_query(args),
        Command::Show(args) => cmd_show(args),
        Command::Stats(args) => cmd_stats(args),
    }
}

fn load_settings(sources: &SourceArgs, overrides: CliOverrides) -> anyhow::Result<ReconcileSettings> {
    let file_config =
        config::load_or_default(&sources.root).context("load toolmatrix.toml config")?;
    let settings = ConfigMerger::new(file_config).merge(&sources.root, &overrides);
    debug!(
        "merged config: inventory={}, usage_dir={}, definitions={:?}, out_dir={:?}, watch={}",
        settings.inventory_path,
        settings.usage_dir,
        settings.definitions_path,
        settings.out_dir,
        settings.watch
    );
    Ok(settings)
}

/// One cycle against the filesystem sources, in-process.
fn reconcile_once(settings: &ReconcileSettings) -> anyhow::Result<(ToolRegistry, CycleReport)> {
    let inventory = FsInventorySource::new(settings.inventory_path.clone());
    let usage = FsUsageSource::new(settings.usage_dir.clone());
    let definitions = FsDefinitionsSource::new(settings.definitions_path.clone());
    let sources = CycleSources {
        inventory: &inventory,
        usage: &usage,
        definitions: &definitions,
    };

    let registry = ToolRegistry::new();
    let report = run_cycle(1, settings, sources, &registry)?;
    Ok((registry, report))
}

fn cmd_scan(args: ScanArgs) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        out_dir: args.out_dir.clone(),
        no_write: args.no_write,
        ..args.sources.overrides()
    };
    let settings = load_settings(&args.sources, overrides)?;
    let (registry, report) = reconcile_once(&settings)?;

    if let Some(out_dir) = &settings.out_dir {
        write_registry_artifacts(&registry, &report, out_dir, &FsWritePort)
            .with_context(|| format!("write registry artifacts to {}", out_dir))?;
        info!("wrote registry to {}", out_dir);
    }

    match args.format {
        OutputFormat::Text => print!("{}", render_cycle_md(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn cmd_watch(args: WatchArgs) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        out_dir: args.out_dir.clone(),
        ..args.sources.overrides()
    };
    let settings = load_settings(&args.sources, overrides)?;
    if !settings.watch {
        anyhow::bail!(
            "watching is disabled by [watch] enabled = false in {}; use `toolmatrix scan` instead",
            config::CONFIG_FILE_NAME
        );
    }

    let ports = ExecutorPorts {
        inventory: Arc::new(FsInventorySource::new(settings.inventory_path.clone())),
        usage: Arc::new(FsUsageSource::new(settings.usage_dir.clone())),
        definitions: Arc::new(FsDefinitionsSource::new(settings.definitions_path.clone())),
        writer: Some(Arc::new(FsWritePort)),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    runtime.block_on(async move {
        let executor = Executor::new(settings, ports);
        executor.start()?;
        info!("watching inputs; press Ctrl-C to stop");

        tokio::signal::ctrl_c()
            .await
            .context("listen for Ctrl-C")?;
        info!("interrupt received; finishing current cycle");
        executor.stop().await;

        let status = executor.status();
        println!(
            "cycles completed: {}, failed: {}",
            status.completed, status.failed
        );
        Ok::<(), anyhow::Error>(())
    })
}

fn cmd_query(args: QueryArgs) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        no_write: true,
        ..args.sources.overrides()
    };
    let settings = load_settings(&args.sources, overrides)?;
    let (registry, _) = reconcile_once(&settings)?;

    let filter = ToolFilter {
        status: args.status,
        matrix: args.matrix.then_some(true),
        category: args.category,
        stale: args.stale.then_some(true),
        low_stock: args.low_stock.then_some(true),
    };
    let tools = registry.query(&filter);

    match args.format {
        OutputFormat::Text => print!("{}", render_tools_text(&tools)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tools)?),
    }
    Ok(())
}

fn cmd_show(args: ShowArgs) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        no_write: true,
        ..args.sources.overrides()
    };
    let settings = load_settings(&args.sources, overrides)?;
    let (registry, _) = reconcile_once(&settings)?;

    let Some(tool) = registry.get_by_id(&args.matrix_code) else {
        anyhow::bail!("no tool with matrix code '{}'", args.matrix_code);
    };

    match args.format {
        OutputFormat::Text => print!("{}", render_tool_text(&tool)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tool)?),
    }
    Ok(())
}

fn cmd_stats(args: StatsArgs) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        no_write: true,
        ..args.sources.overrides()
    };
    let settings = load_settings(&args.sources, overrides)?;
    let (registry, _) = reconcile_once(&settings)?;
    let stats = registry.stats();

    match args.format {
        OutputFormat::Text => print!("{}", render_stats_text(&stats)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    Ok(())
}
