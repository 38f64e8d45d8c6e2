use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use vkt_cases::Case;
use vkt_core::config::default_config_path;
use vkt_harness::{Context, HarnessConfig, HarnessError};

mod report;

use report::CaseResult;

#[derive(Parser)]
#[command(name = "vkt")]
#[command(about = "VKT - single-shot Vulkan correctness tests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available cases
    List,

    /// Show the Vulkan device the cases would run on
    Info {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run cases and dump their images as PPM files
    Run {
        /// Cases to run (all when omitted)
        cases: Vec<String>,

        /// Directory for rt.ppm / tex.ppm (overrides [output] dir)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Reject barriers whose old layout does not match the tracked layout
        #[arg(long)]
        strict: bool,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    vkt_common::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            println!("Available cases:");
            println!();
            for case in vkt_cases::all() {
                println!("  {:<12} {}", case.name(), case.description());
            }
        }

        Commands::Info { config } => {
            let config = load_config(config)?;
            let ctx = Context::new(&config).context("failed to create Vulkan context")?;
            let info = ctx.info();
            println!("Vulkan device (platform {}):", vkt_common::platform_name());
            println!();
            println!("  Name:          {}", info.name);
            println!("  Type:          {:?}", info.device_type);
            println!("  Vulkan:        {}", info.api_version_string());
            println!("  Driver:        {:#x}", info.driver_version);
            println!("  MSAA (color):  {:?}", info.color_sample_counts);
            println!("  Push consts:   {} bytes", info.max_push_constants_size);
            for (i, size) in info.heap_sizes.iter().enumerate() {
                println!("  Heap {}:        {} MB", i, size / (1024 * 1024));
            }
        }

        Commands::Run {
            cases,
            out_dir,
            json,
            strict,
            config,
        } => {
            let mut config = load_config(config)?;
            if let Some(dir) = out_dir {
                config.output.dir = dir;
            }
            if strict {
                config.harness.strict_layouts = true;
            }

            let selected = select_cases(&cases)?;
            let ctx = Context::new(&config).context("failed to create Vulkan context")?;
            let device = ctx.info().to_string();
            info!(
                "running {} case(s) on {} (strict layouts: {})",
                selected.len(),
                device,
                ctx.strict_layouts()
            );

            let results: Vec<CaseResult> = selected
                .iter()
                .map(|case| run_one(case.as_ref(), &ctx, &config))
                .collect();

            if json {
                println!("{}", report::to_json(Some(&device), &results)?);
            } else {
                report::print_pretty(Some(&device), &results);
            }

            if report::has_failures(&results) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// An explicit `--config` must load; otherwise fall back to the default path.
fn load_config(path: Option<PathBuf>) -> anyhow::Result<HarnessConfig> {
    match path {
        Some(path) => HarnessConfig::load(&path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => HarnessConfig::load_or_default(default_config_path()).context("failed to load config"),
    }
}

fn select_cases(names: &[String]) -> anyhow::Result<Vec<Box<dyn Case>>> {
    if names.is_empty() {
        return Ok(vkt_cases::all());
    }
    names
        .iter()
        .map(|name| {
            vkt_cases::find(name).with_context(|| {
                let known: Vec<_> = vkt_cases::all().iter().map(|c| c.name()).collect();
                format!("unknown case '{}' (known: {})", name, known.join(", "))
            })
        })
        .collect()
}

/// Each case writes into `<out_dir>/<case>/`, so the cases' rt.ppm files do
/// not overwrite each other.
fn run_one(case: &dyn Case, ctx: &Context, config: &HarnessConfig) -> CaseResult {
    let out_dir = config.output.dir.join(case.name());
    let start = Instant::now();
    let allocated_before = ctx.allocated_bytes();
    match vkt_cases::run_case(case, ctx, &out_dir) {
        Ok(paths) => {
            CaseResult::pass(case.name(), &format!("{} image(s) written", paths.len()))
                .files(&paths)
                .took(start.elapsed())
                .memory(ctx.allocated_bytes() - allocated_before)
        }
        Err(e @ HarnessError::UnsupportedFormat { .. }) => {
            warn!("case '{}' skipped: {}", case.name(), e);
            CaseResult::skip(case.name(), &e.to_string()).took(start.elapsed())
        }
        Err(e) => {
            let result = CaseResult::fail(case.name(), &e.to_string()).took(start.elapsed());
            if e.is_configuration() {
                result.detail("configuration error in the case itself")
            } else {
                result
            }
        }
    }
}
