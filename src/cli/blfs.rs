use std::{env, path::PathBuf};

use clap::{arg, Args};
use color_eyre::eyre::{eyre, Context, Result};
use tracing::info;

use crate::core::{AutoBuildConfig, AutoBuildContext, ChapterSelection, DEFAULT_CONFIG_FILE};

use super::{output::output_dry_run, OutputFormat};

#[derive(Debug, Args)]
pub(crate) struct Params {
    /// Path to lfs auto build configuration
    #[arg(short, long)]
    config_path: Option<PathBuf>,
    /// Comma separated chapters or ranges to build, e.g. 5,6 or 4-10,12
    /// (defaults to chapters 4 to 50)
    #[arg(long)]
    chapters: Option<String>,
    /// Print the build order without building anything
    #[arg(short, long, default_value_t = false)]
    dry_run: bool,
    /// Output format of the dry run
    #[arg(value_enum, short = 'f', long, default_value_t = OutputFormat::Plain, requires = "dry_run")]
    format: OutputFormat,
}

pub(crate) fn execute(args: Params) -> Result<()> {
    let config_path = args.config_path.unwrap_or(
        env::current_dir()
            .context("Failed to determine current working directory")?
            .join(DEFAULT_CONFIG_FILE.as_path()),
    );
    let config = AutoBuildConfig::new(&config_path)?;
    let run_context = AutoBuildContext::new(config, &config_path)
        .with_context(|| eyre!("Failed to initialize run"))?;

    let selection = ChapterSelection::parse(args.chapters.as_deref());
    if args.dry_run {
        let plan = run_context.blfs_plan(&selection)?;
        return output_dry_run(&run_context.dry_run(&plan, Some(&selection)), args.format);
    }
    info!(target: "user-log", "Building BLFS chapters {}", selection);
    run_context.blfs_build(&selection)
}
