use std::{env, path::PathBuf};

use clap::{arg, Args};
use color_eyre::{
    eyre::{eyre, Context, Result},
    Help,
};

use crate::core::{check_umask, current_umask, AutoBuildConfig, AutoBuildContext, DEFAULT_CONFIG_FILE};

use super::{output::output_dry_run, OutputFormat};

#[derive(Debug, Args)]
pub(crate) struct Params {
    /// Path to lfs auto build configuration
    #[arg(short, long)]
    config_path: Option<PathBuf>,
    /// Print the build order without checking the host or building anything
    #[arg(short, long, default_value_t = false)]
    dry_run: bool,
    /// Output format of the dry run
    #[arg(value_enum, short = 'f', long, default_value_t = OutputFormat::Plain, requires = "dry_run")]
    format: OutputFormat,
    /// Leave the virtual filesystems mounted after the build
    #[arg(long, default_value_t = false)]
    keep_mounts: bool,
}

pub(crate) fn execute(args: Params) -> Result<()> {
    if !args.dry_run {
        check_umask(current_umask())
            .with_suggestion(|| "Run 'umask 022' before starting the build")?;
    }
    let config_path = args.config_path.unwrap_or(
        env::current_dir()
            .context("Failed to determine current working directory")?
            .join(DEFAULT_CONFIG_FILE.as_path()),
    );
    let config = AutoBuildConfig::new(&config_path)?;
    let run_context = AutoBuildContext::new(config, &config_path)
        .with_context(|| eyre!("Failed to initialize run"))?;

    if args.dry_run {
        let plan = run_context.lfs_plan();
        return output_dry_run(&run_context.dry_run(&plan, None), args.format);
    }
    run_context.lfs_build(args.keep_mounts)
}
