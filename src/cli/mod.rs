mod blfs;
mod lfs;
mod output;

use clap::{command, Parser, Subcommand};
use color_eyre::eyre::Result;

pub(crate) use output::OutputFormat;

// LFS Auto Build builds a Linux From Scratch system and its BLFS packages unattended
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the LFS system inside a chroot at the LFS mount point
    Lfs(lfs::Params),
    /// Build the BLFS packages of a range of chapters
    Blfs(blfs::Params),
}

impl Cli {
    pub fn run() -> Result<()> {
        let cli = match Cli::try_parse() {
            Ok(cli) => cli,
            // Help and version output exit successfully
            Err(err) if !err.use_stderr() => err.exit(),
            Err(err) => {
                err.print()?;
                std::process::exit(1);
            }
        };
        match cli.command {
            Commands::Lfs(args) => lfs::execute(args),
            Commands::Blfs(args) => blfs::execute(args),
        }
    }
}
