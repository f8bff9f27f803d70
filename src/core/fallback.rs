use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::{Download, DownloadError, FallbackConfig, PackageEntry, Step};

#[derive(Debug, Error)]
pub(crate) enum FetchError {
    #[error("No command file for '{0}' at '{1}' and no fallback url is configured")]
    NotCached(String, PathBuf),
    #[error("No fallback command cache is configured for '{0}'")]
    NoCache(String),
    #[error("Invalid fallback url '{0}'")]
    InvalidUrl(String, #[source] url::ParseError),
    #[error("Failed to fetch commands for '{0}'")]
    Download(String, #[source] DownloadError),
    #[error("Failed to read command file '{0}'")]
    IO(PathBuf, #[source] std::io::Error),
    #[error("Command file '{0}' contains no commands")]
    Empty(PathBuf),
}

/// Source of build commands for packages without a dedicated recipe.
pub(crate) struct CommandFetcher {
    cache: Option<PathBuf>,
    url: Option<String>,
}

impl CommandFetcher {
    pub fn new(config: &FallbackConfig, base_path: impl AsRef<Path>) -> CommandFetcher {
        CommandFetcher {
            cache: config.cache.as_ref().map(|cache| {
                if cache.is_absolute() {
                    cache.clone()
                } else {
                    base_path.as_ref().join(cache)
                }
            }),
            url: config.url.clone(),
        }
    }

    pub fn command_file_path(&self, entry: &PackageEntry) -> Option<PathBuf> {
        self.cache
            .as_ref()
            .map(|cache| cache.join(entry.command_file()))
    }

    /// Returns the steps for `entry`, downloading its command file into the
    /// cache first when it is missing.
    pub fn fetch(&self, entry: &PackageEntry) -> Result<Vec<Step>, FetchError> {
        let command_file = self
            .command_file_path(entry)
            .ok_or_else(|| FetchError::NoCache(entry.name.clone()))?;
        if !command_file.is_file() {
            let Some(base_url) = self.url.as_ref() else {
                return Err(FetchError::NotCached(entry.name.clone(), command_file));
            };
            let url = command_url(base_url, entry)
                .map_err(|err| FetchError::InvalidUrl(base_url.clone(), err))?;
            info!(target: "user-log", "Fetching commands for {} from {}", entry.name, url);
            Download::new(&url, &command_file)
                .execute()
                .map_err(|err| FetchError::Download(entry.name.clone(), err))?;
        } else {
            debug!(
                "Using cached commands for {} at {}",
                entry.name,
                command_file.display()
            );
        }
        let contents = std::fs::read_to_string(&command_file)
            .map_err(|err| FetchError::IO(command_file.clone(), err))?;
        let steps = split_steps(&contents);
        if steps.is_empty() {
            return Err(FetchError::Empty(command_file));
        }
        Ok(steps)
    }
}

fn command_url(base_url: &str, entry: &PackageEntry) -> Result<Url, url::ParseError> {
    let base = if base_url.ends_with('/') {
        Url::parse(base_url)?
    } else {
        Url::parse(&format!("{}/", base_url))?
    };
    base.join(&entry.command_file())
}

/// Splits a command file into steps, one per blank-line separated block.
/// Comment lines are dropped.
pub(crate) fn split_steps(contents: &str) -> Vec<Step> {
    let mut steps = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in contents.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !block.is_empty() {
                steps.push(Step::new(block.join("\n")));
                block.clear();
            }
        } else if !line.trim_start().starts_with('#') {
            block.push(line);
        }
    }
    steps
}
