use std::path::{Path, PathBuf};

use nix::{
    sys::stat::{umask, Mode},
    unistd::Uid,
};
use thiserror::Error;
use tracing::debug;
use which::which;

pub(crate) const REQUIRED_UMASK: u32 = 0o022;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum EnvironmentError {
    #[error("The umask must be 022 to build LFS, found {0:03o}")]
    Umask(u32),
    #[error("Building LFS requires root privileges")]
    NotRoot,
    #[error("The LFS variable is not set and 'lfs.root' is missing from the configuration")]
    RootNotSet,
    #[error("The LFS root '{0}' must be an absolute path other than '/'")]
    InvalidRoot(PathBuf),
    #[error("The LFS root '{0}' is not an existing directory")]
    RootNotFound(PathBuf),
    #[error("Required host tool '{0}' was not found on PATH")]
    MissingHostTool(String),
}

/// Reads the process umask without changing it.
pub(crate) fn current_umask() -> u32 {
    let previous = umask(Mode::empty());
    umask(previous);
    previous.bits() as u32
}

pub(crate) fn check_umask(mask: u32) -> Result<(), EnvironmentError> {
    if mask == REQUIRED_UMASK {
        Ok(())
    } else {
        Err(EnvironmentError::Umask(mask))
    }
}

pub(crate) fn check_root_user() -> Result<(), EnvironmentError> {
    if Uid::effective().is_root() {
        Ok(())
    } else {
        Err(EnvironmentError::NotRoot)
    }
}

/// Picks the LFS mount point, the `LFS` variable wins over the configuration.
pub(crate) fn resolve_lfs_root(
    from_env: Option<PathBuf>,
    from_config: Option<&Path>,
) -> Result<PathBuf, EnvironmentError> {
    let root = from_env
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| from_config.map(Path::to_path_buf))
        .ok_or(EnvironmentError::RootNotSet)?;
    if !root.is_absolute() || root == Path::new("/") {
        return Err(EnvironmentError::InvalidRoot(root));
    }
    if !root.is_dir() {
        return Err(EnvironmentError::RootNotFound(root));
    }
    Ok(root)
}

pub(crate) fn check_host_tools(tools: &[String]) -> Result<(), EnvironmentError> {
    for tool in tools {
        match which(tool) {
            Ok(path) => debug!("Found host tool '{}' at {}", tool, path.display()),
            Err(_) => return Err(EnvironmentError::MissingHostTool(tool.clone())),
        }
    }
    Ok(())
}
