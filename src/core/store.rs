use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use tempdir::TempDir;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub(crate) struct StorePath(PathBuf);

impl AsRef<Path> for StorePath {
    fn as_ref(&self) -> &Path {
        self.0.as_path()
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub(crate) struct TempDirStorePath(PathBuf);

impl AsRef<Path> for TempDirStorePath {
    fn as_ref(&self) -> &Path {
        self.0.as_path()
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub(crate) struct PackageBuildSuccessLogsStorePath(PathBuf);

impl AsRef<Path> for PackageBuildSuccessLogsStorePath {
    fn as_ref(&self) -> &Path {
        self.0.as_path()
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub(crate) struct PackageBuildFailureLogsStorePath(PathBuf);

impl AsRef<Path> for PackageBuildFailureLogsStorePath {
    fn as_ref(&self) -> &Path {
        self.0.as_path()
    }
}

/// Working directory of a run: scratch space and build logs.
#[derive(Debug, Clone)]
pub(crate) struct Store {
    path: StorePath,
}

impl Store {
    pub fn new(path: impl AsRef<Path>) -> Result<Store> {
        std::fs::create_dir_all(path.as_ref()).with_context(|| {
            format!(
                "Failed to create lfs-auto-build store at '{}'",
                path.as_ref().display()
            )
        })?;
        Ok(Store {
            path: StorePath(path.as_ref().to_path_buf()),
        })
    }

    pub fn temp_dir_path(&self) -> TempDirStorePath {
        TempDirStorePath(self.path.as_ref().join("tmp"))
    }

    pub fn temp_dir(&self, prefix: &str) -> Result<TempDir> {
        let tmp_parent_dir = self.temp_dir_path();
        std::fs::create_dir_all(tmp_parent_dir.as_ref())?;
        TempDir::new_in(tmp_parent_dir.as_ref(), prefix).with_context(|| {
            format!(
                "Failed to create temporary directory in lfs-auto-build store at '{}'",
                tmp_parent_dir.as_ref().display()
            )
        })
    }

    pub fn package_build_success_logs_path(&self) -> PackageBuildSuccessLogsStorePath {
        PackageBuildSuccessLogsStorePath(self.path.as_ref().join("logs").join("success"))
    }

    pub fn package_build_failure_logs_path(&self) -> PackageBuildFailureLogsStorePath {
        PackageBuildFailureLogsStorePath(self.path.as_ref().join("logs").join("failure"))
    }
}
