use color_eyre::eyre::Result;
use infer::Infer;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

lazy_static! {
    static ref FILE_KIND_CHECKER: Infer = Infer::new();
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum FileKind {
    Tar,
    Bzip2,
    Gzip,
    Xz,
    Zstd,
    Other,
}

impl From<&str> for FileKind {
    fn from(value: &str) -> Self {
        match value {
            "application/x-tar" => FileKind::Tar,
            "application/x-bzip2" => FileKind::Bzip2,
            "application/gzip" => FileKind::Gzip,
            "application/x-xz" => FileKind::Xz,
            "application/zstd" => FileKind::Zstd,
            _ => FileKind::Other,
        }
    }
}

impl FileKind {
    pub fn detect(buf: &[u8]) -> FileKind {
        FileKind::from(
            FILE_KIND_CHECKER
                .get(buf)
                .map(|t| t.mime_type())
                .unwrap_or("unknown"),
        )
    }

    pub fn detect_from_reader(mut reader: impl Read) -> FileKind {
        let mut buffer = [0u8; 1024];
        let mut data = Vec::new();
        while let Ok(n) = reader.read(&mut buffer) {
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buffer[..n]);
            if data.len() > 512 {
                break;
            }
        }
        FileKind::detect(&data)
    }

    pub fn detect_from_path(path: impl AsRef<Path>) -> Result<FileKind> {
        let file = File::open(path.as_ref())?;
        Ok(FileKind::detect_from_reader(file))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub(crate) struct FSRootPath(PathBuf);

impl Default for FSRootPath {
    fn default() -> Self {
        Self(PathBuf::from("/"))
    }
}

impl From<PathBuf> for FSRootPath {
    fn from(value: PathBuf) -> Self {
        FSRootPath(value)
    }
}

impl AsRef<Path> for FSRootPath {
    fn as_ref(&self) -> &Path {
        self.0.as_path()
    }
}

impl FSRootPath {
    pub fn is_host(&self) -> bool {
        self.0 == Path::new("/")
    }

    /// Maps a path under this root to the path seen from inside it.
    pub fn inner_path(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        path.as_ref()
            .strip_prefix(self.0.as_path())
            .ok()
            .map(|relative| Path::new("/").join(relative))
    }

    /// Resolves a configured directory against this root, absolute paths are
    /// taken as seen from inside the root.
    pub fn join(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        self.0
            .join(path.strip_prefix("/").unwrap_or(path))
    }
}
