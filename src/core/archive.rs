use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use bzip2::bufread::BzDecoder;
use flate2::bufread::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::debug;
use xz2::bufread::XzDecoder;

use super::FileKind;

#[derive(Debug, Error)]
pub(crate) enum ArchiveError {
    #[error("Source archive '{0}' was not found")]
    NotFound(PathBuf),
    #[error("Source archive '{0}' is not a supported tar archive")]
    Unsupported(PathBuf),
    #[error("Failed to unpack source archive '{0}'")]
    Unpack(PathBuf, #[source] std::io::Error),
}

/// Unpacks a source tarball into `destination` and returns the directory the
/// build should run in: the archive's single top-level directory, or the
/// destination itself when there isn't exactly one.
pub(crate) fn unpack_source(
    archive_path: impl AsRef<Path>,
    destination: impl AsRef<Path>,
) -> Result<PathBuf, ArchiveError> {
    let archive_path = archive_path.as_ref();
    let destination = destination.as_ref();
    if !archive_path.is_file() {
        return Err(ArchiveError::NotFound(archive_path.to_path_buf()));
    }
    let kind = FileKind::detect_from_path(archive_path)
        .map_err(|_| ArchiveError::NotFound(archive_path.to_path_buf()))?;
    let file = File::open(archive_path)
        .map_err(|err| ArchiveError::Unpack(archive_path.to_path_buf(), err))?;
    let reader = BufReader::new(file);
    let decoder: Box<dyn Read> = match kind {
        FileKind::Tar => Box::new(reader),
        FileKind::Gzip => Box::new(GzDecoder::new(reader)),
        FileKind::Bzip2 => Box::new(BzDecoder::new(reader)),
        FileKind::Xz => Box::new(XzDecoder::new(reader)),
        FileKind::Zstd => Box::new(
            zstd::stream::read::Decoder::with_buffer(reader)
                .map_err(|err| ArchiveError::Unpack(archive_path.to_path_buf(), err))?,
        ),
        FileKind::Other => return Err(ArchiveError::Unsupported(archive_path.to_path_buf())),
    };
    debug!(
        "Unpacking {:?} archive {} into {}",
        kind,
        archive_path.display(),
        destination.display()
    );
    let mut archive = Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive
        .unpack(destination)
        .map_err(|err| ArchiveError::Unpack(archive_path.to_path_buf(), err))?;

    let mut entries = std::fs::read_dir(destination)
        .map_err(|err| ArchiveError::Unpack(archive_path.to_path_buf(), err))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    match entries.as_slice() {
        [single] if single.is_dir() => Ok(entries.remove(0)),
        _ => Ok(destination.to_path_buf()),
    }
}
