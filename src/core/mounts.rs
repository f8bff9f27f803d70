use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Context, Result};
use subprocess::{Exec, NullFile, Redirection};
use tracing::{debug, info, warn};

/// A kernel virtual filesystem the chroot needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VirtualFileSystem {
    pub target: &'static str,
    args: &'static [&'static str],
}

pub(crate) const VIRTUAL_FILE_SYSTEMS: [VirtualFileSystem; 5] = [
    VirtualFileSystem {
        target: "dev",
        args: &["--bind", "/dev"],
    },
    VirtualFileSystem {
        target: "dev/pts",
        args: &["-t", "devpts", "devpts", "-o", "gid=5,mode=0620"],
    },
    VirtualFileSystem {
        target: "proc",
        args: &["-t", "proc", "proc"],
    },
    VirtualFileSystem {
        target: "sys",
        args: &["-t", "sysfs", "sysfs"],
    },
    VirtualFileSystem {
        target: "run",
        args: &["-t", "tmpfs", "tmpfs"],
    },
];

impl VirtualFileSystem {
    pub fn mount_args(&self, root: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string())
            .chain(Some(root.join(self.target).to_string_lossy().into_owned()))
            .collect()
    }

    pub fn mount_command(&self, root: &Path) -> Exec {
        Exec::cmd("mount").args(self.mount_args(root).as_slice())
    }
}

fn is_mount_point(path: &Path) -> Result<bool> {
    let status = Exec::cmd("mountpoint")
        .arg("-q")
        .arg(path)
        .stdin(NullFile)
        .stdout(NullFile)
        .stderr(NullFile)
        .join()
        .context("Failed to run mountpoint")?;
    Ok(status.success())
}

/// Filesystems mounted under the LFS root by this run. Only those are
/// unmounted again, in reverse order.
pub(crate) struct VirtualFileSystems {
    root: PathBuf,
    mounted: Vec<PathBuf>,
}

impl VirtualFileSystems {
    pub fn mount(root: impl AsRef<Path>) -> Result<VirtualFileSystems> {
        let mut mounts = VirtualFileSystems {
            root: root.as_ref().to_path_buf(),
            mounted: Vec::new(),
        };
        for fs in VIRTUAL_FILE_SYSTEMS.iter() {
            let target = mounts.root.join(fs.target);
            std::fs::create_dir_all(&target).with_context(|| {
                format!("Failed to create mount point '{}'", target.display())
            })?;
            if is_mount_point(&target)? {
                debug!("{} is already mounted, skipping", target.display());
                continue;
            }
            let output = fs
                .mount_command(&mounts.root)
                .stdin(NullFile)
                .stdout(Redirection::Pipe)
                .stderr(Redirection::Merge)
                .capture()
                .with_context(|| format!("Failed to run mount for '{}'", target.display()))?;
            if !output.success() {
                // Dropping `mounts` unmounts whatever was mounted so far
                return Err(eyre!(
                    "Failed to mount '{}': {}",
                    target.display(),
                    output.stdout_str().trim()
                ));
            }
            info!(target: "user-log", "Mounted {}", target.display());
            mounts.mounted.push(target);
        }
        Ok(mounts)
    }

    /// Leaves everything mounted after the run.
    pub fn keep(mut self) {
        self.mounted.clear();
    }

    pub fn unmount(&mut self) {
        while let Some(target) = self.mounted.pop() {
            let result = Exec::cmd("umount")
                .arg(&target)
                .stdin(NullFile)
                .stdout(Redirection::Pipe)
                .stderr(Redirection::Merge)
                .capture();
            match result {
                Ok(output) if output.success() => {
                    debug!("Unmounted {}", target.display())
                }
                Ok(output) => warn!(
                    target: "user-log",
                    "Failed to unmount {}: {}",
                    target.display(),
                    output.stdout_str().trim()
                ),
                Err(err) => warn!(
                    target: "user-log",
                    "Failed to unmount {}: {}",
                    target.display(),
                    err
                ),
            }
        }
    }
}

impl Drop for VirtualFileSystems {
    fn drop(&mut self) {
        self.unmount();
    }
}
