use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use chrono::{Duration, Utc};
use color_eyre::eyre::Context;
use subprocess::{Exec, ExitStatus, NullFile, Redirection};
use tempdir::TempDir;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::{unpack_source, ArchiveError, FSRootPath, Recipe, Step, Store};

const BASH_OPTIONS: [&str; 3] = ["-e", "-o", "pipefail"];

pub(crate) struct BuildOutput {
    pub build_log: PathBuf,
    pub duration: Duration,
    pub tolerated_failures: usize,
}

#[derive(Debug, Error)]
pub(crate) enum BuildError {
    #[error("Step {step} of {package} failed ({status}): {command}, you can find the build log at {}", .log.display())]
    Step {
        package: String,
        step: usize,
        command: String,
        status: String,
        log: PathBuf,
    },
    #[error("Failed to prepare the sources of {0}")]
    Source(String, #[source] ArchiveError),
    #[error("Failed due to unexpected IO error")]
    IO(#[from] std::io::Error),
    #[error("Failed due to unexpected sub process error")]
    Popen(#[from] subprocess::PopenError),
    #[error("Failed due to an unexpected build error")]
    Unexpected(#[from] color_eyre::eyre::Error),
}

impl BuildError {
    pub fn build_log(&self) -> Option<&Path> {
        match self {
            BuildError::Step { log, .. } => Some(log.as_path()),
            _ => None,
        }
    }
}

/// Runs recipe steps one after another, either directly on the host or
/// inside a chroot, with all output captured in a per-package build log.
pub(crate) struct Executor<'a> {
    root: FSRootPath,
    sources: PathBuf,
    environment: &'a BTreeMap<String, String>,
    store: &'a Store,
}

impl<'a> Executor<'a> {
    pub fn new(
        root: FSRootPath,
        sources: impl AsRef<Path>,
        environment: &'a BTreeMap<String, String>,
        store: &'a Store,
    ) -> Executor<'a> {
        let sources = root.join(sources);
        Executor {
            root,
            sources,
            environment,
            store,
        }
    }

    pub fn build(&self, package: &str, recipe: &Recipe) -> Result<BuildOutput, BuildError> {
        let start = Utc::now();
        let tmp_dir = self.store.temp_dir("build")?;
        let build_log_path = tmp_dir.path().join("build.log");
        let mut build_log = File::create(&build_log_path).with_context(|| {
            format!(
                "Failed to create build log at '{}'",
                build_log_path.display()
            )
        })?;

        // Kept alive until every step has run, dropping it removes the
        // unpacked tree
        let (_scratch_dir, work_dir) = self.prepare_work_dir(package, recipe)?;
        debug!(
            "Starting build of {} in {}, logging output to {}",
            package,
            work_dir.display(),
            build_log_path.display()
        );

        let mut tolerated_failures = 0;
        for (index, step) in recipe.steps.iter().enumerate() {
            writeln!(
                build_log,
                "==> [{}/{}] {}",
                index + 1,
                recipe.steps.len(),
                step.run
            )?;
            build_log.flush()?;
            let cmd = self
                .step_command(step, &work_dir)
                .stdin(NullFile)
                .stdout(Redirection::File(build_log.try_clone()?))
                .stderr(Redirection::Merge);
            trace!("Executing command: {:?}", cmd);
            let exit_status = cmd.join()?;
            if exit_status.success() {
                continue;
            }
            if step.allow_failure {
                warn!(
                    target: "user-log",
                    "Ignoring failure of step {} of {} ({})",
                    index + 1,
                    package,
                    describe_status(&exit_status)
                );
                writeln!(
                    build_log,
                    "==> step failed with {}, continuing",
                    describe_status(&exit_status)
                )?;
                tolerated_failures += 1;
                continue;
            }
            drop(build_log);
            let log = self.move_failure_log(package, &build_log_path)?;
            return Err(BuildError::Step {
                package: package.to_string(),
                step: index + 1,
                command: summarize(&step.run),
                status: describe_status(&exit_status),
                log,
            });
        }

        drop(build_log);
        let build_log = self.move_success_log(package, &build_log_path)?;
        Ok(BuildOutput {
            build_log,
            duration: Utc::now() - start,
            tolerated_failures,
        })
    }

    fn prepare_work_dir(
        &self,
        package: &str,
        recipe: &Recipe,
    ) -> Result<(Option<TempDir>, PathBuf), BuildError> {
        let Some(source) = recipe.source.as_ref() else {
            let work_dir = if self.sources.is_dir() {
                self.sources.clone()
            } else {
                self.root.as_ref().to_path_buf()
            };
            return Ok((None, self.inner_path(&work_dir)?));
        };
        let scratch_dir = TempDir::new_in(&self.sources, &format!("{}-build", package))
            .with_context(|| {
                format!(
                    "Failed to create build directory for {} in '{}'",
                    package,
                    self.sources.display()
                )
            })?;
        let build_dir = unpack_source(self.sources.join(source), scratch_dir.path())
            .map_err(|err| BuildError::Source(package.to_string(), err))?;
        let work_dir = self.inner_path(&build_dir)?;
        Ok((Some(scratch_dir), work_dir))
    }

    fn inner_path(&self, path: &Path) -> Result<PathBuf, BuildError> {
        self.root.inner_path(path).ok_or_else(|| {
            BuildError::Unexpected(color_eyre::eyre::eyre!(
                "Build directory '{}' is outside of the build root '{}'",
                path.display(),
                self.root.as_ref().display()
            ))
        })
    }

    fn step_command(&self, step: &Step, work_dir: &Path) -> Exec {
        if self.root.is_host() {
            let mut cmd = Exec::cmd("bash")
                .args(&BASH_OPTIONS)
                .arg("-c")
                .arg(&step.run)
                .cwd(work_dir);
            for (key, value) in self.environment.iter() {
                cmd = cmd.env(key, value);
            }
            cmd
        } else {
            let script = format!("cd {}\n{}", shell_quote(&work_dir.to_string_lossy()), step.run);
            let variables = self
                .environment
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>();
            Exec::cmd("chroot")
                .arg(self.root.as_ref())
                .arg("/usr/bin/env")
                .arg("-i")
                .args(variables.as_slice())
                .arg("/bin/bash")
                .args(&BASH_OPTIONS)
                .arg("-c")
                .arg(script)
        }
    }

    fn move_success_log(&self, package: &str, build_log_path: &Path) -> Result<PathBuf, BuildError> {
        let logs_dir = self.store.package_build_success_logs_path();
        std::fs::create_dir_all(logs_dir.as_ref()).with_context(|| {
            format!(
                "Failed to create build log directory at '{}'",
                logs_dir.as_ref().display()
            )
        })?;
        let final_log_path = logs_dir.as_ref().join(format!("{}.log", package));
        move_log(build_log_path, &final_log_path)?;
        Ok(final_log_path)
    }

    fn move_failure_log(&self, package: &str, build_log_path: &Path) -> Result<PathBuf, BuildError> {
        let logs_dir = self.store.package_build_failure_logs_path();
        std::fs::create_dir_all(logs_dir.as_ref()).with_context(|| {
            format!(
                "Failed to create build log directory at '{}'",
                logs_dir.as_ref().display()
            )
        })?;
        let final_log_path = logs_dir.as_ref().join(format!(
            "{}-{}.log",
            package,
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        move_log(build_log_path, &final_log_path)?;
        Ok(final_log_path)
    }
}

fn move_log(from: &Path, to: &Path) -> Result<(), BuildError> {
    debug!("Moving build log from {} to {}", from.display(), to.display());
    std::fs::rename(from, to).with_context(|| {
        format!(
            "Failed to move build log from {} to {}",
            from.display(),
            to.display()
        )
    })?;
    Ok(())
}

fn describe_status(status: &ExitStatus) -> String {
    match status {
        ExitStatus::Exited(code) => format!("exit code {}", code),
        ExitStatus::Signaled(signal) => format!("signal {}", signal),
        other => format!("{:?}", other),
    }
}

/// First line of a step, with a marker when the step spans several lines.
fn summarize(run: &str) -> String {
    let mut lines = run.lines().filter(|line| !line.trim().is_empty());
    let first = lines.next().unwrap_or_default().trim().to_string();
    if lines.next().is_some() {
        format!("'{} ...'", first)
    } else {
        format!("'{}'", first)
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Last `lines` lines of a build log. Bytes that are not valid UTF-8 are
/// replaced rather than failing the read.
pub(crate) fn log_tail(path: impl AsRef<Path>, lines: usize) -> std::io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut tail = std::collections::VecDeque::with_capacity(lines);
    for line in reader.split(b'\n') {
        let line = line?;
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(String::from_utf8_lossy(&line).into_owned());
    }
    Ok(tail.into_iter().collect())
}
