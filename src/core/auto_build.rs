use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use chrono::{Duration, Utc};
use chrono_humanize::{Accuracy, HumanTime, Tense};
use color_eyre::{
    eyre::{eyre, Context, Result},
    Help,
};
use owo_colors::{OwoColorize, Stream, Style};
use serde::Serialize;
use tracing::{debug, error, info};

use super::{
    check_host_tools, check_root_user, log_tail, resolve_lfs_root, AutoBuildConfig, BuildError,
    ChapterSelection, CommandFetcher, Dispatch, Dispatcher, EnvironmentError, Executor, FSRootPath,
    PackageEntry, Recipe, Store, VirtualFileSystems,
};

const FAILED_LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy)]
pub(crate) enum BuildAction<'a> {
    Recipe(&'a str, &'a Recipe),
    Generic(&'a PackageEntry),
}

/// One package in the build order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlannedBuild<'a> {
    pub chapter: Option<u32>,
    pub package: &'a str,
    pub action: BuildAction<'a>,
}

impl<'a> Display for PlannedBuild<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chapter {
            Some(chapter) => write!(f, "{} (chapter {})", self.package, chapter),
            None => write!(f, "{}", self.package),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DryRunEntry {
    pub chapter: Option<u32>,
    pub package: String,
    /// Recipe the package dispatches to, `None` for the generic path
    pub recipe: Option<String>,
    pub source: Option<String>,
    pub steps: Option<usize>,
    pub command_file: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BuildDryRun {
    pub chapters: Option<String>,
    pub order: Vec<DryRunEntry>,
}

pub(crate) struct AutoBuildContext {
    config: AutoBuildConfig,
    config_dir: PathBuf,
    store: Store,
}

impl AutoBuildContext {
    pub fn new(config: AutoBuildConfig, config_path: impl AsRef<Path>) -> Result<AutoBuildContext> {
        let config_path = config_path
            .as_ref()
            .canonicalize()
            .context("Failed to canonicalize path to configuration file")?;
        let config_dir = config_path
            .parent()
            .ok_or(eyre!(
                "Failed to determine parent folder of lfs-auto-build configuration file"
            ))?
            .to_path_buf();
        let store = Store::new(config.store_path(&config_path)?)?;
        Ok(AutoBuildContext {
            config,
            config_dir,
            store,
        })
    }

    pub fn lfs_plan(&self) -> Vec<PlannedBuild<'_>> {
        self.config
            .lfs
            .packages
            .iter()
            .map(|package| PlannedBuild {
                chapter: None,
                package: package.name.as_str(),
                action: BuildAction::Recipe(package.name.as_str(), &package.recipe),
            })
            .collect()
    }

    /// Build order of the selected BLFS chapters: chapters ascending, packages
    /// in listing order, each dispatched to its recipe or the generic path.
    pub fn blfs_plan(&self, selection: &ChapterSelection) -> Result<Vec<PlannedBuild<'_>>> {
        let dispatcher = Dispatcher::new(&self.config.blfs.dispatch, &self.config.blfs.recipes)?;
        let mut chapters = self
            .config
            .blfs
            .chapters
            .iter()
            .filter(|chapter| selection.contains(chapter.number))
            .collect::<Vec<_>>();
        chapters.sort_by_key(|chapter| chapter.number);

        let mut plan = Vec::new();
        for chapter in chapters {
            debug!("Planning {}", chapter);
            for entry in chapter.packages.iter() {
                let action = match dispatcher.dispatch(entry) {
                    Dispatch::Recipe(name, recipe) => BuildAction::Recipe(name, recipe),
                    Dispatch::Generic => BuildAction::Generic(entry),
                };
                plan.push(PlannedBuild {
                    chapter: Some(chapter.number),
                    package: entry.name.as_str(),
                    action,
                });
            }
        }
        Ok(plan)
    }

    pub fn dry_run(
        &self,
        plan: &[PlannedBuild<'_>],
        selection: Option<&ChapterSelection>,
    ) -> BuildDryRun {
        let fetcher = self.command_fetcher();
        BuildDryRun {
            chapters: selection.map(|s| s.to_string()),
            order: plan
                .iter()
                .map(|build| match build.action {
                    BuildAction::Recipe(name, recipe) => DryRunEntry {
                        chapter: build.chapter,
                        package: build.package.to_string(),
                        recipe: Some(name.to_string()),
                        source: recipe.source.clone(),
                        steps: Some(recipe.steps.len()),
                        command_file: None,
                    },
                    BuildAction::Generic(entry) => DryRunEntry {
                        chapter: build.chapter,
                        package: build.package.to_string(),
                        recipe: None,
                        source: None,
                        steps: None,
                        command_file: fetcher.command_file_path(entry),
                    },
                })
                .collect(),
        }
    }

    fn command_fetcher(&self) -> CommandFetcher {
        CommandFetcher::new(&self.config.blfs.fallback, &self.config_dir)
    }

    fn build_environment(&self) -> BTreeMap<String, String> {
        self.config.build_environment(|key| std::env::var(key).ok())
    }

    /// Checks the host, mounts the virtual filesystems and builds every LFS
    /// package inside the chroot.
    pub fn lfs_build(&self, keep_mounts: bool) -> Result<()> {
        check_root_user().with_suggestion(|| "Run the LFS build as root, e.g. with sudo -E")?;
        let root = resolve_lfs_root(
            std::env::var_os("LFS").map(PathBuf::from),
            self.config.lfs.root.as_deref(),
        )
        .with_suggestion(|| "Export LFS=/mnt/lfs or set 'lfs.root' in the configuration")?;
        check_host_tools(&self.config.lfs.host_tools)?;
        info!(target: "user-log", "Building LFS in {}", root.display());

        let mounts = VirtualFileSystems::mount(&root)?;
        let environment = self.build_environment();
        let executor = Executor::new(
            FSRootPath::from(root),
            &self.config.lfs.sources,
            &environment,
            &self.store,
        );
        let result = self.run(&executor, &self.lfs_plan());
        if keep_mounts {
            mounts.keep();
        } else {
            drop(mounts);
        }
        result
    }

    pub fn blfs_build(&self, selection: &ChapterSelection) -> Result<()> {
        let plan = self.blfs_plan(selection)?;
        if plan.is_empty() {
            info!(target: "user-ui", "No packages found in chapters {}", selection);
            return Ok(());
        }
        let root = FSRootPath::from(self.config.blfs.root.clone());
        // Dropped after the run, which unmounts everything mounted here
        let _mounts = if root.is_host() {
            None
        } else {
            check_root_user()
                .with_suggestion(|| "Building BLFS inside a chroot requires root")?;
            if !root.as_ref().is_dir() {
                return Err(EnvironmentError::RootNotFound(root.as_ref().to_path_buf()))
                    .with_suggestion(|| "Point 'blfs.root' at the mounted LFS system");
            }
            info!(target: "user-log", "Building BLFS in {}", root.as_ref().display());
            Some(VirtualFileSystems::mount(&root)?)
        };
        let environment = self.build_environment();
        let executor = Executor::new(root, &self.config.blfs.sources, &environment, &self.store);
        self.run(&executor, &plan)
    }

    fn run(&self, executor: &Executor<'_>, plan: &[PlannedBuild<'_>]) -> Result<()> {
        let start = Utc::now();
        let fetcher = self.command_fetcher();
        let total = plan.len();
        for (index, build) in plan.iter().enumerate() {
            info!(target: "user-ui",
                "[{:>3}/{}] Building {}",
                index + 1,
                total,
                build.if_supports_color(Stream::Stdout, |text| text.bold())
            );
            let recipe = match build.action {
                BuildAction::Recipe(_, recipe) => Cow::Borrowed(recipe),
                BuildAction::Generic(entry) => Cow::Owned(Recipe {
                    source: None,
                    steps: fetcher
                        .fetch(entry)
                        .with_context(|| format!("Failed to get build commands for {}", build))?,
                }),
            };
            match executor.build(build.package, &recipe) {
                Ok(output) => {
                    let ignored = if output.tolerated_failures > 0 {
                        format!(" ({} ignored step failures)", output.tolerated_failures)
                    } else {
                        String::new()
                    };
                    info!(target: "user-ui",
                        "{:>9} {} in {}{}",
                        "Built".if_supports_color(Stream::Stdout, |text| text
                            .style(Style::new().green().bold())),
                        build.package,
                        format_elapsed(output.duration),
                        ignored.if_supports_color(Stream::Stdout, |text| text.yellow())
                    );
                    debug!("Build log for {} at {}", build.package, output.build_log.display());
                }
                Err(err) => {
                    report_failure(&err);
                    return Err(err).with_context(|| format!("Failed to build {}", build));
                }
            }
        }
        info!(target: "user-ui",
            "Built {} packages in {}",
            total.if_supports_color(Stream::Stdout, |text| text.magenta()),
            format_elapsed(Utc::now() - start)
        );
        Ok(())
    }
}

fn report_failure(err: &BuildError) {
    let Some(log) = err.build_log() else {
        return;
    };
    match log_tail(log, FAILED_LOG_TAIL_LINES) {
        Ok(lines) => {
            let header = format!("Last lines of {}:", log.display());
            error!(target: "user-ui",
                "{}",
                header.if_supports_color(Stream::Stdout, |text| text.red())
            );
            for line in lines {
                error!(target: "user-ui", "  {}", line);
            }
        }
        Err(err) => debug!("Failed to read build log {}: {}", log.display(), err),
    }
}

fn format_elapsed(duration: Duration) -> String {
    if duration < Duration::seconds(1) {
        format!("{}ms", duration.num_milliseconds())
    } else {
        HumanTime::from(duration).to_text_en(Accuracy::Precise, Tense::Present)
    }
}
