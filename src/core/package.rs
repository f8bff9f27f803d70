use std::{fmt::Display, path::Path, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    static ref PACKAGE_NAME_REGEX: Regex = Regex::new("^[A-Za-z0-9_.+-]+$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum PackageEntryError {
    #[error("Package entry '{0}' is not a 'name|path' pair")]
    MissingSeparator(String),
    #[error("Package entry '{0}' has an empty name")]
    EmptyName(String),
    #[error("Package entry '{0}' has an empty path")]
    EmptyPath(String),
    #[error("Package entry '{0}' has an invalid name, only letters, digits and '_.+-' are allowed")]
    InvalidName(String),
}

/// Package names end up in build directory and log file names.
pub(crate) fn is_valid_package_name(name: &str) -> bool {
    PACKAGE_NAME_REGEX.is_match(name)
}

/// A single package of a chapter listing, written as `name|path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub(crate) struct PackageEntry {
    pub name: String,
    pub path: String,
}

impl FromStr for PackageEntry {
    type Err = PackageEntryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, path) = value
            .split_once('|')
            .ok_or_else(|| PackageEntryError::MissingSeparator(value.to_string()))?;
        let (name, path) = (name.trim(), path.trim());
        if name.is_empty() {
            return Err(PackageEntryError::EmptyName(value.to_string()));
        }
        if path.is_empty() {
            return Err(PackageEntryError::EmptyPath(value.to_string()));
        }
        if !is_valid_package_name(name) {
            return Err(PackageEntryError::InvalidName(value.to_string()));
        }
        Ok(PackageEntry {
            name: name.to_string(),
            path: path.to_string(),
        })
    }
}

impl TryFrom<String> for PackageEntry {
    type Error = PackageEntryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PackageEntry::from_str(value.as_str())
    }
}

impl From<PackageEntry> for String {
    fn from(value: PackageEntry) -> Self {
        value.to_string()
    }
}

impl Display for PackageEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.name, self.path)
    }
}

impl PackageEntry {
    /// Location of the command file for this entry, relative to a command cache
    /// or mirror root. The page extension is swapped for `.sh`.
    pub fn command_file(&self) -> String {
        let path = Path::new(self.path.trim_start_matches('/'));
        path.with_extension("sh").to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum StepDefinition {
    Command(String),
    Detailed {
        run: String,
        #[serde(default)]
        allow_failure: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StepDefinition")]
pub(crate) struct Step {
    pub run: String,
    pub allow_failure: bool,
}

impl Step {
    pub fn new(run: impl Into<String>) -> Step {
        Step {
            run: run.into(),
            allow_failure: false,
        }
    }
}

impl From<StepDefinition> for Step {
    fn from(value: StepDefinition) -> Self {
        match value {
            StepDefinition::Command(run) => Step {
                run,
                allow_failure: false,
            },
            StepDefinition::Detailed { run, allow_failure } => Step { run, allow_failure },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Recipe {
    /// Archive in the sources directory to unpack before the steps run
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LfsPackage {
    pub name: String,
    #[serde(flatten)]
    pub recipe: Recipe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Chapter {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub packages: Vec<PackageEntry>,
}

impl Display for Chapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.title.is_empty() {
            write!(f, "Chapter {}", self.number)
        } else {
            write!(f, "Chapter {} ({})", self.number, self.title)
        }
    }
}
