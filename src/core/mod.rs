mod archive;
mod auto_build;
mod chapter;
mod config;
mod dispatch;
mod download;
mod environment;
mod executor;
mod fallback;
mod fs;
mod mounts;
mod package;
mod store;

pub(crate) use archive::*;
pub(crate) use auto_build::*;
pub(crate) use chapter::*;
pub(crate) use config::*;
pub(crate) use dispatch::*;
pub(crate) use download::*;
pub(crate) use environment::*;
pub(crate) use executor::*;
pub(crate) use fallback::*;
pub(crate) use fs::*;
pub(crate) use mounts::*;
pub(crate) use package::*;
pub(crate) use store::*;
