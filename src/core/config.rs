use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

use color_eyre::{
    eyre::{eyre, Context, Result},
    Help,
};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{is_valid_package_name, Chapter, DispatchRule, Dispatcher, LfsPackage, Recipe};

lazy_static! {
    pub static ref DEFAULT_STORE_PATH: PathBuf = PathBuf::from(".lfs-auto-build");
    pub static ref DEFAULT_CONFIG_FILE: PathBuf = PathBuf::from("lfs-auto-build.json");
    static ref DEFAULT_HOST_TOOLS: Vec<String> = ["bash", "chroot", "mount", "umount", "mountpoint", "tar"]
        .into_iter()
        .map(String::from)
        .collect();
}

const CHROOT_PATH: &str = "/usr/bin:/usr/sbin";
const CHROOT_PS1: &str = r"(lfs chroot) \u:\w\$ ";

/// Host identity, networking, partitions and locale of the system being
/// built. Every field is exported to the build environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SystemConfig {
    pub hostname: Option<String>,
    pub domain: Option<String>,
    pub interface: Option<String>,
    pub ip_address: Option<String>,
    pub gateway: Option<String>,
    pub prefix: Option<u8>,
    #[serde(default)]
    pub nameservers: Vec<String>,
    pub root_partition: Option<String>,
    pub swap_partition: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
}

impl SystemConfig {
    /// Resolves the exported variables. A variable set in the host
    /// environment overrides the configured value, which overrides the
    /// built-in default.
    pub fn resolve(&self, host_env: impl Fn(&str) -> Option<String>) -> BTreeMap<String, String> {
        let configured: [(&str, Option<String>, Option<&str>); 11] = [
            ("HOSTNAME", self.hostname.clone(), Some("lfs")),
            ("DOMAIN", self.domain.clone(), None),
            ("IFACE", self.interface.clone(), Some("eth0")),
            ("IP_ADDR", self.ip_address.clone(), None),
            ("GATEWAY", self.gateway.clone(), None),
            ("PREFIX", self.prefix.map(|p| p.to_string()), Some("24")),
            (
                "NAMESERVERS",
                Some(self.nameservers.join(" ")).filter(|n| !n.is_empty()),
                None,
            ),
            ("ROOT_PART", self.root_partition.clone(), None),
            ("SWAP_PART", self.swap_partition.clone(), None),
            ("LANG", self.locale.clone(), Some("en_US.UTF-8")),
            ("TZ", self.timezone.clone(), Some("UTC")),
        ];
        configured
            .into_iter()
            .filter_map(|(key, value, default)| {
                host_env(key)
                    .filter(|v| !v.is_empty())
                    .or(value)
                    .or_else(|| default.map(String::from))
                    .map(|value| (key.to_string(), value))
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LfsConfig {
    /// Mount point of the new system, overridden by the `LFS` variable
    pub root: Option<PathBuf>,
    /// Sources directory, relative to the root
    #[serde(default = "default_sources_dir")]
    pub sources: PathBuf,
    #[serde(default = "default_host_tools")]
    pub host_tools: Vec<String>,
    #[serde(default)]
    pub packages: Vec<LfsPackage>,
}

impl Default for LfsConfig {
    fn default() -> Self {
        LfsConfig {
            root: None,
            sources: default_sources_dir(),
            host_tools: default_host_tools(),
            packages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct FallbackConfig {
    /// Directory holding one command file per package
    pub cache: Option<PathBuf>,
    /// Plain text mirror serving command files missing from the cache
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct BlfsConfig {
    /// Root the packages are built in, `/` builds on the running system
    #[serde(default = "default_blfs_root")]
    pub root: PathBuf,
    /// Sources directory, relative to the root
    #[serde(default = "default_sources_dir")]
    pub sources: PathBuf,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub recipes: BTreeMap<String, Recipe>,
    #[serde(default)]
    pub dispatch: Vec<DispatchRule>,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl Default for BlfsConfig {
    fn default() -> Self {
        BlfsConfig {
            root: default_blfs_root(),
            sources: default_sources_dir(),
            chapters: Vec::new(),
            recipes: BTreeMap::new(),
            dispatch: Vec::new(),
            fallback: FallbackConfig::default(),
        }
    }
}

fn default_sources_dir() -> PathBuf {
    PathBuf::from("sources")
}

fn default_blfs_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_host_tools() -> Vec<String> {
    DEFAULT_HOST_TOOLS.clone()
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct AutoBuildConfig {
    pub store: Option<PathBuf>,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub lfs: LfsConfig,
    #[serde(default)]
    pub blfs: BlfsConfig,
}

impl AutoBuildConfig {
    pub fn new(config_path: impl AsRef<Path>) -> Result<AutoBuildConfig> {
        let config_path = config_path
            .as_ref()
            .canonicalize()
            .context("Failed to canonicalize path to configuration file")
            .with_suggestion(|| {
                format!(
                    "Make sure '{}' is a valid lfs-auto-build json configuration",
                    config_path.as_ref().display()
                )
            })?;
        trace!("Reading configuration file '{}'", config_path.display());
        let config_file = File::open(&config_path).with_context(|| {
            eyre!(
                "Failed to find lfs-auto-build configuration at '{}'",
                config_path.display()
            )
        })?;
        let config: AutoBuildConfig = serde_json::from_reader(config_file)
            .with_context(|| {
                eyre!(
                    "Failed to read configuration file '{}'",
                    config_path.display()
                )
            })
            .with_suggestion(|| {
                format!(
                    "Make sure '{}' is a valid lfs-auto-build json configuration",
                    config_path.display()
                )
            })?;
        config.validate().with_context(|| {
            eyre!(
                "Invalid configuration file '{}'",
                config_path.display()
            )
        })?;
        debug!("Configuration file '{}' loaded", config_path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Dispatcher::new(&self.blfs.dispatch, &self.blfs.recipes)?;
        for package in self.lfs.packages.iter() {
            if package.name.trim().is_empty() {
                return Err(eyre!("Found an LFS package without a name"));
            }
            if !is_valid_package_name(&package.name) {
                return Err(eyre!("LFS package name '{}' is invalid", package.name)).with_suggestion(
                    || "Package names may only contain letters, digits and '_.+-'",
                );
            }
        }
        Ok(())
    }

    /// Variables every build step sees, on top of a clean environment when
    /// running inside the chroot.
    pub fn build_environment(
        &self,
        host_env: impl Fn(&str) -> Option<String>,
    ) -> BTreeMap<String, String> {
        let mut environment = BTreeMap::new();
        environment.insert("HOME".to_string(), "/root".to_string());
        environment.insert(
            "TERM".to_string(),
            host_env("TERM").unwrap_or_else(|| String::from("xterm")),
        );
        environment.insert("PS1".to_string(), CHROOT_PS1.to_string());
        environment.insert("PATH".to_string(), CHROOT_PATH.to_string());
        environment.insert(
            "MAKEFLAGS".to_string(),
            format!("-j{}", num_cpus::get()),
        );
        environment.extend(self.system.resolve(&host_env));
        environment.extend(
            self.environment
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        environment
    }

    /// Store directory for logs and scratch space, relative paths are taken
    /// from the configuration file's directory.
    pub fn store_path(&self, config_path: impl AsRef<Path>) -> Result<PathBuf> {
        let store_path = self.store.as_ref().unwrap_or(&DEFAULT_STORE_PATH);
        if store_path.is_absolute() {
            return Ok(store_path.clone());
        }
        let config_dir = config_path
            .as_ref()
            .canonicalize()
            .context("Failed to canonicalize path to configuration file")?
            .parent()
            .ok_or(eyre!(
                "Failed to determine parent folder of lfs-auto-build configuration file"
            ))?
            .to_path_buf();
        Ok(config_dir.join(store_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn system_defaults_apply_without_config() {
        let resolved = SystemConfig::default().resolve(env_from(&[]));
        assert_eq!(resolved.get("HOSTNAME").map(String::as_str), Some("lfs"));
        assert_eq!(resolved.get("LANG").map(String::as_str), Some("en_US.UTF-8"));
        assert_eq!(resolved.get("TZ").map(String::as_str), Some("UTC"));
        assert_eq!(resolved.get("PREFIX").map(String::as_str), Some("24"));
        assert!(!resolved.contains_key("IP_ADDR"));
        assert!(!resolved.contains_key("NAMESERVERS"));
    }

    #[test]
    fn host_environment_overrides_config() {
        let system = SystemConfig {
            hostname: Some("builder".into()),
            ip_address: Some("10.0.0.2".into()),
            nameservers: vec!["1.1.1.1".into(), "9.9.9.9".into()],
            ..Default::default()
        };
        let resolved = system.resolve(env_from(&[("HOSTNAME", "override"), ("IP_ADDR", "")]));
        assert_eq!(resolved.get("HOSTNAME").map(String::as_str), Some("override"));
        // Empty host values do not clobber the configuration
        assert_eq!(resolved.get("IP_ADDR").map(String::as_str), Some("10.0.0.2"));
        assert_eq!(
            resolved.get("NAMESERVERS").map(String::as_str),
            Some("1.1.1.1 9.9.9.9")
        );
    }

    #[test]
    fn build_environment_layers_extra_variables_last() {
        let mut config = AutoBuildConfig::default();
        config
            .environment
            .insert("MAKEFLAGS".into(), "-j1".into());
        config.environment.insert("CFLAGS".into(), "-O2".into());
        let environment = config.build_environment(env_from(&[("TERM", "linux")]));
        assert_eq!(environment.get("HOME").map(String::as_str), Some("/root"));
        assert_eq!(environment.get("TERM").map(String::as_str), Some("linux"));
        assert_eq!(environment.get("PATH").map(String::as_str), Some(CHROOT_PATH));
        assert_eq!(environment.get("MAKEFLAGS").map(String::as_str), Some("-j1"));
        assert_eq!(environment.get("CFLAGS").map(String::as_str), Some("-O2"));
    }

    #[test]
    fn minimal_configuration_deserializes_with_defaults() {
        let config: AutoBuildConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.blfs.root, PathBuf::from("/"));
        assert_eq!(config.lfs.sources, PathBuf::from("sources"));
        assert!(config.lfs.host_tools.iter().any(|t| t == "chroot"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dispatch_to_missing_recipe_fails_validation() {
        let config: AutoBuildConfig = serde_json::from_str(
            r#"{"blfs": {"dispatch": [{"pattern": "openssl", "recipe": "openssl"}]}}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn lfs_package_names_must_be_usable_as_file_names() {
        for name in ["../escape", "gcc/pass1", "gcc pass1"] {
            let config: AutoBuildConfig = serde_json::from_value(serde_json::json!({
                "lfs": {"packages": [{"name": name, "steps": ["true"]}]}
            }))
            .unwrap();
            assert!(config.validate().is_err(), "{} should be rejected", name);
        }
        let config: AutoBuildConfig = serde_json::from_str(
            r#"{"lfs": {"packages": [{"name": "gcc-pass1", "steps": ["true"]}]}}"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_chapter_entry_fails_to_load() {
        let result: serde_json::Result<AutoBuildConfig> = serde_json::from_str(
            r#"{"blfs": {"chapters": [{"number": 4, "packages": ["openssl"]}]}}"#,
        );
        assert!(result.is_err());
    }
}
