//! End to end tests of the lfs-auto-build command line
//!
//! BLFS builds run against the host root `/`, so recipes here only append
//! to marker files inside a temporary directory.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempdir::TempDir;

#[allow(deprecated)]
fn lfs_auto_build_cmd() -> Command {
    let mut cmd = Command::cargo_bin("lfs-auto-build").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("LFS");
    cmd
}

#[allow(deprecated)]
fn lfs_auto_build_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin("lfs-auto-build")
}

struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    fn new() -> TestWorkspace {
        let dir = TempDir::new("lfs-auto-build-cli").unwrap();
        std::fs::create_dir_all(dir.path().join("sources")).unwrap();
        TestWorkspace { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn marker(&self) -> PathBuf {
        self.path().join("built.txt")
    }

    fn config_path(&self) -> PathBuf {
        self.path().join("lfs-auto-build.json")
    }

    fn built(&self) -> Vec<String> {
        std::fs::read_to_string(self.marker())
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    fn write_command_file(&self, relative: &str, contents: &str) {
        let path = self.path().join("commands").join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    /// Writes a configuration whose recipes record each package they build.
    fn write_config(&self) -> PathBuf {
        let record = |name: &str| format!("echo {} >> '{}'", name, self.marker().display());
        let config = json!({
            "system": {"hostname": "lfs-test"},
            "lfs": {
                "packages": [
                    {"name": "binutils-pass1", "steps": ["true"]},
                    {"name": "gcc-pass1", "steps": ["true", "true"]}
                ]
            },
            "blfs": {
                "root": "/",
                "sources": self.path().join("sources"),
                "chapters": [
                    {"number": 6, "title": "Editors", "packages": ["nano|postlfs/nano.html"]},
                    {"number": 4, "title": "Security", "packages": ["openssl|postlfs/openssl.html"]},
                    {"number": 5, "title": "File Systems", "packages": [
                        "btrfs-progs|postlfs/btrfs-progs.html",
                        "dosfstools|postlfs/dosfstools.html"
                    ]}
                ],
                "recipes": {
                    "openssl": {"steps": [record("openssl")]},
                    "nano": {"steps": [record("nano")]},
                    "dosfstools": {"steps": [
                        {"run": "exit 1", "allow_failure": true},
                        record("dosfstools")
                    ]},
                    "broken": {"steps": ["echo compiling broken", "echo broken failed >&2; exit 4"]}
                },
                "dispatch": [
                    {"pattern": "openssl", "recipe": "openssl"},
                    {"pattern": "nano", "recipe": "nano"},
                    {"pattern": "dosfs*", "recipe": "dosfstools"},
                    {"pattern": "broken", "recipe": "broken"}
                ],
                "fallback": {"cache": "commands"}
            }
        });
        std::fs::write(self.config_path(), serde_json::to_string_pretty(&config).unwrap())
            .unwrap();
        self.config_path()
    }
}

#[test]
fn test_help_lists_subcommands() {
    for flag in ["--help", "-h"] {
        lfs_auto_build_cmd()
            .arg(flag)
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage"))
            .stdout(predicate::str::contains("lfs"))
            .stdout(predicate::str::contains("blfs"));
    }
}

#[test]
fn test_blfs_help_describes_chapters() {
    lfs_auto_build_cmd()
        .args(["blfs", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--chapters"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_format_requires_dry_run() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    lfs_auto_build_cmd()
        .arg("blfs")
        .arg("-c")
        .arg(&config)
        .args(["-f", "json"])
        .assert()
        .failure()
        .code(1);
    assert!(workspace.built().is_empty());
}

#[test]
fn test_usage_errors_exit_with_one() {
    lfs_auto_build_cmd()
        .args(["blfs", "--no-such-flag"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--no-such-flag"));
}

#[test]
fn test_progress_lines_are_plain_text_when_piped() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    lfs_auto_build_cmd()
        .arg("blfs")
        .arg("-c")
        .arg(&config)
        .args(["--chapters", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[  1/1] Building nano (chapter 6)"))
        .stdout(predicate::str::contains("Built nano in"))
        .stdout(predicate::str::contains(r"\x1b").not())
        .stdout(predicate::str::contains("\u{1b}").not());
    assert_eq!(workspace.built(), vec!["nano"]);

    lfs_auto_build_cmd()
        .arg("blfs")
        .arg("-c")
        .arg(&config)
        .args(["--chapters", "6", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chapters: 6"))
        .stdout(predicate::str::contains("recipe nano (1 steps)"))
        .stdout(predicate::str::contains("\u{1b}").not());
}

#[test]
fn test_dry_run_limits_to_selected_chapters() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    lfs_auto_build_cmd()
        .arg("blfs")
        .arg("-c")
        .arg(&config)
        .args(["--chapters", "5,6", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("btrfs-progs"))
        .stdout(predicate::str::contains("dosfstools"))
        .stdout(predicate::str::contains("nano"))
        .stdout(predicate::str::contains("openssl").not());
    assert!(workspace.built().is_empty());
}

#[test]
fn test_malformed_chapters_fall_back_to_default_range() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    lfs_auto_build_cmd()
        .arg("blfs")
        .arg("-c")
        .arg(&config)
        .args(["--chapters", "five", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("openssl"))
        .stdout(predicate::str::contains("nano"))
        .stderr(predicate::str::contains("malformed chapter list"));
}

#[test]
fn test_json_dry_run_orders_chapters_ascending() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    let output = lfs_auto_build_cmd()
        .arg("blfs")
        .arg("-c")
        .arg(&config)
        .args(["--dry-run", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let plan: Value = serde_json::from_slice(&output.stdout).unwrap();
    let packages = plan["order"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["package"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(packages, vec!["openssl", "btrfs-progs", "dosfstools", "nano"]);
    assert_eq!(plan["order"][1]["recipe"], Value::Null);
    assert_eq!(plan["order"][0]["recipe"], "openssl");
}

#[test]
fn test_lfs_dry_run_lists_packages_without_host_checks() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    lfs_auto_build_cmd()
        .arg("lfs")
        .arg("-c")
        .arg(&config)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("binutils-pass1"))
        .stdout(predicate::str::contains("gcc-pass1"));
}

#[test]
fn test_blfs_builds_only_selected_chapters() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    workspace.write_command_file(
        "postlfs/btrfs-progs.sh",
        &format!(
            "# btrfs-progs\necho btrfs-progs >> '{}'\n",
            workspace.marker().display()
        ),
    );
    lfs_auto_build_cmd()
        .arg("blfs")
        .arg("-c")
        .arg(&config)
        .args(["--chapters", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[  1/2]"))
        .stdout(predicate::str::contains("Built"));
    assert_eq!(workspace.built(), vec!["btrfs-progs", "dosfstools"]);
    assert!(workspace
        .path()
        .join(".lfs-auto-build/logs/success/dosfstools.log")
        .is_file());
}

#[test]
fn test_blfs_stops_at_missing_generic_commands() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    lfs_auto_build_cmd()
        .arg("blfs")
        .arg("-c")
        .arg(&config)
        .args(["--chapters", "4-5"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("btrfs-progs"));
    // openssl ran, nothing after the failing package did
    assert_eq!(workspace.built(), vec!["openssl"]);
}

#[test]
fn test_failed_build_keeps_the_log() {
    let workspace = TestWorkspace::new();
    workspace.write_config();
    let mut config: Value =
        serde_json::from_str(&std::fs::read_to_string(workspace.config_path()).unwrap()).unwrap();
    config["blfs"]["chapters"] = json!([
        {"number": 7, "title": "Broken", "packages": ["broken|broken/broken.html", "nano|postlfs/nano.html"]}
    ]);
    std::fs::write(workspace.config_path(), config.to_string()).unwrap();

    lfs_auto_build_cmd()
        .arg("blfs")
        .arg("-c")
        .arg(workspace.config_path())
        .args(["--chapters", "7"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("broken failed"))
        .stderr(predicate::str::contains("Failed to build broken"));
    assert!(workspace.built().is_empty());
    let failures = std::fs::read_dir(workspace.path().join(".lfs-auto-build/logs/failure"))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("broken-"));
}

#[test]
fn test_lfs_aborts_on_wrong_umask() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    let binary = lfs_auto_build_path();
    Command::new("bash")
        .arg("-c")
        .arg(format!(
            "umask 077 && exec '{}' lfs -c '{}'",
            binary.display(),
            config.display()
        ))
        .env_remove("LFS")
        .assert()
        .failure()
        .stderr(predicate::str::contains("umask must be 022"));
}

#[test]
fn test_lfs_requires_root_and_mount_point() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config();
    let binary = lfs_auto_build_path();
    // Either the root check or the missing LFS root stops the run
    Command::new("bash")
        .arg("-c")
        .arg(format!(
            "umask 022 && exec '{}' lfs -c '{}'",
            binary.display(),
            config.display()
        ))
        .env_remove("LFS")
        .assert()
        .failure()
        .stderr(predicate::str::contains("root").or(predicate::str::contains("LFS")));
}
