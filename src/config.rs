// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Server configuration: persisted as TOML at /etc/opsdeck/config.toml

use crate::error::{OpsError, Result};
use crate::inventory::categorize::UnmatchedPolicy;
use crate::inventory::Inventory;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/opsdeck/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory playbook runs start in; relative paths below resolve against it
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_inventory")]
    pub inventory_path: PathBuf,
    #[serde(default = "default_playbook")]
    pub playbook_path: PathBuf,
    #[serde(default = "default_ansible")]
    pub ansible_bin: String,
    #[serde(default = "default_crontab")]
    pub crontab_bin: String,
    #[serde(default = "default_docker")]
    pub docker_bin: String,

    // ── API access ──
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_key_header")]
    pub api_key_header: String,

    // ── Behaviour ──
    /// Serve labelled sample data when a backend is unavailable
    #[serde(default = "default_true")]
    pub sample_fallback: bool,
    #[serde(default)]
    pub unmatched_keys: UnmatchedPolicy,

    // ── Filesystem roots ──
    /// Overrides `<project_path>/log`
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Used when the inventory has no `project_path` default var
    #[serde(default = "default_project_path")]
    pub default_project_path: PathBuf,
    /// Used when the inventory has no `backup_path` default var
    #[serde(default = "default_backup_path")]
    pub default_backup_path: PathBuf,
}

fn default_base_dir() -> PathBuf { PathBuf::from(".") }
fn default_inventory() -> PathBuf { PathBuf::from("inventory.yml") }
fn default_playbook() -> PathBuf { PathBuf::from("playbook.yml") }
fn default_ansible() -> String { "ansible-playbook".to_string() }
fn default_crontab() -> String { "crontab".to_string() }
fn default_docker() -> String { "docker".to_string() }
fn default_key_header() -> String { "X-API-Key".to_string() }
fn default_true() -> bool { true }
fn default_project_path() -> PathBuf { PathBuf::from("/home/calibri") }
fn default_backup_path() -> PathBuf { PathBuf::from("/home/calibri/backup") }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            inventory_path: default_inventory(),
            playbook_path: default_playbook(),
            ansible_bin: default_ansible(),
            crontab_bin: default_crontab(),
            docker_bin: default_docker(),
            api_key: None,
            api_key_header: default_key_header(),
            sample_fallback: true,
            unmatched_keys: UnmatchedPolicy::Drop,
            log_dir: None,
            default_project_path: default_project_path(),
            default_backup_path: default_backup_path(),
        }
    }
}

impl AppConfig {
    /// Load from disk. A missing file gives defaults, a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => {
                let config: AppConfig = toml::from_str(&data)
                    .map_err(|e| OpsError::Parse(format!("{}: {}", path.display(), e)))?;
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() { p.to_path_buf() } else { self.base_dir.join(p) }
    }

    pub fn inventory_file(&self) -> PathBuf {
        self.resolve(&self.inventory_path)
    }

    pub fn playbook_file(&self) -> PathBuf {
        self.resolve(&self.playbook_path)
    }

    /// Whether an API key is required
    pub fn auth_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

// ─── Project paths ───

/// Filesystem roots of the deployment, taken from the inventory's
/// `project_path` and `backup_path` default vars
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPaths {
    pub project: PathBuf,
    pub backups: PathBuf,
    pub logs: PathBuf,
}

impl ProjectPaths {
    pub fn resolve(config: &AppConfig, inventory: &Inventory) -> Self {
        let project = inventory
            .default_text("project_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| config.default_project_path.clone());
        let backups = match inventory.default_text("backup_path") {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => project.join(p),
            None => config.default_backup_path.clone(),
        };
        let logs = config.log_dir.clone().unwrap_or_else(|| project.join("log"));
        Self { project, backups, logs }
    }

    /// Where playbook run output lands
    pub fn run_logs(&self) -> PathBuf {
        self.logs.join("runs")
    }
}
