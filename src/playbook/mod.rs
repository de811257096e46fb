// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Playbook runner: starts `ansible-playbook` for one customer and tracks the run
//!
//! Runs are fire-and-accept: `start` returns once the process is spawned.
//! Output goes to `<log_dir>/runs/<run_id>.log`.

pub mod api;

use crate::config::AppConfig;
use crate::error::{OpsError, Result};
use crate::inventory::VarMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use tracing::{info, warn};

/// Finished runs kept for `/api/run/list`
const MAX_FINISHED_RUNS: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub customer: String,
    #[serde(default)]
    pub extra_vars: VarMap,
    #[serde(default)]
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunHandle {
    pub run_id: String,
    pub pid: u32,
    pub customer: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RunState {
    Running,
    Finished { exit_code: Option<i32> },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub pid: u32,
    pub customer: String,
    pub tags: Option<String>,
    pub command: String,
    pub log_file: PathBuf,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: RunState,
}

struct RunRecord {
    info: RunInfo,
    child: Option<Child>,
}

impl RunRecord {
    /// Reap the child if it has exited
    fn poll(&mut self) {
        if let Some(child) = &mut self.child {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!("Playbook run {} for {} exited with {:?}", self.info.run_id, self.info.customer, status.code());
                    self.info.state = RunState::Finished { exit_code: status.code() };
                    self.child = None;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Cannot poll playbook run {}: {}", self.info.run_id, e);
                    self.info.state = RunState::Finished { exit_code: None };
                    self.child = None;
                }
            }
        }
    }
}

pub struct PlaybookRunner {
    ansible_bin: String,
    inventory: PathBuf,
    playbook: PathBuf,
    base_dir: PathBuf,
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl PlaybookRunner {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            ansible_bin: config.ansible_bin.clone(),
            inventory: config.inventory_file(),
            playbook: config.playbook_file(),
            base_dir: config.base_dir.clone(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Argument list after the binary name
    pub fn build_args(&self, req: &RunRequest) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            self.inventory.display().to_string(),
            self.playbook.display().to_string(),
            "--limit".to_string(),
            req.customer.clone(),
        ];
        if !req.extra_vars.is_empty() {
            // JSON form keeps quotes and spaces in values intact
            args.push("--extra-vars".to_string());
            args.push(serde_json::to_string(&req.extra_vars).unwrap_or_else(|_| "{}".to_string()));
        }
        if let Some(tags) = req.tags.as_deref().filter(|t| !t.is_empty()) {
            args.push("--tags".to_string());
            args.push(tags.to_string());
        }
        args
    }

    pub fn start(&self, req: &RunRequest, log_dir: &Path) -> Result<RunHandle> {
        validate_name("customer", &req.customer)?;
        if let Some(tags) = req.tags.as_deref().filter(|t| !t.is_empty()) {
            if !tags.split(',').all(|t| is_safe_name(t.trim())) {
                return Err(OpsError::validation(format!("Invalid tags '{}'", tags)));
            }
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        fs::create_dir_all(log_dir)?;
        let log_file = log_dir.join(format!("{}.log", run_id));
        let stdout = File::create(&log_file)?;
        let stderr = stdout.try_clone()?;

        let args = self.build_args(req);
        let command = format!("{} {}", self.ansible_bin, args.join(" "));
        let child = Command::new(&self.ansible_bin)
            .args(&args)
            .current_dir(&self.base_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| OpsError::Command(format!("Failed to start {}: {}", self.ansible_bin, e)))?;
        let pid = child.id();
        info!("Started playbook run {} for {} (pid {})", run_id, req.customer, pid);

        let info = RunInfo {
            run_id: run_id.clone(),
            pid,
            customer: req.customer.clone(),
            tags: req.tags.clone(),
            command: command.clone(),
            log_file,
            started_at: Utc::now(),
            state: RunState::Running,
        };
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        prune_finished(&mut runs);
        runs.insert(run_id.clone(), RunRecord { info, child: Some(child) });

        Ok(RunHandle { run_id, pid, customer: req.customer.clone(), command })
    }

    pub fn status(&self, run_id: &str) -> Option<RunInfo> {
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        runs.get_mut(run_id).map(|r| {
            r.poll();
            r.info.clone()
        })
    }

    /// Poll every child so finished ones are not left as zombies.
    /// Returns how many are still running.
    pub fn reap(&self) -> usize {
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        prune_finished(&mut runs);
        runs.values().filter(|r| r.child.is_some()).count()
    }

    /// All known runs, newest first
    pub fn list(&self) -> Vec<RunInfo> {
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<RunInfo> = runs.values_mut()
            .map(|r| {
                r.poll();
                r.info.clone()
            })
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out
    }
}

fn prune_finished(runs: &mut HashMap<String, RunRecord>) {
    for r in runs.values_mut() {
        r.poll();
    }
    let mut finished: Vec<(DateTime<Utc>, String)> = runs.values()
        .filter(|r| r.child.is_none())
        .map(|r| (r.info.started_at, r.info.run_id.clone()))
        .collect();
    if finished.len() < MAX_FINISHED_RUNS {
        return;
    }
    finished.sort();
    let excess = finished.len() + 1 - MAX_FINISHED_RUNS;
    for (_, id) in finished.into_iter().take(excess) {
        runs.remove(&id);
    }
}

fn is_safe_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !s.starts_with('-')
}

/// Customer ids and similar values end up on command lines and in paths
pub fn validate_name(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(OpsError::validation(format!("{} is required", what)));
    }
    if !is_safe_name(value) {
        return Err(OpsError::validation(format!("Invalid {} '{}'", what, value)));
    }
    Ok(())
}
