// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Log browser: cron and backup logs under `<project_path>/log`

pub mod api;

use crate::error::{OpsError, Result};
use crate::inventory::Inventory;
use crate::sizes::format_size;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct LogFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub size_formatted: String,
    pub modified: String,
    pub line_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Databases,
    Volumes,
    Unknown,
}

impl LogKind {
    fn from_name(name: &str) -> Self {
        if name.contains("databases") {
            LogKind::Databases
        } else if name.contains("volumes") {
            LogKind::Volumes
        } else {
            LogKind::Unknown
        }
    }
}

/// Whole-file counters shown next to each customer log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogSummary {
    pub total_lines: usize,
    pub error_count: usize,
    pub success_count: usize,
    pub warning_count: usize,
    pub start_count: usize,
    pub finish_count: usize,
    pub first_entry: Option<String>,
    pub last_entry: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerLog {
    #[serde(rename = "type")]
    pub kind: LogKind,
    #[serde(flatten)]
    pub file: LogFile,
    pub analysis: LogSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerLogs {
    pub name: String,
    pub total_logs: usize,
    pub logs: Vec<CustomerLog>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogListing {
    pub cron: Option<LogFile>,
    pub backup: BTreeMap<String, LogFile>,
    pub customers: BTreeMap<String, CustomerLogs>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineHit {
    pub line_number: usize,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineAnalysis {
    pub errors: Vec<LineHit>,
    pub warnings: Vec<LineHit>,
    pub successes: Vec<LineHit>,
    pub starts: Vec<LineHit>,
    pub finishes: Vec<LineHit>,
}

// ─── Analysis ───

pub fn summarize(content: &str) -> LogSummary {
    let lines: Vec<&str> = content.lines().collect();
    let mut s = LogSummary {
        total_lines: lines.len(),
        first_entry: lines.first().map(|l| l.trim().to_string()),
        last_entry: lines.last().map(|l| l.trim().to_string()),
        ..LogSummary::default()
    };
    for line in &lines {
        let lower = line.to_lowercase();
        if lower.contains("error") {
            s.error_count += 1;
        } else if lower.contains("success") {
            s.success_count += 1;
        } else if lower.contains("warning") {
            s.warning_count += 1;
        }
        if lower.contains("start") {
            s.start_count += 1;
        } else if lower.contains("finish") {
            s.finish_count += 1;
        }
    }
    s
}

/// Per-line classification; a line is one of error, warning or success,
/// and separately a start (of a backup step) or a finish
pub fn analyze_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> LineAnalysis {
    let mut a = LineAnalysis::default();
    for (i, line) in lines.into_iter().enumerate() {
        let lower = line.to_lowercase();
        let hit = || LineHit { line_number: i + 1, content: line.trim().to_string() };
        if lower.contains("error") {
            a.errors.push(hit());
        } else if lower.contains("warning") {
            a.warnings.push(hit());
        } else if lower.contains("success") {
            a.successes.push(hit());
        }
        let backup_step = ["backup", "database", "volume"].iter().any(|w| lower.contains(w));
        if lower.contains("start") && backup_step {
            a.starts.push(hit());
        } else if lower.contains("finish") {
            a.finishes.push(hit());
        }
    }
    a
}

// ─── Files ───

fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn stat_file(path: &Path) -> Option<LogFile> {
    let meta = fs::metadata(path).ok()?;
    let modified = meta
        .modified()
        .ok()
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let line_count = read_lossy(path).map(|c| c.lines().count()).unwrap_or(0);
    Some(LogFile {
        name: path.file_name()?.to_string_lossy().to_string(),
        path: path.to_path_buf(),
        size: meta.len(),
        size_formatted: format_size(meta.len()),
        modified,
        line_count,
    })
}

/// First `lines` lines, or the last `lines` when `tail` is set
pub fn read_log(path: &Path, lines: usize, tail: bool) -> Result<String> {
    let content = read_lossy(path)?;
    let all: Vec<&str> = content.split_inclusive('\n').collect();
    let picked = if tail {
        &all[all.len().saturating_sub(lines)..]
    } else {
        &all[..lines.min(all.len())]
    };
    Ok(picked.concat())
}

pub fn clear_log(path: &Path) -> Result<()> {
    let marker = format!("# Log cleared at {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
    fs::write(path, marker)?;
    info!("Cleared log {}", path.display());
    Ok(())
}

/// Resolve a requested log path, absolute or relative to `root`, and refuse
/// anything that lands outside it
pub fn resolve_in_root(root: &Path, requested: &str) -> Result<PathBuf> {
    if requested.trim().is_empty() {
        return Err(OpsError::validation("Log path is required"));
    }
    let candidate = if Path::new(requested).is_absolute() {
        PathBuf::from(requested)
    } else {
        root.join(requested)
    };
    let Ok(real) = candidate.canonicalize() else {
        return Err(OpsError::not_found("Log file", requested));
    };
    let root = root.canonicalize().map_err(|_| OpsError::not_found("Log directory", root.display().to_string()))?;
    if !real.starts_with(&root) {
        return Err(OpsError::validation(format!("Log path '{}' is outside the log directory", requested)));
    }
    if !real.is_file() {
        return Err(OpsError::not_found("Log file", requested));
    }
    Ok(real)
}

// ─── Listing ───

pub fn list_logs(root: &Path, inventory: &Inventory) -> LogListing {
    let mut listing = LogListing {
        cron: stat_file(&root.join("cron.log")),
        ..LogListing::default()
    };

    if let Ok(entries) = fs::read_dir(root.join("backup")) {
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".log") {
                continue;
            }
            if let Some(file) = stat_file(&entry.path()) {
                listing.backup.insert(name, file);
            }
        }
    }

    for customer in inventory.customer_ids() {
        let logs: Vec<CustomerLog> = listing
            .backup
            .iter()
            .filter(|(name, _)| name.contains(customer.as_str()))
            .map(|(name, file)| CustomerLog {
                kind: LogKind::from_name(name),
                analysis: read_lossy(&file.path).map(|c| summarize(&c)).unwrap_or_default(),
                file: file.clone(),
            })
            .collect();
        if !logs.is_empty() {
            listing.customers.insert(
                customer.clone(),
                CustomerLogs { name: inventory.display_name(&customer), total_logs: logs.len(), logs },
            );
        }
    }
    listing
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Starting backup for acme
Database portal dumped successfully
WARNING: volume uploads is large
ERROR: failed to reach registry
Finished backup
";

    #[test]
    fn line_analysis_buckets() {
        let a = analyze_lines(SAMPLE.lines());
        assert_eq!(a.starts.len(), 1);
        assert_eq!(a.starts[0].line_number, 1);
        assert_eq!(a.successes[0].content, "Database portal dumped successfully");
        assert_eq!(a.warnings[0].line_number, 3);
        assert_eq!(a.errors[0].line_number, 4);
        assert_eq!(a.finishes[0].line_number, 5);

        // "start" without a backup word is not a start
        assert!(analyze_lines(["Starting nginx"]).starts.is_empty());
    }

    #[test]
    fn summary_counts() {
        let s = summarize(SAMPLE);
        assert_eq!(s.total_lines, 5);
        assert_eq!(s.error_count, 1);
        assert_eq!(s.success_count, 1);
        assert_eq!(s.warning_count, 1);
        assert_eq!(s.start_count, 1);
        assert_eq!(s.finish_count, 1);
        assert_eq!(s.first_entry.as_deref(), Some("Starting backup for acme"));
        assert_eq!(s.last_entry.as_deref(), Some("Finished backup"));
    }

    #[test]
    fn head_and_tail_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron.log");
        fs::write(&path, "a\nb\nc\nd\n").unwrap();
        assert_eq!(read_log(&path, 2, false).unwrap(), "a\nb\n");
        assert_eq!(read_log(&path, 2, true).unwrap(), "c\nd\n");
        assert_eq!(read_log(&path, 10, true).unwrap(), "a\nb\nc\nd\n");
    }

    #[test]
    fn clear_leaves_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron.log");
        fs::write(&path, "old\nlines\n").unwrap();
        clear_log(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Log cleared at "));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn paths_stay_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("log");
        fs::create_dir_all(root.join("backup")).unwrap();
        fs::write(root.join("backup").join("acme_databases.log"), "x\n").unwrap();
        fs::write(dir.path().join("secret.txt"), "x\n").unwrap();

        assert!(resolve_in_root(&root, "backup/acme_databases.log").is_ok());
        let abs = root.join("backup").join("acme_databases.log");
        assert!(resolve_in_root(&root, abs.to_str().unwrap()).is_ok());
        assert!(matches!(resolve_in_root(&root, "../secret.txt"), Err(OpsError::Validation(_))));
        assert!(matches!(resolve_in_root(&root, "nope.log"), Err(OpsError::NotFound { .. })));
        assert!(matches!(resolve_in_root(&root, ""), Err(OpsError::Validation(_))));
    }

    #[test]
    fn listing_groups_by_customer() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("backup")).unwrap();
        fs::write(root.join("cron.log"), "tick\ntock\n").unwrap();
        fs::write(root.join("backup").join("acme_databases.log"), SAMPLE).unwrap();
        fs::write(root.join("backup").join("acme_volumes.log"), "ok\n").unwrap();
        fs::write(root.join("backup").join("other.log"), "ok\n").unwrap();
        fs::write(root.join("backup").join("notes.txt"), "skip\n").unwrap();

        let inv: Inventory = serde_yaml::from_str(
            "all:\n  hosts:\n    acme:\n      vars:\n        customer_name: Acme\n    beta:\n",
        )
        .unwrap();
        let listing = list_logs(root, &inv);
        assert_eq!(listing.cron.as_ref().unwrap().line_count, 2);
        assert_eq!(listing.backup.len(), 3);
        let acme = &listing.customers["acme"];
        assert_eq!(acme.name, "Acme");
        assert_eq!(acme.total_logs, 2);
        assert_eq!(acme.logs[0].kind, LogKind::Databases);
        assert_eq!(acme.logs[0].analysis.error_count, 1);
        assert_eq!(acme.logs[1].kind, LogKind::Volumes);
        assert!(!listing.customers.contains_key("beta"));
    }
}
