// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Backup archives: per-customer backup sets produced by the backup playbook
//!
//! Layout: `<backup_root>/<customer>/<YYYY-MM-DD-HH-MM-SS>/...` where each set
//! holds database dumps (`.sql.gz`), volume archives (`.tar.gz`) and others.

pub mod api;

use crate::error::{OpsError, Result};
use crate::inventory::{Inventory, VarValue};
use crate::sizes::format_size;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Retention when `customer_backup_keep` is not set
pub const DEFAULT_KEEP: usize = 7;

#[derive(Debug, Clone, Serialize)]
pub struct BackupFile {
    pub name: String,
    /// Relative to the backup set
    pub path: String,
    pub size: u64,
    pub size_formatted: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupFiles {
    pub databases: Vec<BackupFile>,
    pub volumes: Vec<BackupFile>,
    pub others: Vec<BackupFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupSet {
    pub name: String,
    pub path: PathBuf,
    pub date: String,
    pub time: String,
    pub full_date: String,
    pub size: u64,
    pub size_formatted: String,
    pub file_count: usize,
    pub files: BackupFiles,
    #[serde(skip)]
    taken_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerBackups {
    pub name: String,
    pub backup_enabled: bool,
    pub backup_path: PathBuf,
    pub backups: Vec<BackupSet>,
    pub total_backups: usize,
    pub total_size: u64,
    pub total_size_formatted: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub deleted_count: usize,
    pub deleted: Vec<String>,
}

// ─── Names and paths ───

/// Parse a set name (`2024-03-01-02-00-00`) into date and time parts.
/// Sets named with a date only get midnight.
pub fn parse_set_name(name: &str) -> Option<NaiveDateTime> {
    if !name.starts_with("20") {
        return None;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(name, "%Y-%m-%d-%H-%M-%S") {
        return Some(dt);
    }
    let date_part: String = name.splitn(4, '-').take(3).collect::<Vec<_>>().join("-");
    NaiveDate::parse_from_str(&date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// A single path component: no separators, no `.`/`..`
pub fn check_component<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
    {
        return Err(OpsError::validation(format!("Invalid {} '{}'", what, value)));
    }
    Ok(value)
}

/// A relative path below a backup set, no `..` or absolute parts
fn check_relative(value: &str) -> Result<&Path> {
    let path = Path::new(value);
    let ok = !value.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(path)
    } else {
        Err(OpsError::validation(format!("Invalid file name '{}'", value)))
    }
}

fn is_listed_file(name: &str) -> bool {
    !name.ends_with(".sh") && !name.contains("backup_")
}

// ─── Listing ───

fn scan_set(dir: &Path, name: &str, taken_at: NaiveDateTime) -> BackupSet {
    let mut files = BackupFiles::default();
    let mut size = 0u64;
    let mut file_count = 0usize;

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !is_listed_file(&file_name) {
            continue;
        }
        let file_size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path()).to_string_lossy().to_string();
        size += file_size;
        file_count += 1;
        let file = BackupFile {
            name: file_name.clone(),
            path: rel,
            size: file_size,
            size_formatted: format_size(file_size),
        };
        if file_name.ends_with(".sql.gz") {
            files.databases.push(file);
        } else if file_name.ends_with(".tar.gz") {
            files.volumes.push(file);
        } else {
            files.others.push(file);
        }
    }

    BackupSet {
        name: name.to_string(),
        path: dir.to_path_buf(),
        date: taken_at.format("%Y-%m-%d").to_string(),
        time: taken_at.format("%H:%M:%S").to_string(),
        full_date: taken_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        size,
        size_formatted: format_size(size),
        file_count,
        files,
        taken_at,
    }
}

/// Backup sets of one customer directory, newest first. Names that don't
/// parse as a timestamp fall back to the directory's mtime.
pub fn list_sets(customer_dir: &Path) -> Vec<BackupSet> {
    let Ok(entries) = fs::read_dir(customer_dir) else {
        return Vec::new();
    };
    let mut sets: Vec<BackupSet> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with("20") {
                return None;
            }
            let taken_at = parse_set_name(&name).or_else(|| {
                e.metadata().ok()?.modified().ok().map(|t| DateTime::<Local>::from(t).naive_local())
            })?;
            Some(scan_set(&e.path(), &name, taken_at))
        })
        .collect();
    sets.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then_with(|| b.name.cmp(&a.name)));
    sets
}

/// Every inventory customer that has a backup directory
pub fn list_backups(root: &Path, inventory: &Inventory) -> BTreeMap<String, CustomerBackups> {
    inventory
        .customer_ids()
        .into_iter()
        .filter_map(|customer| {
            let dir = root.join(&customer);
            if !dir.is_dir() {
                return None;
            }
            let backups = list_sets(&dir);
            let total_size = backups.iter().map(|b| b.size).sum();
            let summary = CustomerBackups {
                name: inventory.display_name(&customer),
                backup_enabled: backup_enabled(inventory, &customer),
                backup_path: dir,
                total_backups: backups.len(),
                total_size,
                total_size_formatted: format_size(total_size),
                backups,
            };
            Some((customer, summary))
        })
        .collect()
}

// ─── Per-customer settings ───

pub fn backup_enabled(inventory: &Inventory, customer: &str) -> bool {
    match inventory.resolve(customer, "customer_backup_enabled") {
        Some(VarValue::Bool(b)) => *b,
        Some(VarValue::Text(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Some(VarValue::Int(n)) => *n != 0,
        _ => false,
    }
}

pub fn keep_count(inventory: &Inventory, customer: &str) -> usize {
    match inventory.resolve(customer, "customer_backup_keep") {
        Some(VarValue::Int(n)) if *n >= 0 => *n as usize,
        Some(VarValue::Text(s)) => s.trim().parse().unwrap_or(DEFAULT_KEEP),
        _ => DEFAULT_KEEP,
    }
}

pub fn enabled_customers(inventory: &Inventory) -> Vec<String> {
    inventory
        .customer_ids()
        .into_iter()
        .filter(|c| backup_enabled(inventory, c))
        .collect()
}

// ─── Mutations ───

pub fn file_path(root: &Path, customer: &str, set: &str, file: &str) -> Result<PathBuf> {
    let path = root
        .join(check_component("customer", customer)?)
        .join(check_component("backup name", set)?)
        .join(check_relative(file)?);
    if !path.is_file() {
        return Err(OpsError::not_found("Backup file", file));
    }
    Ok(path)
}

pub fn delete_set(root: &Path, customer: &str, set: &str) -> Result<()> {
    let dir = root
        .join(check_component("customer", customer)?)
        .join(check_component("backup name", set)?);
    if !dir.is_dir() {
        return Err(OpsError::not_found("Backup", format!("{}/{}", customer, set)));
    }
    fs::remove_dir_all(&dir)?;
    info!("Deleted backup {} for {}", set, customer);
    Ok(())
}

/// Keep the newest `customer_backup_keep` sets of every customer directory
pub fn clean(root: &Path, inventory: &Inventory) -> Result<CleanReport> {
    let mut report = CleanReport::default();
    let Ok(entries) = fs::read_dir(root) else {
        return Ok(report);
    };
    for entry in entries.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()) {
        let customer = entry.file_name().to_string_lossy().to_string();
        let keep = keep_count(inventory, &customer);
        for set in list_sets(&entry.path()).into_iter().skip(keep) {
            match fs::remove_dir_all(&set.path) {
                Ok(()) => {
                    report.deleted_count += 1;
                    report.deleted.push(format!("{}/{}", customer, set.name));
                }
                Err(e) => warn!("Failed to remove old backup {}: {}", set.path.display(), e),
            }
        }
    }
    info!("Backup clean removed {} old sets", report.deleted_count);
    Ok(report)
}
