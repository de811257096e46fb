// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Crontab access: parse, edit and write user crontabs via the `crontab` command

use super::schedule::CronSchedule;
use crate::error::{OpsError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use tracing::{info, warn};

static USER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").unwrap_or_else(|e| panic!("user pattern: {}", e))
});

const SHORT_COMMAND_LEN: usize = 50;

/// One crontab entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub schedule: CronSchedule,
    pub schedule_text: String,
    pub command: String,
    pub short_command: String,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    pub raw: String,
    pub user: String,
    pub enabled: bool,
    /// `@reboot`, `@daily` and friends, when the line uses one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<String>,
}

/// Body of `POST /api/cron/jobs/add`
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    #[serde(default)]
    pub schedule: CronSchedule,
    #[serde(default)]
    pub command: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_enabled() -> bool {
    true
}

// ─── Line parsing ───

/// Stable id: first 12 hex chars of SHA-256 over the uncommented line,
/// so toggling a job keeps its id
pub fn job_id(line: &str) -> String {
    let digest = Sha256::digest(uncomment(line).as_bytes());
    hex::encode(digest)[..12].to_string()
}

fn uncomment(line: &str) -> &str {
    line.trim().trim_start_matches('#').trim()
}

/// Parse a crontab line. Blank lines, comments, and env assignments yield
/// `None`. A commented-out line that still reads as a job comes back disabled.
pub fn parse_line(line: &str, user: &str) -> Option<CronJob> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let enabled = !trimmed.starts_with('#');
    let body = uncomment(trimmed);
    let parts: Vec<&str> = body.split_whitespace().collect();
    let (schedule, special, mut rest) = match parts.first() {
        Some(word) if word.starts_with('@') => {
            let (fields, _) = special_schedule(word)?;
            if parts.len() < 2 {
                return None;
            }
            (CronSchedule::decode(fields), Some(word.to_string()), &parts[1..])
        }
        _ => {
            if parts.len() < 6 {
                return None;
            }
            let schedule = CronSchedule::decode(&parts[..5].join(" "));
            // comment text, or a line crontab itself would reject
            schedule.validate().ok()?;
            (schedule, None, &parts[5..])
        }
    };

    let mut env_vars = BTreeMap::new();
    while rest.len() >= 2 {
        match rest[0].split_once('=') {
            Some((key, value)) if is_env_name(key) => {
                env_vars.insert(key.to_string(), value.to_string());
                rest = &rest[1..];
            }
            _ => break,
        }
    }
    let command = rest.join(" ");

    let schedule_text = match special.as_deref().and_then(special_schedule) {
        Some((_, text)) => text.to_string(),
        None => schedule.describe(),
    };
    Some(CronJob {
        id: job_id(trimmed),
        schedule_text,
        short_command: shorten(&command),
        schedule,
        command,
        env_vars,
        raw: trimmed.to_string(),
        user: user.to_string(),
        enabled,
        special,
    })
}

/// Five-field equivalent and description of a cron `@` macro.
/// `@reboot` has no field form and keeps the all-stars schedule.
fn special_schedule(word: &str) -> Option<(&'static str, &'static str)> {
    let found = match word {
        "@reboot" => ("* * * * *", "at reboot"),
        "@hourly" => ("0 * * * *", "hourly"),
        "@daily" | "@midnight" => ("0 0 * * *", "daily"),
        "@weekly" => ("0 0 * * 0", "weekly"),
        "@monthly" => ("0 0 1 * *", "monthly"),
        "@yearly" | "@annually" => ("0 0 1 1 *", "yearly"),
        _ => return None,
    };
    Some(found)
}

fn is_env_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

fn shorten(command: &str) -> String {
    if command.chars().count() > SHORT_COMMAND_LEN {
        let cut: String = command.chars().take(SHORT_COMMAND_LEN).collect();
        format!("{}...", cut)
    } else {
        command.to_string()
    }
}

pub fn list_jobs(crontab: &str, user: &str) -> Vec<CronJob> {
    crontab.lines().filter_map(|l| parse_line(l, user)).collect()
}

pub fn find_job(crontab: &str, user: &str, id: &str) -> Option<CronJob> {
    list_jobs(crontab, user).into_iter().find(|j| j.id == id)
}

// ─── Editing ───

/// Build a crontab line. Env vars go in front of the command so the line
/// stays valid for every cron implementation.
pub fn build_line(job: &NewJob) -> Result<String> {
    let command = job.command.trim();
    if command.is_empty() {
        return Err(OpsError::validation("Command is required"));
    }
    if command.contains('\n') {
        return Err(OpsError::validation("Command must be a single line"));
    }
    job.schedule.validate().map_err(OpsError::Validation)?;
    let mut line = job.schedule.encode();
    for (key, value) in &job.env_vars {
        if !is_env_name(key) || value.contains(char::is_whitespace) {
            return Err(OpsError::validation(format!("Invalid environment variable {}", key)));
        }
        line.push_str(&format!(" {}={}", key, value));
    }
    line.push(' ');
    line.push_str(command);
    if !job.enabled {
        line = format!("# {}", line);
    }
    Ok(line)
}

pub fn append_line(crontab: &str, line: &str) -> String {
    let mut out = crontab.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
    out
}

/// Comment or uncomment every line carrying `id`. `None` when no line matches.
pub fn toggle_job(crontab: &str, user: &str, id: &str, enabled: bool) -> Option<String> {
    let mut found = false;
    let lines: Vec<String> = crontab
        .lines()
        .map(|line| match parse_line(line, user) {
            Some(job) if job.id == id => {
                found = true;
                let body = uncomment(line);
                if enabled { body.to_string() } else { format!("# {}", body) }
            }
            _ => line.to_string(),
        })
        .collect();
    found.then(|| with_trailing_newline(lines.join("\n")))
}

/// Remove every line carrying `id`. `None` when no line matches.
pub fn remove_job(crontab: &str, user: &str, id: &str) -> Option<String> {
    let before = crontab.lines().count();
    let lines: Vec<&str> = crontab
        .lines()
        .filter(|line| parse_line(line, user).is_none_or(|job| job.id != id))
        .collect();
    (lines.len() != before).then(|| with_trailing_newline(lines.join("\n")))
}

/// Swap the line carrying `id` for `line`, keeping its position
pub fn replace_job(crontab: &str, user: &str, id: &str, line: &str) -> Option<String> {
    let mut found = false;
    let lines: Vec<&str> = crontab
        .lines()
        .filter_map(|l| match parse_line(l, user) {
            Some(job) if job.id == id => {
                let first = !found;
                found = true;
                first.then_some(line)
            }
            _ => Some(l),
        })
        .collect();
    found.then(|| with_trailing_newline(lines.join("\n")))
}

fn with_trailing_newline(mut s: String) -> String {
    if !s.is_empty() && !s.ends_with('\n') {
        s.push('\n');
    }
    s
}

/// Shown when the real crontab cannot be read; always labelled as sample data
pub fn sample_jobs() -> Vec<CronJob> {
    [
        "*/5 * * * * /usr/bin/php /var/www/backup.php",
        "0 2 * * * /home/calibri/backup.sh >> /home/calibri/log/cron.log 2>&1",
    ]
    .iter()
    .filter_map(|l| parse_line(l, "root"))
    .collect()
}

// ─── crontab command ───

/// Runs the `crontab` binary for a user
#[derive(Debug, Clone)]
pub struct Crontab {
    bin: String,
    /// Account this process runs as; its own table needs no `-u`
    current_user: Option<String>,
}

impl Default for Crontab {
    fn default() -> Self {
        Self::new("crontab")
    }
}

impl Crontab {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into(), current_user: current_user() }
    }

    fn user_args(&self, user: &str) -> Result<Vec<String>> {
        if !USER_RE.is_match(user) {
            return Err(OpsError::validation(format!("Invalid user name '{}'", user)));
        }
        if self.current_user.as_deref() == Some(user) {
            Ok(Vec::new())
        } else {
            Ok(vec!["-u".to_string(), user.to_string()])
        }
    }

    /// Current crontab text. "no crontab for user" reads as empty.
    pub fn read(&self, user: &str) -> Result<String> {
        let mut args = self.user_args(user)?;
        args.push("-l".to_string());
        let output = Command::new(&self.bin)
            .args(&args)
            .output()
            .map_err(|e| OpsError::Command(format!("Failed to run {}: {}", self.bin, e)))?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab") {
            Ok(String::new())
        } else {
            Err(OpsError::Command(stderr.trim().to_string()))
        }
    }

    /// Replace the crontab with `content` (fed through stdin)
    pub fn write(&self, user: &str, content: &str) -> Result<()> {
        let mut args = self.user_args(user)?;
        args.push("-".to_string());
        let mut child = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OpsError::Command(format!("Failed to run {}: {}", self.bin, e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if output.status.success() {
            info!("Crontab updated for user {}", user);
            Ok(())
        } else {
            let msg = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("crontab write for {} failed: {}", user, msg);
            Err(OpsError::Command(msg))
        }
    }
}

/// Name of the effective user, from the owner of `/proc/self` and `/etc/passwd`
fn current_user() -> Option<String> {
    let uid = std::fs::metadata("/proc/self").ok()?.uid();
    if uid == 0 {
        return Some("root".to_string());
    }
    let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
    passwd.lines().find_map(|line| {
        let mut fields = line.split(':');
        let name = fields.next()?;
        let entry_uid: u32 = fields.nth(1)?.parse().ok()?;
        (entry_uid == uid).then(|| name.to_string())
    })
}

// ─── cron service ───

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub active: bool,
    pub service: Option<String>,
    pub processes: u32,
}

/// Check cron or crond through systemctl, then count processes with pgrep
pub fn service_status() -> ServiceStatus {
    let service = ["cron", "crond"].into_iter().find(|svc| {
        Command::new("systemctl")
            .args(["is-active", "--quiet", *svc])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    });

    let processes = ["cron", "crond"]
        .iter()
        .filter_map(|name| {
            Command::new("pgrep")
                .args(["-c", "-x", *name])
                .output()
                .ok()
                .and_then(|o| String::from_utf8_lossy(&o.stdout).trim().parse::<u32>().ok())
        })
        .sum::<u32>();

    ServiceStatus {
        active: service.is_some() || processes > 0,
        service: service.map(str::to_string),
        processes,
    }
}

/// Restart the cron service, trying systemctl then the SysV script
pub fn restart_service() -> Result<String> {
    let attempts: [(&str, &[&str]); 3] = [
        ("systemctl", &["restart", "cron"]),
        ("systemctl", &["restart", "crond"]),
        ("service", &["cron", "restart"]),
    ];
    let mut last_error = String::from("no service manager found");
    for (cmd, args) in attempts {
        match Command::new(cmd).args(args).output() {
            Ok(o) if o.status.success() => {
                info!("Cron service restarted via {} {}", cmd, args.join(" "));
                return Ok(format!("{} {}", cmd, args.join(" ")));
            }
            Ok(o) => last_error = String::from_utf8_lossy(&o.stderr).trim().to_string(),
            Err(e) => last_error = e.to_string(),
        }
    }
    warn!("Cron restart failed: {}", last_error);
    Err(OpsError::Command(format!("Failed to restart cron: {}", last_error)))
}

// ─── cron service log ───

/// System logs that carry cron entries, checked in order
pub const CRON_LOG_FILES: [&str; 3] = ["/var/log/syslog", "/var/log/cron", "/var/log/messages"];

/// Entries returned by the log endpoint
pub const CRON_LOG_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CronLogEntry {
    pub timestamp: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub source: String,
}

/// error, warning, success or info
pub fn classify_log_line(line: &str) -> &'static str {
    let lower = line.to_lowercase();
    if lower.contains("error") || lower.contains("failed") {
        "error"
    } else if lower.contains("warning") {
        "warning"
    } else if ["started", "success", "completed"].iter().any(|w| lower.contains(w)) {
        "success"
    } else {
        "info"
    }
}

/// Split a syslog line into its timestamp ("Oct 18 02:00:01" or RFC 3339) and the rest
fn split_timestamp(line: &str) -> (String, String) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let iso = tokens.first().is_some_and(|t| t.starts_with(|c: char| c.is_ascii_digit()) && t.contains('T'));
    let take = if iso { 1 } else { 3 };
    if tokens.len() <= take {
        return (String::new(), line.trim().to_string());
    }
    (tokens[..take].join(" "), tokens[take..].join(" "))
}

/// The last `limit` cron lines of `text`
pub fn log_entries(text: &str, source: &str, limit: usize) -> Vec<CronLogEntry> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with("-- "))
        .filter(|l| l.to_lowercase().contains("cron"))
        .collect();
    lines[lines.len().saturating_sub(limit)..]
        .iter()
        .map(|line| {
            let (timestamp, message) = split_timestamp(line);
            CronLogEntry { timestamp, message, kind: classify_log_line(line), source: source.to_string() }
        })
        .collect()
}

/// Recent cron activity from the first log file that has any, then the journal
pub fn read_service_log(files: &[&str], limit: usize) -> Result<Vec<CronLogEntry>> {
    for file in files {
        if !std::path::Path::new(file).is_file() {
            continue;
        }
        let output = Command::new("tail").args(["-n", "500", *file]).output()?;
        let entries = log_entries(&String::from_utf8_lossy(&output.stdout), file, limit);
        if !entries.is_empty() {
            return Ok(entries);
        }
    }
    for unit in ["cron", "crond"] {
        let limit_arg = limit.to_string();
        let Ok(output) = Command::new("journalctl").args(["-u", unit, "-n", limit_arg.as_str(), "--no-pager"]).output() else {
            continue;
        };
        if output.status.success() {
            let entries = log_entries(&String::from_utf8_lossy(&output.stdout), "journalctl", limit);
            if !entries.is_empty() {
                return Ok(entries);
            }
        }
    }
    Err(OpsError::Command("No cron log entries found in syslog or the journal".to_string()))
}

/// Shown, labelled, when no cron log can be read
pub fn sample_cron_logs() -> Vec<CronLogEntry> {
    log_entries(
        "Oct 18 02:00:01 host CRON[2101]: (root) CMD (/home/calibri/backup.sh)\n\
         Oct 18 02:05:00 host CRON[2150]: (root) CMD (/usr/bin/php /var/www/backup.php)\n\
         Oct 18 02:10:00 host cron[812]: (CRON) INFO (Running @reboot jobs)\n",
        "sample",
        CRON_LOG_LIMIT,
    )
}
