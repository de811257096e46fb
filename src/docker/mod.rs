// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Docker management: images, containers, networks and volumes via the docker CLI

pub mod api;

use crate::error::{OpsError, Result};
use crate::sizes::{format_size, parse_size_pair, parse_size_str};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use tracing::{info, warn};
use walkdir::WalkDir;

const JSON_FORMAT: &str = "{{json .}}";

// ─── Types ───

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    #[serde(rename(deserialize = "ID"), default)]
    pub id: String,
    #[serde(rename(deserialize = "Repository"), default)]
    pub repository: String,
    #[serde(rename(deserialize = "Tag"), default)]
    pub tag: String,
    #[serde(rename(deserialize = "Size"), default)]
    pub size: String,
    #[serde(skip_deserializing)]
    pub size_bytes: u64,
    #[serde(rename(deserialize = "CreatedAt"), default)]
    pub created: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    #[serde(rename(deserialize = "ID"), default)]
    pub id: String,
    #[serde(rename(deserialize = "Names"), default)]
    pub name: String,
    #[serde(rename(deserialize = "Image"), default)]
    pub image: String,
    #[serde(rename(deserialize = "Status"), default)]
    pub status: String,
    #[serde(rename(deserialize = "State"), default)]
    pub state: String,
    #[serde(rename(deserialize = "CreatedAt"), default)]
    pub created: String,
    #[serde(rename(deserialize = "Ports"), default)]
    pub ports: String,
    #[serde(rename(deserialize = "Networks"), default)]
    pub networks: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(rename(deserialize = "ID"), default)]
    pub id: String,
    #[serde(rename(deserialize = "Name"), default)]
    pub name: String,
    #[serde(rename(deserialize = "Driver"), default)]
    pub driver: String,
    #[serde(rename(deserialize = "Scope"), default)]
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeInfo {
    #[serde(rename(deserialize = "Name"), default)]
    pub name: String,
    #[serde(rename(deserialize = "Driver"), default)]
    pub driver: String,
    #[serde(rename(deserialize = "Mountpoint"), default)]
    pub mountpoint: String,
    #[serde(rename(deserialize = "Scope"), default)]
    pub scope: String,
    /// Comma separated `key=value` pairs
    #[serde(rename(deserialize = "Labels"), default)]
    pub labels: String,
}

/// One line of `docker stats --format '{{json .}}'`
#[derive(Debug, Deserialize)]
struct RawStats {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "CPUPerc", default)]
    cpu: String,
    #[serde(rename = "MemUsage", default)]
    mem_usage: String,
    #[serde(rename = "MemPerc", default)]
    mem_perc: String,
    #[serde(rename = "NetIO", default)]
    net_io: String,
    #[serde(rename = "BlockIO", default)]
    block_io: String,
    #[serde(rename = "PIDs", default)]
    pids: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStats {
    pub id: String,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub net_input: u64,
    pub net_output: u64,
    pub block_read: u64,
    pub block_write: u64,
    pub pids: u32,
}

impl From<RawStats> for ContainerStats {
    fn from(raw: RawStats) -> Self {
        let (memory_usage, memory_limit) = parse_size_pair(&raw.mem_usage);
        let (net_input, net_output) = parse_size_pair(&raw.net_io);
        let (block_read, block_write) = parse_size_pair(&raw.block_io);
        ContainerStats {
            id: raw.id,
            name: raw.name,
            cpu_percent: raw.cpu.trim_end_matches('%').parse().unwrap_or(0.0),
            memory_usage,
            memory_limit,
            memory_percent: raw.mem_perc.trim_end_matches('%').parse().unwrap_or(0.0),
            net_input,
            net_output,
            block_read,
            block_write,
            pids: raw.pids.trim().parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub output: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub deleted_count: usize,
    pub space_reclaimed: String,
}

/// Containers by state, plus the image count
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerCounts {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    pub paused: usize,
    pub restarting: usize,
    pub images: usize,
}

impl ContainerCounts {
    fn tally(containers: &[ContainerInfo], images: usize) -> Self {
        let mut counts = ContainerCounts { total: containers.len(), images, ..Default::default() };
        for c in containers {
            match c.state.as_str() {
                "running" => counts.running += 1,
                "paused" => counts.paused += 1,
                "restarting" => counts.restarting += 1,
                _ => counts.stopped += 1,
            }
        }
        counts
    }
}

/// A container attached to a network
#[derive(Debug, Clone, Serialize)]
pub struct NetworkMember {
    pub id: String,
    pub full_id: String,
    pub name: String,
    pub ipv4: String,
    pub ipv6: String,
    pub mac_address: String,
}

/// One row of `ls -la`
#[derive(Debug, Clone, Serialize)]
pub struct VolumeEntry {
    pub permissions: String,
    pub links: u32,
    pub owner: String,
    pub group: String,
    pub size: u64,
    pub month: String,
    pub day: String,
    pub time: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeListing {
    pub volume: String,
    pub mountpoint: String,
    pub files_count: usize,
    pub files: Vec<VolumeEntry>,
    pub raw_output: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VolumeStats {
    pub total_volumes: usize,
    pub local_driver: usize,
    pub other_drivers: usize,
    pub labeled_volumes: usize,
    pub estimated_size: String,
}

impl VolumeStats {
    /// Sizes come from walking each mountpoint; unreadable ones count as empty
    fn tally(volumes: &[VolumeInfo]) -> Self {
        let local_driver = volumes.iter().filter(|v| v.driver == "local").count();
        let bytes: u64 = volumes.iter().map(|v| dir_size(&v.mountpoint)).sum();
        VolumeStats {
            total_volumes: volumes.len(),
            local_driver,
            other_drivers: volumes.len() - local_driver,
            labeled_volumes: volumes.iter().filter(|v| !v.labels.trim().is_empty()).count(),
            estimated_size: format_size(bytes),
        }
    }
}

/// Body of POST /api/docker/containers/create
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewContainer {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    /// Container port ("80/tcp") to host port
    #[serde(default)]
    pub ports: BTreeMap<String, Value>,
    /// Host path or volume name to a bind path, or to `{bind, mode}`
    #[serde(default)]
    pub volumes: BTreeMap<String, Value>,
    #[serde(default)]
    pub environment: BTreeMap<String, Value>,
    #[serde(default)]
    pub network: Option<String>,
    /// A policy name, or `{"Name": ...}`
    #[serde(default)]
    pub restart_policy: Option<Value>,
}

impl NewContainer {
    /// Arguments for `docker create`; every problem is reported at once
    pub fn args(&self) -> Result<Vec<String>> {
        let mut errors = Vec::new();
        let mut args = vec!["create".to_string()];

        let image = self.image.trim();
        if image.is_empty() {
            errors.push("Image name is required".to_string());
        } else if !is_plain_ref(image) {
            errors.push(format!("Invalid image '{}'", image));
        }

        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if is_plain_ref(name) {
                args.extend(["--name".to_string(), name.to_string()]);
            } else {
                errors.push(format!("Invalid container name '{}'", name));
            }
        }

        for (container_port, host) in &self.ports {
            let host = scalar_text(host);
            if !is_plain_ref(container_port) || host.contains(char::is_whitespace) || host.starts_with('-') {
                errors.push(format!("Invalid port mapping '{}'", container_port));
                continue;
            }
            let container_port = container_port.trim_end_matches("/tcp");
            // No host port publishes on a random one
            let mapping = if host.is_empty() { container_port.to_string() } else { format!("{}:{}", host, container_port) };
            args.extend(["-p".to_string(), mapping]);
        }

        for (source, target) in &self.volumes {
            let (bind, mode) = match target {
                Value::Object(o) => (
                    o.get("bind").map(scalar_text).unwrap_or_default(),
                    o.get("mode").map(scalar_text).unwrap_or_else(|| "rw".to_string()),
                ),
                other => (scalar_text(other), "rw".to_string()),
            };
            if !is_plain_ref(source) || !bind.starts_with('/') || bind.contains(char::is_whitespace) {
                errors.push(format!("Invalid volume mapping '{}'", source));
                continue;
            }
            args.extend(["-v".to_string(), format!("{}:{}:{}", source, bind, mode)]);
        }

        for (key, value) in &self.environment {
            if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
                errors.push(format!("Invalid environment variable '{}'", key));
                continue;
            }
            args.extend(["-e".to_string(), format!("{}={}", key, scalar_text(value))]);
        }

        if let Some(network) = self.network.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if is_plain_ref(network) {
                args.extend(["--network".to_string(), network.to_string()]);
            } else {
                errors.push(format!("Invalid network '{}'", network));
            }
        }

        let policy = match &self.restart_policy {
            Some(Value::Object(o)) => o.get("Name").map(scalar_text).unwrap_or_default(),
            Some(other) => scalar_text(other),
            None => String::new(),
        };
        let policy = if policy.is_empty() { "unless-stopped".to_string() } else { policy };
        if ["no", "always", "unless-stopped", "on-failure"].contains(&policy.split(':').next().unwrap_or("")) {
            args.extend(["--restart".to_string(), policy]);
        } else {
            errors.push(format!("Unknown restart policy '{}'", policy));
        }

        if !errors.is_empty() {
            return Err(OpsError::Validation(errors));
        }

        args.push(image.to_string());
        if let Some(command) = self.command.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            args.extend(["sh".to_string(), "-c".to_string(), command.to_string()]);
        }
        Ok(args)
    }
}

/// Container lifecycle actions exposed over the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
}

impl ContainerAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "restart" => Some(Self::Restart),
            "pause" => Some(Self::Pause),
            "unpause" => Some(Self::Unpause),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
        }
    }
}

// ─── CLI wrapper ───

/// Thin wrapper over the docker binary
#[derive(Debug, Clone)]
pub struct Docker {
    bin: String,
}

impl Default for Docker {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl Docker {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn output(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new(&self.bin)
            .args(args)
            .output()
            .map_err(|e| OpsError::Docker(format!("Failed to run {}: {}", self.bin, e)))
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(OpsError::Docker(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }

    /// Like `run`, but "No such ..." from the daemon becomes `NotFound`
    fn run_on(&self, kind: &'static str, id: &str, args: &[&str]) -> Result<String> {
        self.run(args).map_err(|e| match e {
            OpsError::Docker(msg) if is_missing(&msg) => OpsError::not_found(kind, id),
            other => other,
        })
    }

    fn list<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        parse_json_lines(&self.run(args)?)
    }

    fn inspect(&self, kind: &'static str, sub: &str, id: &str) -> Result<serde_json::Value> {
        let out = self.run_on(kind, id, &[sub, "inspect", id])?;
        let mut items: Vec<serde_json::Value> = serde_json::from_str(&out)?;
        if items.is_empty() {
            return Err(OpsError::not_found(kind, id));
        }
        Ok(items.swap_remove(0))
    }

    fn prune(&self, sub: &str) -> Result<PruneReport> {
        let out = self.run(&[sub, "prune", "-f"])?;
        Ok(parse_prune(&out))
    }

    // ── Engine ──

    /// Server version when the daemon answers
    pub fn ping(&self) -> Result<String> {
        self.run(&["version", "--format", "{{.Server.Version}}"])
    }

    pub fn engine_info(&self) -> Result<serde_json::Value> {
        let out = self.run(&["info", "--format", JSON_FORMAT])?;
        Ok(serde_json::from_str(&out)?)
    }

    /// Space held by image layers, from `docker system df`
    pub fn disk_usage(&self) -> Result<String> {
        let rows: Vec<DiskUsageRow> = self.list(&["system", "df", "--format", JSON_FORMAT])?;
        let bytes = rows.iter().filter(|r| r.kind == "Images").map(|r| parse_size_str(&r.size)).sum();
        Ok(format_size(bytes))
    }

    /// Engine facts and object counts in one document
    pub fn system_summary(&self) -> Result<Value> {
        let info = self.engine_info()?;
        let counts = self.container_counts()?;
        let disk_usage = self.disk_usage().unwrap_or_else(|e| {
            warn!("docker system df failed: {}", e);
            "unknown".to_string()
        });
        Ok(summarize_system(&info, &counts, disk_usage))
    }

    // ── Images ──

    pub fn images(&self) -> Result<Vec<ImageInfo>> {
        let mut images: Vec<ImageInfo> = self.list(&["images", "--format", JSON_FORMAT])?;
        for image in &mut images {
            image.size_bytes = parse_size_str(&image.size);
        }
        images.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(images)
    }

    pub fn remove_image(&self, id: &str, force: bool) -> Result<String> {
        let mut args = vec!["rmi"];
        if force {
            args.push("-f");
        }
        args.push(id);
        let out = self.run_on("Image", id, &args)?;
        info!("Removed docker image {}", id);
        Ok(out)
    }

    pub fn pull_image(&self, image: &str) -> Result<String> {
        info!("Pulling Docker image: {}", image);
        let out = self.run_on("Image", image, &["pull", image])?;
        info!("Docker image {} pulled", image);
        Ok(out.lines().last().unwrap_or("").to_string())
    }

    pub fn prune_images(&self) -> Result<PruneReport> {
        self.prune("image")
    }

    /// `docker build -t <tag> <dir>`; returns the last line of build output
    pub fn build_image(&self, dir: &Path, tag: &str) -> Result<String> {
        let dir = dir.to_string_lossy();
        info!("Building image {} from {}", tag, dir);
        let out = self.run(&["build", "-t", tag, &*dir])?;
        info!("Image {} built", tag);
        Ok(out.lines().last().unwrap_or("").to_string())
    }

    // ── Containers ──

    pub fn containers(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let mut args = vec!["ps", "--format", JSON_FORMAT, "--no-trunc"];
        if all {
            args.push("-a");
        }
        self.list(&args)
    }

    pub fn container_counts(&self) -> Result<ContainerCounts> {
        let containers = self.containers(true)?;
        Ok(ContainerCounts::tally(&containers, self.images()?.len()))
    }

    /// Returns the new container's id and name
    pub fn create_container(&self, spec: &NewContainer) -> Result<(String, String)> {
        let args = spec.args()?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let image = spec.image.trim();
        let id = self.run_on("Image", image, &args)?;
        let name = self.run(&["inspect", "--format", "{{.Name}}", id.as_str()])?.trim_start_matches('/').to_string();
        info!("Created container {} from {}", name, image);
        Ok((id, name))
    }

    pub fn inspect_container(&self, id: &str) -> Result<serde_json::Value> {
        self.inspect("Container", "container", id)
    }

    pub fn container_action(&self, id: &str, action: ContainerAction) -> Result<String> {
        self.run_on("Container", id, &[action.as_str(), id])?;
        info!("Container {} {}", id, action.as_str());
        Ok(format!("Container {} {} successfully", id, action.as_str()))
    }

    pub fn remove_container(&self, id: &str, force: bool) -> Result<String> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(id);
        self.run_on("Container", id, &args)?;
        info!("Removed container {}", id);
        Ok(format!("Container {} removed", id))
    }

    /// Last `tail` lines; docker writes container output to both streams
    pub fn logs(&self, id: &str, tail: u32) -> Result<Vec<String>> {
        let tail = tail.to_string();
        let output = self.output(&["logs", "--tail", &tail, "--timestamps", id])?;
        if !output.status.success() {
            let msg = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(if is_missing(&msg) { OpsError::not_found("Container", id) } else { OpsError::Docker(msg) });
        }
        let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout).lines().map(str::to_string).collect();
        lines.extend(String::from_utf8_lossy(&output.stderr).lines().map(str::to_string));
        Ok(lines)
    }

    /// One-shot stats for a single container
    pub fn stats(&self, id: &str) -> Result<ContainerStats> {
        let out = self.run_on("Container", id, &["stats", "--no-stream", "--format", JSON_FORMAT, id])?;
        let raw: Vec<RawStats> = parse_json_lines(&out)?;
        raw.into_iter()
            .next()
            .map(ContainerStats::from)
            .ok_or_else(|| OpsError::not_found("Container", id))
    }

    pub fn exec(&self, id: &str, command: &str) -> Result<ExecOutput> {
        let output = self.output(&["exec", id, "sh", "-c", command])?;
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() && is_missing(&stderr) {
            return Err(OpsError::not_found("Container", id));
        }
        info!("Exec in container {}: {}", id, command);
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&stderr);
        Ok(ExecOutput { exit_code: output.status.code(), output: text })
    }

    pub fn prune_containers(&self) -> Result<PruneReport> {
        self.prune("container")
    }

    // ── Networks ──

    pub fn networks(&self) -> Result<Vec<NetworkInfo>> {
        self.list(&["network", "ls", "--format", JSON_FORMAT, "--no-trunc"])
    }

    pub fn inspect_network(&self, id: &str) -> Result<serde_json::Value> {
        self.inspect("Network", "network", id)
    }

    /// Name of the network and the containers attached to it
    pub fn network_containers(&self, id: &str) -> Result<(String, Vec<NetworkMember>)> {
        let detail = self.inspect_network(id)?;
        let name = detail.get("Name").and_then(Value::as_str).unwrap_or(id).to_string();
        Ok((name, network_members(&detail)))
    }

    pub fn create_network(&self, name: &str, driver: &str) -> Result<String> {
        let id = self.run(&["network", "create", "--driver", driver, name])?;
        info!("Created network {} ({})", name, driver);
        Ok(id)
    }

    pub fn remove_network(&self, id: &str) -> Result<String> {
        self.run_on("Network", id, &["network", "rm", id])?;
        info!("Removed network {}", id);
        Ok(format!("Network {} removed", id))
    }

    pub fn prune_networks(&self) -> Result<PruneReport> {
        self.prune("network")
    }

    // ── Volumes ──

    pub fn volumes(&self) -> Result<Vec<VolumeInfo>> {
        self.list(&["volume", "ls", "--format", JSON_FORMAT])
    }

    pub fn inspect_volume(&self, name: &str) -> Result<serde_json::Value> {
        self.inspect("Volume", "volume", name)
    }

    pub fn volume_stats(&self) -> Result<VolumeStats> {
        Ok(VolumeStats::tally(&self.volumes()?))
    }

    /// `ls -la` of a volume's mountpoint on this host
    pub fn volume_files(&self, name: &str) -> Result<VolumeListing> {
        let detail = self.inspect_volume(name)?;
        let mountpoint = detail.get("Mountpoint").and_then(Value::as_str).unwrap_or("").to_string();
        if mountpoint.is_empty() {
            return Err(OpsError::Docker(format!("Volume {} has no mountpoint", name)));
        }
        let output = Command::new("ls").args(["-la", mountpoint.as_str()]).output()?;
        if !output.status.success() {
            return Err(OpsError::Command(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        let raw_output = String::from_utf8_lossy(&output.stdout).to_string();
        let files = parse_ls(&raw_output);
        Ok(VolumeListing {
            volume: name.to_string(),
            mountpoint,
            files_count: files.len(),
            files,
            raw_output,
        })
    }

    pub fn create_volume(&self, name: &str, driver: &str) -> Result<String> {
        let out = self.run(&["volume", "create", "--driver", driver, name])?;
        info!("Created volume {} ({})", name, driver);
        Ok(out)
    }

    pub fn remove_volume(&self, name: &str, force: bool) -> Result<String> {
        let mut args = vec!["volume", "rm"];
        if force {
            args.push("-f");
        }
        args.push(name);
        self.run_on("Volume", name, &args)?;
        info!("Removed volume {}", name);
        Ok(format!("Volume {} removed", name))
    }

    pub fn prune_volumes(&self) -> Result<PruneReport> {
        self.prune("volume")
    }
}

// ─── Parsing helpers ───

fn is_missing(stderr: &str) -> bool {
    stderr.contains("No such") || stderr.contains("not found")
}

/// Safe to pass as a single docker CLI argument
fn is_plain_ref(value: &str) -> bool {
    !value.is_empty() && !value.starts_with('-') && !value.contains(char::is_whitespace)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn dir_size(dir: &str) -> u64 {
    if dir.is_empty() {
        return 0;
    }
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// One line of `docker system df --format '{{json .}}'`
#[derive(Debug, Deserialize)]
struct DiskUsageRow {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Size", default)]
    size: String,
}

fn summarize_system(info: &Value, counts: &ContainerCounts, disk_usage: String) -> Value {
    let text = |key: &str| info.get(key).and_then(Value::as_str).unwrap_or("").to_string();
    json!({
        "images_count": counts.images,
        "containers_count": counts.total,
        "running_containers": counts.running,
        "stopped_containers": counts.stopped,
        "paused_containers": counts.paused,
        "disk_usage": disk_usage,
        "system_info": {
            "docker_version": text("ServerVersion"),
            "os": text("OperatingSystem"),
            "architecture": text("Architecture"),
            "kernel_version": text("KernelVersion"),
            "cpus": info.get("NCPU").and_then(Value::as_u64).unwrap_or(0),
            "memory": format_size(info.get("MemTotal").and_then(Value::as_u64).unwrap_or(0)),
        },
    })
}

/// `Containers` of `docker network inspect`, keyed by full container id
fn network_members(detail: &Value) -> Vec<NetworkMember> {
    let Some(containers) = detail.get("Containers").and_then(Value::as_object) else {
        return Vec::new();
    };
    let field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).unwrap_or("").to_string();
    let mut members: Vec<NetworkMember> = containers
        .iter()
        .map(|(full_id, c)| NetworkMember {
            id: full_id.chars().take(12).collect(),
            full_id: full_id.clone(),
            name: field(c, "Name"),
            ipv4: field(c, "IPv4Address"),
            ipv6: field(c, "IPv6Address"),
            mac_address: field(c, "MacAddress"),
        })
        .collect();
    members.sort_by(|a, b| a.name.cmp(&b.name));
    members
}

/// Rows of `ls -la`, without the total line and the `.`/`..` entries
fn parse_ls(out: &str) -> Vec<VolumeEntry> {
    out.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 9 {
                return None;
            }
            let name = fields[8..].join(" ");
            if name == "." || name == ".." {
                return None;
            }
            Some(VolumeEntry {
                permissions: fields[0].to_string(),
                links: fields[1].parse().unwrap_or(0),
                owner: fields[2].to_string(),
                group: fields[3].to_string(),
                size: fields[4].parse().unwrap_or(0),
                month: fields[5].to_string(),
                day: fields[6].to_string(),
                time: fields[7].to_string(),
                name,
            })
        })
        .collect()
}

fn parse_json_lines<T: DeserializeOwned>(out: &str) -> Result<Vec<T>> {
    out.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(OpsError::from))
        .collect()
}

/// `docker <x> prune -f` prints "Deleted ...:" followed by ids and a
/// "Total reclaimed space: 1.2GB" footer
fn parse_prune(out: &str) -> PruneReport {
    let mut report = PruneReport::default();
    for line in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(space) = line.strip_prefix("Total reclaimed space:") {
            report.space_reclaimed = space.trim().to_string();
        } else if line.ends_with(':') {
            continue;
        } else {
            let id = line.strip_prefix("deleted: ").or_else(|| line.strip_prefix("untagged: ")).unwrap_or(line);
            report.deleted.push(id.to_string());
        }
    }
    report.deleted_count = report.deleted.len();
    if report.space_reclaimed.is_empty() {
        report.space_reclaimed = "0B".to_string();
    }
    report
}

// ─── Sample data ───
// Served, labelled, when the daemon is unreachable and fallback is enabled

pub fn sample_images() -> Vec<ImageInfo> {
    vec![ImageInfo {
        id: "sha256:0000sample".into(),
        repository: "nginx".into(),
        tag: "latest".into(),
        size: "187MB".into(),
        size_bytes: 187_000_000,
        created: "2024-01-01 00:00:00 +0000 UTC".into(),
    }]
}

pub fn sample_containers() -> Vec<ContainerInfo> {
    vec![ContainerInfo {
        id: "0000sample".into(),
        name: "sample-web".into(),
        image: "nginx:latest".into(),
        status: "Up 2 hours".into(),
        state: "running".into(),
        created: "2024-01-01 00:00:00 +0000 UTC".into(),
        ports: "0.0.0.0:80->80/tcp".into(),
        networks: "bridge".into(),
    }]
}

pub fn sample_networks() -> Vec<NetworkInfo> {
    ["bridge", "host", "none"]
        .iter()
        .map(|name| NetworkInfo {
            id: format!("sample-{}", name),
            name: name.to_string(),
            driver: if *name == "none" { "null".into() } else { name.to_string() },
            scope: "local".into(),
        })
        .collect()
}

pub fn sample_volumes() -> Vec<VolumeInfo> {
    vec![VolumeInfo {
        name: "sample_data".into(),
        driver: "local".into(),
        mountpoint: "/var/lib/docker/volumes/sample_data/_data".into(),
        scope: "local".into(),
        labels: String::new(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ps_json_lines() {
        let out = r#"{"Command":"\"nginx\"","CreatedAt":"2024-05-01 10:00:00 +0000 UTC","ID":"abc123","Image":"nginx:latest","Names":"web","Networks":"bridge","Ports":"0.0.0.0:80->80/tcp","State":"running","Status":"Up 3 hours"}
{"ID":"def456","Names":"db","Image":"mysql:8","State":"exited","Status":"Exited (0)"}
"#;
        let containers: Vec<ContainerInfo> = parse_json_lines(out).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "web");
        assert_eq!(containers[1].state, "exited");
        assert_eq!(containers[1].ports, "");

        let json = serde_json::to_value(&containers[0]).unwrap();
        assert_eq!(json["id"], "abc123");
    }

    #[test]
    fn stats_are_converted() {
        let line = r#"{"ID":"abc","Name":"web","CPUPerc":"1.50%","MemUsage":"100MiB / 1GiB","MemPerc":"9.77%","NetIO":"1kB / 2kB","BlockIO":"0B / 0B","PIDs":"5"}"#;
        let raw: Vec<RawStats> = parse_json_lines(line).unwrap();
        let stats = ContainerStats::from(raw.into_iter().next().unwrap());
        assert_eq!(stats.cpu_percent, 1.5);
        assert_eq!(stats.memory_usage, 100 * 1024 * 1024);
        assert_eq!(stats.net_output, 2000);
        assert_eq!(stats.pids, 5);
    }

    #[test]
    fn prune_output_is_summarized() {
        let out = "Deleted Containers:\nabc\ndef\n\nTotal reclaimed space: 12.5MB\n";
        let report = parse_prune(out);
        assert_eq!(report.deleted_count, 2);
        assert_eq!(report.space_reclaimed, "12.5MB");
        assert_eq!(parse_prune("").space_reclaimed, "0B");
    }

    #[test]
    fn missing_binary_is_a_docker_error() {
        let docker = Docker::new("/nonexistent/docker-bin");
        assert!(matches!(docker.images(), Err(OpsError::Docker(_))));
    }

    fn container(state: &str) -> ContainerInfo {
        let mut c = sample_containers().remove(0);
        c.state = state.to_string();
        c
    }

    #[test]
    fn containers_are_counted_by_state() {
        let list: Vec<ContainerInfo> =
            ["running", "running", "exited", "created", "paused", "restarting"].iter().map(|s| container(s)).collect();
        let counts = ContainerCounts::tally(&list, 3);
        assert_eq!(counts.total, 6);
        assert_eq!(counts.running, 2);
        assert_eq!(counts.stopped, 2);
        assert_eq!(counts.paused, 1);
        assert_eq!(counts.restarting, 1);
        assert_eq!(counts.images, 3);
    }

    #[test]
    fn system_summary_reads_engine_info() {
        let info = json!({
            "ServerVersion": "24.0.7",
            "OperatingSystem": "Ubuntu 22.04.3 LTS",
            "Architecture": "x86_64",
            "KernelVersion": "5.15.0",
            "NCPU": 8,
            "MemTotal": 2147483648u64,
        });
        let counts = ContainerCounts::tally(&[container("running"), container("exited")], 4);
        let summary = summarize_system(&info, &counts, "1.00 GB".into());
        assert_eq!(summary["images_count"], 4);
        assert_eq!(summary["containers_count"], 2);
        assert_eq!(summary["running_containers"], 1);
        assert_eq!(summary["stopped_containers"], 1);
        assert_eq!(summary["disk_usage"], "1.00 GB");
        assert_eq!(summary["system_info"]["docker_version"], "24.0.7");
        assert_eq!(summary["system_info"]["cpus"], 8);
        assert_eq!(summary["system_info"]["memory"], "2.00 GB");
    }

    #[test]
    fn network_members_come_from_inspect() {
        let detail = json!({
            "Name": "backend",
            "Containers": {
                "f00dbeefcafe0123456789": {
                    "Name": "web", "MacAddress": "02:42:ac:11:00:02",
                    "IPv4Address": "172.17.0.2/16", "IPv6Address": ""
                },
                "abcabcabcabc999": { "Name": "db", "IPv4Address": "172.17.0.3/16" }
            }
        });
        let members = network_members(&detail);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "db");
        assert_eq!(members[1].id, "f00dbeefcafe");
        assert_eq!(members[1].full_id, "f00dbeefcafe0123456789");
        assert_eq!(members[1].ipv4, "172.17.0.2/16");
        assert_eq!(members[0].mac_address, "");
        assert!(network_members(&json!({ "Name": "none" })).is_empty());
    }

    #[test]
    fn ls_rows_are_split() {
        let out = "total 16\n\
drwxr-xr-x 3 root root 4096 Jan  2 10:00 .\n\
drwx-----x 3 root root 4096 Jan  2 10:00 ..\n\
-rw-r--r-- 1 www-data www-data 1234 Feb 10 09:15 index.html\n\
drwxr-xr-x 2 root root 4096 Mar  1  2023 my uploads\n";
        let rows = parse_ls(out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "index.html");
        assert_eq!(rows[0].owner, "www-data");
        assert_eq!(rows[0].size, 1234);
        assert_eq!(rows[0].month, "Feb");
        assert_eq!(rows[1].name, "my uploads");
        assert_eq!(rows[1].time, "2023");
    }

    #[test]
    fn volume_stats_walk_mountpoints() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.bin"), vec![0u8; 1024]).unwrap();
        std::fs::write(dir.path().join("nested/b.bin"), vec![0u8; 1024]).unwrap();

        let mut local = sample_volumes().remove(0);
        local.mountpoint = dir.path().to_string_lossy().to_string();
        local.labels = "com.docker.compose.project=shop".into();
        let mut remote = sample_volumes().remove(0);
        remote.driver = "nfs".into();
        remote.mountpoint = "/nonexistent/opsdeck-volume".into();

        let stats = VolumeStats::tally(&[local, remote]);
        assert_eq!(stats.total_volumes, 2);
        assert_eq!(stats.local_driver, 1);
        assert_eq!(stats.other_drivers, 1);
        assert_eq!(stats.labeled_volumes, 1);
        assert_eq!(stats.estimated_size, "2.00 KB");
    }

    #[test]
    fn create_args_follow_the_request() {
        let spec: NewContainer = serde_json::from_value(json!({
            "image": "nginx:1.25",
            "name": "web",
            "command": "nginx -g 'daemon off;'",
            "ports": { "80/tcp": 8080, "53/udp": "5353", "443/tcp": null },
            "volumes": { "/srv/www": { "bind": "/usr/share/nginx/html", "mode": "ro" }, "logs": "/var/log/nginx" },
            "environment": { "TZ": "UTC", "WORKERS": 4 },
            "network": "backend",
            "restart_policy": { "Name": "always" }
        }))
        .unwrap();
        let args = spec.args().unwrap();
        let joined = args.join(" ");
        assert!(joined.starts_with("create --name web"));
        assert!(joined.contains("-p 5353:53/udp"));
        assert!(joined.contains("-p 8080:80"));
        assert!(joined.contains("-p 443 "));
        assert!(joined.contains("-v /srv/www:/usr/share/nginx/html:ro"));
        assert!(joined.contains("-v logs:/var/log/nginx:rw"));
        assert!(joined.contains("-e TZ=UTC -e WORKERS=4"));
        assert!(joined.contains("--network backend --restart always nginx:1.25"));
        assert_eq!(&args[args.len() - 3..], ["sh", "-c", "nginx -g 'daemon off;'"]);
    }

    #[test]
    fn create_defaults_and_rejections() {
        let spec = NewContainer { image: "redis".into(), ..Default::default() };
        assert_eq!(spec.args().unwrap(), ["create", "--restart", "unless-stopped", "redis"]);

        let bad: NewContainer = serde_json::from_value(json!({
            "image": "",
            "name": "--privileged",
            "volumes": { "/data": "relative/path" },
            "environment": { "A=B": "x" },
            "restart_policy": "sometimes"
        }))
        .unwrap();
        match bad.args() {
            Err(OpsError::Validation(errors)) => {
                assert_eq!(errors.len(), 5, "{:?}", errors);
                assert_eq!(errors[0], "Image name is required");
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn actions_round_trip() {
        for name in ["start", "stop", "restart", "pause", "unpause"] {
            assert_eq!(ContainerAction::parse(name).map(|a| a.as_str()), Some(name));
        }
        assert_eq!(ContainerAction::parse("explode"), None);
    }
}
