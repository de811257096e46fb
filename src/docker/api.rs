// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::warn;

use super::{sample_containers, sample_images, sample_networks, sample_volumes, ContainerAction, Docker, NewContainer};
use crate::api::{blocking, list_or_sample, require_auth, success, AppState};
use crate::error::{OpsError, Result};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/docker")
            .route("/ping", web::get().to(ping))
            .route("/system", web::get().to(system_summary))
            .route("/system/info", web::get().to(system_info))
            .route("/system/resources", web::get().to(system_resources))
            // Images
            .route("/images", web::get().to(list_images))
            .route("/images/pull", web::post().to(pull_image))
            .route("/images/prune", web::post().to(prune_images))
            .route("/images/build", web::post().to(build_image))
            .route("/images/remove", web::post().to(remove_image_by_body))
            .route("/images/{id:.+}", web::delete().to(remove_image))
            // Containers
            .route("/containers", web::get().to(list_containers))
            .route("/containers/prune", web::post().to(prune_containers))
            .route("/containers/create", web::post().to(create_container))
            .route("/containers/stats/all", web::get().to(container_counts))
            .route("/containers/{id}/logs", web::get().to(container_logs))
            .route("/containers/{id}/stats", web::get().to(container_stats))
            .route("/containers/{id}/exec", web::post().to(container_exec))
            .route("/containers/{id}/remove", web::post().to(remove_container))
            .route("/containers/{id}/{action}", web::post().to(container_action))
            .route("/containers/{id}", web::get().to(inspect_container))
            .route("/containers/{id}", web::delete().to(remove_container))
            // Networks
            .route("/networks", web::get().to(list_networks))
            .route("/networks/create", web::post().to(create_network))
            .route("/networks/prune", web::post().to(prune_networks))
            .route("/networks/{id}/containers", web::get().to(network_containers))
            .route("/networks/{id}/remove", web::post().to(remove_network))
            .route("/networks/{id}", web::get().to(inspect_network))
            .route("/networks/{id}", web::delete().to(remove_network))
            // Volumes
            .route("/volumes", web::get().to(list_volumes))
            .route("/volumes/create", web::post().to(create_volume))
            .route("/volumes/prune", web::post().to(prune_volumes))
            .route("/volumes/stats", web::get().to(volume_stats))
            .route("/volumes/{name}/inspect", web::get().to(volume_files))
            .route("/volumes/{name}/remove", web::post().to(remove_volume))
            .route("/volumes/{name}", web::get().to(inspect_volume))
            .route("/volumes/{name}", web::delete().to(remove_volume))
    );
}

/// Run a docker CLI call on the blocking pool
async fn with_docker<T, F>(state: &web::Data<AppState>, f: F) -> Result<T>
where
    F: FnOnce(&Docker) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let docker = state.docker.clone();
    blocking(move || f(&docker)).await
}

/// Ids, names and image references go straight onto the docker command line
fn check_ref(what: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('-') || value.contains(char::is_whitespace) {
        return Err(OpsError::validation(format!("Invalid {} '{}'", what, value)));
    }
    Ok(value.to_string())
}

#[derive(Deserialize)]
struct ForceQuery {
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
struct CreateRequest {
    #[serde(default)]
    name: String,
    #[serde(default = "default_driver")]
    driver: String,
}

// ─── Engine ───

async fn ping(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let version = with_docker(&state, |d| d.ping()).await?;
    Ok(success(json!({ "message": "Docker is reachable", "version": version })))
}

/// GET /api/docker/system: engine facts with object counts
async fn system_summary(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let summary = with_docker(&state, |d| d.system_summary()).await?;
    Ok(success(summary))
}

/// GET /api/docker/system/info: engine summary plus host metrics
async fn system_info(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let engine = with_docker(&state, |d| d.engine_info()).await;
    let metrics = state.monitor.lock().unwrap_or_else(|p| p.into_inner()).collect();
    match engine {
        Ok(info) => Ok(success(json!({ "docker": info, "system": metrics }))),
        Err(e) if state.config.sample_fallback => {
            warn!("Docker info unavailable, reporting host only: {}", e);
            Ok(success(json!({
                "docker": null,
                "system": metrics,
                "sample": true,
                "message": format!("Docker unavailable: {}", e),
            })))
        }
        Err(e) => Err(e),
    }
}

/// GET /api/docker/system/resources: host usage and object counts
async fn system_resources(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let metrics = state.monitor.lock().unwrap_or_else(|p| p.into_inner()).collect();
    let counts = with_docker(&state, |d| {
        let containers = d.containers(true)?;
        let running = containers.iter().filter(|c| c.state == "running").count();
        Ok(json!({
            "containers": containers.len(),
            "running": running,
            "images": d.images()?.len(),
            "volumes": d.volumes()?.len(),
            "networks": d.networks()?.len(),
        }))
    })
    .await;
    let docker = match counts {
        Ok(c) => c,
        Err(e) => {
            warn!("Docker counts unavailable: {}", e);
            json!(null)
        }
    };
    Ok(success(json!({ "system": metrics, "docker": docker })))
}

// ─── Images ───

async fn list_images(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let images = with_docker(&state, |d| d.images()).await;
    list_or_sample(&state, "images", images, sample_images)
}

#[derive(Deserialize)]
struct PullRequest {
    #[serde(default)]
    image: String,
}

async fn pull_image(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<PullRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let image = check_ref("image", &body.image)?;
    let out = with_docker(&state, move |d| d.pull_image(&image)).await?;
    Ok(success(json!({ "message": "Image pulled", "output": out })))
}

async fn prune_images(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let report = with_docker(&state, |d| d.prune_images()).await?;
    Ok(success(json!({ "report": report })))
}

async fn remove_image(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ForceQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = check_ref("image", &path)?;
    let force = query.force;
    let msg = with_docker(&state, move |d| d.remove_image(&id, force)).await?;
    Ok(success(json!({ "message": msg })))
}

#[derive(Deserialize)]
struct RemoveImageRequest {
    #[serde(default)]
    image_id: String,
    #[serde(default)]
    force: bool,
}

/// POST /api/docker/images/remove with `{image_id, force}`
async fn remove_image_by_body(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RemoveImageRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    if body.image_id.trim().is_empty() {
        return Err(OpsError::validation("Image ID is required"));
    }
    let id = check_ref("image", &body.image_id)?;
    let force = body.force;
    let msg = with_docker(&state, move |d| d.remove_image(&id, force)).await?;
    Ok(success(json!({ "message": msg })))
}

#[derive(Deserialize)]
struct BuildRequest {
    #[serde(default = "default_build_path")]
    path: String,
    #[serde(default = "default_build_tag")]
    tag: String,
}

fn default_build_path() -> String {
    ".".to_string()
}

fn default_build_tag() -> String {
    "custom-image:latest".to_string()
}

/// POST /api/docker/images/build: build context is a directory on this host
async fn build_image(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<BuildRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let BuildRequest { path, tag } = body.into_inner();
    let tag = check_ref("tag", &tag)?;
    let dir = PathBuf::from(path.trim());
    if !dir.join("Dockerfile").is_file() {
        return Err(OpsError::validation(format!("No Dockerfile in '{}'", dir.display())));
    }
    let build_tag = tag.clone();
    let out = with_docker(&state, move |d| d.build_image(&dir, &build_tag)).await?;
    Ok(success(json!({ "message": format!("Image {} built", tag), "tag": tag, "output": out })))
}

// ─── Containers ───

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default = "default_true")]
    all: bool,
}

fn default_true() -> bool {
    true
}

fn default_driver() -> String {
    "local".to_string()
}

async fn list_containers(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let all = query.all;
    let containers = with_docker(&state, move |d| d.containers(all)).await;
    list_or_sample(&state, "containers", containers, sample_containers)
}

/// GET /api/docker/containers/stats/all
async fn container_counts(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let counts = with_docker(&state, |d| d.container_counts()).await?;
    Ok(success(json!({ "stats": counts })))
}

async fn create_container(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<NewContainer>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let spec = body.into_inner();
    // Reject bad requests before touching the daemon
    spec.args()?;
    let (id, name) = with_docker(&state, move |d| d.create_container(&spec)).await?;
    Ok(success(json!({ "message": "Container created successfully", "container_id": id, "name": name })))
}

async fn inspect_container(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = check_ref("container", &path)?;
    let detail = with_docker(&state, move |d| d.inspect_container(&id)).await?;
    Ok(success(json!({ "container": detail })))
}

/// POST /api/docker/containers/{id}/{start|stop|restart|pause|unpause}
async fn container_action(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let (id, action) = path.into_inner();
    let id = check_ref("container", &id)?;
    let action = ContainerAction::parse(&action)
        .ok_or_else(|| OpsError::validation(format!("Unknown container action '{}'", action)))?;
    let msg = with_docker(&state, move |d| d.container_action(&id, action)).await?;
    Ok(success(json!({ "message": msg, "action": action.as_str() })))
}

async fn remove_container(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ForceQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = check_ref("container", &path)?;
    let force = query.force;
    let msg = with_docker(&state, move |d| d.remove_container(&id, force)).await?;
    Ok(success(json!({ "message": msg })))
}

#[derive(Deserialize)]
struct LogsQuery {
    #[serde(default = "default_tail")]
    tail: u32,
}

fn default_tail() -> u32 {
    100
}

async fn container_logs(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<LogsQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = check_ref("container", &path)?;
    let tail = query.tail;
    let lines = with_docker(&state, move |d| d.logs(&id, tail)).await?;
    Ok(success(json!({ "count": lines.len(), "logs": lines })))
}

async fn container_stats(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = check_ref("container", &path)?;
    let stats = with_docker(&state, move |d| d.stats(&id)).await?;
    Ok(success(json!({ "stats": stats })))
}

#[derive(Deserialize)]
struct ExecRequest {
    #[serde(default)]
    command: String,
}

async fn container_exec(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ExecRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = check_ref("container", &path)?;
    let command = body.into_inner().command;
    if command.trim().is_empty() {
        return Err(OpsError::validation("Command is required"));
    }
    let out = with_docker(&state, move |d| d.exec(&id, &command)).await?;
    Ok(success(json!({ "exit_code": out.exit_code, "output": out.output })))
}

async fn prune_containers(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let report = with_docker(&state, |d| d.prune_containers()).await?;
    Ok(success(json!({ "report": report })))
}

// ─── Networks ───

async fn list_networks(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let networks = with_docker(&state, |d| d.networks()).await;
    list_or_sample(&state, "networks", networks, sample_networks)
}

async fn inspect_network(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = check_ref("network", &path)?;
    let detail = with_docker(&state, move |d| d.inspect_network(&id)).await?;
    Ok(success(json!({ "network": detail })))
}

async fn network_containers(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = check_ref("network", &path)?;
    let (network, members) = with_docker(&state, move |d| d.network_containers(&id)).await?;
    Ok(success(json!({ "network": network, "containers_count": members.len(), "containers": members })))
}

async fn create_network(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let CreateRequest { name, driver } = body.into_inner();
    let name = check_ref("network name", &name)?;
    // Networks default to bridge rather than the volume driver name
    let driver = if driver == "local" { "bridge".to_string() } else { check_ref("driver", &driver)? };
    let id = with_docker(&state, move |d| d.create_network(&name, &driver)).await?;
    Ok(success(json!({ "message": "Network created", "id": id })))
}

async fn remove_network(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = check_ref("network", &path)?;
    let msg = with_docker(&state, move |d| d.remove_network(&id)).await?;
    Ok(success(json!({ "message": msg })))
}

async fn prune_networks(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let report = with_docker(&state, |d| d.prune_networks()).await?;
    Ok(success(json!({ "report": report })))
}

// ─── Volumes ───

async fn list_volumes(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let volumes = with_docker(&state, |d| d.volumes()).await;
    list_or_sample(&state, "volumes", volumes, sample_volumes)
}

async fn inspect_volume(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let name = check_ref("volume", &path)?;
    let detail = with_docker(&state, move |d| d.inspect_volume(&name)).await?;
    Ok(success(json!({ "volume": detail })))
}

async fn volume_stats(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let stats = with_docker(&state, |d| d.volume_stats()).await?;
    Ok(success(serde_json::to_value(stats)?))
}

/// GET /api/docker/volumes/{name}/inspect: files under the mountpoint
async fn volume_files(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let name = check_ref("volume", &path)?;
    let listing = with_docker(&state, move |d| d.volume_files(&name)).await?;
    Ok(success(serde_json::to_value(listing)?))
}

async fn create_volume(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let CreateRequest { name, driver } = body.into_inner();
    let name = check_ref("volume name", &name)?;
    let driver = check_ref("driver", &driver)?;
    let out = with_docker(&state, move |d| d.create_volume(&name, &driver)).await?;
    Ok(success(json!({ "message": "Volume created", "name": out })))
}

async fn remove_volume(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ForceQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let name = check_ref("volume", &path)?;
    let force = query.force;
    let msg = with_docker(&state, move |d| d.remove_volume(&name, force)).await?;
    Ok(success(json!({ "message": msg })))
}

async fn prune_volumes(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let report = with_docker(&state, |d| d.prune_volumes()).await?;
    Ok(success(json!({ "report": report })))
}
