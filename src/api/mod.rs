// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! REST API shared state and helpers. Each feature module registers its
//! own scope through `configure`.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Mutex;
use tracing::warn;

use crate::auth::ApiKeyAuth;
use crate::config::{AppConfig, ProjectPaths};
use crate::cron::crontab::Crontab;
use crate::docker::Docker;
use crate::error::{OpsError, Result};
use crate::inventory::store::InventoryStore;
use crate::monitoring::SystemMonitor;
use crate::playbook::PlaybookRunner;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub auth: ApiKeyAuth,
    pub inventory: InventoryStore,
    pub runner: PlaybookRunner,
    pub crontab: Crontab,
    pub docker: Docker,
    pub monitor: Mutex<SystemMonitor>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            auth: ApiKeyAuth::new(config.api_key.clone(), config.api_key_header.clone()),
            inventory: InventoryStore::new(config.inventory_file()),
            runner: PlaybookRunner::new(&config),
            crontab: Crontab::new(config.crontab_bin.clone()),
            docker: Docker::new(config.docker_bin.clone()),
            monitor: Mutex::new(SystemMonitor::new()),
            config,
        }
    }

    /// Project, backup and log roots as the inventory currently defines them
    pub fn paths(&self) -> Result<ProjectPaths> {
        let inventory = self.inventory.load()?;
        Ok(ProjectPaths::resolve(&self.config, &inventory))
    }
}

// ─── Handler helpers ───

/// Reject the request unless it carries the configured API key
pub fn require_auth(req: &HttpRequest, state: &AppState) -> Result<()> {
    if state.auth.check(req) {
        Ok(())
    } else {
        Err(OpsError::Unauthorized(format!("Missing or invalid {} header", state.auth.header())))
    }
}

/// Run filesystem or subprocess work off the async workers
pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    web::block(f)
        .await
        .map_err(|e| OpsError::Command(format!("Worker failed: {}", e)))?
}

/// `{status: "success", ...fields}`
pub fn success(fields: Value) -> HttpResponse {
    let mut body = json!({ "status": "success" });
    if let (Some(out), Value::Object(extra)) = (body.as_object_mut(), fields) {
        out.extend(extra);
    }
    HttpResponse::Ok().json(body)
}

/// List response `{status, <key>: [...], count}`. When the backend failed and
/// sample fallback is on, the sample list is returned marked `sample: true`.
pub fn list_or_sample<T: Serialize>(
    state: &AppState,
    key: &str,
    result: Result<Vec<T>>,
    sample: impl FnOnce() -> Vec<T>,
) -> Result<HttpResponse> {
    match result {
        Ok(items) => Ok(success(json!({ key: &items, "count": items.len() }))),
        Err(e) if state.config.sample_fallback && !matches!(e, OpsError::Validation(_)) => {
            warn!("Serving sample {} data: {}", key, e);
            let items = sample();
            Ok(success(json!({
                key: &items,
                "count": items.len(),
                "sample": true,
                "message": format!("Showing sample data: {}", e),
            })))
        }
        Err(e) => Err(e),
    }
}

// ─── Server endpoints ───

/// GET /api/health, open without a key
async fn health() -> HttpResponse {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    success(json!({
        "service": "opsdeck",
        "version": env!("CARGO_PKG_VERSION"),
        "hostname": hostname,
    }))
}

/// GET /api/metrics: host metrics
async fn get_metrics(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let metrics = state.monitor.lock().unwrap_or_else(|p| p.into_inner()).collect();
    Ok(success(json!({ "metrics": metrics })))
}

/// Configure all API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(health))
        .route("/api/metrics", web::get().to(get_metrics))
        .configure(crate::inventory::api::config)
        .configure(crate::playbook::api::config)
        .configure(crate::cron::api::config)
        .configure(crate::docker::api::config)
        .configure(crate::backup::api::config)
        .configure(crate::logs::api::config);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::path::Path;

    /// Config rooted in `dir`; crontab and docker point at missing binaries
    pub fn config(dir: &Path) -> AppConfig {
        AppConfig {
            base_dir: dir.to_path_buf(),
            ansible_bin: "true".to_string(),
            crontab_bin: "/nonexistent/crontab".to_string(),
            docker_bin: "/nonexistent/docker".to_string(),
            log_dir: Some(dir.join("log")),
            default_project_path: dir.to_path_buf(),
            default_backup_path: dir.join("backup"),
            ..AppConfig::default()
        }
    }

    pub fn state(dir: &Path, fallback: bool, api_key: Option<&str>) -> web::Data<AppState> {
        let cfg = AppConfig {
            api_key: api_key.map(str::to_string),
            sample_fallback: fallback,
            ..config(dir)
        };
        web::Data::new(AppState::new(cfg))
    }

    pub const INVENTORY: &str = r#"
all:
  vars:
    customer_state: up
    customer_backup_enabled: false
  hosts:
    acme:
      vars:
        customer_name: Acme Ltd
        customer_domain: acme.example.com
        customer_backup_enabled: true
        customer_portal_git_branch: main
    beta:
"#;
}

#[cfg(test)]
mod tests {
    use super::testing;
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn health_needs_no_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::state(dir.path(), true, Some("k3y"));
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
        assert!(resp.status().is_success());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["service"], "opsdeck");
    }

    #[actix_web::test]
    async fn api_key_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::state(dir.path(), true, Some("k3y"));
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/inventory/customers").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");

        let req = test::TestRequest::get()
            .uri("/api/inventory/customers")
            .insert_header(("X-API-Key", "k3y"))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }

    #[actix_web::test]
    async fn metrics_report_host() {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::state(dir.path(), true, None);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/metrics").to_request()).await;
        let body: Value = test::read_body_json(resp).await;
        assert!(body["metrics"]["memory_total_bytes"].as_u64().unwrap() > 0);
    }

    #[actix_web::test]
    async fn sample_fallback_is_labelled() {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::state(dir.path(), true, None);
        let failed: Result<Vec<u32>> = Err(OpsError::Docker("daemon down".into()));
        let resp = list_or_sample(&state, "things", failed, || vec![1, 2]).unwrap();
        assert!(resp.status().is_success());
        let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["sample"], true);
        assert_eq!(body["things"], json!([1, 2]));
        assert_eq!(body["count"], 2);
        assert!(body["message"].as_str().unwrap().contains("daemon down"));

        let ok: Result<Vec<u32>> = Ok(vec![7]);
        let resp = list_or_sample(&state, "things", ok, Vec::new).unwrap();
        let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("sample").is_none());

        let rejected: Result<Vec<u32>> = Err(OpsError::validation("bad filter"));
        assert!(list_or_sample(&state, "things", rejected, Vec::new).is_err());

        let strict = testing::state(dir.path(), false, None);
        let failed: Result<Vec<u32>> = Err(OpsError::Docker("daemon down".into()));
        assert!(list_or_sample(&strict, "things", failed, Vec::new).is_err());
    }
}
