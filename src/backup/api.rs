// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

use actix_files::NamedFile;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::api::{blocking, require_auth, success, AppState};
use crate::config::ProjectPaths;
use crate::error::Result;
use crate::inventory::VarMap;
use crate::playbook::RunRequest;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/backup")
            .route("/list", web::get().to(list_backups))
            .route("/download", web::get().to(download))
            .route("/delete", web::post().to(delete_backup))
            .route("/run-all", web::post().to(run_all))
            .route("/clean", web::post().to(clean))
    );
}

async fn list_backups(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let st = state.clone();
    let (root, customers) = blocking(move || {
        let inventory = st.inventory.load()?;
        let root = ProjectPaths::resolve(&st.config, &inventory).backups;
        let customers = super::list_backups(&root, &inventory);
        Ok((root, customers))
    })
    .await?;
    Ok(success(json!({
        "backup_path": root,
        "total_customers": customers.len(),
        "customers": customers,
    })))
}

#[derive(Deserialize)]
struct FileQuery {
    #[serde(default)]
    customer: String,
    #[serde(default)]
    backup_name: String,
    #[serde(default)]
    file_name: String,
}

/// GET /api/backup/download?customer=&backup_name=&file_name=
async fn download(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<FileQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let FileQuery { customer, backup_name, file_name } = query.into_inner();
    let st = state.clone();
    let path = blocking(move || {
        let root = st.paths()?.backups;
        super::file_path(&root, &customer, &backup_name, &file_name)
    })
    .await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "backup".to_string());
    info!("Serving backup file {}", path.display());
    let file = NamedFile::open(&path)?.set_content_disposition(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(name)],
    });
    Ok(file.into_response(&req))
}

#[derive(Deserialize)]
struct DeleteRequest {
    #[serde(default)]
    customer: String,
    #[serde(default)]
    backup_name: String,
}

async fn delete_backup(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<DeleteRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let DeleteRequest { customer, backup_name } = body.into_inner();
    let st = state.clone();
    let (c, b) = (customer.clone(), backup_name.clone());
    blocking(move || super::delete_set(&st.paths()?.backups, &c, &b)).await?;
    Ok(success(json!({
        "message": format!("Backup {} of {} deleted", backup_name, customer),
    })))
}

#[derive(Serialize)]
struct StartedBackup {
    customer: String,
    run_id: String,
}

#[derive(Serialize)]
struct FailedBackup {
    customer: String,
    message: String,
}

/// POST /api/backup/run-all: one backup-tagged playbook run per enabled customer
async fn run_all(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let st = state.clone();
    let (started, failed) = blocking(move || {
        let inventory = st.inventory.load()?;
        let logs = ProjectPaths::resolve(&st.config, &inventory).run_logs();
        let mut started = Vec::new();
        let mut failed = Vec::new();
        for customer in super::enabled_customers(&inventory) {
            let run = RunRequest {
                customer: customer.clone(),
                extra_vars: VarMap::new(),
                tags: Some("backup".to_string()),
            };
            match st.runner.start(&run, &logs) {
                Ok(handle) => started.push(StartedBackup { customer, run_id: handle.run_id }),
                Err(e) => {
                    warn!("Backup run for {} did not start: {}", customer, e);
                    failed.push(FailedBackup { customer, message: e.to_string() });
                }
            }
        }
        Ok((started, failed))
    })
    .await?;

    if started.is_empty() && failed.is_empty() {
        return Ok(success(json!({ "message": "No customers have backups enabled", "count": 0 })));
    }
    info!("Started {} backup runs ({} failed)", started.len(), failed.len());
    Ok(HttpResponse::Ok().json(json!({
        "status": "started",
        "message": format!("Backups started for {} customers", started.len()),
        "count": started.len(),
        "started": started,
        "failed": failed,
    })))
}

/// POST /api/backup/clean: apply `customer_backup_keep`
async fn clean(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let st = state.clone();
    let report = blocking(move || {
        let inventory = st.inventory.load()?;
        let root = ProjectPaths::resolve(&st.config, &inventory).backups;
        super::clean(&root, &inventory)
    })
    .await?;
    Ok(success(json!({
        "message": format!("Removed {} old backups", report.deleted_count),
        "deleted_count": report.deleted_count,
        "deleted": report.deleted,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing;
    use actix_web::{test, App};
    use serde_json::Value;
    use std::fs;
    use std::path::Path;

    fn seeded(dir: &Path) -> web::Data<AppState> {
        fs::write(dir.join("inventory.yml"), testing::INVENTORY).unwrap();
        for name in ["2024-01-01-02-00-00", "2024-01-02-02-00-00"] {
            let set = dir.join("backup").join("acme").join(name);
            fs::create_dir_all(&set).unwrap();
            fs::write(set.join("portal.sql.gz"), b"dump").unwrap();
        }
        testing::state(dir, true, None)
    }

    #[actix_web::test]
    async fn list_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/backup/list").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["customers"]["acme"]["total_backups"], 2);
        assert_eq!(body["customers"]["acme"]["backups"][0]["name"], "2024-01-02-02-00-00");

        let req = test::TestRequest::get()
            .uri("/api/backup/download?customer=acme&backup_name=2024-01-01-02-00-00&file_name=portal.sql.gz")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment"));
        assert_eq!(test::read_body(resp).await.as_ref(), b"dump");

        let req = test::TestRequest::get()
            .uri("/api/backup/download?customer=..&backup_name=x&file_name=y")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn delete_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/backup/delete")
            .set_json(json!({ "customer": "acme", "backup_name": "2024-01-01-02-00-00" }))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
        assert!(!dir.path().join("backup/acme/2024-01-01-02-00-00").exists());

        let req = test::TestRequest::post().uri("/api/backup/clean").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["deleted_count"], 0);
    }

    #[actix_web::test]
    async fn run_all_starts_enabled_customers() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;
        let req = test::TestRequest::post().uri("/api/backup/run-all").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "started");
        assert_eq!(body["count"], 1);
        assert_eq!(body["started"][0]["customer"], "acme");
    }
}
