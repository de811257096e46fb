// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

use actix_files::NamedFile;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::api::{blocking, require_auth, success, AppState};
use crate::config::ProjectPaths;
use crate::error::Result;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/logs")
            .route("/list", web::get().to(list_logs))
            .route("/view", web::get().to(view_log))
            .route("/download", web::get().to(download_log))
            .route("/clear", web::post().to(clear_log))
    );
}

async fn list_logs(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let st = state.clone();
    let (root, listing) = blocking(move || {
        let inventory = st.inventory.load()?;
        let root = ProjectPaths::resolve(&st.config, &inventory).logs;
        let listing = super::list_logs(&root, &inventory);
        Ok((root, listing))
    })
    .await?;
    let exists = root.is_dir();
    Ok(success(json!({
        "log_path": root,
        "backup_log_path": root.join("backup"),
        "exists": exists,
        "logs": listing,
    })))
}

#[derive(Deserialize)]
struct ViewQuery {
    #[serde(default)]
    path: String,
    #[serde(default = "default_lines")]
    lines: usize,
    #[serde(default)]
    tail: bool,
}

fn default_lines() -> usize {
    100
}

/// GET /api/logs/view?path=&lines=100&tail=false
async fn view_log(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ViewQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let ViewQuery { path, lines, tail } = query.into_inner();
    let st = state.clone();
    let (file, content) = blocking(move || {
        let file = super::resolve_in_root(&st.paths()?.logs, &path)?;
        let content = super::read_log(&file, lines, tail)?;
        Ok((file, content))
    })
    .await?;
    let analysis = super::analyze_lines(content.lines());
    let filename = file.file_name().map(|n| n.to_string_lossy().to_string());
    Ok(success(json!({
        "path": file,
        "filename": filename,
        "total_lines": content.lines().count(),
        "content": content,
        "analysis": analysis,
    })))
}

#[derive(Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: String,
}

async fn download_log(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<PathQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let requested = query.into_inner().path;
    let st = state.clone();
    let file = blocking(move || super::resolve_in_root(&st.paths()?.logs, &requested)).await?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "log".to_string());
    let named = NamedFile::open(&file)?.set_content_disposition(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(name)],
    });
    Ok(named.into_response(&req))
}

async fn clear_log(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<PathQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let requested = body.into_inner().path;
    let st = state.clone();
    let file = blocking(move || {
        let file = super::resolve_in_root(&st.paths()?.logs, &requested)?;
        super::clear_log(&file)?;
        Ok(file)
    })
    .await?;
    Ok(success(json!({ "message": "Log cleared", "path": file })))
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
        let logs = dir.join("log");
        fs::create_dir_all(logs.join("backup")).unwrap();
        fs::write(logs.join("cron.log"), "tick\n").unwrap();
        fs::write(
            logs.join("backup").join("acme_databases.log"),
            "Starting database backup\nERROR: dump failed\nFinished\n",
        )
        .unwrap();
        testing::state(dir, true, None)
    }

    #[actix_web::test]
    async fn list_groups_customer_logs() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/logs/list").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["logs"]["cron"]["name"], "cron.log");
        assert_eq!(body["logs"]["customers"]["acme"]["logs"][0]["type"], "databases");
        assert_eq!(body["logs"]["customers"]["acme"]["logs"][0]["analysis"]["error_count"], 1);
    }

    #[actix_web::test]
    async fn view_tail_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;

        let req = test::TestRequest::get()
            .uri("/api/logs/view?path=backup/acme_databases.log&lines=2&tail=true")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["content"], "ERROR: dump failed\nFinished\n");
        assert_eq!(body["analysis"]["errors"][0]["line_number"], 1);
        assert_eq!(body["filename"], "acme_databases.log");

        let req = test::TestRequest::post()
            .uri("/api/logs/clear")
            .set_json(json!({ "path": "cron.log" }))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
        let cleared = fs::read_to_string(dir.path().join("log").join("cron.log")).unwrap();
        assert!(cleared.starts_with("# Log cleared at "));
    }

    #[actix_web::test]
    async fn paths_outside_root_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/logs/view?path=../inventory.yml").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::get().uri("/api/logs/download?path=missing.log").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::get().uri("/api/logs/download?path=cron.log").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(test::read_body(resp).await.as_ref(), b"tick\n");
    }
}
