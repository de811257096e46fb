// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use super::RunRequest;
use crate::api::{blocking, require_auth, success, AppState};
use crate::config::ProjectPaths;
use crate::error::{OpsError, Result};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/run")
            .route("", web::post().to(start_run))
            .route("/list", web::get().to(list_runs))
            .route("/status/{run_id}", web::get().to(run_status))
    );
}

/// POST /api/run: returns once ansible-playbook has been spawned
async fn start_run(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RunRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let run = body.into_inner();
    let st = state.clone();
    let handle = blocking(move || {
        let inventory = st.inventory.load()?;
        if !run.customer.is_empty() && !inventory.has_customer(&run.customer) {
            return Err(OpsError::not_found("Customer", run.customer.clone()));
        }
        let logs = ProjectPaths::resolve(&st.config, &inventory).run_logs();
        st.runner.start(&run, &logs)
    })
    .await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "started",
        "message": format!("Playbook started for {}", handle.customer),
        "run_id": handle.run_id,
        "pid": handle.pid,
        "customer": handle.customer,
        "command": handle.command,
    })))
}

async fn run_status(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let run_id = path.into_inner();
    match state.runner.status(&run_id) {
        Some(info) => Ok(success(json!({ "run": info }))),
        None => Err(OpsError::not_found("Run", run_id)),
    }
}

async fn list_runs(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let runs = state.runner.list();
    Ok(success(json!({ "runs": runs, "count": runs.len() })))
}
