// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::crontab::{self, NewJob};
use super::schedule::CronSchedule;
use crate::api::{blocking, list_or_sample, require_auth, success, AppState};
use crate::error::{OpsError, Result};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/cron")
            .route("/jobs", web::get().to(list_jobs))
            .route("/jobs/add", web::post().to(add_job))
            .route("/jobs/{id}/toggle", web::post().to(toggle_job))
            .route("/jobs/{id}/edit", web::post().to(edit_job))
            .route("/jobs/{id}", web::get().to(get_job))
            .route("/jobs/{id}", web::delete().to(delete_job))
            .route("/validate", web::post().to(validate_schedule))
            .route("/system/status", web::get().to(system_status))
            .route("/system/restart", web::post().to(system_restart))
            .route("/logs", web::get().to(service_logs))
    );
}

#[derive(Deserialize)]
struct UserQuery {
    #[serde(default = "root")]
    user: String,
}

fn root() -> String {
    "root".to_string()
}

async fn read_table(state: &web::Data<AppState>, user: &str) -> Result<String> {
    let st = state.clone();
    let user = user.to_string();
    blocking(move || st.crontab.read(&user)).await
}

async fn write_table(state: &web::Data<AppState>, user: &str, content: String) -> Result<()> {
    let st = state.clone();
    let user = user.to_string();
    blocking(move || st.crontab.write(&user, &content)).await
}

/// GET /api/cron/jobs?user=root
async fn list_jobs(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let jobs = read_table(&state, &query.user)
        .await
        .map(|table| crontab::list_jobs(&table, &query.user));
    list_or_sample(&state, "jobs", jobs, crontab::sample_jobs)
}

async fn get_job(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = path.into_inner();
    let table = read_table(&state, &query.user).await?;
    let job = crontab::find_job(&table, &query.user, &id).ok_or_else(|| OpsError::not_found("Cron job", id))?;
    Ok(success(json!({ "job": job })))
}

/// POST /api/cron/jobs/add
async fn add_job(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<NewJob>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let job = body.into_inner();
    let line = crontab::build_line(&job)?;
    let table = read_table(&state, &job.user).await?;
    write_table(&state, &job.user, crontab::append_line(&table, &line)).await?;
    let added = crontab::parse_line(&line, &job.user);
    Ok(success(json!({
        "message": "Cron job added",
        "job": added,
    })))
}

#[derive(Deserialize)]
struct ToggleRequest {
    enabled: bool,
}

async fn toggle_job(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<UserQuery>,
    body: web::Json<ToggleRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = path.into_inner();
    let table = read_table(&state, &query.user).await?;
    let updated = crontab::toggle_job(&table, &query.user, &id, body.enabled)
        .ok_or_else(|| OpsError::not_found("Cron job", id.clone()))?;
    write_table(&state, &query.user, updated).await?;
    let verb = if body.enabled { "enabled" } else { "disabled" };
    Ok(success(json!({
        "message": format!("Cron job {}", verb),
        "id": id,
        "enabled": body.enabled,
    })))
}

/// POST /api/cron/jobs/{id}/edit replaces the line in place
async fn edit_job(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<NewJob>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = path.into_inner();
    let job = body.into_inner();
    let line = crontab::build_line(&job)?;
    let table = read_table(&state, &job.user).await?;
    let updated = crontab::replace_job(&table, &job.user, &id, &line)
        .ok_or_else(|| OpsError::not_found("Cron job", id))?;
    write_table(&state, &job.user, updated).await?;
    Ok(success(json!({
        "message": "Cron job updated",
        "job": crontab::parse_line(&line, &job.user),
    })))
}

async fn delete_job(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = path.into_inner();
    let table = read_table(&state, &query.user).await?;
    let updated = crontab::remove_job(&table, &query.user, &id)
        .ok_or_else(|| OpsError::not_found("Cron job", id.clone()))?;
    write_table(&state, &query.user, updated).await?;
    Ok(success(json!({ "message": "Cron job deleted", "id": id })))
}

/// A schedule as a crontab string or as separate fields
#[derive(Deserialize)]
#[serde(untagged)]
enum ScheduleInput {
    Text(String),
    Fields(CronSchedule),
}

#[derive(Deserialize)]
struct ValidateRequest {
    schedule: ScheduleInput,
}

/// POST /api/cron/validate
async fn validate_schedule(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ValidateRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let schedule = match body.into_inner().schedule {
        ScheduleInput::Text(s) => CronSchedule::decode(&s),
        ScheduleInput::Fields(f) => f,
    };
    schedule.validate().map_err(OpsError::Validation)?;
    Ok(success(json!({
        "message": "Schedule is valid",
        "schedule": schedule.encode(),
        "description": schedule.describe(),
    })))
}

async fn system_status(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let status = blocking(|| Ok(crontab::service_status())).await?;
    Ok(success(json!({ "service": status })))
}

async fn system_restart(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let via = blocking(crontab::restart_service).await?;
    Ok(success(json!({ "message": format!("Cron service restarted ({})", via) })))
}

/// GET /api/cron/logs: recent cron activity from syslog or the journal
async fn service_logs(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let logs = blocking(|| crontab::read_service_log(&crontab::CRON_LOG_FILES, crontab::CRON_LOG_LIMIT)).await;
    list_or_sample(&state, "logs", logs, crontab::sample_cron_logs)
}
