// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::categorize::MODULES;
use super::schema::KeySchema;
use super::VarMap;
use crate::api::{blocking, require_auth, success, AppState};
use crate::error::{OpsError, Result};
use crate::playbook::validate_name;
use crate::view::{self, CustomerView};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/inventory")
            .route("", web::get().to(get_inventory))
            .route("/customers", web::get().to(list_customers))
            .route("/modules", web::get().to(list_modules))
            .route("/save", web::post().to(save_customer))
            .route("/customer/{id}/view", web::get().to(customer_view))
            .route("/customer/{id}", web::get().to(get_customer))
    );
}

/// GET /api/inventory: the raw tree
async fn get_inventory(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let st = state.clone();
    let inventory = blocking(move || st.inventory.load()).await?;
    Ok(HttpResponse::Ok().json(inventory))
}

async fn list_customers(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let st = state.clone();
    let inventory = blocking(move || st.inventory.load()).await?;
    let customers = inventory.customer_summaries();
    Ok(success(json!({ "customers": customers, "count": customers.len() })))
}

async fn list_modules(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    Ok(success(json!({ "modules": MODULES })))
}

async fn get_customer(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = path.into_inner();
    let st = state.clone();
    let inventory = blocking(move || st.inventory.load()).await?;
    let Some(host) = inventory.all.hosts.get(&id) else {
        return Err(OpsError::not_found("Customer", id));
    };
    Ok(success(json!({
        "customer": id,
        "name": inventory.display_name(&id),
        "vars": inventory.customer_vars(&id),
        "raw_data": host,
    })))
}

/// GET /api/inventory/customer/{id}/view: categorized, typed fields
async fn customer_view(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let id = path.into_inner();
    let st = state.clone();
    let inventory = blocking(move || st.inventory.load()).await?;
    if !inventory.has_customer(&id) {
        return Err(OpsError::not_found("Customer", id));
    }
    let view = CustomerView::build(&id, &inventory.customer_vars(&id), state.config.unmatched_keys);
    Ok(success(json!({ "view": view })))
}

#[derive(Deserialize)]
struct SaveRequest {
    #[serde(default)]
    customer: String,
    #[serde(default)]
    vars: VarMap,
    #[serde(default)]
    merge: bool,
}

/// POST /api/inventory/save: check every key, then persist
async fn save_customer(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<SaveRequest>,
) -> Result<HttpResponse> {
    require_auth(&req, &state)?;
    let SaveRequest { customer, mut vars, merge } = body.into_inner();
    validate_name("customer", &customer)?;
    KeySchema.validate(&vars).map_err(OpsError::Validation)?;

    let count = vars.len();
    let st = state.clone();
    let who = customer.clone();
    blocking(move || {
        let current = st.inventory.load()?.all.hosts.get(&who).map(|h| h.vars.clone()).unwrap_or_default();
        view::restore_masked(&mut vars, &current);
        st.inventory.save_customer(&who, vars, merge)
    })
    .await?;
    info!("Inventory saved for {} ({} vars, merge={})", customer, count, merge);
    Ok(success(json!({
        "message": format!("Configuration for {} saved", customer),
        "customer": customer,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing;
    use actix_web::{test, App};
    use serde_json::Value;

    fn seeded(dir: &std::path::Path) -> web::Data<AppState> {
        std::fs::write(dir.join("inventory.yml"), testing::INVENTORY).unwrap();
        testing::state(dir, true, None)
    }

    #[actix_web::test]
    async fn lists_customers_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/inventory/customers").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["customers"]["acme"]["name"], "Acme Ltd");
        assert_eq!(body["customers"]["beta"]["name"], "beta");
        assert_eq!(body["customers"]["beta"]["state"], "down");
    }

    #[actix_web::test]
    async fn customer_detail_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/inventory/customer/acme").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["vars"]["customer_state"], "up");
        assert_eq!(body["vars"]["customer_backup_enabled"], true);
        assert!(body["raw_data"]["vars"].get("customer_state").is_none());

        let req = test::TestRequest::get().uri("/api/inventory/customer/nobody").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn view_has_typed_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/inventory/customer/acme/view").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let tabs = body["view"]["tabs"].as_array().unwrap();
        assert!(tabs.iter().any(|t| t["id"] == "portal"));
        assert!(tabs.iter().any(|t| t["id"] == "domain"));
    }

    #[actix_web::test]
    async fn save_validates_then_persists() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/inventory/save")
            .set_json(json!({
                "customer": "acme",
                "vars": { "customer_domain": "not a domain", "customer_backup_keep": "lots" }
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);

        let req = test::TestRequest::post()
            .uri("/api/inventory/save")
            .set_json(json!({ "customer": "gamma", "vars": { "customer_name": "Gamma" } }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "success");

        let req = test::TestRequest::get().uri("/api/inventory/customer/gamma").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["name"], "Gamma");
    }

    #[actix_web::test]
    async fn saving_the_mask_keeps_the_password() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;
        let save = |password: &str| {
            test::TestRequest::post()
                .uri("/api/inventory/save")
                .set_json(json!({
                    "customer": "acme",
                    "vars": { "customer_name": "Acme Ltd", "portal_mysql_password": password },
                }))
                .to_request()
        };
        assert!(test::call_service(&app, save("s3cret")).await.status().is_success());
        assert!(test::call_service(&app, save(crate::view::MASK)).await.status().is_success());

        let req = test::TestRequest::get().uri("/api/inventory/customer/acme").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["vars"]["portal_mysql_password"], "s3cret");
    }

    #[actix_web::test]
    async fn save_requires_customer() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(seeded(dir.path())).configure(config)).await;
        let req = test::TestRequest::post()
            .uri("/api/inventory/save")
            .set_json(json!({ "vars": {} }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }
}
