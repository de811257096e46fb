// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Inventory client for a running OpsDeck server
//!
//! The client owns its inventory cache. `load_inventory` replaces it
//! wholesale; every read recomputes the overlay from the cached tree.

use crate::error::{OpsError, Result};
use crate::inventory::{CustomerSummary, Inventory, VarMap, VarValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Server acknowledgement of a write
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ack {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Success,
}

/// Answer to a playbook request; the run continues on the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunAck {
    pub status: RunStatus,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct InventoryClient {
    base_url: String,
    api_key: Option<(String, String)>,
    client: reqwest::Client,
    cache: Option<Inventory>,
}

impl InventoryClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            client,
            cache: None,
        }
    }

    /// Send `key` in `header` on every request
    pub fn with_api_key(mut self, header: &str, key: &str) -> Self {
        self.api_key = Some((header.to_string(), key.to_string()));
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.client.request(method, &url);
        match &self.api_key {
            Some((header, key)) => builder.header(header.as_str(), key.as_str()),
            None => builder,
        }
    }

    /// Fetch the whole tree and replace the cache
    pub async fn load_inventory(&mut self) -> Result<&Inventory> {
        let resp = self.request(reqwest::Method::GET, "/api/inventory").send().await?;
        let body = read_body(resp, "/api/inventory").await?;
        let inventory: Inventory = serde_json::from_value(body)?;
        Ok(self.cache.insert(inventory))
    }

    /// The cached tree, if loaded
    pub fn inventory(&self) -> Option<&Inventory> {
        self.cache.as_ref()
    }

    /// Effective variables of a customer from the cache. Unknown customers
    /// and an unloaded cache both give an empty map.
    pub fn customer_vars(&self, id: &str) -> VarMap {
        self.cache.as_ref().map(|inv| inv.customer_vars(id)).unwrap_or_default()
    }

    pub fn customers(&self) -> BTreeMap<String, CustomerSummary> {
        self.cache.as_ref().map(|inv| inv.customer_summaries()).unwrap_or_default()
    }

    /// Replace a customer's overrides on the server, then mirror the change
    /// into the cache
    pub async fn save_customer_vars(&mut self, id: &str, vars: VarMap) -> Result<Ack> {
        let resp = self
            .request(reqwest::Method::POST, "/api/inventory/save")
            .json(&json!({ "customer": id, "vars": &vars }))
            .send()
            .await?;
        let ack: Ack = serde_json::from_value(read_body(resp, id).await?)?;
        if let Some(inv) = self.cache.as_mut() {
            inv.set_customer_vars(id, vars, false);
        }
        Ok(ack)
    }

    /// The customer's own overrides from the cache, without defaults
    pub fn overrides(&self, id: &str) -> VarMap {
        self.cache
            .as_ref()
            .and_then(|inv| inv.all.hosts.get(id))
            .map(|host| host.vars.clone())
            .unwrap_or_default()
    }

    /// Change some keys and keep the rest: reloads the tree, folds `changes`
    /// into the current overrides and saves the result as a full replacement
    pub async fn update_customer_vars(&mut self, id: &str, changes: VarMap) -> Result<Ack> {
        self.load_inventory().await?;
        let mut vars = self.overrides(id);
        vars.extend(changes);
        self.save_customer_vars(id, vars).await
    }

    /// Ask the server to start the playbook; returns once it is accepted
    pub async fn run_playbook(&self, id: &str, extra_vars: &VarMap, tags: Option<&str>) -> Result<RunAck> {
        let mut body = json!({ "customer": id, "extra_vars": extra_vars });
        if let Some(tags) = tags {
            body["tags"] = json!(tags);
        }
        let resp = self.request(reqwest::Method::POST, "/api/run").json(&body).send().await?;
        Ok(serde_json::from_value(read_body(resp, id).await?)?)
    }
}

/// Decode a response, turning the error envelope into typed errors
async fn read_body(resp: reqwest::Response, subject: &str) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await?;
    let body: Option<Value> = serde_json::from_str(&text).ok();
    let message = body
        .as_ref()
        .and_then(|b| b.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(text.as_str())
        .to_string();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(OpsError::not_found("Resource", subject));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(OpsError::Unauthorized(message));
    }
    let Some(body) = body else {
        return if status.is_success() {
            Err(OpsError::Parse(format!("Response is not JSON: {}", truncate(&text))))
        } else {
            Err(OpsError::Network(format!("HTTP {}: {}", status.as_u16(), truncate(&text))))
        };
    };
    if body.get("status").and_then(|s| s.as_str()) == Some("error") {
        let errors: Vec<String> = body
            .get("errors")
            .and_then(|e| serde_json::from_value(e.clone()).ok())
            .unwrap_or_else(|| vec![message.clone()]);
        return Err(if status.is_server_error() {
            OpsError::Network(format!("HTTP {}: {}", status.as_u16(), message))
        } else {
            OpsError::Validation(errors)
        });
    }
    if !status.is_success() {
        return Err(OpsError::Network(format!("HTTP {}: {}", status.as_u16(), message)));
    }
    Ok(body)
}

/// Parse a `key=value` command-line assignment. `true`/`false` become
/// booleans and whole numbers integers; everything else stays text.
pub fn parse_assignment(arg: &str) -> Result<(String, VarValue)> {
    let Some((key, raw)) = arg.split_once('=') else {
        return Err(OpsError::validation(format!("Expected key=value, got '{}'", arg)));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(OpsError::validation(format!("Missing key in '{}'", arg)));
    }
    let value = match raw {
        "true" => VarValue::Bool(true),
        "false" => VarValue::Bool(false),
        _ => raw.parse::<i64>().map(VarValue::Int).unwrap_or_else(|_| VarValue::Text(raw.to_string())),
    };
    Ok((key.to_string(), value))
}

fn truncate(s: &str) -> String {
    s.chars().take(200).collect()
}
