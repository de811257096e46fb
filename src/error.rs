// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Error types shared by the dashboard server and the inventory client

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Result alias used across OpsDeck
pub type Result<T> = std::result::Result<T, OpsError>;

#[derive(Debug, Error)]
pub enum OpsError {
    /// Transport failure or unreachable server
    #[error("Network error: {0}")]
    Network(String),

    /// Body was not JSON, or not the JSON we expected
    #[error("Parse error: {0}")]
    Parse(String),

    /// A payload was rejected; every problem found is listed
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Inventory file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An external command (crontab, ansible-playbook, systemctl) failed
    #[error("Command failed: {0}")]
    Command(String),

    #[error("Docker error: {0}")]
    Docker(String),
}

impl OpsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        OpsError::Validation(vec![msg.into()])
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        OpsError::NotFound { kind, id: id.into() }
    }
}

impl From<serde_json::Error> for OpsError {
    fn from(e: serde_json::Error) -> Self {
        OpsError::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for OpsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            OpsError::Parse(e.to_string())
        } else {
            OpsError::Network(e.to_string())
        }
    }
}

impl ResponseError for OpsError {
    fn status_code(&self) -> StatusCode {
        match self {
            OpsError::Validation(_) => StatusCode::BAD_REQUEST,
            OpsError::Parse(_) => StatusCode::BAD_REQUEST,
            OpsError::NotFound { .. } => StatusCode::NOT_FOUND,
            OpsError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            OpsError::Network(_) | OpsError::Docker(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        });
        if let OpsError::Validation(errors) = self {
            body["errors"] = serde_json::json!(errors);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}
