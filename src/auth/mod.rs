// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Authentication: shared API key carried in a request header
//!
//! When no key is configured every request passes.

use actix_web::HttpRequest;
use tracing::warn;

pub struct ApiKeyAuth {
    key: Option<String>,
    header: String,
}

impl ApiKeyAuth {
    pub fn new(key: Option<String>, header: impl Into<String>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()),
            header: header.into(),
        }
    }

    /// Auth disabled
    pub fn open() -> Self {
        Self::new(None, "X-API-Key")
    }

    pub fn enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Check a request's key header
    pub fn check(&self, req: &HttpRequest) -> bool {
        let Some(expected) = &self.key else {
            return true;
        };
        let provided = req
            .headers()
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let ok = validate_key(provided, expected);
        if !ok {
            warn!("Rejected request to {} with missing or bad API key", req.path());
        }
        ok
    }
}

/// Compare a provided key against the expected one in constant time
pub fn validate_key(provided: &str, expected: &str) -> bool {
    if provided.is_empty() || expected.is_empty() {
        return false;
    }
    provided.len() == expected.len()
        && provided.as_bytes().iter().zip(expected.as_bytes().iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn key_comparison() {
        assert!(validate_key("abc123", "abc123"));
        assert!(!validate_key("abc124", "abc123"));
        assert!(!validate_key("abc", "abc123"));
        assert!(!validate_key("", ""));
    }

    #[test]
    fn open_auth_passes_everything() {
        let req = TestRequest::default().to_http_request();
        assert!(ApiKeyAuth::open().check(&req));
        assert!(!ApiKeyAuth::new(Some(String::new()), "X-API-Key").enabled());
    }

    #[test]
    fn header_is_checked() {
        let auth = ApiKeyAuth::new(Some("s3cret".into()), "X-Ops-Key");
        let good = TestRequest::default().insert_header(("X-Ops-Key", "s3cret")).to_http_request();
        let bad = TestRequest::default().insert_header(("X-API-Key", "s3cret")).to_http_request();
        assert!(auth.check(&good));
        assert!(!auth.check(&bad));
    }
}
