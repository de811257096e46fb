// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Key schema: the registry of known inventory keys, what category each
//! belongs to, what kind of value it holds and how it is checked on save

use super::categorize::{classify, Category};
use super::{VarMap, VarValue};
use crate::cron::schedule::CronSchedule;
use regex::Regex;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$")
        .unwrap_or_else(|e| panic!("domain pattern: {}", e))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Flag,
    Text,
    /// Rendered masked
    Secret,
    /// Non-negative integer
    Integer,
    CronSchedule,
    DomainName,
    /// Domain name or IPv4 address
    Host,
    /// `up` or `down`
    State,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec {
    pub category: Option<Category>,
    pub kind: ValueKind,
}

/// Key registry. Category comes from the categorizer rules; value kind
/// from the key name.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeySchema;

impl KeySchema {
    pub fn lookup(&self, key: &str) -> KeySpec {
        KeySpec { category: classify(key), kind: kind_of(key) }
    }

    /// Check one value against its key's kind
    pub fn check(&self, key: &str, value: &VarValue) -> Result<(), String> {
        let kind = kind_of(key);
        let ok = match kind {
            ValueKind::Flag => value.as_bool().is_some(),
            ValueKind::Integer => matches!(value, VarValue::Int(n) if *n >= 0)
                || value.as_str().is_some_and(|s| s.parse::<u32>().is_ok()),
            ValueKind::State => matches!(value.as_str(), Some("up") | Some("down")),
            ValueKind::DomainName => value.as_str().is_some_and(is_domain),
            ValueKind::Host => value.as_str().is_some_and(|s| is_domain(s) || s.parse::<Ipv4Addr>().is_ok()),
            ValueKind::CronSchedule => {
                return match value.as_str() {
                    Some(s) => CronSchedule::decode(s)
                        .validate()
                        .map_err(|errs| format!("{}: {}", key, errs.join(", "))),
                    None => Err(format!("{}: cron schedule must be a string", key)),
                };
            }
            ValueKind::Text | ValueKind::Secret => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{}: invalid {} value '{}'", key, kind_label(kind), value))
        }
    }

    /// Check a whole variable map, collecting every problem
    pub fn validate(&self, vars: &VarMap) -> Result<(), Vec<String>> {
        let errors: Vec<String> = vars
            .iter()
            .filter_map(|(k, v)| self.check(k, v).err())
            .collect();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

pub fn is_domain(s: &str) -> bool {
    DOMAIN_RE.is_match(s)
}

fn kind_of(key: &str) -> ValueKind {
    match key {
        "customer_state" => return ValueKind::State,
        "customer_domain" => return ValueKind::DomainName,
        "customer_url" => return ValueKind::Host,
        "customer_backup_enabled" => return ValueKind::Flag,
        "customer_backup_keep" => return ValueKind::Integer,
        _ => {}
    }
    if key.starts_with("customer_backup_cron_") {
        ValueKind::CronSchedule
    } else if key.starts_with("customer_test_") || (key.starts_with("customer_") && key.ends_with("_update")) {
        ValueKind::Flag
    } else if key.ends_with("_mysql_password") || key.ends_with("_mysql_root_password") {
        ValueKind::Secret
    } else {
        ValueKind::Text
    }
}

fn kind_label(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Flag => "boolean",
        ValueKind::Text => "text",
        ValueKind::Secret => "secret",
        ValueKind::Integer => "non-negative integer",
        ValueKind::CronSchedule => "cron",
        ValueKind::DomainName => "domain",
        ValueKind::Host => "domain or IPv4",
        ValueKind::State => "state (up/down)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_key_names() {
        let schema = KeySchema;
        assert_eq!(schema.lookup("lms_mysql_root_password").kind, ValueKind::Secret);
        assert_eq!(schema.lookup("lms_mysql_user").kind, ValueKind::Text);
        assert_eq!(schema.lookup("customer_backup_cron_volumes").kind, ValueKind::CronSchedule);
        assert_eq!(schema.lookup("customer_gateway_update").kind, ValueKind::Flag);
        assert_eq!(schema.lookup("customer_state").category, None);
    }

    #[test]
    fn domain_and_host_checks() {
        let schema = KeySchema;
        assert!(schema.check("customer_domain", &"example.com".into()).is_ok());
        assert!(schema.check("customer_domain", &"not a domain".into()).is_err());
        assert!(schema.check("customer_url", &"10.0.0.5".into()).is_ok());
        assert!(schema.check("customer_url", &"portal.example.co.uk".into()).is_ok());
        assert!(schema.check("customer_url", &"http://x".into()).is_err());
    }

    #[test]
    fn validate_collects_all_errors() {
        let mut vars = VarMap::new();
        vars.insert("customer_state".into(), "sideways".into());
        vars.insert("customer_backup_keep".into(), VarValue::Int(-1));
        vars.insert("customer_backup_cron_databases".into(), "99 * * * *".into());
        vars.insert("customer_backup_enabled".into(), VarValue::Bool(true));
        vars.insert("customer_name".into(), "Acme".into());
        let errs = KeySchema.validate(&vars).unwrap_err();
        assert_eq!(errs.len(), 3);
    }

    #[test]
    fn string_retention_is_accepted() {
        assert!(KeySchema.check("customer_backup_keep", &"14".into()).is_ok());
        assert!(KeySchema.check("customer_backup_keep", &VarValue::Int(7)).is_ok());
    }
}
