// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Inventory: the Ansible customer tree and its variable model
//!
//! The inventory has a single top-level group `all` with default `vars`
//! and one `hosts` entry per customer carrying that customer's overrides.
//! A customer's effective configuration is the shallow overlay of the two.
//! Anything else in the file (`children`, host keys such as `ansible_host`,
//! other top-level groups) is carried through untouched in `extra`.

pub mod api;
pub mod categorize;
pub mod schema;
pub mod store;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat variable mapping, keyed by exact variable name
pub type VarMap = BTreeMap<String, VarValue>;

/// An inventory value. Scalars are typed; lists and maps pass through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// `key:` with no value in the YAML file
    Null,
    Structured(serde_yaml::Value),
}

impl VarValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VarValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            VarValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Bool(b) => write!(f, "{}", b),
            VarValue::Int(n) => write!(f, "{}", n),
            VarValue::Float(x) => write!(f, "{}", x),
            VarValue::Text(s) => write!(f, "{}", s),
            VarValue::Null => Ok(()),
            VarValue::Structured(v) => write!(f, "{}", serde_json::to_string(v).unwrap_or_default()),
        }
    }
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self { VarValue::Bool(b) }
}

impl From<i64> for VarValue {
    fn from(n: i64) -> Self { VarValue::Int(n) }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self { VarValue::Text(s.to_string()) }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self { VarValue::Text(s) }
}

/// Whole inventory file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default, deserialize_with = "null_as_default")]
    pub all: Group,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// The `all` group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, deserialize_with = "null_as_default")]
    pub vars: VarMap,
    #[serde(default, deserialize_with = "hosts_or_empty")]
    pub hosts: BTreeMap<String, Host>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// One customer entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Host {
    #[serde(default, deserialize_with = "null_as_default")]
    pub vars: VarMap,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// Summary row for the customer list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub name: String,
    pub state: String,
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// `customer1:` with nothing under it is a valid host with no overrides
fn hosts_or_empty<'de, D>(d: D) -> Result<BTreeMap<String, Host>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<Host>>> = Option::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(id, host)| (id, host.unwrap_or_default()))
        .collect())
}

/// Shallow overlay: every key of `overrides` replaces the same key of `defaults`
pub fn overlay(defaults: &VarMap, overrides: &VarMap) -> VarMap {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

impl Inventory {
    pub fn has_customer(&self, id: &str) -> bool {
        self.all.hosts.contains_key(id)
    }

    pub fn customer_ids(&self) -> Vec<String> {
        self.all.hosts.keys().cloned().collect()
    }

    /// Effective variables for one customer. Unknown customers yield an empty map.
    pub fn customer_vars(&self, id: &str) -> VarMap {
        match self.all.hosts.get(id) {
            Some(host) => overlay(&self.all.vars, &host.vars),
            None => VarMap::new(),
        }
    }

    /// Look a single variable up, customer override first, then the default
    pub fn resolve(&self, id: &str, key: &str) -> Option<&VarValue> {
        self.all.hosts
            .get(id)
            .and_then(|h| h.vars.get(key))
            .or_else(|| self.all.vars.get(key))
    }

    /// Default (group-level) variable as text
    pub fn default_text(&self, key: &str) -> Option<&str> {
        self.all.vars.get(key).and_then(|v| v.as_str())
    }

    pub fn customer_summaries(&self) -> BTreeMap<String, CustomerSummary> {
        self.all.hosts.iter()
            .map(|(id, host)| {
                let name = host.vars.get("customer_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or(id)
                    .to_string();
                let state = host.vars.get("customer_state")
                    .and_then(|v| v.as_str())
                    .unwrap_or("down")
                    .to_string();
                (id.clone(), CustomerSummary { name, state })
            })
            .collect()
    }

    /// Display name for a customer (`customer_name` or the id)
    pub fn display_name(&self, id: &str) -> String {
        self.all.hosts
            .get(id)
            .and_then(|h| h.vars.get("customer_name"))
            .and_then(|v| v.as_str())
            .unwrap_or(id)
            .to_string()
    }

    /// Store a customer's variables, creating the host entry when missing.
    /// With `merge` the given keys are folded into the existing overrides,
    /// otherwise they replace them.
    pub fn set_customer_vars(&mut self, id: &str, vars: VarMap, merge: bool) {
        let host = self.all.hosts.entry(id.to_string()).or_default();
        if merge {
            host.vars.extend(vars);
        } else {
            host.vars = vars;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Inventory {
        let yaml = r#"
all:
  vars:
    a: 1
    b: 2
    customer_backup_enabled: false
  hosts:
    acme:
      vars:
        b: 3
        c: 4
        customer_name: Acme Ltd
        customer_state: up
    bare:
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn overlay_prefers_customer_values() {
        let inv = sample();
        let vars = inv.customer_vars("acme");
        assert_eq!(vars.get("a"), Some(&VarValue::Int(1)));
        assert_eq!(vars.get("b"), Some(&VarValue::Int(3)));
        assert_eq!(vars.get("c"), Some(&VarValue::Int(4)));
    }

    #[test]
    fn unknown_customer_has_no_vars() {
        assert!(sample().customer_vars("nobody").is_empty());
    }

    #[test]
    fn host_without_body_gets_defaults() {
        let inv = sample();
        assert!(inv.has_customer("bare"));
        assert_eq!(inv.customer_vars("bare").get("a"), Some(&VarValue::Int(1)));
    }

    #[test]
    fn missing_hosts_means_no_customers() {
        let inv: Inventory = serde_yaml::from_str("all:\n  vars:\n    a: 1\n").unwrap();
        assert!(inv.customer_ids().is_empty());
        let inv: Inventory = serde_json::from_str("{}").unwrap();
        assert!(inv.customer_ids().is_empty());
    }

    #[test]
    fn summaries_fall_back_to_id_and_down() {
        let summaries = sample().customer_summaries();
        assert_eq!(summaries["acme"], CustomerSummary { name: "Acme Ltd".into(), state: "up".into() });
        assert_eq!(summaries["bare"], CustomerSummary { name: "bare".into(), state: "down".into() });
    }

    #[test]
    fn set_vars_replaces_or_merges() {
        let mut inv = sample();
        let mut update = VarMap::new();
        update.insert("d".into(), VarValue::Bool(true));

        inv.set_customer_vars("acme", update.clone(), true);
        assert!(inv.all.hosts["acme"].vars.contains_key("c"));
        assert!(inv.all.hosts["acme"].vars.contains_key("d"));

        inv.set_customer_vars("acme", update, false);
        assert_eq!(inv.all.hosts["acme"].vars.len(), 1);

        inv.set_customer_vars("newco", VarMap::new(), false);
        assert!(inv.has_customer("newco"));
    }

    #[test]
    fn unmodelled_keys_are_kept() {
        let yaml = r#"
all:
  vars:
    customer_extra_hosts: [a, b]
  children:
    prod:
      hosts:
        acme:
  hosts:
    acme:
      ansible_host: 10.0.0.5
      vars:
        customer_limits: {cpu: 2}
staging:
  hosts: {}
"#;
        let inv: Inventory = serde_yaml::from_str(yaml).unwrap();
        assert!(inv.all.extra.contains_key("children"));
        assert!(inv.extra.contains_key("staging"));
        assert_eq!(
            inv.all.hosts["acme"].extra.get("ansible_host").and_then(|v| v.as_str()),
            Some("10.0.0.5")
        );
        let vars = inv.customer_vars("acme");
        assert!(matches!(vars.get("customer_extra_hosts"), Some(VarValue::Structured(_))));
        assert_eq!(vars["customer_limits"].to_string(), r#"{"cpu":2}"#);

        let again: Inventory = serde_yaml::from_str(&serde_yaml::to_string(&inv).unwrap()).unwrap();
        assert_eq!(again, inv);
    }

    #[test]
    fn resolve_checks_override_then_default() {
        let inv = sample();
        assert_eq!(inv.resolve("acme", "b"), Some(&VarValue::Int(3)));
        assert_eq!(inv.resolve("acme", "customer_backup_enabled"), Some(&VarValue::Bool(false)));
        assert_eq!(inv.resolve("acme", "zzz"), None);
    }
}
