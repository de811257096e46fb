// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Inventory persistence: the YAML file is the source of truth

use super::{Inventory, VarMap};
use crate::error::{OpsError, Result};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

/// File-backed inventory. Reads go straight to disk; writes are
/// serialized by a process-wide lock and land atomically.
pub struct InventoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl InventoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the tree. A missing file is an empty inventory.
    pub fn load(&self) -> Result<Inventory> {
        match fs::read_to_string(&self.path) {
            Ok(data) if data.trim().is_empty() => Ok(Inventory::default()),
            Ok(data) => Ok(serde_yaml::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Inventory::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Update one customer's overrides and persist. The edit is made on the
    /// raw YAML tree so only `all.hosts.<customer>.vars` changes.
    pub fn save_customer(&self, customer: &str, vars: VarMap, merge: bool) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut root = self.load_raw()?;
        set_host_vars(&mut root, customer, vars, merge)?;
        // Refuse to write a tree we could not read back
        serde_yaml::from_value::<Inventory>(root.clone())?;
        self.write(&root).inspect_err(|e| {
            error!("Failed to save inventory {}: {}", self.path.display(), e);
        })?;
        info!("Saved inventory vars for customer {} (merge={})", customer, merge);
        Ok(())
    }

    fn load_raw(&self) -> Result<Value> {
        match fs::read_to_string(&self.path) {
            Ok(data) if data.trim().is_empty() => Ok(Value::Mapping(Mapping::new())),
            Ok(data) => Ok(serde_yaml::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::Mapping(Mapping::new())),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, root: &Value) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let yaml = serde_yaml::to_string(root)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, yaml)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn set_host_vars(root: &mut Value, customer: &str, vars: VarMap, merge: bool) -> Result<()> {
    if root.is_null() {
        *root = Value::Mapping(Mapping::new());
    }
    let root = root
        .as_mapping_mut()
        .ok_or_else(|| OpsError::Parse("inventory root is not a mapping".to_string()))?;
    let all = child_mapping(root, "all")?;
    let hosts = child_mapping(all, "hosts")?;
    let host = child_mapping(hosts, customer)?;

    let Value::Mapping(new_vars) = serde_yaml::to_value(&vars)? else {
        return Err(OpsError::Parse("customer vars did not serialize as a mapping".to_string()));
    };
    if merge {
        child_mapping(host, "vars")?.extend(new_vars);
    } else {
        host.insert(Value::String("vars".to_string()), Value::Mapping(new_vars));
    }
    Ok(())
}

/// The mapping under `key`, created when absent or empty
fn child_mapping<'a>(parent: &'a mut Mapping, key: &str) -> Result<&'a mut Mapping> {
    let slot = parent.entry(Value::String(key.to_string())).or_insert(Value::Null);
    if slot.is_null() {
        *slot = Value::Mapping(Mapping::new());
    }
    slot.as_mapping_mut()
        .ok_or_else(|| OpsError::Parse(format!("inventory key '{}' is not a mapping", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::VarValue;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = InventoryStore::new(dir.path().join("inventory.yml"));
        let inv = store.load().unwrap();
        assert!(inv.all.hosts.is_empty());
        assert!(inv.all.vars.is_empty());
    }

    #[test]
    fn save_creates_host_and_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yml");
        fs::write(&path, "all:\n  vars:\n    customer_backup_keep: 7\n  hosts:\n    acme:\n      vars:\n        customer_state: up\n").unwrap();
        let store = InventoryStore::new(&path);

        let mut vars = VarMap::new();
        vars.insert("customer_domain".into(), "newco.example.com".into());
        store.save_customer("newco", vars, false).unwrap();

        let inv = store.load().unwrap();
        assert_eq!(inv.all.vars.get("customer_backup_keep"), Some(&VarValue::Int(7)));
        assert!(inv.has_customer("acme"));
        assert_eq!(
            inv.customer_vars("newco").get("customer_domain"),
            Some(&VarValue::Text("newco.example.com".into()))
        );
        assert!(!dir.path().join("inventory.yml.tmp").exists());
    }

    #[test]
    fn save_leaves_the_rest_of_the_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yml");
        fs::write(
            &path,
            "all:\n  vars:\n    customer_extra_hosts: [a, b]\n  children:\n    prod:\n      hosts:\n        acme:\n  hosts:\n    acme:\n      ansible_host: 10.0.0.5\n      vars:\n        customer_state: up\nstaging:\n  hosts:\n    qa1:\n",
        )
        .unwrap();
        let store = InventoryStore::new(&path);

        let mut vars = VarMap::new();
        vars.insert("customer_state".into(), "down".into());
        store.save_customer("acme", vars, false).unwrap();

        let raw: Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["all"]["children"]["prod"]["hosts"].as_mapping().unwrap().contains_key("acme"));
        assert_eq!(raw["all"]["hosts"]["acme"]["ansible_host"].as_str(), Some("10.0.0.5"));
        assert_eq!(raw["all"]["hosts"]["acme"]["vars"]["customer_state"].as_str(), Some("down"));
        assert_eq!(raw["all"]["vars"]["customer_extra_hosts"][1].as_str(), Some("b"));
        assert!(raw["staging"]["hosts"].as_mapping().unwrap().contains_key("qa1"));

        let inv = store.load().unwrap();
        assert!(matches!(
            inv.customer_vars("acme").get("customer_extra_hosts"),
            Some(VarValue::Structured(_))
        ));
    }

    #[test]
    fn save_rejects_a_non_mapping_hosts_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yml");
        fs::write(&path, "all:\n  hosts: [acme]\n").unwrap();
        let store = InventoryStore::new(&path);
        assert!(matches!(store.save_customer("acme", VarMap::new(), false), Err(OpsError::Parse(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "all:\n  hosts: [acme]\n");
    }

    #[test]
    fn merge_keeps_existing_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let store = InventoryStore::new(dir.path().join("inv.yml"));
        let mut first = VarMap::new();
        first.insert("customer_state".into(), "up".into());
        store.save_customer("acme", first, false).unwrap();

        let mut second = VarMap::new();
        second.insert("customer_test_enabled".into(), VarValue::Bool(true));
        store.save_customer("acme", second, true).unwrap();

        let vars = store.load().unwrap().customer_vars("acme");
        assert_eq!(vars.len(), 2);
    }
}
