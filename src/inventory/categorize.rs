// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Variable categorizer: buckets a customer's flat variables into the
//! groups the dashboard renders as tabs

use super::{VarMap, VarValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Closed list of deployable modules, in display order
pub const MODULES: [Module; 5] = [
    Module::Gateway,
    Module::Portal,
    Module::PortalFrontend,
    Module::Lms,
    Module::File,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Gateway,
    Portal,
    PortalFrontend,
    Lms,
    File,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Gateway => "gateway",
            Module::Portal => "portal",
            Module::PortalFrontend => "portal_frontend",
            Module::Lms => "lms",
            Module::File => "file",
        }
    }

    pub fn parse(name: &str) -> Option<Module> {
        MODULES.iter().copied().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a key lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Domain,
    Backup,
    Test,
    /// Database settings of the named module (text before `_mysql_`)
    Database(String),
    Module(Module),
}

/// What to do with keys that match no category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    #[default]
    Drop,
    Keep,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizedVars {
    pub modules: BTreeMap<Module, VarMap>,
    pub domain: VarMap,
    pub backup: VarMap,
    pub test: VarMap,
    pub database: BTreeMap<String, VarMap>,
    #[serde(default, skip_serializing_if = "VarMap::is_empty")]
    pub uncategorized: VarMap,
}

/// Classify a single key. First matching rule wins; `None` means the key
/// belongs to no category.
pub fn classify(key: &str) -> Option<Category> {
    if key == "customer_domain" || key == "customer_url" || key.starts_with("customer_subdomain_") {
        return Some(Category::Domain);
    }
    if key.starts_with("customer_backup_") {
        return Some(Category::Backup);
    }
    if key.starts_with("customer_test_") {
        return Some(Category::Test);
    }
    if let Some(pos) = key.find("_mysql_") {
        return Some(Category::Database(key[..pos].to_string()));
    }
    if key == "customer_state" || key.contains("subdomain") {
        return None;
    }
    let rest = key.strip_prefix("customer_")?;
    Module::parse(module_candidate(rest)).map(Category::Module)
}

// Cut at the earliest `_git` or `_update` so `portal_frontend_git_tags`
// yields `portal_frontend`
fn module_candidate(rest: &str) -> &str {
    let cut = [rest.find("_git"), rest.find("_update")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(rest.len());
    &rest[..cut]
}

pub fn categorize(vars: &VarMap) -> CategorizedVars {
    categorize_with(vars, UnmatchedPolicy::Drop)
}

pub fn categorize_with(vars: &VarMap, policy: UnmatchedPolicy) -> CategorizedVars {
    let mut out = CategorizedVars::default();
    for (key, value) in vars {
        match classify(key) {
            Some(Category::Domain) => insert(&mut out.domain, key, value),
            Some(Category::Backup) => insert(&mut out.backup, key, value),
            Some(Category::Test) => insert(&mut out.test, key, value),
            Some(Category::Database(module)) => {
                insert(out.database.entry(module).or_default(), key, value)
            }
            Some(Category::Module(module)) => {
                insert(out.modules.entry(module).or_default(), key, value)
            }
            None => {
                debug!("Uncategorized inventory key '{}'", key);
                if policy == UnmatchedPolicy::Keep && key != "customer_state" {
                    insert(&mut out.uncategorized, key, value);
                }
            }
        }
    }
    out
}

fn insert(map: &mut VarMap, key: &str, value: &VarValue) {
    map.insert(key.to_string(), value.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(keys: &[&str]) -> VarMap {
        keys.iter().map(|k| (k.to_string(), VarValue::Bool(true))).collect()
    }

    #[test]
    fn module_keys_bucket_by_module() {
        let cats = categorize(&vars(&[
            "customer_portal_update",
            "customer_portal_frontend_git_tags",
            "customer_lms_git_branches",
        ]));
        assert!(cats.modules[&Module::Portal].contains_key("customer_portal_update"));
        assert!(cats.modules[&Module::PortalFrontend].contains_key("customer_portal_frontend_git_tags"));
        assert!(cats.modules[&Module::Lms].contains_key("customer_lms_git_branches"));
        assert_eq!(cats.modules.len(), 3);
    }

    #[test]
    fn mysql_keys_bucket_by_prefix() {
        let cats = categorize(&vars(&["lms_mysql_password", "lms_mysql_user", "portal_mysql_db_name"]));
        assert_eq!(cats.database["lms"].len(), 2);
        assert_eq!(cats.database["portal"].len(), 1);
        assert!(cats.modules.is_empty());
    }

    #[test]
    fn subdomain_is_domain_not_backup() {
        let cats = categorize(&vars(&["customer_subdomain_gateway", "customer_backup_keep"]));
        assert!(cats.domain.contains_key("customer_subdomain_gateway"));
        assert!(!cats.backup.contains_key("customer_subdomain_gateway"));
        assert!(cats.backup.contains_key("customer_backup_keep"));
        assert!(!cats.domain.contains_key("customer_backup_keep"));
    }

    #[test]
    fn state_is_never_categorized() {
        let cats = categorize_with(&vars(&["customer_state"]), UnmatchedPolicy::Keep);
        assert_eq!(cats, CategorizedVars::default());
    }

    #[test]
    fn unknown_module_is_dropped_or_kept() {
        let input = vars(&["customer_billing_update", "ansible_user"]);
        assert_eq!(categorize(&input), CategorizedVars::default());

        let kept = categorize_with(&input, UnmatchedPolicy::Keep);
        assert_eq!(kept.uncategorized.len(), 2);
    }

    #[test]
    fn precedence_follows_rule_order() {
        assert_eq!(classify("customer_backup_mysql_x"), Some(Category::Backup));
        assert_eq!(classify("customer_test_enabled"), Some(Category::Test));
        assert_eq!(classify("customer_url"), Some(Category::Domain));
        assert_eq!(classify("customer_gateway"), Some(Category::Module(Module::Gateway)));
        assert_eq!(classify("customer_name"), None);
        assert_eq!(classify("gateway_update"), None);
    }

    fn map(entries: &[(&str, VarValue)]) -> VarMap {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    /// Number of buckets holding `key`
    fn placements(cats: &CategorizedVars, key: &str) -> usize {
        [&cats.domain, &cats.backup, &cats.test]
            .into_iter()
            .chain(cats.modules.values())
            .chain(cats.database.values())
            .filter(|bucket| bucket.contains_key(key))
            .count()
    }

    #[test]
    fn gateway_module_holds_both_keys() {
        let input = map(&[
            ("customer_gateway_update", VarValue::Bool(true)),
            ("customer_gateway_git_branches", "main".into()),
        ]);
        let cats = categorize(&input);
        assert_eq!(cats.modules[&Module::Gateway], input);
        assert_eq!(cats.modules.len(), 1);
    }

    #[test]
    fn lms_database_bucket() {
        let input = map(&[("lms_mysql_db_name", "lms_db".into())]);
        let cats = categorize(&input);
        assert_eq!(cats.database["lms"], input);
        assert_eq!(cats.database.len(), 1);
    }

    #[test]
    fn backup_and_domain_do_not_mix() {
        let cats = categorize(&map(&[
            ("customer_backup_enabled", VarValue::Bool(true)),
            ("customer_domain", "x.com".into()),
        ]));
        assert_eq!(cats.backup, map(&[("customer_backup_enabled", VarValue::Bool(true))]));
        assert_eq!(cats.domain, map(&[("customer_domain", "x.com".into())]));
        assert!(cats.test.is_empty() && cats.modules.is_empty() && cats.database.is_empty());
    }

    #[test]
    fn every_rule_places_a_key_exactly_once() {
        let matching = [
            "customer_domain",
            "customer_url",
            "customer_subdomain_portal",
            "customer_backup_keep",
            "customer_backup_cron_databases",
            "customer_test_smoke",
            "portal_mysql_password",
            "file_mysql_root_password",
            "customer_gateway_update",
            "customer_portal_frontend_git_tags",
            "customer_file_git_branches",
        ];
        for key in matching {
            let cats = categorize(&vars(&[key]));
            assert_eq!(placements(&cats, key), 1, "{} should land in one bucket", key);
        }

        let unmatched = ["customer_state", "customer_name", "customer_billing_update", "ansible_user", "subdomain_x"];
        for key in unmatched {
            let cats = categorize(&vars(&[key]));
            assert_eq!(placements(&cats, key), 0, "{} should land nowhere", key);
            assert_eq!(cats, CategorizedVars::default());
        }
    }

    #[test]
    fn earliest_cut_wins() {
        // `_update` appears before `_git`
        assert_eq!(classify("customer_file_update_git"), Some(Category::Module(Module::File)));
        assert_eq!(module_candidate("gateway"), "gateway");
    }
}
