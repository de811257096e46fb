// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Customer view-model: the categorized variables of one customer arranged
//! as tabs of typed fields, ready for any front end to render

use crate::cron::schedule::CronSchedule;
use crate::inventory::categorize::{categorize_with, UnmatchedPolicy, MODULES};
use crate::inventory::schema::{KeySchema, ValueKind};
use crate::inventory::{VarMap, VarValue};
use serde::Serialize;

/// Placeholder shown for secrets. Saving it back keeps the stored secret.
pub const MASK: &str = "********";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Toggle { checked: bool },
    Cron { schedule: CronSchedule, description: String },
    /// Secret; the value is never sent, only [`MASK`]
    Masked,
    Number,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub key: String,
    pub label: String,
    /// Display value; masked fields carry a placeholder
    pub value: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tab {
    pub id: String,
    pub title: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerView {
    pub customer: String,
    pub name: String,
    pub state: String,
    pub tabs: Vec<Tab>,
}

impl CustomerView {
    /// Build the view from a customer's effective variables
    pub fn build(customer: &str, vars: &VarMap, policy: UnmatchedPolicy) -> Self {
        let cats = categorize_with(vars, policy);
        let mut tabs = Vec::new();

        // Module tabs keep the fixed module order
        for module in MODULES {
            if let Some(module_vars) = cats.modules.get(&module) {
                tabs.push(tab(module.as_str(), &title_case(module.as_str()), module_vars, None));
            }
        }
        push_nonempty(&mut tabs, "domain", "Domains", &cats.domain, Some("customer_"));
        push_nonempty(&mut tabs, "backup", "Backup", &cats.backup, Some("customer_backup_"));
        push_nonempty(&mut tabs, "test", "Tests", &cats.test, Some("customer_test_"));
        for (module, db_vars) in &cats.database {
            let prefix = format!("{}_mysql_", module);
            tabs.push(tab(
                &format!("database_{}", module),
                &format!("{} database", title_case(module)),
                db_vars,
                Some(&prefix),
            ));
        }
        push_nonempty(&mut tabs, "other", "Other", &cats.uncategorized, None);

        Self {
            customer: customer.to_string(),
            name: vars
                .get("customer_name")
                .map(|v| v.to_string())
                .unwrap_or_else(|| customer.to_string()),
            state: vars
                .get("customer_state")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "down".to_string()),
            tabs,
        }
    }

    pub fn tab(&self, id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }
}

fn push_nonempty(tabs: &mut Vec<Tab>, id: &str, title: &str, vars: &VarMap, strip: Option<&str>) {
    if !vars.is_empty() {
        tabs.push(tab(id, title, vars, strip));
    }
}

fn tab(id: &str, title: &str, vars: &VarMap, strip: Option<&str>) -> Tab {
    Tab {
        id: id.to_string(),
        title: title.to_string(),
        fields: vars.iter().map(|(k, v)| field(k, v, strip)).collect(),
    }
}

fn field(key: &str, value: &VarValue, strip: Option<&str>) -> Field {
    let short = strip
        .and_then(|p| key.strip_prefix(p))
        .unwrap_or_else(|| key.strip_prefix("customer_").unwrap_or(key));
    let (kind, shown) = match KeySchema.lookup(key).kind {
        ValueKind::Flag => (FieldKind::Toggle { checked: value.as_bool().unwrap_or(false) }, value.to_string()),
        ValueKind::CronSchedule => {
            let schedule = CronSchedule::decode(&value.to_string());
            let description = schedule.describe();
            (FieldKind::Cron { schedule, description }, value.to_string())
        }
        ValueKind::Secret => (FieldKind::Masked, MASK.to_string()),
        ValueKind::Integer => (FieldKind::Number, value.to_string()),
        _ => (FieldKind::Text, value.to_string()),
    };
    Field {
        key: key.to_string(),
        label: title_case(short),
        value: shown,
        kind,
    }
}

/// Undo masking in a payload built from a view: a secret that still reads
/// as [`MASK`] takes its value from `current`, or is dropped when there is none
pub fn restore_masked(vars: &mut VarMap, current: &VarMap) {
    let masked: Vec<String> = vars
        .iter()
        .filter(|(k, v)| v.as_str() == Some(MASK) && KeySchema.lookup(k).kind == ValueKind::Secret)
        .map(|(k, _)| k.clone())
        .collect();
    for key in masked {
        match current.get(&key) {
            Some(value) => vars.insert(key, value.clone()),
            None => vars.remove(&key),
        };
    }
}

/// `portal_frontend` → `Portal Frontend`
fn title_case(s: &str) -> String {
    s.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
