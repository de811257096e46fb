// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Cron field codec: five-field schedule strings to and from a struct

use serde::{Deserialize, Serialize};

fn star() -> String {
    "*".to_string()
}

/// The five fields of a cron schedule, in crontab order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    #[serde(default = "star")]
    pub minute: String,
    #[serde(default = "star")]
    pub hour: String,
    #[serde(default = "star")]
    pub day_of_month: String,
    #[serde(default = "star")]
    pub month: String,
    #[serde(default = "star")]
    pub day_of_week: String,
}

impl Default for CronSchedule {
    fn default() -> Self {
        Self { minute: star(), hour: star(), day_of_month: star(), month: star(), day_of_week: star() }
    }
}

/// (name, min, max) per field position
const FIELD_RANGES: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day_of_month", 1, 31),
    ("month", 1, 12),
    ("day_of_week", 0, 7),
];

impl CronSchedule {
    /// Split on whitespace; missing positions become `*`, extra tokens are
    /// ignored. Never fails and does not check syntax.
    pub fn decode(raw: &str) -> Self {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let mut next = || parts.next().unwrap_or_else(star);
        Self {
            minute: next(),
            hour: next(),
            day_of_month: next(),
            month: next(),
            day_of_week: next(),
        }
    }

    /// Join the fields with single spaces; empty fields are written as `*`
    pub fn encode(&self) -> String {
        self.fields()
            .iter()
            .map(|f| if f.trim().is_empty() { "*" } else { f.trim() })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn fields(&self) -> [&str; 5] {
        [&self.minute, &self.hour, &self.day_of_month, &self.month, &self.day_of_week]
    }

    /// Range and syntax check of every field (lists, ranges, steps)
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let errors: Vec<String> = self
            .fields()
            .iter()
            .zip(FIELD_RANGES.iter())
            .filter(|(value, (_, min, max))| !validate_field(value, *min, *max))
            .map(|(value, (name, min, max))| {
                format!("{} '{}' is invalid (allowed {}-{})", name, value, min, max)
            })
            .collect();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Short English description, e.g. "minute 0, hour 2"
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self
            .fields()
            .iter()
            .zip(FIELD_RANGES.iter())
            .filter(|(value, _)| **value != "*")
            .map(|(value, (name, _, _))| format!("{} {}", name.replace('_', " "), value))
            .collect();
        if parts.is_empty() {
            "every minute".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Validate one field: `*`, a number, `a-b`, `*/n`, `a-b/n`, or a comma list of those
pub fn validate_field(field: &str, min: u32, max: u32) -> bool {
    if field.is_empty() {
        return false;
    }
    field.split(',').all(|item| validate_item(item, min, max))
}

fn validate_item(item: &str, min: u32, max: u32) -> bool {
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => (base, Some(step)),
        None => (item, None),
    };
    if let Some(step) = step {
        match step.parse::<u32>() {
            Ok(n) if n >= 1 && n <= max.max(1) => {}
            _ => return false,
        }
    }
    if base == "*" {
        return true;
    }
    match base.split_once('-') {
        Some((lo, hi)) => match (in_range(lo, min, max), in_range(hi, min, max)) {
            (Some(lo), Some(hi)) => lo <= hi,
            _ => false,
        },
        None => in_range(base, min, max).is_some(),
    }
}

fn in_range(s: &str, min: u32, max: u32) -> Option<u32> {
    s.parse::<u32>().ok().filter(|n| (min..=max).contains(n))
}

/// Collapse runs of whitespace to single spaces
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
