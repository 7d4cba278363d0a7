//! Change summary parsing for `pulumi preview`.
//!
//! The engine prints a human-readable summary such as
//!
//! ```text
//! Resources:
//!     + 2 to create
//!     ~ 1 to update
//!     4 unchanged
//! ```
//!
//! Only the pending create/update/delete/replace counts matter here.

use regex::Regex;
use std::sync::LazyLock;

static CHANGE_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)(\d+)\s+(?:resources?\s+)?to\s+(create|update|delete|replace)\b").ok()
});

/// Pending changes reported by a preview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Resources to create
    pub create: u64,
    /// Resources to update
    pub update: u64,
    /// Resources to delete
    pub delete: u64,
    /// Resources to replace
    pub replace: u64,
}

impl ChangeSummary {
    /// Parse the counts out of preview output. Lines that do not mention a
    /// pending change are ignored.
    pub fn parse(text: &str) -> Self {
        let mut summary = Self::default();
        let Some(re) = CHANGE_LINE.as_ref() else {
            return summary;
        };
        for caps in re.captures_iter(text) {
            let count: u64 = caps[1].parse().unwrap_or(0);
            let slot = match &caps[2] {
                "create" => &mut summary.create,
                "update" => &mut summary.update,
                "delete" => &mut summary.delete,
                "replace" => &mut summary.replace,
                _ => continue,
            };
            *slot = slot.saturating_add(count);
        }
        summary
    }

    /// Total pending changes.
    pub fn total(&self) -> u64 {
        self.create
            .saturating_add(self.update)
            .saturating_add(self.delete)
            .saturating_add(self.replace)
    }

    /// Whether anything would change.
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }

    /// One-line description, e.g. `2 to create, 1 to update`.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = [
            (self.create, "create"),
            (self.update, "update"),
            (self.delete, "delete"),
            (self.replace, "replace"),
        ]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, what)| format!("{n} to {what}"))
        .collect();
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}
