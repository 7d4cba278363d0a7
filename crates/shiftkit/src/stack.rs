//! Stack references and organization resolution.

use std::fmt;

/// A stack as addressed on the command line: `[org/]name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRef {
    /// Organization prefix, when the reference carried one
    pub organization: Option<String>,
    /// Stack name (may itself contain `/` for `project/stack` forms)
    pub name: String,
}

impl StackRef {
    /// Parse `org/name` or `name`. The organization is everything before the
    /// first `/`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_matches('/');
        if raw.is_empty() {
            return None;
        }
        match raw.split_once('/') {
            Some((org, name)) if !org.is_empty() && !name.is_empty() => Some(Self {
                organization: Some(org.to_string()),
                name: name.to_string(),
            }),
            _ => Some(Self {
                organization: None,
                name: raw.to_string(),
            }),
        }
    }

    /// Stack without an organization.
    pub fn unqualified(name: &str) -> Self {
        Self {
            organization: None,
            name: name.to_string(),
        }
    }

    /// Effective organization: an explicit value overrides the embedded one.
    pub fn effective_organization<'a>(&'a self, explicit: Option<&'a str>) -> Option<&'a str> {
        explicit
            .filter(|o| !o.is_empty())
            .or(self.organization.as_deref())
    }

    /// Address used on the engine command line.
    ///
    /// `org2` applied to `org1/stackA` gives `org2/stackA`; no organization
    /// anywhere gives the bare name.
    pub fn qualified(&self, explicit: Option<&str>) -> String {
        match self.effective_organization(explicit) {
            Some(org) => format!("{org}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// File-name friendly form, used for the staged export.
    pub fn file_stem(&self) -> String {
        self.qualified(None)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect()
    }
}

impl fmt::Display for StackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified(None))
    }
}
