//! Pulumi project descriptor (`Pulumi.yaml`).

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Descriptor file names, in lookup order.
pub const PROJECT_FILES: [&str; 2] = ["Pulumi.yaml", "Pulumi.yml"];

/// Suffix appended to the project name to derive a bucket name.
pub const DEFAULT_BUCKET_SUFFIX: &str = "pulumi-state";

/// The parts of `Pulumi.yaml` this tool reads.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Project {
    /// Project name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Backend pinned by the project, if any
    #[serde(default)]
    pub backend: Option<ProjectBackend>,
}

/// `backend:` section of the descriptor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProjectBackend {
    /// Backend URL, e.g. `s3://my-state?region=eu-west-1`
    #[serde(default)]
    pub url: Option<String>,
}

impl Project {
    /// Path of the descriptor in `workspace`, if there is one.
    pub fn find(workspace: &Path) -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(|name| workspace.join(name))
            .find(|path| path.is_file())
    }

    /// Load the descriptor from `workspace`.
    pub fn load(workspace: &Path) -> Result<Self> {
        let Some(path) = Self::find(workspace) else {
            return Err(Error::Project {
                path: workspace.join(PROJECT_FILES[0]),
                message: "no Pulumi project in this directory".to_string(),
            });
        };
        let content = fs::read_to_string(&path)?;
        serde_yaml::from_str(&content).map_err(|e| Error::Project {
            path,
            message: e.to_string(),
        })
    }

    /// Backend URL pinned in the descriptor.
    pub fn backend_url(&self) -> Option<&str> {
        self.backend
            .as_ref()
            .and_then(|b| b.url.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    /// Default bucket name for this project.
    pub fn bucket_name(&self, suffix: &str) -> String {
        derive_bucket_name(&self.name, suffix)
    }
}

/// `<project>-<suffix>` as a valid bucket name: lowercase, anything outside
/// `[a-z0-9-]` replaced by `-`, no leading, trailing or repeated dashes.
pub fn derive_bucket_name(project: &str, suffix: &str) -> String {
    let raw = if suffix.is_empty() {
        project.to_string()
    } else {
        format!("{project}-{suffix}")
    };
    let mut name = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && (name.is_empty() || name.ends_with('-')) {
            continue;
        }
        name.push(c);
    }
    name.trim_end_matches('-').to_string()
}
