//! User configuration (`config.toml`).
//!
//! Every key is optional; command-line flags override the file and the file
//! overrides built-in defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use shiftkit::Settings;
use shiftkit::location::DEFAULT_REGION;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Region used when neither `--region` nor the AWS variables set one
    pub region: Option<String>,
    /// Suffix for derived bucket names
    pub bucket_suffix: Option<String>,
    /// Default KMS alias
    pub kms_alias: Option<String>,
    /// Staging directory name inside the workspace
    pub staging_dir: Option<String>,
    /// Seconds to wait after a policy write next to an explicit deny
    pub policy_propagation_secs: Option<u64>,
    /// Path of the pulumi executable
    pub pulumi_bin: Option<String>,
    /// Path of the aws executable
    pub aws_bin: Option<String>,
}

impl Config {
    /// Load from the config directory; a missing file means defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    /// Workflow settings with the configured overrides applied.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        if let Some(dir) = &self.staging_dir {
            settings.staging_dir.clone_from(dir);
        }
        if let Some(suffix) = &self.bucket_suffix {
            settings.bucket_suffix.clone_from(suffix);
        }
        if let Some(alias) = &self.kms_alias {
            settings.kms_alias = shiftkit::secrets::normalize_alias(alias);
        }
        if let Some(secs) = self.policy_propagation_secs {
            settings.propagation_delay = Duration::from_secs(secs);
        }
        settings
    }

    /// Region from the flag, the environment, this file, or the default.
    pub fn region(&self, flag: Option<&str>) -> String {
        pick_region(
            flag,
            std::env::var("AWS_REGION").ok().as_deref(),
            std::env::var("AWS_DEFAULT_REGION").ok().as_deref(),
            self.region.as_deref(),
        )
    }
}

fn pick_region(
    flag: Option<&str>,
    aws_region: Option<&str>,
    aws_default_region: Option<&str>,
    configured: Option<&str>,
) -> String {
    [flag, aws_region, aws_default_region, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REGION)
        .to_string()
}
