//! Path resolution for stackshift.
//!
//! # Environment Variables
//!
//! - `STACKSHIFT_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `STACKSHIFT_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/stackshift` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\stackshift`
//!    - macOS/Linux: `~/.config/stackshift`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STACKSHIFT_CONFIG_DIR";

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the stackshift config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        let path = PathBuf::from(xdg_config).join("stackshift");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("stackshift"));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("stackshift"))
}

/// Path of the config file.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand `path` and make it absolute against the current directory.
pub fn workspace(path: &Path) -> Result<PathBuf> {
    let expanded = expand(&path.to_string_lossy());
    std::path::absolute(&expanded)
        .with_context(|| format!("Invalid workspace path: {}", expanded.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value`, restoring it afterwards.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: only this test touches STACKSHIFT_CONFIG_DIR
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: see above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        let dir = with_env_var(ENV_CONFIG_DIR, "/tmp/stackshift-test", || config_dir().unwrap());
        assert_eq!(dir, PathBuf::from("/tmp/stackshift-test"));
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand("~/infra");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("infra"));
    }

    #[test]
    fn test_workspace_is_absolute() {
        assert!(workspace(Path::new(".")).unwrap().is_absolute());
    }
}
