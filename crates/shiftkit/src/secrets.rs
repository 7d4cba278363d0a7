//! Secrets provider configuration and switching.

use crate::error::{Error, Result};
use crate::exec::{RunOptions, Runner};
use crate::stack::StackRef;
use std::fmt;
use std::path::Path;

/// Environment variable the engine reads the stack passphrase from.
pub const PASSPHRASE_ENV: &str = "PULUMI_CONFIG_PASSPHRASE";

/// Alias used when none is given.
pub const DEFAULT_KMS_ALIAS: &str = "alias/pulumi-secrets";

/// How secret values in stack state are encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsMode {
    /// Backend default: service-managed on Pulumi Cloud
    Default,
    /// Passphrase-derived key
    Passphrase,
    /// AWS KMS key
    KeyManagement,
}

impl SecretsMode {
    /// Parse a CLI token. `service` is the hosted spelling of `default`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "default" | "service" => Some(Self::Default),
            "passphrase" => Some(Self::Passphrase),
            "awskms" | "kms" => Some(Self::KeyManagement),
            _ => None,
        }
    }

    /// Token used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Passphrase => "passphrase",
            Self::KeyManagement => "awskms",
        }
    }
}

impl fmt::Display for SecretsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated secrets provider settings.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretsConfig {
    mode: SecretsMode,
    passphrase: Option<String>,
    key: Option<String>,
    region: String,
}

impl SecretsConfig {
    /// Backend default provider.
    pub fn default_provider(region: &str) -> Self {
        Self {
            mode: SecretsMode::Default,
            passphrase: None,
            key: None,
            region: region.to_string(),
        }
    }

    /// Passphrase provider. An empty passphrase would make the engine prompt,
    /// so it is rejected.
    pub fn passphrase(passphrase: &str, region: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(Error::InvalidSecrets(format!(
                "passphrase mode needs a passphrase (--passphrase or {PASSPHRASE_ENV})"
            )));
        }
        Ok(Self {
            mode: SecretsMode::Passphrase,
            passphrase: Some(passphrase.to_string()),
            key: None,
            region: region.to_string(),
        })
    }

    /// KMS provider addressed by alias; `alias/` is prepended when missing.
    pub fn kms_alias(alias: &str, region: &str) -> Result<Self> {
        let alias = alias.trim();
        if alias.is_empty() || alias == "alias/" {
            return Err(Error::InvalidSecrets(
                "awskms mode needs a key alias".to_string(),
            ));
        }
        Ok(Self::kms(normalize_alias(alias), region))
    }

    /// KMS provider addressed by key id or ARN, used verbatim.
    pub fn kms_key(key: &str, region: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidSecrets("awskms mode needs a key id".to_string()));
        }
        Ok(Self::kms(key.to_string(), region))
    }

    fn kms(key: String, region: &str) -> Self {
        Self {
            mode: SecretsMode::KeyManagement,
            passphrase: None,
            key: Some(key),
            region: region.to_string(),
        }
    }

    /// Provider mode.
    pub fn mode(&self) -> SecretsMode {
        self.mode
    }

    /// KMS alias or key id, for key-management mode.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Region the key lives in.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Value for `--secrets-provider` / `change-secrets-provider`.
    pub fn provider_url(&self) -> String {
        match (self.mode, &self.key) {
            (SecretsMode::KeyManagement, Some(key)) => {
                format!("awskms://{key}?region={}", self.region)
            }
            _ => self.mode.as_str().to_string(),
        }
    }

    /// Environment the engine needs to use this provider without prompting.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(passphrase) = &self.passphrase {
            env.push((PASSPHRASE_ENV.to_string(), passphrase.clone()));
        }
        if self.mode == SecretsMode::KeyManagement {
            env.push(("AWS_REGION".to_string(), self.region.clone()));
        }
        env
    }
}

impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("mode", &self.mode)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("key", &self.key)
            .field("region", &self.region)
            .finish()
    }
}

/// Prefix `alias/` unless already present.
pub fn normalize_alias(alias: &str) -> String {
    if alias.starts_with("alias/") {
        alias.to_string()
    } else {
        format!("alias/{alias}")
    }
}

/// Switches the secrets provider of a stack.
pub struct SecretsManager<'r> {
    runner: &'r dyn Runner,
}

impl<'r> SecretsManager<'r> {
    /// Create a manager using `runner`.
    pub fn new(runner: &'r dyn Runner) -> Self {
        Self { runner }
    }

    /// Bind `config` to `stack`. Returns the mode on success.
    ///
    /// `current_env` carries whatever the stack's present provider needs to
    /// decrypt (e.g. its passphrase); the new provider's environment wins on
    /// conflicts.
    pub fn set_provider(
        &self,
        stack: &str,
        workspace: &Path,
        config: &SecretsConfig,
        current_env: &[(String, String)],
    ) -> Option<SecretsMode> {
        let provider = config.provider_url();
        let opts = RunOptions::new()
            .cwd(workspace)
            .envs(current_env)
            .envs(&config.env())
            .observed(
                "secrets-provider",
                format!("Switching {stack} to the {} secrets provider", config.mode()),
            );
        let result = self.runner.run(
            "pulumi",
            &[
                "stack",
                "change-secrets-provider",
                &provider,
                "--stack",
                stack,
                "--non-interactive",
            ],
            &opts,
        );
        if result.success {
            log::info!("secrets provider of {stack} is now {}", config.mode());
            Some(config.mode())
        } else {
            log::warn!(
                "could not switch {stack} to {}: {}",
                config.mode(),
                result.output()
            );
            None
        }
    }

    /// Return `stack` to the backend default provider.
    pub fn reset_to_default(
        &self,
        stack: &StackRef,
        workspace: &Path,
        organization: Option<&str>,
        current_env: &[(String, String)],
    ) -> bool {
        let address = stack.qualified(organization);
        let config = SecretsConfig::default_provider("");
        self.set_provider(&address, workspace, &config, current_env)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecResult;
    use crate::testing::FakeRunner;

    #[test]
    fn test_mode_parse() {
        assert_eq!(SecretsMode::parse("service"), Some(SecretsMode::Default));
        assert_eq!(SecretsMode::parse("AWSKMS"), Some(SecretsMode::KeyManagement));
        assert_eq!(SecretsMode::parse("passphrase"), Some(SecretsMode::Passphrase));
        assert_eq!(SecretsMode::parse("vault"), None);
    }

    #[test]
    fn test_provider_urls() {
        let kms = SecretsConfig::kms_alias("pulumi-secrets", "eu-west-1").unwrap();
        assert_eq!(kms.provider_url(), "awskms://alias/pulumi-secrets?region=eu-west-1");

        let key = SecretsConfig::kms_key("1234abcd-12ab", "us-east-2").unwrap();
        assert_eq!(key.provider_url(), "awskms://1234abcd-12ab?region=us-east-2");

        let pass = SecretsConfig::passphrase("hunter2", "us-east-1").unwrap();
        assert_eq!(pass.provider_url(), "passphrase");
        assert_eq!(
            pass.env(),
            vec![(PASSPHRASE_ENV.to_string(), "hunter2".to_string())]
        );

        assert_eq!(SecretsConfig::default_provider("us-east-1").provider_url(), "default");
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            SecretsConfig::passphrase("", "us-east-1"),
            Err(Error::InvalidSecrets(_))
        ));
        assert!(SecretsConfig::kms_alias("alias/", "us-east-1").is_err());
        assert!(SecretsConfig::kms_key(" ", "us-east-1").is_err());
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let pass = SecretsConfig::passphrase("hunter2", "us-east-1").unwrap();
        let debug = format!("{pass:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_set_provider_passes_passphrase_in_env() {
        let runner = FakeRunner::new();
        let manager = SecretsManager::new(&runner);
        let config = SecretsConfig::passphrase("s3cret", "us-east-1").unwrap();

        let mode = manager.set_provider("proj/dev", Path::new("."), &config, &[]);

        assert_eq!(mode, Some(SecretsMode::Passphrase));
        let calls = runner.calls();
        assert_eq!(
            calls[0],
            "pulumi stack change-secrets-provider passphrase --stack proj/dev --non-interactive"
        );
        assert!(!calls[0].contains("s3cret"));
        assert!(
            runner
                .env_of("change-secrets-provider")
                .contains(&(PASSPHRASE_ENV.to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn test_set_provider_failure_returns_none() {
        let runner = FakeRunner::new().on(
            "change-secrets-provider",
            ExecResult::failed("error: no stack named 'dev' found"),
        );
        let manager = SecretsManager::new(&runner);
        let config = SecretsConfig::kms_alias("alias/k", "us-east-1").unwrap();
        assert!(manager.set_provider("dev", Path::new("."), &config, &[]).is_none());
        assert_eq!(runner.count("change-secrets-provider"), 1);
    }

    #[test]
    fn test_reset_uses_organization_tie_break() {
        let runner = FakeRunner::new();
        let manager = SecretsManager::new(&runner);
        let stack = StackRef::parse("org1/web").unwrap();

        assert!(manager.reset_to_default(&stack, Path::new("."), Some("org2"), &[]));
        assert!(manager.reset_to_default(&stack, Path::new("."), None, &[]));

        let calls = runner.calls();
        assert!(calls[0].contains("change-secrets-provider default --stack org2/web"));
        assert!(calls[1].contains("--stack org1/web"));
    }
}
