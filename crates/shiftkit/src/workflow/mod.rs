//! Migration and provisioning workflows.
//!
//! Each workflow is a straight sequence of steps over the components in this
//! crate. Steps that later steps depend on (bucket, stack creation, export,
//! import) stop the run with an [`Error`]; advisory steps (policy, lifecycle,
//! verification) add a warning to the [`Report`] and, where the risk is the
//! user's to take, ask through [`Decide`].

mod login;
mod provision;
mod to_hosted;
mod to_object_storage;

pub use login::{LoginOptions, login_object_storage};
pub use provision::{DEFAULT_TEMPLATE, ProvisionOptions, provision};
pub use to_hosted::{ToHostedOptions, to_hosted};
pub use to_object_storage::{ToObjectStorageOptions, to_object_storage};

use crate::decide::{Decide, confirm_or_assume};
use crate::error::{Error, Result};
use crate::exec::Runner;
use crate::location::BackendLocation;
use crate::project::DEFAULT_BUCKET_SUFFIX;
use crate::provision::{POLICY_PROPAGATION_DELAY, Provisioner};
use crate::report::{Report, Reporter};
use crate::secrets::{DEFAULT_KMS_ALIAS, SecretsConfig, normalize_alias};
use crate::session::Session;
use crate::staging::DEFAULT_STAGING_DIR;
use crate::transfer::Transfer;
use std::time::Duration;

/// Tunables shared by all workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Staging directory name inside the workspace
    pub staging_dir: String,
    /// Suffix for derived bucket names
    pub bucket_suffix: String,
    /// KMS alias used when none is given
    pub kms_alias: String,
    /// Wait after writing a bucket policy next to an explicit deny
    pub propagation_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
            bucket_suffix: DEFAULT_BUCKET_SUFFIX.to_string(),
            kms_alias: DEFAULT_KMS_ALIAS.to_string(),
            propagation_delay: POLICY_PROPAGATION_DELAY,
        }
    }
}

/// Collaborators a workflow runs with.
pub struct Toolbox<'a> {
    /// Executes `pulumi` and `aws`
    pub runner: &'a dyn Runner,
    /// Receives progress
    pub reporter: &'a dyn Reporter,
    /// Answers questions
    pub decide: &'a dyn Decide,
    /// Tunables
    pub settings: Settings,
}

impl<'a> Toolbox<'a> {
    /// Toolbox with default settings.
    pub fn new(runner: &'a dyn Runner, reporter: &'a dyn Reporter, decide: &'a dyn Decide) -> Self {
        Self {
            runner,
            reporter,
            decide,
            settings: Settings::default(),
        }
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    fn provisioner(&self) -> Provisioner<'a> {
        Provisioner::new(self.runner).with_propagation_delay(self.settings.propagation_delay)
    }

    fn confirm(&self, assume_yes: bool, question: &str, default: bool) -> bool {
        confirm_or_assume(self.decide, assume_yes, question, default)
    }
}

/// Passphrase from the caller, or asked for.
fn passphrase_config(
    tools: &Toolbox<'_>,
    given: Option<&str>,
    region: &str,
) -> Result<SecretsConfig> {
    let passphrase = match given.filter(|p| !p.is_empty()) {
        Some(p) => p.to_string(),
        None => tools
            .decide
            .ask_secret("Passphrase for stack secrets")
            .unwrap_or_default(),
    };
    SecretsConfig::passphrase(&passphrase, region)
}

/// KMS provider for `alias`, creating the key when it is missing and
/// permitted.
///
/// When no usable key results, falls back to the passphrase provider if a
/// passphrase is at hand and to the backend default otherwise. The fallback
/// is recorded as a warning.
fn kms_config(
    tools: &Toolbox<'_>,
    report: &mut Report,
    alias: &str,
    region: &str,
    create: bool,
    assume_yes: bool,
    fallback_passphrase: Option<&str>,
) -> Result<SecretsConfig> {
    let alias = normalize_alias(alias);
    let provisioner = tools.provisioner();

    if provisioner.key_alias_exists(&alias, region) {
        report.done(tools.reporter, format!("KMS key {alias} found"));
        return SecretsConfig::kms_alias(&alias, region);
    }

    let permitted = create
        || tools.confirm(
            assume_yes,
            &format!("KMS alias {alias} does not exist in {region}. Create it?"),
            true,
        );
    if permitted && let Some(key) = provisioner.create_key_and_alias(&alias, region) {
        return if key.alias.is_some() {
            report.done(tools.reporter, format!("Created KMS key {alias}"));
            SecretsConfig::kms_alias(&alias, region)
        } else {
            report.warn(
                tools.reporter,
                format!("KMS key {} created but alias {alias} could not be bound", key.key_id),
            );
            SecretsConfig::kms_key(key.provider_key(), region)
        };
    }

    match fallback_passphrase.filter(|p| !p.is_empty()) {
        Some(passphrase) => {
            report.warn(
                tools.reporter,
                format!("No KMS key {alias}; using the passphrase provider instead"),
            );
            SecretsConfig::passphrase(passphrase, region)
        }
        None => {
            report.warn(
                tools.reporter,
                format!("No KMS key {alias}; using the backend default secrets provider"),
            );
            Ok(SecretsConfig::default_provider(region))
        }
    }
}

/// Verify the destination, or decide whether to carry on without.
fn verification_gate(
    tools: &Toolbox<'_>,
    report: &mut Report,
    transfer: &mut Transfer<'_>,
    skip: bool,
    assume_yes: bool,
) -> Result<()> {
    let address = transfer
        .destination_address()
        .unwrap_or_default()
        .to_string();

    if skip {
        report.warn(tools.reporter, "Verification skipped");
        transfer.accept_unverified();
        return Ok(());
    }

    tools.reporter.step(&format!("Verifying {address}"));
    if transfer.verify() {
        report.verified = true;
        report.done(tools.reporter, format!("Verified {address}: no changes"));
        return Ok(());
    }

    let summary = transfer
        .changes()
        .filter(|c| c.has_changes())
        .map_or_else(|| "preview failed".to_string(), |c| c.describe());
    report.warn(
        tools.reporter,
        format!("Verification of {address} did not pass: {summary}"),
    );

    if !tools.confirm(
        assume_yes,
        &format!("Preview of {address} reports {summary}. Continue anyway?"),
        false,
    ) {
        log::info!("verification declined; {address} keeps the imported state");
        return Err(Error::Verification {
            stack: address,
            detail: transfer.last_output().to_string(),
        });
    }
    transfer.accept_unverified();
    Ok(())
}

/// Fatal exit after the session moved away from `source`: log back in to the
/// source so the engine is left pointing at the authoritative copy.
fn restore_source(
    tools: &Toolbox<'_>,
    session: &mut Session<'_>,
    source: &BackendLocation,
    token: Option<&str>,
    error: Error,
) -> Error {
    if session.current() != Some(source) {
        tools
            .reporter
            .info(&format!("Restoring login to {}", source.name()));
        if !session.login(source, token) {
            log::warn!("could not restore the session to {source}");
        }
    }
    error
}

/// Build the login error for a backend.
fn login_error(location: &BackendLocation, token_given: bool) -> Error {
    let hint = match location {
        BackendLocation::ObjectStorage { bucket, .. } => format!(
            "Check that your AWS identity can list and write s3://{bucket} (try --fix-permissions)"
        ),
        BackendLocation::Hosted { .. } if token_given => {
            "The access token was rejected; create a new one in Pulumi Cloud".to_string()
        }
        BackendLocation::Hosted { .. } => {
            "Run `pulumi login` or pass --access-token / PULUMI_ACCESS_TOKEN".to_string()
        }
    };
    Error::Login {
        backend: location.name(),
        hint,
    }
}
