//! S3 -> Pulumi Cloud.

use super::{Toolbox, login_error, restore_source, verification_gate};
use crate::error::{Error, Result, TransferStep};
use crate::location::BackendLocation;
use crate::preflight;
use crate::report::Report;
use crate::secrets::{SecretsConfig, SecretsManager, SecretsMode};
use crate::session::Session;
use crate::stack::StackRef;
use crate::staging::StagingDir;
use crate::transfer::Transfer;
use std::path::PathBuf;

/// Options for [`to_hosted`].
#[derive(Debug, Clone)]
pub struct ToHostedOptions {
    /// Stack to move, `[org/]name`
    pub stack: StackRef,
    /// Pulumi Cloud organization to create the stack in
    pub organization: String,
    /// Project directory
    pub workspace: PathBuf,
    /// Source location (`objectstore://bucket?region=r`); taken from the
    /// project or derived from its name when `None`
    pub backend: Option<String>,
    /// Region for the source bucket when the location does not name one
    pub region: String,
    /// Pulumi Cloud access token
    pub access_token: Option<String>,
    /// Secrets provider the source stack uses
    pub source_secrets: SecretsMode,
    /// Passphrase of the source stack
    pub passphrase: Option<String>,
    /// KMS key of the source stack
    pub kms_key: Option<String>,
    /// Delete the stack from the bucket afterwards
    pub delete_source: bool,
    /// Skip the preview check
    pub skip_verify: bool,
    /// Answer yes to every confirmation
    pub assume_yes: bool,
}

impl ToHostedOptions {
    /// Options with defaults for everything but the stack, organization and
    /// workspace.
    pub fn new(stack: StackRef, organization: &str, workspace: impl Into<PathBuf>) -> Self {
        Self {
            stack,
            organization: organization.to_string(),
            workspace: workspace.into(),
            backend: None,
            region: crate::location::DEFAULT_REGION.to_string(),
            access_token: None,
            source_secrets: SecretsMode::Default,
            passphrase: None,
            kms_key: None,
            delete_source: false,
            skip_verify: false,
            assume_yes: false,
        }
    }

    /// How to decrypt the source stack during export.
    fn source_secrets(&self) -> Result<SecretsConfig> {
        match self.source_secrets {
            SecretsMode::Default => Ok(SecretsConfig::default_provider(&self.region)),
            SecretsMode::Passphrase => {
                let passphrase = self.passphrase.as_deref().unwrap_or_default();
                SecretsConfig::passphrase(passphrase, &self.region)
            }
            SecretsMode::KeyManagement => match &self.kms_key {
                Some(key) => SecretsConfig::kms_key(key, &self.region),
                None => Err(Error::InvalidSecrets(
                    "awskms source needs --kms-key".to_string(),
                )),
            },
        }
    }
}

/// Resolve the source bucket: explicit location, then the project's pinned
/// backend, then a name derived from the project.
fn source_location(tools: &Toolbox<'_>, opts: &ToHostedOptions) -> Result<BackendLocation> {
    if let Some(raw) = &opts.backend {
        return BackendLocation::parse_object_storage(raw, &opts.region);
    }
    let project = preflight::check_project(&opts.workspace)?;
    if let Some(url) = project.backend_url()
        && let Ok(location) = BackendLocation::parse_object_storage(url, &opts.region)
    {
        return Ok(location);
    }
    let derived = project.bucket_name(&tools.settings.bucket_suffix);
    let bucket = tools.decide.ask("S3 bucket holding the stack", &derived);
    BackendLocation::object_storage(&bucket, &opts.region)
}

/// Move a stack from an S3 bucket to Pulumi Cloud.
pub fn to_hosted(tools: &Toolbox<'_>, opts: &ToHostedOptions) -> Result<Report> {
    let mut report = Report::default();
    let token = opts.access_token.as_deref();

    tools.reporter.step("Checking prerequisites");
    preflight::check_tools(tools.runner, &preflight::REQUIRED_TOOLS)?;
    preflight::check_aws_credentials(tools.runner)?;
    let source_secrets = opts.source_secrets()?;
    let source = source_location(tools, opts)?;
    let destination = BackendLocation::hosted(Some(opts.organization.as_str()));
    let source_address = opts.stack.qualified(None);

    let mut session = Session::new(tools.runner);
    if !session.login_object_storage(&source) {
        return Err(login_error(&source, false));
    }
    report.done(tools.reporter, format!("Logged in to {}", source.name()));

    let staging = StagingDir::acquire(&opts.workspace, &tools.settings.staging_dir)?;
    let mut transfer = Transfer::new(tools.runner, opts.stack.clone(), &opts.workspace);

    tools.reporter.step(&format!("Exporting {source_address}"));
    if transfer
        .export_state(&staging, &source_secrets.env())
        .is_none()
    {
        return Err(Error::transfer(
            TransferStep::Export,
            &source_address,
            transfer.last_output(),
        ));
    }
    report.done(tools.reporter, format!("Exported {source_address}"));

    if !session.login_hosted(Some(opts.organization.as_str()), token) {
        let error = login_error(&destination, token.is_some());
        return Err(restore_source(tools, &mut session, &source, None, error));
    }
    report.done(tools.reporter, "Logged in to Pulumi Cloud");

    if !transfer.create_destination_stack(&destination, &source_secrets) {
        let error = Error::transfer(
            TransferStep::CreateDestination,
            &opts.stack.qualified(Some(opts.organization.as_str())),
            transfer.last_output(),
        );
        return Err(restore_source(tools, &mut session, &source, None, error));
    }
    let address = transfer.destination_address().unwrap_or_default().to_string();
    report.done(tools.reporter, format!("Created stack {address} in Pulumi Cloud"));

    if !transfer.import_state() {
        let error = Error::transfer(TransferStep::Import, &address, transfer.last_output());
        return Err(restore_source(tools, &mut session, &source, None, error));
    }
    report.done(tools.reporter, format!("Imported state into {address}"));

    let manager = SecretsManager::new(tools.runner);
    if manager.reset_to_default(
        transfer.stack(),
        &opts.workspace,
        Some(opts.organization.as_str()),
        &source_secrets.env(),
    ) {
        report.done(tools.reporter, format!("{address} uses the Pulumi Cloud secrets provider"));
    } else {
        report.warn(
            tools.reporter,
            format!("{address} still uses the {} secrets provider", source_secrets.mode()),
        );
    }

    verification_gate(tools, &mut report, &mut transfer, opts.skip_verify, opts.assume_yes)?;

    if opts.delete_source {
        if !tools.confirm(
            opts.assume_yes,
            &format!("Delete {source_address} from {}?", source.name()),
            false,
        ) {
            report.warn(
                tools.reporter,
                format!("Source stack {source_address} kept: deletion not confirmed"),
            );
        } else if transfer.delete_source_stack(&mut session, &source, &destination, token) {
            report.source_deleted = true;
            report.done(
                tools.reporter,
                format!("Deleted {source_address} from {}", source.name()),
            );
        } else {
            report.warn(
                tools.reporter,
                format!("Could not delete {source_address}: {}", transfer.last_output()),
            );
        }
    }

    transfer.complete();
    log::info!("migrated {source_address} to {destination}");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decide::Defaults;
    use crate::exec::ExecResult;
    use crate::report::NoReport;
    use crate::secrets::PASSPHRASE_ENV;
    use crate::staging::DEFAULT_STAGING_DIR;
    use crate::testing::{FakeRunner, ScriptedDecide};
    use crate::workflow::fixtures::{self, write_project};
    use tempfile::TempDir;

    fn options(tmp: &TempDir) -> ToHostedOptions {
        let mut opts = ToHostedOptions::new(StackRef::parse("dev").unwrap(), "acme", tmp.path());
        opts.backend = Some("objectstore://proj-state?region=eu-west-1".to_string());
        opts.assume_yes = true;
        opts
    }

    fn run(runner: &FakeRunner, opts: &ToHostedOptions) -> Result<Report> {
        to_hosted(&Toolbox::new(runner, &NoReport, &Defaults), opts)
    }

    #[test]
    fn test_happy_path() {
        let tmp = TempDir::new().unwrap();
        let runner = fixtures::healthy();
        let mut opts = options(&tmp);
        opts.source_secrets = SecretsMode::Passphrase;
        opts.passphrase = Some("old-secret".to_string());
        opts.access_token = Some("pul-abc".to_string());

        let report = run(&runner, &opts).unwrap();
        assert!(report.verified);

        let order = [
            "pulumi login s3://proj-state?region=eu-west-1",
            "stack export --stack dev --show-secrets",
            "pulumi login",
            "stack init acme/dev --secrets-provider passphrase",
            "stack import --stack acme/dev",
            "change-secrets-provider default --stack acme/dev",
            "pulumi preview --stack acme/dev",
        ];
        let calls = runner.calls();
        let mut cursor = 0;
        for step in order {
            let offset = calls[cursor..]
                .iter()
                .position(|c| c.contains(step))
                .unwrap_or_else(|| panic!("missing {step} after {cursor}: {calls:#?}"));
            cursor += offset + 1;
        }

        assert!(
            runner
                .env_of("stack export")
                .contains(&(PASSPHRASE_ENV.to_string(), "old-secret".to_string()))
        );
        assert!(calls.iter().all(|c| !c.contains("pul-abc") && !c.contains("old-secret")));
        assert!(!tmp.path().join(DEFAULT_STAGING_DIR).exists());
    }

    #[test]
    fn test_token_rejection_hint_and_restore() {
        let tmp = TempDir::new().unwrap();
        let runner =
            fixtures::healthy().on("pulumi whoami", ExecResult::failed("401 unauthorized"));
        let mut opts = options(&tmp);
        opts.access_token = Some("pul-bad".to_string());

        let err = run(&runner, &opts).unwrap_err();
        assert!(matches!(err, Error::Login { .. }));
        assert!(err.advice().contains("token was rejected"));

        let calls = runner.calls();
        assert_eq!(
            calls.last().map(String::as_str),
            Some("pulumi login s3://proj-state?region=eu-west-1")
        );
        assert!(!tmp.path().join(DEFAULT_STAGING_DIR).exists());
    }

    #[test]
    fn test_create_failure_restores_source_session() {
        let tmp = TempDir::new().unwrap();
        let runner =
            fixtures::healthy().on("stack init", ExecResult::failed("stack already exists"));

        let err = run(&runner, &options(&tmp)).unwrap_err();
        assert!(matches!(
            err,
            Error::Transfer { step: TransferStep::CreateDestination, .. }
        ));
        assert_eq!(runner.count("stack init"), 1);
        assert_eq!(runner.count("stack import"), 0);
        assert!(runner.calls().last().unwrap().starts_with("pulumi login s3://"));
    }

    #[test]
    fn test_delete_source_restores_hosted_session() {
        let tmp = TempDir::new().unwrap();
        let runner = fixtures::healthy();
        let mut opts = options(&tmp);
        opts.delete_source = true;

        let report = run(&runner, &opts).unwrap();
        assert!(report.source_deleted);

        let calls = runner.calls();
        let rm = runner.position("stack rm dev --yes --force").unwrap();
        assert!(calls[rm - 1].starts_with("pulumi login s3://"));
        assert!(calls[rm + 1..].iter().any(|c| c == "pulumi login"));
        assert_eq!(calls.last().map(String::as_str), Some("pulumi whoami"));
    }

    #[test]
    fn test_verification_failure_accepted() {
        let tmp = TempDir::new().unwrap();
        let runner = fixtures::healthy()
            .on("pulumi preview", ExecResult::ok("Resources:\n    + 2 to create\n"));
        let mut opts = options(&tmp);
        opts.delete_source = true;

        let report = run(&runner, &opts).unwrap();

        assert!(!report.verified);
        assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
        assert!(report.warnings[0].contains("2 to create"));
        assert!(report.source_deleted);
        assert_eq!(runner.count("stack rm dev"), 1);
        assert!(!tmp.path().join(DEFAULT_STAGING_DIR).exists());
    }

    #[test]
    fn test_verification_failure_declined_keeps_source() {
        let tmp = TempDir::new().unwrap();
        let runner = fixtures::healthy()
            .on("pulumi preview", ExecResult::ok("Resources:\n    - 1 to delete\n"));
        let decide = ScriptedDecide::answering(&[false]);
        let mut opts = options(&tmp);
        opts.assume_yes = false;
        opts.delete_source = true;

        let err = to_hosted(&Toolbox::new(&runner, &NoReport, &decide), &opts).unwrap_err();

        assert!(matches!(err, Error::Verification { .. }));
        assert_eq!(decide.questions.borrow().len(), 1);
        assert_eq!(runner.count("stack rm"), 0);
        assert!(!tmp.path().join(DEFAULT_STAGING_DIR).exists());
    }

    #[test]
    fn test_skip_verify() {
        let tmp = TempDir::new().unwrap();
        let runner = fixtures::healthy();
        let mut opts = options(&tmp);
        opts.skip_verify = true;

        let report = run(&runner, &opts).unwrap();

        assert!(!report.verified);
        assert_eq!(report.warnings, vec!["Verification skipped".to_string()]);
        assert_eq!(runner.count("pulumi preview"), 0);
        assert_eq!(runner.count("stack import --stack acme/dev"), 1);
    }

    #[test]
    fn test_delete_source_not_confirmed() {
        let tmp = TempDir::new().unwrap();
        let runner = fixtures::healthy();
        let mut opts = options(&tmp);
        opts.assume_yes = false;
        opts.delete_source = true;

        let report = run(&runner, &opts).unwrap();

        assert!(report.verified);
        assert!(!report.source_deleted);
        assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
        assert!(report.warnings[0].contains("deletion not confirmed"));
        assert_eq!(runner.count("stack rm"), 0);
    }

    #[test]
    fn test_location_from_project() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("Pulumi.yaml"),
            "name: proj\nruntime: go\nbackend:\n  url: s3://pinned-state?region=ap-south-1\n",
        )
        .unwrap();
        let runner = fixtures::healthy();
        let mut opts = options(&tmp);
        opts.backend = None;

        run(&runner, &opts).unwrap();
        assert_eq!(runner.count("pulumi login s3://pinned-state?region=ap-south-1"), 1);
    }

    #[test]
    fn test_location_derived_from_project_name() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "proj");
        let runner = fixtures::healthy();
        let mut opts = options(&tmp);
        opts.backend = None;

        run(&runner, &opts).unwrap();
        assert!(runner.position("pulumi login s3://proj-pulumi-state?region=us-east-1").is_some());
    }

    #[test]
    fn test_malformed_backend_is_rejected_before_login() {
        let tmp = TempDir::new().unwrap();
        let runner = fixtures::healthy();
        let mut opts = options(&tmp);
        opts.backend = Some("gs://bucket".to_string());

        assert!(matches!(run(&runner, &opts), Err(Error::InvalidLocation { .. })));
        assert_eq!(runner.count("pulumi login"), 0);
    }

    #[test]
    fn test_kms_source_needs_key() {
        let tmp = TempDir::new().unwrap();
        let runner = fixtures::healthy();
        let mut opts = options(&tmp);
        opts.source_secrets = SecretsMode::KeyManagement;

        assert!(matches!(run(&runner, &opts), Err(Error::InvalidSecrets(_))));
    }
}
