//! Pulumi Cloud -> S3.

use super::{Toolbox, kms_config, login_error, passphrase_config, restore_source, verification_gate};
use crate::error::{Error, Result, TransferStep};
use crate::location::BackendLocation;
use crate::preflight;
use crate::provision::{BucketStatus, Outcome};
use crate::report::Report;
use crate::secrets::{SecretsConfig, SecretsManager, SecretsMode};
use crate::session::Session;
use crate::stack::StackRef;
use crate::staging::StagingDir;
use crate::transfer::Transfer;
use std::path::PathBuf;

/// Options for [`to_object_storage`].
#[derive(Debug, Clone)]
pub struct ToObjectStorageOptions {
    /// Stack to move, `[org/]name`
    pub stack: StackRef,
    /// Project directory
    pub workspace: PathBuf,
    /// Destination bucket; derived from the project name when `None`
    pub bucket: Option<String>,
    /// Bucket and key region
    pub region: String,
    /// Create a missing bucket: `Some` to decide up front, `None` to ask
    pub create_bucket: Option<bool>,
    /// Secrets provider for the destination
    pub secrets_mode: SecretsMode,
    /// KMS alias; the configured default when `None`
    pub kms_alias: Option<String>,
    /// Passphrase for passphrase mode, and for the KMS fallback
    pub passphrase: Option<String>,
    /// Create a missing KMS alias without asking
    pub create_kms: bool,
    /// Delete the stack from Pulumi Cloud afterwards
    pub delete_source: bool,
    /// Skip the preview check
    pub skip_verify: bool,
    /// Grant the caller access in the bucket policy
    pub fix_permissions: bool,
    /// Answer yes to every confirmation
    pub assume_yes: bool,
}

impl ToObjectStorageOptions {
    /// Options with defaults for everything but the stack and workspace.
    pub fn new(stack: StackRef, workspace: impl Into<PathBuf>) -> Self {
        Self {
            stack,
            workspace: workspace.into(),
            bucket: None,
            region: crate::location::DEFAULT_REGION.to_string(),
            create_bucket: None,
            secrets_mode: SecretsMode::KeyManagement,
            kms_alias: None,
            passphrase: None,
            create_kms: false,
            delete_source: false,
            skip_verify: false,
            fix_permissions: false,
            assume_yes: false,
        }
    }
}

/// Move a stack from Pulumi Cloud to an S3 bucket.
pub fn to_object_storage(tools: &Toolbox<'_>, opts: &ToObjectStorageOptions) -> Result<Report> {
    let mut report = Report::default();
    let region = opts.region.as_str();

    tools.reporter.step("Checking prerequisites");
    preflight::check_tools(tools.runner, &preflight::REQUIRED_TOOLS)?;
    preflight::check_aws_credentials(tools.runner)?;
    let user = preflight::check_hosted_session(tools.runner, None)?;
    let project = preflight::check_project(&opts.workspace)?;
    report.done(tools.reporter, format!("Logged in to Pulumi Cloud as {user}"));

    let derived = opts
        .bucket
        .clone()
        .unwrap_or_else(|| project.bucket_name(&tools.settings.bucket_suffix));
    let bucket = if opts.bucket.is_none() && tools.decide.is_interactive() {
        tools.decide.ask("S3 bucket for stack state", &derived)
    } else {
        derived
    };
    let destination = BackendLocation::object_storage(&bucket, region)?;

    // Bucket
    tools.reporter.step(&format!("Preparing {}", destination.name()));
    let provisioner = tools.provisioner();
    let bucket_report = provisioner.ensure_bucket(
        &bucket,
        region,
        || {
            opts.create_bucket.unwrap_or_else(|| {
                tools.confirm(
                    opts.assume_yes,
                    &format!("Bucket {bucket} does not exist in {region}. Create it?"),
                    true,
                )
            })
        },
        false,
    )?;
    match bucket_report.status {
        BucketStatus::Created => report.done(tools.reporter, format!("Created bucket {bucket}")),
        BucketStatus::Existing => report.done(tools.reporter, format!("Bucket {bucket} found")),
    }
    for warning in bucket_report.warnings {
        report.warn(tools.reporter, warning);
    }

    if opts.fix_permissions {
        match provisioner.reconcile_policy(&bucket, region) {
            Outcome::Failed(reason) => {
                report.warn(tools.reporter, format!("Bucket policy not updated: {reason}"));
                if !tools.confirm(
                    opts.assume_yes,
                    "The bucket policy could not be updated. Continue anyway?",
                    false,
                ) {
                    return Err(Error::Declined("bucket policy not updated".to_string()));
                }
            }
            _ => report.done(tools.reporter, "Bucket policy grants state access"),
        }
    }

    // Secrets provider, switched on the source so the export is compatible.
    let secrets = match opts.secrets_mode {
        SecretsMode::KeyManagement => {
            let alias = opts.kms_alias.as_deref().unwrap_or(&tools.settings.kms_alias);
            kms_config(
                tools,
                &mut report,
                alias,
                region,
                opts.create_kms,
                opts.assume_yes,
                opts.passphrase.as_deref(),
            )?
        }
        SecretsMode::Passphrase => passphrase_config(tools, opts.passphrase.as_deref(), region)?,
        SecretsMode::Default => SecretsConfig::default_provider(region),
    };

    let source = BackendLocation::hosted(opts.stack.organization.as_deref());
    let source_address = opts.stack.qualified(None);
    let manager = SecretsManager::new(tools.runner);
    if manager
        .set_provider(&source_address, &opts.workspace, &secrets, &[])
        .is_some()
    {
        report.done(
            tools.reporter,
            format!("Secrets provider of {source_address} set to {}", secrets.mode()),
        );
    } else {
        report.warn(
            tools.reporter,
            format!("Could not switch {source_address} to the {} secrets provider", secrets.mode()),
        );
        if !tools.confirm(
            opts.assume_yes,
            "Secrets may not re-encrypt cleanly on the destination. Continue anyway?",
            false,
        ) {
            return Err(Error::Declined("secrets provider not switched".to_string()));
        }
    }

    // Transfer
    let staging = StagingDir::acquire(&opts.workspace, &tools.settings.staging_dir)?;
    let mut session = Session::adopt(tools.runner, source.clone());
    let mut transfer = Transfer::new(tools.runner, opts.stack.clone(), &opts.workspace);

    tools.reporter.step(&format!("Exporting {source_address}"));
    if transfer.export_state(&staging, &secrets.env()).is_none() {
        return Err(Error::transfer(
            TransferStep::Export,
            &source_address,
            transfer.last_output(),
        ));
    }
    report.done(tools.reporter, format!("Exported {source_address}"));

    if !session.login_object_storage(&destination) {
        let error = login_error(&destination, false);
        return Err(restore_source(tools, &mut session, &source, None, error));
    }
    report.done(tools.reporter, format!("Logged in to {}", destination.name()));

    if !transfer.create_destination_stack(&destination, &secrets) {
        let error = Error::transfer(
            TransferStep::CreateDestination,
            &source_address,
            transfer.last_output(),
        );
        return Err(restore_source(tools, &mut session, &source, None, error));
    }
    let address = transfer.destination_address().unwrap_or_default().to_string();
    report.done(tools.reporter, format!("Created stack {address} in {bucket}"));

    if !transfer.import_state() {
        let error = Error::transfer(TransferStep::Import, &address, transfer.last_output());
        return Err(restore_source(tools, &mut session, &source, None, error));
    }
    report.done(tools.reporter, format!("Imported state into {address}"));

    verification_gate(tools, &mut report, &mut transfer, opts.skip_verify, opts.assume_yes)?;

    if opts.delete_source {
        if !tools.confirm(
            opts.assume_yes,
            &format!("Delete {source_address} from Pulumi Cloud?"),
            false,
        ) {
            report.warn(
                tools.reporter,
                format!("Source stack {source_address} kept: deletion not confirmed"),
            );
        } else if transfer.delete_source_stack(&mut session, &source, &destination, None) {
            report.source_deleted = true;
            report.done(tools.reporter, format!("Deleted {source_address} from Pulumi Cloud"));
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
