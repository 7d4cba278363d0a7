//! Provision a bucket and key, then set up a project and stack on them.

use super::{Toolbox, kms_config, login_error, passphrase_config};
use crate::error::{Error, Result};
use crate::exec::RunOptions;
use crate::location::BackendLocation;
use crate::preflight;
use crate::project::{Project, derive_bucket_name};
use crate::provision::BucketStatus;
use crate::report::Report;
use crate::secrets::{SecretsConfig, SecretsMode};
use crate::session::Session;
use std::path::PathBuf;

/// Template for new projects.
pub const DEFAULT_TEMPLATE: &str = "aws-typescript";

/// Providers offered when none was given, first one preselected.
const SECRETS_CHOICES: [SecretsMode; 3] = [
    SecretsMode::KeyManagement,
    SecretsMode::Passphrase,
    SecretsMode::Default,
];

/// Options for [`provision`].
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Project directory
    pub workspace: PathBuf,
    /// Project name; the existing project's or the directory name when `None`
    pub name: Option<String>,
    /// Project description for new projects
    pub description: Option<String>,
    /// Template for new projects
    pub template: String,
    /// Initial stack name
    pub stack: Option<String>,
    /// State bucket; derived from the project name when `None`
    pub bucket: Option<String>,
    /// Bucket and key region
    pub region: String,
    /// Secrets provider for the stack; asked for when `None` and someone is
    /// answering, otherwise KMS
    pub secrets_mode: Option<SecretsMode>,
    /// KMS alias; the configured default when `None`
    pub kms_alias: Option<String>,
    /// Passphrase for passphrase mode
    pub passphrase: Option<String>,
    /// Create a missing bucket without asking
    pub create_bucket: bool,
    /// Create a missing KMS alias without asking
    pub create_kms: bool,
    /// Answer yes to every confirmation
    pub assume_yes: bool,
}

impl ProvisionOptions {
    /// Options with defaults for everything but the workspace.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            name: None,
            description: None,
            template: DEFAULT_TEMPLATE.to_string(),
            stack: None,
            bucket: None,
            region: crate::location::DEFAULT_REGION.to_string(),
            secrets_mode: None,
            kms_alias: None,
            passphrase: None,
            create_bucket: false,
            create_kms: false,
            assume_yes: false,
        }
    }
}

/// Provision state storage and create the first stack on it.
pub fn provision(tools: &Toolbox<'_>, opts: &ProvisionOptions) -> Result<Report> {
    let mut report = Report::default();
    let region = opts.region.as_str();

    tools.reporter.step("Checking prerequisites");
    preflight::check_tools(tools.runner, &preflight::REQUIRED_TOOLS)?;
    preflight::check_aws_credentials(tools.runner)?;

    // Naming
    let existing = Project::find(&opts.workspace)
        .map(|_| Project::load(&opts.workspace))
        .transpose()?;
    let default_name = opts
        .name
        .clone()
        .or_else(|| existing.as_ref().map(|p| p.name.clone()))
        .or_else(|| {
            opts.workspace
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
        })
        .unwrap_or_else(|| "infra".to_string());
    let name = if opts.name.is_none() && existing.is_none() {
        tools.decide.ask("Project name", &default_name)
    } else {
        default_name
    };
    let stack = match &opts.stack {
        Some(stack) => stack.clone(),
        None => tools.decide.ask("Stack name", "dev"),
    };

    // Bucket, with the policy reconciled either way.
    let bucket = opts
        .bucket
        .clone()
        .unwrap_or_else(|| derive_bucket_name(&name, &tools.settings.bucket_suffix));
    let location = BackendLocation::object_storage(&bucket, region)?;
    tools.reporter.step(&format!("Preparing {}", location.name()));
    let bucket_report = tools.provisioner().ensure_bucket(
        &bucket,
        region,
        || {
            opts.create_bucket
                || tools.confirm(
                    opts.assume_yes,
                    &format!("Bucket {bucket} does not exist in {region}. Create it?"),
                    true,
                )
        },
        true,
    )?;
    match bucket_report.status {
        BucketStatus::Created => report.done(tools.reporter, format!("Created bucket {bucket}")),
        BucketStatus::Existing => report.done(tools.reporter, format!("Bucket {bucket} found")),
    }
    for warning in bucket_report.warnings {
        report.warn(tools.reporter, warning);
    }

    // Key, downgraded rather than fatal.
    let secrets = match secrets_mode(tools, opts.secrets_mode) {
        SecretsMode::KeyManagement => {
            let alias = opts.kms_alias.as_deref().unwrap_or(&tools.settings.kms_alias);
            kms_config(
                tools,
                &mut report,
                alias,
                region,
                opts.create_kms,
                opts.assume_yes,
                None,
            )?
        }
        SecretsMode::Passphrase => passphrase_config(tools, opts.passphrase.as_deref(), region)?,
        SecretsMode::Default => SecretsConfig::default_provider(region),
    };

    let mut session = Session::new(tools.runner);
    if !session.login_object_storage(&location) {
        return Err(login_error(&location, false));
    }
    report.done(tools.reporter, format!("Logged in to {}", location.name()));

    if existing.is_none() {
        scaffold(tools, opts, &name)?;
        report.done(tools.reporter, format!("Created project {name} from {}", opts.template));
    }

    let provider = secrets.provider_url();
    let mut args = vec!["stack", "init", stack.as_str()];
    if secrets.mode() != SecretsMode::Default {
        args.extend(["--secrets-provider", provider.as_str()]);
    }
    args.push("--non-interactive");
    let created = tools.runner.run(
        "pulumi",
        &args,
        &RunOptions::new()
            .cwd(&opts.workspace)
            .envs(&secrets.env())
            .observed("stack-init", format!("Creating stack {stack}")),
    );
    if !created.success {
        return Err(Error::Provision {
            resource: format!("stack {stack}"),
            message: "pulumi stack init failed".to_string(),
            detail: created.output().to_string(),
        });
    }
    report.done(
        tools.reporter,
        format!("Created stack {stack} with the {} secrets provider", secrets.mode()),
    );

    log::info!("provisioned {location} for {name}/{stack}");
    Ok(report)
}

fn secrets_mode(tools: &Toolbox<'_>, given: Option<SecretsMode>) -> SecretsMode {
    if let Some(mode) = given {
        return mode;
    }
    if !tools.decide.is_interactive() {
        return SecretsMode::KeyManagement;
    }
    let labels: Vec<&str> = SECRETS_CHOICES.iter().map(SecretsMode::as_str).collect();
    let index = tools.decide.choose("Secrets provider for the stack", &labels, 0);
    SECRETS_CHOICES
        .get(index)
        .copied()
        .unwrap_or(SecretsMode::KeyManagement)
}

/// Generate a project from `opts.template` without creating a stack.
fn scaffold(tools: &Toolbox<'_>, opts: &ProvisionOptions, name: &str) -> Result<()> {
    std::fs::create_dir_all(&opts.workspace)?;
    let mut args = vec![
        "new",
        opts.template.as_str(),
        "--name",
        name,
        "--generate-only",
        "--yes",
        "--force",
    ];
    if let Some(description) = &opts.description {
        args.extend(["--description", description.as_str()]);
    }
    let result = tools.runner.run(
        "pulumi",
        &args,
        &RunOptions::new()
            .cwd(&opts.workspace)
            .observed("new", format!("Generating project {name}")),
    );
    if result.success {
        Ok(())
    } else {
        Err(Error::Provision {
            resource: format!("project {name}"),
            message: format!("pulumi new {} failed", opts.template),
            detail: result.output().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decide::Defaults;
    use crate::exec::ExecResult;
    use crate::report::NoReport;
    use crate::testing::ScriptedDecide;
    use crate::workflow::fixtures::{self, write_project};
    use std::time::Duration;
    use tempfile::TempDir;

    fn run(runner: &crate::testing::FakeRunner, opts: &ProvisionOptions) -> Result<Report> {
        let mut tools = Toolbox::new(runner, &NoReport, &Defaults);
        tools.settings.propagation_delay = Duration::ZERO;
        provision(&tools, opts)
    }

    #[test]
    fn test_new_project() {
        let tmp = TempDir::new().unwrap();
        let runner = fixtures::healthy()
            .on("head-bucket", ExecResult::failed("Not Found"))
            .on("describe-key", ExecResult::failed("NotFoundException"));
        let mut opts = ProvisionOptions::new(tmp.path());
        opts.name = Some("proj".to_string());
        opts.stack = Some("dev".to_string());
        opts.description = Some("Core infrastructure".to_string());
        opts.assume_yes = true;

        let report = run(&runner, &opts).unwrap();
        assert!(report.is_clean(), "{:?}", report.warnings);

        let order = [
            "create-bucket --bucket proj-pulumi-state",
            "put-bucket-policy --bucket proj-pulumi-state",
            "kms create-alias --alias-name alias/pulumi-secrets",
            "pulumi login s3://proj-pulumi-state?region=us-east-1",
            "pulumi new aws-typescript --name proj --generate-only --yes --force --description Core infrastructure",
            "pulumi stack init dev --secrets-provider awskms://alias/pulumi-secrets?region=us-east-1",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|p| runner.position(p).unwrap_or_else(|| panic!("missing: {p}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:#?}", runner.calls());
    }

    #[test]
    fn test_existing_project_and_bucket() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "shop");
        let runner = fixtures::healthy();
        let mut opts = ProvisionOptions::new(tmp.path());
        opts.secrets_mode = Some(SecretsMode::Default);

        run(&runner, &opts).unwrap();
        assert_eq!(runner.count("create-bucket"), 0);
        assert_eq!(runner.count("put-bucket-policy"), 1);
        assert_eq!(runner.count("pulumi new"), 0);
        assert!(runner.calls().iter().any(|c| c == "pulumi stack init dev --non-interactive"));
        assert!(runner.position("s3://shop-pulumi-state").is_some());
    }

    #[test]
    fn test_key_failure_downgrades_to_default() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "shop");
        let runner = fixtures::healthy()
            .on("describe-key", ExecResult::failed("NotFoundException"))
            .on("kms create-key", ExecResult::failed("AccessDeniedException"));
        let mut opts = ProvisionOptions::new(tmp.path());
        opts.create_kms = true;

        let report = run(&runner, &opts).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(runner.calls().iter().any(|c| c == "pulumi stack init dev --non-interactive"));
    }

    #[test]
    fn test_secrets_provider_is_chosen_interactively() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "shop");
        let runner = fixtures::healthy();
        let decide = ScriptedDecide::choosing(2);
        let tools = Toolbox::new(&runner, &NoReport, &decide);

        let report = provision(&tools, &ProvisionOptions::new(tmp.path())).unwrap();

        assert!(report.is_clean(), "{:?}", report.warnings);
        assert!(decide.questions.borrow().iter().any(|q| q.starts_with("Secrets provider")));
        assert_eq!(runner.count("kms"), 0);
        assert!(runner.calls().iter().any(|c| c == "pulumi stack init dev --non-interactive"));
    }

    #[test]
    fn test_secrets_provider_flag_is_not_asked() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "shop");
        let runner = fixtures::healthy();
        let decide = ScriptedDecide::choosing(2);
        let tools = Toolbox::new(&runner, &NoReport, &decide);
        let mut opts = ProvisionOptions::new(tmp.path());
        opts.secrets_mode = Some(SecretsMode::KeyManagement);

        provision(&tools, &opts).unwrap();

        assert!(decide.questions.borrow().is_empty());
        assert!(runner.position("--secrets-provider awskms://alias/pulumi-secrets").is_some());
    }

    #[test]
    fn test_stack_init_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "shop");
        let runner = fixtures::healthy().on("stack init", ExecResult::failed("already exists"));
        let mut opts = ProvisionOptions::new(tmp.path());
        opts.secrets_mode = Some(SecretsMode::Default);

        let err = run(&runner, &opts).unwrap_err();
        assert!(matches!(err, Error::Provision { .. }));
        assert_eq!(err.detail(), Some("already exists"));
    }

    #[test]
    fn test_bucket_failure_stops_before_login() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "shop");
        let runner = fixtures::healthy()
            .on("head-bucket", ExecResult::failed("Not Found"))
            .on("create-bucket", ExecResult::failed("BucketAlreadyExists"));
        let mut opts = ProvisionOptions::new(tmp.path());
        opts.create_bucket = true;

        assert!(matches!(run(&runner, &opts), Err(Error::Provision { .. })));
        assert_eq!(runner.count("pulumi login"), 0);
    }
}
