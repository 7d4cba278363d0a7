//! Migration commands: Pulumi Cloud to S3 and back.

use anyhow::Result;
use shiftkit::workflow::{self, ToHostedOptions, ToObjectStorageOptions};

use crate::Context;
use crate::cli::{ToHostedArgs, ToObjectStoreArgs};
use crate::config::Config;
use crate::paths;

pub fn to_object_store(ctx: &Context, args: &ToObjectStoreArgs) -> Result<()> {
    let opts = object_store_options(&ctx.config, args)?;
    log::info!("Migrating {} to object storage", opts.stack);
    super::run_workflow(ctx, args.prompt.interactive, "Migration complete", |tools| {
        workflow::to_object_storage(tools, &opts)
    })
}

pub fn to_hosted(ctx: &Context, args: &ToHostedArgs) -> Result<()> {
    let opts = hosted_options(&ctx.config, args)?;
    log::info!("Migrating {} to Pulumi Cloud ({})", opts.stack, opts.organization);
    super::run_workflow(ctx, args.prompt.interactive, "Migration complete", |tools| {
        workflow::to_hosted(tools, &opts)
    })
}

fn object_store_options(
    config: &Config,
    args: &ToObjectStoreArgs,
) -> Result<ToObjectStorageOptions> {
    let mut opts =
        ToObjectStorageOptions::new(args.stack.clone(), paths::workspace(&args.prompt.workspace)?);
    opts.bucket.clone_from(&args.bucket);
    opts.region = config.region(args.region.as_deref());
    opts.create_bucket = args.create_bucket();
    opts.secrets_mode = args.secrets_provider;
    opts.kms_alias.clone_from(&args.kms_alias);
    opts.passphrase.clone_from(&args.passphrase);
    opts.create_kms = args.create_kms;
    opts.delete_source = args.delete_source;
    opts.skip_verify = args.skip_verify;
    opts.fix_permissions = args.fix_permissions;
    opts.assume_yes = args.prompt.yes;
    Ok(opts)
}

fn hosted_options(config: &Config, args: &ToHostedArgs) -> Result<ToHostedOptions> {
    let mut opts = ToHostedOptions::new(
        args.stack.clone(),
        &args.organization,
        paths::workspace(&args.prompt.workspace)?,
    );
    opts.backend.clone_from(&args.backend);
    opts.region = config.region(args.region.as_deref());
    opts.access_token.clone_from(&args.access_token);
    opts.source_secrets = args.secrets_provider;
    opts.passphrase.clone_from(&args.passphrase);
    opts.kms_key.clone_from(&args.kms_key);
    opts.delete_source = args.delete_source;
    opts.skip_verify = args.skip_verify;
    opts.assume_yes = args.prompt.yes;
    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use shiftkit::SecretsMode;

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["stackshift"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_object_store_options_from_flags() {
        let Command::MigrateToObjectStore(args) = parse(&[
            "migrate-to-object-store",
            "--stack",
            "acme/prod",
            "--bucket",
            "acme-state",
            "--region",
            "eu-west-1",
            "--create-bucket",
            "--kms-alias",
            "team",
            "--delete-source",
            "--fix-permissions",
            "--yes",
            "--workspace",
            "/srv/infra",
        ]) else {
            panic!("wrong subcommand");
        };

        let opts = object_store_options(&Config::default(), &args).unwrap();
        assert_eq!(opts.stack.name, "prod");
        assert_eq!(opts.bucket.as_deref(), Some("acme-state"));
        assert_eq!(opts.region, "eu-west-1");
        assert_eq!(opts.create_bucket, Some(true));
        assert_eq!(opts.secrets_mode, SecretsMode::KeyManagement);
        assert_eq!(opts.kms_alias.as_deref(), Some("team"));
        assert!(opts.delete_source && opts.fix_permissions && opts.assume_yes);
        assert!(!opts.skip_verify);
        assert!(opts.workspace.is_absolute());
        assert!(opts.workspace.ends_with("infra"));
    }

    #[test]
    fn test_hosted_options_from_flags() {
        let Command::MigrateToHosted(args) = parse(&[
            "migrate-to-hosted",
            "--stack",
            "dev",
            "--organization",
            "acme",
            "--backend",
            "s3://acme-state?region=eu-west-1",
            "--region",
            "eu-west-1",
            "--secrets-provider",
            "awskms",
            "--kms-key",
            "alias/pulumi-secrets",
            "--skip-verify",
        ]) else {
            panic!("wrong subcommand");
        };

        let opts = hosted_options(&Config::default(), &args).unwrap();
        assert_eq!(opts.organization, "acme");
        assert_eq!(opts.backend.as_deref(), Some("s3://acme-state?region=eu-west-1"));
        assert_eq!(opts.source_secrets, SecretsMode::KeyManagement);
        assert_eq!(opts.kms_key.as_deref(), Some("alias/pulumi-secrets"));
        assert!(opts.skip_verify);
        assert!(!opts.delete_source && !opts.assume_yes);
    }
}
