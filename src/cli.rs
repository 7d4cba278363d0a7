use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use shiftkit::{SecretsMode, StackRef};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackshift")]
#[command(version)]
#[command(
    about = "Move Pulumi stacks between Pulumi Cloud and S3 state storage",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable coloured output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Move a stack from Pulumi Cloud to an S3 bucket
    MigrateToObjectStore(ToObjectStoreArgs),

    /// Move a stack from an S3 bucket to Pulumi Cloud
    MigrateToHosted(ToHostedArgs),

    /// Provision a bucket and KMS key, then create a project stack on them
    Init(InitArgs),

    /// Log in to the project's S3 backend
    LoginObjectStore(LoginArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_stack(raw: &str) -> Result<StackRef, String> {
    StackRef::parse(raw).ok_or_else(|| format!("invalid stack reference '{raw}'"))
}

fn parse_secrets(raw: &str) -> Result<SecretsMode, String> {
    SecretsMode::parse(raw).ok_or_else(|| {
        format!("unknown secrets provider '{raw}' (expected default, passphrase or awskms)")
    })
}

/// Flags shared by every command that talks to a person.
#[derive(Args, Debug, Clone)]
pub struct PromptArgs {
    /// Answer yes to every confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Ask for values (bucket, names) instead of taking defaults
    #[arg(short, long)]
    pub interactive: bool,

    /// Project directory
    #[arg(short, long, default_value = ".")]
    pub workspace: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ToObjectStoreArgs {
    /// Stack to move ([org/]name)
    #[arg(short, long, value_parser = parse_stack)]
    pub stack: StackRef,

    /// Destination bucket (default: derived from the project name)
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// AWS region
    #[arg(short, long)]
    pub region: Option<String>,

    /// Create the bucket without asking
    #[arg(long, conflicts_with = "no_create_bucket")]
    pub create_bucket: bool,

    /// Fail instead of creating a missing bucket
    #[arg(long)]
    pub no_create_bucket: bool,

    /// Secrets provider for the destination
    #[arg(long, value_parser = parse_secrets, default_value = "awskms")]
    pub secrets_provider: SecretsMode,

    /// KMS alias (default from config or alias/pulumi-secrets)
    #[arg(long)]
    pub kms_alias: Option<String>,

    /// Passphrase for the passphrase provider
    #[arg(long, env = "PULUMI_CONFIG_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Create the KMS key and alias without asking
    #[arg(long)]
    pub create_kms: bool,

    /// Delete the Pulumi Cloud stack after a successful move
    #[arg(long)]
    pub delete_source: bool,

    /// Skip the preview after import
    #[arg(long)]
    pub skip_verify: bool,

    /// Add the current identity to the bucket policy
    #[arg(long)]
    pub fix_permissions: bool,

    #[command(flatten)]
    pub prompt: PromptArgs,
}

impl ToObjectStoreArgs {
    /// `Some(true)` for --create-bucket, `Some(false)` for
    /// --no-create-bucket, otherwise ask.
    pub fn create_bucket(&self) -> Option<bool> {
        match (self.create_bucket, self.no_create_bucket) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ToHostedArgs {
    /// Stack to move ([org/]name)
    #[arg(short, long, value_parser = parse_stack)]
    pub stack: StackRef,

    /// Destination organization on Pulumi Cloud
    #[arg(short, long)]
    pub organization: String,

    /// Source backend (s3://bucket?region=... or objectstore://...)
    #[arg(long)]
    pub backend: Option<String>,

    /// AWS region of the source bucket
    #[arg(short, long)]
    pub region: Option<String>,

    /// Pulumi Cloud access token
    #[arg(long, env = "PULUMI_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Secrets provider of the source stack
    #[arg(long, value_parser = parse_secrets, default_value = "service")]
    pub secrets_provider: SecretsMode,

    /// Passphrase of the source stack
    #[arg(long, env = "PULUMI_CONFIG_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// KMS key of the source stack (alias/..., key id or ARN)
    #[arg(long)]
    pub kms_key: Option<String>,

    /// Delete the bucket stack after a successful move
    #[arg(long)]
    pub delete_source: bool,

    /// Skip the preview after import
    #[arg(long)]
    pub skip_verify: bool,

    #[command(flatten)]
    pub prompt: PromptArgs,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Project name (default: existing project or directory name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Project description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Template for new projects
    #[arg(short, long, default_value = shiftkit::workflow::DEFAULT_TEMPLATE)]
    pub template: String,

    /// First stack name
    #[arg(short, long)]
    pub stack: Option<String>,

    /// State bucket (default: derived from the project name)
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// AWS region
    #[arg(short, long)]
    pub region: Option<String>,

    /// Secrets provider for the stack (asked with --interactive, otherwise awskms)
    #[arg(long, value_parser = parse_secrets)]
    pub secrets_provider: Option<SecretsMode>,

    /// KMS alias (default from config or alias/pulumi-secrets)
    #[arg(long)]
    pub kms_alias: Option<String>,

    /// Passphrase for the passphrase provider
    #[arg(long, env = "PULUMI_CONFIG_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Create the bucket without asking
    #[arg(long)]
    pub create_bucket: bool,

    /// Create the KMS key and alias without asking
    #[arg(long)]
    pub create_kms: bool,

    #[command(flatten)]
    pub prompt: PromptArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// AWS region when the project does not pin one
    #[arg(short, long)]
    pub region: Option<String>,

    #[command(flatten)]
    pub prompt: PromptArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_to_object_store() {
        let cli = Cli::try_parse_from([
            "stackshift",
            "migrate-to-object-store",
            "--stack",
            "acme/dev",
            "--secrets-provider",
            "passphrase",
            "--no-create-bucket",
            "-y",
        ])
        .unwrap();
        let Command::MigrateToObjectStore(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(args.stack.organization.as_deref(), Some("acme"));
        assert_eq!(args.secrets_provider, SecretsMode::Passphrase);
        assert_eq!(args.create_bucket(), Some(false));
        assert!(args.prompt.yes);
        assert_eq!(args.prompt.workspace, PathBuf::from("."));
    }

    #[test]
    fn test_create_bucket_flags_conflict() {
        assert!(
            Cli::try_parse_from([
                "stackshift",
                "migrate-to-object-store",
                "--stack",
                "dev",
                "--create-bucket",
                "--no-create-bucket",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_to_hosted_requires_organization() {
        assert!(
            Cli::try_parse_from(["stackshift", "migrate-to-hosted", "--stack", "dev"]).is_err()
        );

        let cli = Cli::try_parse_from([
            "stackshift",
            "migrate-to-hosted",
            "--stack",
            "dev",
            "--organization",
            "acme",
        ])
        .unwrap();
        let Command::MigrateToHosted(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(args.secrets_provider, SecretsMode::Default);
    }

    #[test]
    fn test_rejects_unknown_secrets_provider() {
        assert!(
            Cli::try_parse_from(["stackshift", "init", "--secrets-provider", "vault"]).is_err()
        );
    }
}
