use anyhow::Result;
use shiftkit::workflow::{self, ProvisionOptions};

use crate::Context;
use crate::cli::InitArgs;
use crate::config::Config;
use crate::paths;

pub fn run(ctx: &Context, args: &InitArgs) -> Result<()> {
    let opts = options(&ctx.config, args)?;
    super::run_workflow(ctx, args.prompt.interactive, "Project ready", |tools| {
        workflow::provision(tools, &opts)
    })
}

fn options(config: &Config, args: &InitArgs) -> Result<ProvisionOptions> {
    let mut opts = ProvisionOptions::new(paths::workspace(&args.prompt.workspace)?);
    opts.name.clone_from(&args.name);
    opts.description.clone_from(&args.description);
    opts.template.clone_from(&args.template);
    opts.stack.clone_from(&args.stack);
    opts.bucket.clone_from(&args.bucket);
    opts.region = config.region(args.region.as_deref());
    opts.secrets_mode = args.secrets_provider;
    opts.kms_alias.clone_from(&args.kms_alias);
    opts.passphrase.clone_from(&args.passphrase);
    opts.create_bucket = args.create_bucket;
    opts.create_kms = args.create_kms;
    opts.assume_yes = args.prompt.yes;
    Ok(opts)
}
