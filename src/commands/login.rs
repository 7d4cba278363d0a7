use anyhow::Result;
use shiftkit::workflow::{self, LoginOptions};

use crate::Context;
use crate::cli::LoginArgs;
use crate::paths;

pub fn run(ctx: &Context, args: &LoginArgs) -> Result<()> {
    let opts = LoginOptions {
        workspace: paths::workspace(&args.prompt.workspace)?,
        region: ctx.config.region(args.region.as_deref()),
        assume_yes: args.prompt.yes,
    };
    super::run_workflow(ctx, args.prompt.interactive, "Logged in", |tools| {
        workflow::login_object_storage(tools, &opts)
    })
}
