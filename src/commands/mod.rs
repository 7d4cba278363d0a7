pub mod init;
pub mod login;
pub mod migrate;

use anyhow::Result;
use shiftkit::{Report, Reporter, SystemRunner, Toolbox};

use crate::Context;
use crate::config::Config;
use crate::paths;
use crate::progress::Spinners;
use crate::prompt;
use crate::ui;

/// Runner with the configured executables substituted for `pulumi` and `aws`.
fn system_runner<'a>(config: &Config, reporter: &'a dyn Reporter) -> SystemRunner<'a> {
    let mut runner = SystemRunner::new(reporter);
    for (name, path) in [("pulumi", &config.pulumi_bin), ("aws", &config.aws_bin)] {
        if let Some(path) = path {
            runner = runner.with_program(name, paths::expand(path).to_string_lossy().into_owned());
        }
    }
    runner
}

/// Run `workflow` against the real tools and print its report.
fn run_workflow<F>(ctx: &Context, interactive: bool, title: &str, workflow: F) -> Result<()>
where
    F: FnOnce(&Toolbox<'_>) -> shiftkit::Result<Report>,
{
    let reporter = Spinners::new(ctx.quiet);
    let runner = system_runner(&ctx.config, &reporter);
    let decide = prompt::decider(interactive);
    let tools =
        Toolbox::new(&runner, &reporter, decide.as_ref()).with_settings(ctx.config.settings());

    let report = workflow(&tools)?;
    if !ctx.quiet {
        ui::report(title, &report);
    }
    Ok(())
}
