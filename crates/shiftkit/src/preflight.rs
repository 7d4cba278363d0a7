//! Checks run before any workflow mutates anything.

use crate::error::{Error, Result};
use crate::exec::{RunOptions, Runner};
use crate::project::Project;
use crate::session::ACCESS_TOKEN_ENV;
use serde::Deserialize;
use std::path::Path;

/// Tools every workflow needs.
pub const REQUIRED_TOOLS: [&str; 2] = ["pulumi", "aws"];

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Identity {
    account: String,
    arn: String,
}

/// Fail on the first tool in `tools` that is not on `PATH`.
pub fn check_tools(runner: &dyn Runner, tools: &[&str]) -> Result<()> {
    for tool in tools {
        if !runner.command_exists(tool) {
            return Err(Error::ToolMissing {
                tool: (*tool).to_string(),
            });
        }
        log::debug!("found {tool}");
    }
    Ok(())
}

/// Confirm AWS credentials resolve to an identity. Returns its ARN.
pub fn check_aws_credentials(runner: &dyn Runner) -> Result<String> {
    let result = runner.run(
        "aws",
        &["sts", "get-caller-identity", "--output", "json"],
        &RunOptions::new().observed("aws-identity", "Checking AWS credentials"),
    );
    if !result.success {
        return Err(Error::Credentials {
            message: "AWS credentials are missing or expired".to_string(),
            detail: result.output().to_string(),
        });
    }
    let identity: Identity =
        serde_json::from_str(&result.stdout).map_err(|e| Error::Credentials {
            message: "unexpected output from aws sts get-caller-identity".to_string(),
            detail: e.to_string(),
        })?;
    log::info!("AWS account {} as {}", identity.account, identity.arn);
    Ok(identity.arn)
}

/// Confirm the engine is logged in to Pulumi Cloud. Returns the user name.
pub fn check_hosted_session(runner: &dyn Runner, token: Option<&str>) -> Result<String> {
    let mut opts = RunOptions::silent();
    if let Some(token) = token {
        opts = opts.env(ACCESS_TOKEN_ENV, token);
    }
    let result = runner.run("pulumi", &["whoami"], &opts);
    let user = result.output();
    if result.success && !user.is_empty() {
        Ok(user.to_string())
    } else {
        Err(Error::Login {
            backend: "Pulumi Cloud".to_string(),
            hint: format!("Run `pulumi login` or set {ACCESS_TOKEN_ENV}"),
        })
    }
}

/// Load the project the workflow operates on.
pub fn check_project(workspace: &Path) -> Result<Project> {
    let project = Project::load(workspace)?;
    log::debug!("project {} in {}", project.name, workspace.display());
    Ok(project)
}
