//! Log the engine in to the project's S3 backend.

use super::{Toolbox, login_error};
use crate::error::{Error, Result};
use crate::location::BackendLocation;
use crate::preflight;
use crate::report::Report;
use crate::session::Session;
use std::path::PathBuf;

/// Options for [`login_object_storage`].
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Project directory
    pub workspace: PathBuf,
    /// Region when the project does not pin one
    pub region: String,
    /// Skip the confirmation
    pub assume_yes: bool,
}

/// Log in to the bucket the project pins, or the one derived from its name.
pub fn login_object_storage(tools: &Toolbox<'_>, opts: &LoginOptions) -> Result<Report> {
    let mut report = Report::default();

    preflight::check_tools(tools.runner, &["pulumi"])?;
    let project = preflight::check_project(&opts.workspace)?;

    let location = match project.backend_url() {
        Some(url) => BackendLocation::parse_object_storage(url, &opts.region)?,
        None => {
            let derived = project.bucket_name(&tools.settings.bucket_suffix);
            let bucket = tools.decide.ask("S3 bucket for stack state", &derived);
            BackendLocation::object_storage(&bucket, &opts.region)?
        }
    };

    if !tools.confirm(
        opts.assume_yes,
        &format!("Log in to {}?", location.name()),
        true,
    ) {
        return Err(Error::Declined(format!("login to {location}")));
    }

    let mut session = Session::new(tools.runner);
    if !session.login_object_storage(&location) {
        return Err(login_error(&location, false));
    }
    report.done(tools.reporter, format!("Logged in to {location}"));
    Ok(report)
}
