//! Backend session handling.
//!
//! The engine keeps one process-wide "current backend". [`Session`] is the
//! only thing that changes it, and it remembers where it left it, so the
//! workflows can assert which backend is active after every step.

use crate::exec::{RunOptions, Runner};
use crate::location::BackendLocation;

/// Environment variable carrying a Pulumi Cloud access token.
pub const ACCESS_TOKEN_ENV: &str = "PULUMI_ACCESS_TOKEN";

/// Handle on the engine's ambient login state.
pub struct Session<'r> {
    runner: &'r dyn Runner,
    current: Option<BackendLocation>,
}

impl<'r> Session<'r> {
    /// Session with unknown state.
    pub fn new(runner: &'r dyn Runner) -> Self {
        Self {
            runner,
            current: None,
        }
    }

    /// Session already logged in to `location` (verified by the caller).
    pub fn adopt(runner: &'r dyn Runner, location: BackendLocation) -> Self {
        Self {
            runner,
            current: Some(location),
        }
    }

    /// Backend the engine is logged in to, as far as this session knows.
    pub fn current(&self) -> Option<&BackendLocation> {
        self.current.as_ref()
    }

    /// `pulumi logout`. The state is unknown afterwards either way.
    pub fn logout(&mut self) -> bool {
        self.current = None;
        self.runner
            .run("pulumi", &["logout"], &RunOptions::silent())
            .success
    }

    /// Log out, then log in to an S3 backend.
    pub fn login_object_storage(&mut self, location: &BackendLocation) -> bool {
        let (Some(url), BackendLocation::ObjectStorage { region, .. }) =
            (location.login_url(), location)
        else {
            log::warn!("{location} is not an object storage location");
            return false;
        };

        // Logging out first is harmless when not logged in.
        self.logout();

        let result = self.runner.run(
            "pulumi",
            &["login", &url],
            &RunOptions::new()
                .env("AWS_REGION", region.as_str())
                .observed("login", format!("Logging in to {}", location.name())),
        );
        if result.success {
            log::info!("logged in to {location}");
            self.current = Some(location.clone());
        } else {
            log::warn!("login to {location} failed: {}", result.output());
        }
        result.success
    }

    /// Log out, log in to Pulumi Cloud and confirm the identity.
    ///
    /// `pulumi login` can exit 0 with stale cached credentials, so the
    /// session only counts as logged in once `pulumi whoami` also succeeds.
    pub fn login_hosted(&mut self, organization: Option<&str>, token: Option<&str>) -> bool {
        self.logout();

        let mut opts = RunOptions::new().observed("login", "Logging in to Pulumi Cloud");
        if let Some(token) = token {
            opts = opts.env(ACCESS_TOKEN_ENV, token);
        }
        let login = self.runner.run("pulumi", &["login"], &opts);
        if !login.success {
            log::warn!("pulumi login failed: {}", login.output());
            return false;
        }

        match self.whoami(token) {
            Some(user) => {
                log::info!("logged in to Pulumi Cloud as {user}");
                self.current = Some(BackendLocation::hosted(organization));
                true
            }
            None => false,
        }
    }

    /// Log in to whichever backend `location` names.
    pub fn login(&mut self, location: &BackendLocation, token: Option<&str>) -> bool {
        match location {
            BackendLocation::ObjectStorage { .. } => self.login_object_storage(location),
            BackendLocation::Hosted { organization } => {
                self.login_hosted(organization.as_deref(), token)
            }
        }
    }

    /// Current user according to the engine.
    pub fn whoami(&self, token: Option<&str>) -> Option<String> {
        let mut opts = RunOptions::silent();
        if let Some(token) = token {
            opts = opts.env(ACCESS_TOKEN_ENV, token);
        }
        let result = self.runner.run("pulumi", &["whoami"], &opts);
        let user = result.output();
        if result.success && !user.is_empty() {
            Some(user.lines().next().unwrap_or(user).trim().to_string())
        } else {
            log::debug!("pulumi whoami failed: {user}");
            None
        }
    }
}
