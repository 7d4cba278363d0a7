//! Stack state transfer between backends.
//!
//! A transfer walks a fixed sequence of states:
//!
//! ```text
//! Idle -> Exported -> DestinationReady -> Imported -> Verified -> SourceDeleted -> Complete
//! ```
//!
//! Any step may move it to `Failed`, which is absorbing. Each operation
//! checks the state it is called from and refuses to run out of order, so a
//! failed export can never be followed by an import of a stale file.

use crate::exec::{RunOptions, Runner};
use crate::location::BackendLocation;
use crate::preview::ChangeSummary;
use crate::secrets::{SecretsConfig, SecretsMode};
use crate::session::Session;
use crate::stack::StackRef;
use crate::staging::StagingDir;
use std::fmt;
use std::path::{Path, PathBuf};

/// Position of a transfer in its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Nothing done yet
    Idle,
    /// Source state is in the staging file
    Exported,
    /// Destination stack exists
    DestinationReady,
    /// Staged state imported into the destination
    Imported,
    /// Destination verified, or the user accepted it unverified
    Verified,
    /// Source stack deleted
    SourceDeleted,
    /// Finished
    Complete,
    /// A step failed
    Failed,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One stack's move from a source backend to a destination backend.
pub struct Transfer<'r> {
    runner: &'r dyn Runner,
    stack: StackRef,
    workspace: PathBuf,
    state: TransferState,
    staged: Option<PathBuf>,
    destination: Option<String>,
    destination_env: Vec<(String, String)>,
    changes: Option<ChangeSummary>,
    last_output: String,
}

impl<'r> Transfer<'r> {
    /// New transfer of `stack` for the project in `workspace`.
    pub fn new(runner: &'r dyn Runner, stack: StackRef, workspace: &Path) -> Self {
        Self {
            runner,
            stack,
            workspace: workspace.to_path_buf(),
            state: TransferState::Idle,
            staged: None,
            destination: None,
            destination_env: Vec::new(),
            changes: None,
            last_output: String::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Stack being moved.
    pub fn stack(&self) -> &StackRef {
        &self.stack
    }

    /// Address the destination stack was created under.
    pub fn destination_address(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Changes reported by the last verification.
    pub fn changes(&self) -> Option<ChangeSummary> {
        self.changes
    }

    /// Captured output of the last command that failed.
    pub fn last_output(&self) -> &str {
        &self.last_output
    }

    fn expect(&mut self, expected: TransferState, operation: &str) -> bool {
        if self.state == expected {
            return true;
        }
        self.last_output = format!(
            "{operation} called in state {}, expected {expected}",
            self.state
        );
        log::warn!("{}", self.last_output);
        false
    }

    fn fail(&mut self, output: &str) {
        self.last_output = output.to_string();
        self.state = TransferState::Failed;
    }

    fn pulumi(&self, args: &[&str], opts: RunOptions) -> crate::exec::ExecResult {
        self.runner.run("pulumi", args, &opts.cwd(&self.workspace))
    }

    /// Export the source stack, secrets included in plaintext, into
    /// `staging`. The destination re-encrypts them with its own provider.
    pub fn export_state(
        &mut self,
        staging: &StagingDir,
        source_env: &[(String, String)],
    ) -> Option<PathBuf> {
        if !self.expect(TransferState::Idle, "export") {
            return None;
        }
        let address = self.stack.qualified(None);
        let path = staging.file(&self.stack.file_stem());
        let file = path.to_string_lossy().to_string();

        let result = self.pulumi(
            &[
                "stack",
                "export",
                "--stack",
                &address,
                "--show-secrets",
                "--file",
                &file,
            ],
            RunOptions::new()
                .envs(source_env)
                .observed("export", format!("Exporting {address}")),
        );
        if !result.success {
            self.fail(result.output());
            return None;
        }

        log::info!("exported {address} to {}", path.display());
        self.staged = Some(path.clone());
        self.state = TransferState::Exported;
        Some(path)
    }

    /// Create the destination stack on the backend the session is logged in
    /// to.
    ///
    /// On object storage the organization-qualified name is tried first and,
    /// if that fails and there is an organization, the bare name once more,
    /// for backends without organization namespaces. On the hosted service the
    /// stack is always created under the location's organization.
    pub fn create_destination_stack(
        &mut self,
        destination: &BackendLocation,
        secrets: &SecretsConfig,
    ) -> bool {
        if !self.expect(TransferState::Exported, "create destination") {
            return false;
        }

        let (first, fallback) = match destination {
            BackendLocation::ObjectStorage { .. } => {
                let qualified = self.stack.qualified(None);
                let fallback = self
                    .stack
                    .organization
                    .as_ref()
                    .map(|_| self.stack.name.clone());
                (qualified, fallback)
            }
            BackendLocation::Hosted { organization } => {
                (self.stack.qualified(organization.as_deref()), None)
            }
        };

        let provider = secrets.provider_url();
        let pass_provider =
            !(destination.is_hosted() && secrets.mode() == SecretsMode::Default);
        let env = secrets.env();

        let init = |address: &str| {
            let mut args = vec!["stack", "init", address];
            if pass_provider {
                args.extend(["--secrets-provider", provider.as_str()]);
            }
            args.push("--non-interactive");
            self.pulumi(
                &args,
                RunOptions::new()
                    .envs(&env)
                    .observed("stack-init", format!("Creating stack {address}")),
            )
        };

        let mut result = init(&first);
        let mut address = first;
        if !result.success
            && let Some(bare) = fallback
        {
            log::info!(
                "creating {address} failed ({}); retrying as {bare}",
                result.output()
            );
            result = init(&bare);
            address = bare;
        }

        if !result.success {
            self.fail(result.output());
            return false;
        }

        log::info!("created destination stack {address} on {destination}");
        self.destination = Some(address);
        self.destination_env = env;
        self.state = TransferState::DestinationReady;
        true
    }

    /// Import the staged state into the destination stack.
    pub fn import_state(&mut self) -> bool {
        if !self.expect(TransferState::DestinationReady, "import") {
            return false;
        }
        let (Some(path), Some(address)) = (self.staged.clone(), self.destination.clone()) else {
            self.fail("no staged state or destination stack");
            return false;
        };
        let file = path.to_string_lossy().to_string();

        let result = self.pulumi(
            &["stack", "import", "--stack", &address, "--file", &file],
            RunOptions::new()
                .envs(&self.destination_env)
                .observed("import", format!("Importing state into {address}")),
        );
        if !result.success {
            self.fail(result.output());
            return false;
        }

        log::info!("imported state into {address}");
        self.state = TransferState::Imported;
        true
    }

    /// Preview the destination and require zero pending changes.
    ///
    /// A failed verification leaves the transfer in `Imported`; the caller
    /// decides whether to [`accept_unverified`](Self::accept_unverified).
    pub fn verify(&mut self) -> bool {
        if !self.expect(TransferState::Imported, "verify") {
            return false;
        }
        let Some(address) = self.destination.clone() else {
            return false;
        };

        let result = self.pulumi(
            &["preview", "--stack", &address, "--non-interactive", "--diff"],
            RunOptions::new()
                .envs(&self.destination_env)
                .observed("preview", format!("Verifying {address}")),
        );
        let changes = ChangeSummary::parse(&result.stdout);
        self.changes = Some(changes);

        if !result.success {
            self.last_output = result.output().to_string();
            log::warn!("preview of {address} failed");
            return false;
        }
        if changes.has_changes() {
            self.last_output = result.stdout.clone();
            log::warn!("preview of {address} reports {}", changes.describe());
            return false;
        }

        log::info!("verified {address}: no changes");
        self.state = TransferState::Verified;
        true
    }

    /// Continue past a skipped or failed verification.
    pub fn accept_unverified(&mut self) -> bool {
        if !self.expect(TransferState::Imported, "accept unverified") {
            return false;
        }
        self.state = TransferState::Verified;
        true
    }

    /// Delete the stack from the source backend.
    ///
    /// Logs in to `source`, removes the stack, then logs back in to
    /// `destination` whatever happened, so the session never stays on the
    /// backend the stack was just removed from. Returns whether the stack was
    /// deleted and the destination session restored.
    pub fn delete_source_stack(
        &mut self,
        session: &mut Session<'_>,
        source: &BackendLocation,
        destination: &BackendLocation,
        token: Option<&str>,
    ) -> bool {
        if !self.expect(TransferState::Verified, "delete source") {
            return false;
        }
        let address = self.stack.qualified(None);

        let deleted = if session.login(source, token) {
            let result = self.pulumi(
                &["stack", "rm", &address, "--yes", "--force", "--non-interactive"],
                RunOptions::new().observed(
                    "stack-rm",
                    format!("Deleting {address} from {}", source.name()),
                ),
            );
            if !result.success {
                self.last_output = result.output().to_string();
            }
            result.success
        } else {
            self.last_output = format!("could not log in to {}", source.name());
            false
        };

        let restored = session.login(destination, token);
        if !restored {
            log::warn!("could not log back in to {destination}");
        }

        if deleted {
            log::info!("deleted {address} from {source}");
            self.state = TransferState::SourceDeleted;
        }
        deleted && restored
    }

    /// Mark the transfer finished.
    pub fn complete(&mut self) -> bool {
        if matches!(
            self.state,
            TransferState::Verified | TransferState::SourceDeleted
        ) {
            self.state = TransferState::Complete;
            true
        } else {
            false
        }
    }
}
