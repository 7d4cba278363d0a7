//! # shiftkit
//!
//! Pulumi stack state migration between Pulumi Cloud and S3.
//!
//! This crate provides:
//! - Provisioning of the state bucket (versioning, encryption, lifecycle,
//!   access policy) and the KMS key used for stack secrets
//! - Switching a stack's secrets provider
//! - An ordered export / create / import / verify / delete transfer
//! - Workflows composing the above, with explicit session handling so the
//!   engine is never left logged in to a backend a stack was deleted from
//!
//! Every external effect goes through the [`Runner`] trait, every question
//! through [`Decide`], and every progress event through [`Reporter`].
//!
//! ## Example
//!
//! ```no_run
//! use shiftkit::{Defaults, NoReport, StackRef, SystemRunner, Toolbox};
//! use shiftkit::workflow::{ToObjectStorageOptions, to_object_storage};
//!
//! let runner = SystemRunner::default();
//! let tools = Toolbox::new(&runner, &NoReport, &Defaults);
//!
//! let stack = StackRef::parse("acme/dev").expect("valid stack");
//! let mut opts = ToObjectStorageOptions::new(stack, ".");
//! opts.bucket = Some("acme-pulumi-state".to_string());
//! opts.assume_yes = true;
//!
//! let report = to_object_storage(&tools, &opts).expect("migration failed");
//! for step in &report.completed {
//!     println!("done: {step}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decide;
pub mod error;
pub mod exec;
pub mod location;
pub mod policy;
pub mod preflight;
pub mod preview;
pub mod project;
pub mod provision;
pub mod report;
pub mod secrets;
pub mod session;
pub mod stack;
pub mod staging;
pub mod transfer;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use decide::{Decide, Defaults};
pub use error::{Error, ErrorCategory, Result, TransferStep};
pub use exec::{ExecResult, RunOptions, Runner, SystemRunner};
pub use location::BackendLocation;
pub use preview::ChangeSummary;
pub use project::Project;
pub use provision::{Outcome, Provisioner};
pub use report::{NoReport, Report, Reporter};
pub use secrets::{SecretsConfig, SecretsManager, SecretsMode};
pub use session::Session;
pub use stack::StackRef;
pub use staging::StagingDir;
pub use transfer::{Transfer, TransferState};
pub use workflow::{Settings, Toolbox};
