//! Error types for migration and provisioning workflows.
//!
//! Internal helpers report expected failures (missing resource, non-zero exit)
//! as `bool`, `Option` or [`Outcome`](crate::Outcome). An [`Error`] is only
//! produced when a workflow has to stop, so every variant maps to a category
//! that decides how the CLI explains it.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Categories of workflow errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A required tool, credential or project is missing. Nothing was mutated.
    Precondition,
    /// A bucket or key could not be created.
    Provisioning,
    /// Export, destination creation or import failed. The source stack is
    /// still the authoritative copy.
    Transfer,
    /// The imported stack does not match the source and the run stopped.
    Verification,
    /// The user declined to continue past a warning.
    Declined,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Precondition => "Precondition failed",
            Self::Provisioning => "Resource provisioning failed",
            Self::Transfer => "State transfer failed",
            Self::Verification => "Verification failed",
            Self::Declined => "Cancelled",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Precondition => {
                "Install the missing tool or refresh your credentials, then retry"
            }
            Self::Provisioning => {
                "Check that your AWS identity may create S3 buckets and KMS keys in this region"
            }
            Self::Transfer => {
                "The source stack was not modified; fix the problem and rerun the migration"
            }
            Self::Verification => {
                "Run `pulumi preview` on the destination stack to inspect the drift"
            }
            Self::Declined => "No further changes were made",
            Self::Other => "Rerun with --verbose for the full command output",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that stop a workflow.
#[derive(Debug, Error)]
pub enum Error {
    /// A required executable is not on `PATH`
    #[error("required tool not found: {tool}")]
    ToolMissing {
        /// Name of the missing executable
        tool: String,
    },

    /// Cloud or backend credentials are missing or rejected
    #[error("credentials check failed: {message}")]
    Credentials {
        /// What was being checked
        message: String,
        /// Captured output of the failing command
        detail: String,
    },

    /// The Pulumi project in the workspace is missing or unreadable
    #[error("cannot read project at {}: {message}", path.display())]
    Project {
        /// Path of the project descriptor
        path: PathBuf,
        /// Why it could not be used
        message: String,
    },

    /// A backend location string could not be parsed
    #[error("invalid backend location '{raw}': {reason}")]
    InvalidLocation {
        /// The string as given
        raw: String,
        /// What is wrong with it
        reason: String,
    },

    /// A secrets configuration is incomplete
    #[error("invalid secrets configuration: {0}")]
    InvalidSecrets(String),

    /// Backend login failed
    #[error("login to {backend} failed")]
    Login {
        /// Backend display name
        backend: String,
        /// Hint tailored to how the login was attempted
        hint: String,
    },

    /// A primary resource could not be provisioned
    #[error("could not provision {resource}: {message}")]
    Provision {
        /// Resource description, e.g. `bucket my-state`
        resource: String,
        /// Summary of the failure
        message: String,
        /// Captured output of the failing command
        detail: String,
    },

    /// A state transfer step failed
    #[error("{step} failed for stack {stack}")]
    Transfer {
        /// Step that failed
        step: TransferStep,
        /// Stack address the step ran against
        stack: String,
        /// Captured output of the failing command
        detail: String,
    },

    /// Verification reported pending changes and the run stopped
    #[error("destination stack {stack} differs from its source")]
    Verification {
        /// Stack address
        stack: String,
        /// Preview summary
        detail: String,
    },

    /// The user declined to continue
    #[error("declined: {0}")]
    Declined(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transfer steps that can fail fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    /// `pulumi stack export`
    Export,
    /// `pulumi stack init` on the destination backend
    CreateDestination,
    /// `pulumi stack import`
    Import,
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Export => "state export",
            Self::CreateDestination => "destination stack creation",
            Self::Import => "state import",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ToolMissing { .. }
            | Self::Credentials { .. }
            | Self::Project { .. }
            | Self::InvalidLocation { .. }
            | Self::InvalidSecrets(_)
            | Self::Login { .. } => ErrorCategory::Precondition,
            Self::Provision { .. } => ErrorCategory::Provisioning,
            Self::Transfer { .. } => ErrorCategory::Transfer,
            Self::Verification { .. } => ErrorCategory::Verification,
            Self::Declined(_) => ErrorCategory::Declined,
            Self::Io(_) => ErrorCategory::Other,
        }
    }

    /// Actionable advice, specific to the variant where one is known.
    pub fn advice(&self) -> String {
        match self {
            Self::ToolMissing { tool } if tool == "pulumi" => {
                "Install the Pulumi CLI: https://www.pulumi.com/docs/install/".to_string()
            }
            Self::ToolMissing { tool } if tool == "aws" => {
                "Install the AWS CLI v2: https://aws.amazon.com/cli/".to_string()
            }
            Self::Credentials { .. } => {
                "Run `aws configure` or `aws sso login` and check AWS_PROFILE".to_string()
            }
            Self::Login { hint, .. } => hint.clone(),
            Self::InvalidLocation { .. } => {
                "Use the form objectstore://<bucket>?region=<region>".to_string()
            }
            other => other.category().advice().to_string(),
        }
    }

    /// Captured command output behind this error, if any.
    pub fn detail(&self) -> Option<&str> {
        let detail = match self {
            Self::Credentials { detail, .. }
            | Self::Provision { detail, .. }
            | Self::Transfer { detail, .. }
            | Self::Verification { detail, .. } => detail.as_str(),
            _ => return None,
        };
        if detail.trim().is_empty() {
            None
        } else {
            Some(detail)
        }
    }

    pub(crate) fn transfer(step: TransferStep, stack: &str, detail: impl Into<String>) -> Self {
        Self::Transfer {
            step,
            stack: stack.to_string(),
            detail: detail.into(),
        }
    }
}

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, Error>;
