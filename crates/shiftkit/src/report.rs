//! Progress and event reporting.
//!
//! Presentation lives outside this crate. Workflows and the runner only emit
//! events through [`Reporter`]; the CLI renders them as spinners and messages.

/// Receiver for workflow progress events.
///
/// All methods default to no-ops so implementations only override what they
/// render.
pub trait Reporter {
    /// An external command tagged `op` started.
    fn op_started(&self, _op: &str, _message: &str) {}

    /// The external command tagged `op` finished.
    fn op_finished(&self, _op: &str, _succeeded: bool) {}

    /// A workflow step started.
    fn step(&self, _message: &str) {}

    /// Informational message.
    fn info(&self, _message: &str) {}

    /// Something degraded but the workflow continues.
    fn warn(&self, _message: &str) {}

    /// A step completed.
    fn success(&self, _message: &str) {}
}

/// Reporter that renders nothing.
pub struct NoReport;

impl Reporter for NoReport {}

/// Summary of a finished workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Completed steps in order
    pub completed: Vec<String>,
    /// Degradations the user should know about
    pub warnings: Vec<String>,
    /// Whether the source stack was deleted
    pub source_deleted: bool,
    /// Whether verification ran and reported no changes
    pub verified: bool,
}

impl Report {
    pub(crate) fn done(&mut self, reporter: &dyn Reporter, step: impl Into<String>) {
        let step = step.into();
        reporter.success(&step);
        self.completed.push(step);
    }

    pub(crate) fn warn(&mut self, reporter: &dyn Reporter, warning: impl Into<String>) {
        let warning = warning.into();
        log::warn!("{warning}");
        reporter.warn(&warning);
        self.warnings.push(warning);
    }

    /// Whether the run finished without any warnings.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_tracks_steps_and_warnings() {
        let mut report = Report::default();
        report.done(&NoReport, "bucket ready");
        assert!(report.is_clean());

        report.warn(&NoReport, "lifecycle rule not applied");
        assert!(!report.is_clean());
        assert_eq!(report.completed, vec!["bucket ready".to_string()]);
        assert_eq!(report.warnings.len(), 1);
    }
}
