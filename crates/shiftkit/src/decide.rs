//! User decisions at risk points.
//!
//! Workflows never talk to a terminal. Every question goes through
//! [`Decide`], so the CLI can plug in real prompts and tests can script
//! answers.

/// Capability to ask the user something.
pub trait Decide {
    /// Yes/no question.
    fn confirm(&self, question: &str, default: bool) -> bool;

    /// Pick one of `options`; returns the chosen index.
    fn choose(&self, question: &str, options: &[&str], default: usize) -> usize;

    /// Free text with a default.
    fn ask(&self, question: &str, default: &str) -> String;

    /// Hidden input. `None` when no answer can be obtained.
    fn ask_secret(&self, _question: &str) -> Option<String> {
        None
    }

    /// Whether answers come from a person.
    fn is_interactive(&self) -> bool {
        false
    }
}

/// Non-interactive decider: every question gets its default.
pub struct Defaults;

impl Decide for Defaults {
    fn confirm(&self, question: &str, default: bool) -> bool {
        log::debug!("non-interactive: '{question}' -> {default}");
        default
    }

    fn choose(&self, _question: &str, options: &[&str], default: usize) -> usize {
        default.min(options.len().saturating_sub(1))
    }

    fn ask(&self, _question: &str, default: &str) -> String {
        default.to_string()
    }
}

/// Confirm unless the user already said yes to everything.
pub(crate) fn confirm_or_assume(
    decide: &dyn Decide,
    assume_yes: bool,
    question: &str,
    default: bool,
) -> bool {
    assume_yes || decide.confirm(question, default)
}
