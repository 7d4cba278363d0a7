//! Scripted collaborators for unit tests.

use crate::decide::Decide;
use crate::exec::{ExecResult, RunOptions, Runner};
use std::cell::RefCell;
use std::collections::VecDeque;

/// One recorded invocation.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub line: String,
    pub env: Vec<(String, String)>,
}

struct Rule {
    pattern: String,
    result: ExecResult,
    once: bool,
    used: bool,
}

/// Runner that answers from scripted rules and records every call.
///
/// One-shot rules are consumed first, in registration order. Otherwise the
/// most recently registered persistent rule whose pattern is a substring of
/// the command line wins. Unmatched commands succeed with empty output.
pub(crate) struct FakeRunner {
    rules: RefCell<Vec<Rule>>,
    calls: RefCell<Vec<Call>>,
    missing: Vec<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            rules: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            missing: Vec::new(),
        }
    }

    pub fn on(self, pattern: &str, result: ExecResult) -> Self {
        self.push(pattern, result, false);
        self
    }

    pub fn once(self, pattern: &str, result: ExecResult) -> Self {
        self.push(pattern, result, true);
        self
    }

    pub fn without_tool(mut self, tool: &str) -> Self {
        self.missing.push(tool.to_string());
        self
    }

    fn push(&self, pattern: &str, result: ExecResult, once: bool) {
        self.rules.borrow_mut().push(Rule {
            pattern: pattern.to_string(),
            result,
            once,
            used: false,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.line.clone()).collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.line.contains(pattern))
            .count()
    }

    /// Index of the first call containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.calls
            .borrow()
            .iter()
            .position(|c| c.line.contains(pattern))
    }

    /// Environment passed to the first call containing `pattern`.
    pub fn env_of(&self, pattern: &str) -> Vec<(String, String)> {
        self.calls
            .borrow()
            .iter()
            .find(|c| c.line.contains(pattern))
            .map(|c| c.env.clone())
            .unwrap_or_default()
    }
}

impl Runner for FakeRunner {
    fn run(&self, program: &str, args: &[&str], opts: &RunOptions) -> ExecResult {
        let line = format!("{} {}", program, args.join(" "));
        self.calls.borrow_mut().push(Call {
            line: line.clone(),
            env: opts.env.clone(),
        });

        let mut rules = self.rules.borrow_mut();
        if let Some(rule) = rules
            .iter_mut()
            .find(|r| r.once && !r.used && line.contains(&r.pattern))
        {
            rule.used = true;
            return rule.result.clone();
        }
        rules
            .iter()
            .rev()
            .find(|r| !r.once && line.contains(&r.pattern))
            .map_or_else(|| ExecResult::ok(""), |r| r.result.clone())
    }

    fn command_exists(&self, program: &str) -> bool {
        !self.missing.iter().any(|m| m == program)
    }
}

/// Decider answering confirmations from a queue, falling back to defaults.
pub(crate) struct ScriptedDecide {
    answers: RefCell<VecDeque<bool>>,
    choice: Option<usize>,
    pub questions: RefCell<Vec<String>>,
}

impl ScriptedDecide {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            choice: None,
            questions: RefCell::new(Vec::new()),
        }
    }

    /// Interactive decider picking option `index` from every menu.
    pub fn choosing(index: usize) -> Self {
        Self {
            choice: Some(index),
            ..Self::answering(&[])
        }
    }
}

impl Decide for ScriptedDecide {
    fn confirm(&self, question: &str, default: bool) -> bool {
        self.questions.borrow_mut().push(question.to_string());
        self.answers.borrow_mut().pop_front().unwrap_or(default)
    }

    fn choose(&self, question: &str, options: &[&str], default: usize) -> usize {
        self.questions.borrow_mut().push(question.to_string());
        self.choice
            .unwrap_or(default)
            .min(options.len().saturating_sub(1))
    }

    fn ask(&self, _question: &str, default: &str) -> String {
        default.to_string()
    }

    fn is_interactive(&self) -> bool {
        self.choice.is_some()
    }
}
