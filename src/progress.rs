//! Progress rendering for workflow events.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use shiftkit::Reporter;
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use crate::ui;

/// Spinner for a running external command.
fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Renders workflow events: one spinner per running command, keyed by the
/// operation id, and coloured lines for steps and results.
pub struct Spinners {
    quiet: bool,
    active: RefCell<HashMap<String, (ProgressBar, String)>>,
}

impl Spinners {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            active: RefCell::new(HashMap::new()),
        }
    }
}

impl Reporter for Spinners {
    fn op_started(&self, op: &str, message: &str) {
        if self.quiet {
            return;
        }
        let pb = spinner(message);
        if let Some((previous, _)) = self
            .active
            .borrow_mut()
            .insert(op.to_string(), (pb, message.to_string()))
        {
            previous.finish_and_clear();
        }
    }

    fn op_finished(&self, op: &str, succeeded: bool) {
        let Some((pb, message)) = self.active.borrow_mut().remove(op) else {
            return;
        };
        pb.finish_and_clear();
        if !succeeded {
            eprintln!("{} {}", "✗".red(), message);
        }
    }

    fn step(&self, message: &str) {
        if !self.quiet {
            ui::section(message);
        }
    }

    fn info(&self, message: &str) {
        if !self.quiet {
            ui::info(message);
        }
    }

    fn warn(&self, message: &str) {
        ui::warn(message);
    }

    fn success(&self, message: &str) {
        if !self.quiet {
            ui::success(message);
        }
    }
}

impl Drop for Spinners {
    fn drop(&mut self) {
        for (_, (pb, _)) in self.active.borrow_mut().drain() {
            pb.finish_and_clear();
        }
    }
}
