//! Terminal prompts.

use dialoguer::{Confirm, Input, Password, Select};
use shiftkit::{Decide, Defaults};

/// Asks on the terminal. Confirmations are always asked; free-text values
/// (bucket, project and stack names) only with `--interactive`, otherwise
/// their defaults are taken.
pub struct Prompt {
    ask_values: bool,
}

impl Decide for Prompt {
    fn confirm(&self, question: &str, default: bool) -> bool {
        Confirm::new()
            .with_prompt(question)
            .default(default)
            .interact()
            .unwrap_or_else(|e| {
                log::debug!("prompt failed ({e}); using default");
                default
            })
    }

    fn choose(&self, question: &str, options: &[&str], default: usize) -> usize {
        if !self.ask_values || options.is_empty() {
            return Defaults.choose(question, options, default);
        }
        Select::new()
            .with_prompt(question)
            .items(options)
            .default(default.min(options.len() - 1))
            .interact()
            .unwrap_or(default)
    }

    fn ask(&self, question: &str, default: &str) -> String {
        if !self.ask_values {
            return default.to_string();
        }
        Input::new()
            .with_prompt(question)
            .default(default.to_string())
            .interact_text()
            .unwrap_or_else(|_| default.to_string())
    }

    fn ask_secret(&self, question: &str) -> Option<String> {
        Password::new()
            .with_prompt(question)
            .interact()
            .ok()
            .filter(|p| !p.is_empty())
    }

    fn is_interactive(&self) -> bool {
        self.ask_values
    }
}

/// Decider for this run: prompts when a terminal is attached, defaults
/// otherwise.
pub fn decider(interactive: bool) -> Box<dyn Decide> {
    if console::Term::stderr().features().is_attended() {
        Box::new(Prompt {
            ask_values: interactive,
        })
    } else {
        if interactive {
            log::warn!("--interactive ignored: no terminal attached");
        }
        Box::new(Defaults)
    }
}
