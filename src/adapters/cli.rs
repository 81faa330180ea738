//! CLI adapter — interactive and single-message command line interface.
//!
//! Every line typed at the prompt is one assistant turn in the channel's
//! session, so pronouns like "它" resolve against earlier turns.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;

use crate::assistant::{Assistant, TurnOutcome};
use crate::ui;
use crate::Result;

/// CLI channel for interactive assistant sessions.
pub struct CliChannel {
    assistant: Arc<Assistant>,
    session_id: String,
}

impl CliChannel {
    /// Create a new CLI channel bound to one session.
    pub fn new(assistant: Arc<Assistant>, session_id: impl Into<String>) -> Self {
        Self {
            assistant,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run a single message and return the outcome.
    pub async fn run_once(&self, message: &str) -> Result<TurnOutcome> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_message("Working");
        spinner.enable_steady_tick(Duration::from_millis(100));

        let outcome = self.assistant.handle(&self.session_id, message).await;
        spinner.finish_and_clear();

        outcome
    }

    /// Print the executed steps and the reply.
    pub fn print_outcome(outcome: &TurnOutcome) {
        for step in &outcome.steps {
            ui::print_tool_step(step);
        }
        if outcome.success {
            ui::print_success(&outcome.reply);
        } else {
            ui::print_warning(&outcome.reply);
        }
    }

    /// Run interactive REPL loop.
    pub async fn run_interactive(&self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("\n> ");
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF
                break;
            }

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            if is_exit_command(input) {
                println!("Goodbye! 👋");
                break;
            }

            match self.run_once(input).await {
                Ok(outcome) => Self::print_outcome(&outcome),
                Err(e) => ui::print_error(&e.to_string()),
            }
        }

        Ok(())
    }
}

fn is_exit_command(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q" | "退出")
}
