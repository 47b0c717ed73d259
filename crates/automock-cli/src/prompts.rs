//! Terminal prompter backing the run pipeline
//!
//! Variable values and continue-on-failure confirmations go through
//! `dialoguer`. With `--yes` the prompter turns non-interactive: variables
//! are never supplied and every continue question is answered yes.

use async_trait::async_trait;
use automock_core::run::Prompter;
use dialoguer::{theme::ColorfulTheme, Confirm, Input};

/// Prompter for an interactive terminal session.
#[derive(Debug, Clone)]
pub struct TerminalPrompter {
    assume_yes: bool,
}

impl TerminalPrompter {
    /// `assume_yes` disables interaction and auto-continues past failures.
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn prompt_variable(&self, name: &str, request_name: &str) -> Option<String> {
        if self.assume_yes {
            return None;
        }
        let prompt = format!("Value for variable '{name}' (request '{request_name}')");
        let answer = tokio::task::spawn_blocking(move || {
            Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        })
        .await
        .ok()?
        .ok()?;
        if answer.is_empty() {
            None
        } else {
            Some(answer)
        }
    }

    async fn confirm_continue(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        let prompt = message.to_string();
        tokio::task::spawn_blocking(move || {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await
        .map(|r| r.unwrap_or(false))
        .unwrap_or(false)
    }
}
