//! Human-interaction surface: ask, confirm, choose and show.
//!
//! The phase drivers only talk to the [`Operator`] trait. [`TerminalOperator`]
//! implements it with `dialoguer`; tests use a scripted operator.

use std::path::Path;

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

/// Decisions and free text from the human running the session.
pub trait Operator {
    /// Free text, trimmed. At least `min_chars` characters unless
    /// `min_chars` is zero, in which case empty input is allowed.
    fn ask(&mut self, prompt: &str, min_chars: usize) -> Result<String>;

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;

    /// Index into `options` of the selected label.
    fn choose(&mut self, prompt: &str, options: &[&str]) -> Result<usize>;

    /// Display a block of content, truncated with a pointer to `source` when
    /// it is long.
    fn show(&mut self, title: &str, content: &str, source: Option<&Path>) -> Result<()>;
}

/// Check free text against a minimum length, counted in characters.
pub fn check_min_len(input: &str, min_chars: usize) -> Result<(), String> {
    let len = input.trim().chars().count();
    if len < min_chars {
        return Err(format!("please enter at least {min_chars} characters"));
    }
    Ok(())
}

/// Keep the first `max_lines` lines of `content`, noting how much was cut
/// and where the full text lives.
pub fn truncate_for_display(content: &str, max_lines: usize, source: Option<&Path>) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= max_lines {
        return content.trim_end().to_string();
    }
    let mut shown = lines[..max_lines].join("\n");
    let hidden = lines.len() - max_lines;
    shown.push_str(&format!("\n... ({hidden} more lines"));
    if let Some(path) = source {
        shown.push_str(&format!("; full text in {}", path.display()));
    }
    shown.push(')');
    shown
}

/// Interactive terminal operator.
#[derive(Debug, Clone)]
pub struct TerminalOperator {
    show_max_lines: usize,
}

impl TerminalOperator {
    pub fn new(show_max_lines: usize) -> Self {
        Self { show_max_lines }
    }
}

impl Operator for TerminalOperator {
    fn ask(&mut self, prompt: &str, min_chars: usize) -> Result<String> {
        let input: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty(min_chars == 0)
            .validate_with(|input: &String| check_min_len(input, min_chars))
            .interact_text()
            .context("read operator input")?;
        Ok(input.trim().to_string())
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default)
            .interact()
            .context("read operator confirmation")
    }

    fn choose(&mut self, prompt: &str, options: &[&str]) -> Result<usize> {
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact()
            .context("read operator selection")
    }

    fn show(&mut self, title: &str, content: &str, source: Option<&Path>) -> Result<()> {
        println!();
        println!("===== {title} =====");
        println!("{}", truncate_for_display(content, self.show_max_lines, source));
        println!();
        Ok(())
    }
}
