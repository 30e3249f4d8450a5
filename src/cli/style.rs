//! Terminal styling helpers shared by the CLI commands

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Convenience styling for user-facing strings
pub trait Stylize {
    /// De-emphasized text for secondary information
    fn muted(&self) -> String;
    /// Emphasized identifier (branch, merge request ID)
    fn emph(&self) -> String;
    /// Error text
    fn error(&self) -> String;
    /// Success text
    fn success(&self) -> String;
}

impl Stylize for str {
    fn muted(&self) -> String {
        self.dimmed().to_string()
    }

    fn emph(&self) -> String {
        self.cyan().to_string()
    }

    fn error(&self) -> String {
        self.red().to_string()
    }

    fn success(&self) -> String {
        self.green().to_string()
    }
}

/// Green check prefix for completed actions.
#[must_use]
pub fn check(text: &str) -> String {
    format!("{} {text}", "✓".green())
}

/// Red cross prefix for failures.
#[must_use]
pub fn cross(text: &str) -> String {
    format!("{} {text}", "✗".red())
}

/// Spinner for long-running git operations.
#[must_use]
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
