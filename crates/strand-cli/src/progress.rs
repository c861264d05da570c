//! Progress display helpers for long-running CLI commands.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Format a byte count as a human-readable string (KB/MB/GB).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

/// A spinner shown while a handshake or connection attempt is in flight.
pub struct WaitSpinner {
    bar: ProgressBar,
}

impl WaitSpinner {
    /// Start a spinner with the given message.
    #[must_use]
    pub fn start(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(message.into());
        Self { bar }
    }

    /// Stop the spinner, leaving a success message.
    pub fn succeed(self, message: impl Into<String>) {
        self.bar
            .finish_with_message(format!("{} {}", style("✓").green(), message.into()));
    }

    /// Stop the spinner, leaving a failure message.
    pub fn fail(self, message: impl Into<String>) {
        self.bar
            .finish_with_message(format!("{} {}", style("✗").red(), message.into()));
    }
}
