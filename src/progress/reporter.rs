//! Terminal progress bar
//!
//! Uses indicatif: a percentage bar once totals are known, a spinner while
//! progress is indeterminate.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Renders engine progress callbacks on the terminal
pub struct ProgressReporter {
    bar: ProgressBar,
    determinate: bool,
}

impl ProgressReporter {
    /// Create a reporter drawing to stderr
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            determinate: false,
        }
    }

    /// Create a reporter that draws nothing (quiet mode)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.bar.disable_steady_tick();
        reporter.bar.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Apply one engine progress callback
    pub fn update(&mut self, message: &str, percent: Option<f64>) {
        match percent {
            Some(pct) => {
                if !self.determinate {
                    self.determinate = true;
                    self.bar.disable_steady_tick();
                    self.bar.set_length(1000);
                    self.bar.set_style(bar_style());
                }
                self.bar.set_position((pct.clamp(0.0, 100.0) * 10.0) as u64);
            }
            None => self.bar.tick(),
        }
        self.bar.set_message(shorten(message, 60));
    }

    /// Finish with a success message
    pub fn finish_success(&self, message: &str) {
        self.bar.finish_with_message(format!("✓ {}", message));
    }

    /// Finish with an error message
    pub fn finish_error(&self, message: &str) {
        self.bar.abandon_with_message(format!("✗ {}", message));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{bar:40.green/white}] {percent:>3}% {elapsed_precise} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Keep the tail of long messages (usually paths)
fn shorten(message: &str, max: usize) -> String {
    let count = message.chars().count();
    if count <= max {
        return message.to_string();
    }
    let tail: String = message.chars().skip(count - (max - 3)).collect();
    format!("...{}", tail)
}
