//! Styled stage progress for the terminal

use console::style;

/// Prints numbered pipeline stages and summary lines.
pub struct Progress {
    total: usize,
}

impl Progress {
    /// Progress over a fixed number of stages
    pub fn new(total: usize) -> Self {
        Self { total }
    }

    /// Announce a stage
    pub fn step(&self, index: usize, message: &str) {
        println!(
            "{} {}",
            style(format!("[{index}/{}]", self.total)).bold().dim(),
            message
        );
    }

    /// Report a completed run
    pub fn done(&self, message: &str) {
        println!("{} {}", style("✔").green().bold(), message);
    }

    /// Report a non-fatal problem
    pub fn warn(&self, message: &str) {
        eprintln!("{} {}", style("!").yellow().bold(), message);
    }
}
