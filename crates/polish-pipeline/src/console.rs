//! Console reporting.
//!
//! Plain `println!`/`eprintln!` with `colored`, one banner per phase and a
//! summary line on completion; `verbose` adds per-file detail lines.

use colored::Colorize;

#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    pub verbose: bool,
}

impl Console {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn phase(&self, id: u32, name: &str) {
        println!("{} {}", format!("[phase {id}/5]").cyan().bold(), name);
    }

    pub fn done(&self, summary: &str) {
        println!("  {} {summary}", "✓".green());
    }

    pub fn info(&self, message: &str) {
        println!("  {message}");
    }

    pub fn detail(&self, message: &str) {
        if self.verbose {
            println!("    {}", message.dimmed());
        }
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{} {message}", "warning:".yellow().bold());
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {message}", "error:".red().bold());
    }
}
