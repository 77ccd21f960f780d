//! Terminal output.

pub mod table;

use crossterm::style::Stylize;

/// Status lines on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, msg: &str) {
        println!("  {} {msg}", "✓".green());
    }

    pub fn held(&self, msg: &str) {
        println!("  {} {msg}", "•".yellow());
    }

    pub fn error(&self, msg: &str) {
        println!("  {} {msg}", "✗".red());
    }

    pub fn warn(&self, msg: &str) {
        println!("  {} {}", "!".yellow(), msg.dark_yellow());
    }

    pub fn info(&self, msg: &str) {
        println!("  {msg}");
    }

    pub fn section(&self, title: &str) {
        println!();
        println!("  {}", title.white().bold());
    }
}
