//! Compact output rendering helpers for CLI surfaces.
//!
//! Keeps command result output bounded and readable while preserving signal.

use crate::core::model::Status;
use colored::Colorize;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Status tinted for terminal listings.
pub fn colored_status(status: Status) -> String {
    let label = status.as_str();
    match status {
        Status::Draft => label.bright_black().to_string(),
        Status::Ready => label.bright_cyan().to_string(),
        Status::InProgress => label.bright_yellow().to_string(),
        Status::Done => label.bright_green().to_string(),
        Status::Archived => label.bright_magenta().to_string(),
    }
}
