//! Shared helper functions for CLI commands.

use console::style;

use crate::models::{Bucket, Report};

/// Truncate to at most `max_chars` characters, adding an ellipsis.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Collapse whitespace so multi-line extracts print on one line.
pub fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn styled_title<B: Bucket>(bucket: B) -> console::StyledObject<&'static str> {
    let title = style(bucket.title()).bold();
    match bucket.as_str() {
        "high" => title.red(),
        "medium" => title.yellow(),
        "low" => title.green(),
        _ => title.cyan(),
    }
}

/// Print a report to the terminal, one section per bucket.
pub fn print_report<B: Bucket>(report: &Report<B>, width: usize) {
    for (bucket, extracts) in report.iter() {
        println!("\n{} ({})", styled_title(bucket), extracts.len());
        println!("  {}", style(bucket.description()).dim());
        if extracts.is_empty() {
            println!("  {}", style("No clauses found").dim());
        }
        for extract in extracts {
            println!("  - {}", truncate(&one_line(extract), width));
        }
    }
}
