//! Utility functions and helpers for the CLI

use chrono::{DateTime, Local, Utc};
use colored::*;

/// Print an error message with consistent styling
pub fn print_error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}

/// Print a warning message with consistent styling
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

/// Print an info message with consistent styling
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Modification time in the local timezone
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Create a table-like output
pub struct TableBuilder {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    column_widths: Vec<usize>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            column_widths: Vec::new(),
        }
    }

    pub fn headers(mut self, headers: &[&str]) -> Self {
        self.headers = headers.iter().map(|s| s.to_string()).collect();
        self.column_widths = headers.iter().map(|s| s.chars().count()).collect();
        self
    }

    pub fn row(mut self, values: Vec<String>) -> Self {
        for (i, value) in values.iter().enumerate() {
            let width = value.chars().count();
            match self.column_widths.get_mut(i) {
                Some(current) => *current = (*current).max(width),
                None => self.column_widths.push(width),
            }
        }
        self.rows.push(values);
        self
    }

    /// Render without styling; trailing whitespace is trimmed per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.headers.is_empty() {
            out.push_str(&self.render_row(&self.headers));
            let separator: Vec<String> = self.column_widths.iter().map(|w| "─".repeat(*w)).collect();
            out.push_str(&self.render_row(&separator));
        }
        for row in &self.rows {
            out.push_str(&self.render_row(row));
        }
        out
    }

    fn render_row(&self, values: &[String]) -> String {
        let mut line = String::new();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                line.push_str("  ");
            }
            let width = self.column_widths.get(i).copied().unwrap_or(0);
            let padding = width.saturating_sub(value.chars().count());
            line.push_str(value);
            line.push_str(&" ".repeat(padding));
        }
        format!("{}\n", line.trim_end())
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builder() {
        let table = TableBuilder::new()
            .headers(&["Name", "Path"])
            .row(vec!["test_a".to_string(), "tests/test_a.c".to_string()])
            .row(vec!["net/test_socket".to_string(), "tests/net/test_socket.c".to_string()]);

        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Name             Path");
        assert_eq!(lines[2], "test_a           tests/test_a.c");
        assert_eq!(lines[3], "net/test_socket  tests/net/test_socket.c");
    }

    #[test]
    fn test_table_without_headers() {
        let table = TableBuilder::new().row(vec!["a".to_string()]);
        assert_eq!(table.render(), "a\n");
    }

    #[test]
    fn test_format_timestamp_shape() {
        let formatted = format_timestamp(&DateTime::<Utc>::from(std::time::UNIX_EPOCH));
        assert_eq!(formatted.len(), "1970-01-01 00:00:00".len());
    }
}
