//! Core formatting traits and implementations
//!
//! This module defines the console output interface and provides
//! a plain text implementation with table formatting.

use crate::{
    error::{AppError, Result},
    experiment::{IterationReport, JobResult},
    stats::Summary,
};
use std::fmt::Write as _;
use std::path::Path;

/// Main trait for console output
pub trait OutputFormatter {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// Format one `mean ± std (n)` line
    fn format_metric(&self, name: &str, summary: &Summary, unit: &str, precision: usize) -> Result<String>;

    /// Format rows as a table
    fn format_table(&self, format: &TableFormat, rows: &[RowData]) -> Result<String>;

    /// Format the job outcomes of one experiment iteration
    fn format_iteration(&self, report: &IterationReport) -> Result<String>;

    /// Format a note about a written output file
    fn format_saved(&self, what: &str, path: &Path) -> Result<String>;

    /// Format error messages
    fn format_error(&self, error: &str) -> Result<String>;

    /// Format warning messages
    fn format_warning(&self, warning: &str) -> Result<String>;

    /// Format success messages
    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// Enable verbose mode with detailed information
    pub verbose_mode: bool,
    /// Show table borders
    pub table_borders: bool,
    /// Maximum output width
    pub max_width: usize,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            table_borders: true,
            max_width: 120,
        }
    }
}

/// Table formatting configuration
#[derive(Debug, Clone)]
pub struct TableFormat {
    /// Column definitions
    pub columns: Vec<Column>,
    /// Show borders around table
    pub show_borders: bool,
    /// Minimum width of columns without a definition
    pub min_column_width: usize,
    /// Maximum width of columns without a definition
    pub max_column_width: usize,
}

impl TableFormat {
    /// Left-aligned first column, right-aligned numeric columns
    pub fn numeric(headers: &[&str]) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, header)| Column {
                header: header.to_string(),
                alignment: if i == 0 { Alignment::Left } else { Alignment::Right },
                min_width: 6,
                max_width: 40,
            })
            .collect();
        Self {
            columns,
            show_borders: true,
            min_column_width: 6,
            max_column_width: 40,
        }
    }
}

/// Column definition for table formatting
#[derive(Debug, Clone)]
pub struct Column {
    /// Column header
    pub header: String,
    /// Column alignment
    pub alignment: Alignment,
    /// Minimum width
    pub min_width: usize,
    /// Maximum width
    pub max_width: usize,
}

/// Text alignment options
#[derive(Debug, Clone)]
pub enum Alignment {
    Left,
    Right,
    Center,
}

/// Row data for table formatting
pub type RowData = Vec<String>;

/// Plain text formatter implementation
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    /// Create a new plain formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    /// Render a table; borders follow both the format and the options
    pub(crate) fn create_table(&self, format: &TableFormat, rows: &[RowData]) -> String {
        let borders = format.show_borders && self.options.table_borders;
        let widths = calculate_column_widths(format, rows, self.options.max_width);
        let mut output = String::new();

        if borders {
            output.push_str(&create_horizontal_border(&widths));
            output.push('\n');
        }
        let headers: Vec<String> = format.columns.iter().map(|c| c.header.clone()).collect();
        output.push_str(&create_row(&headers, &widths, format, borders));
        output.push('\n');
        if borders {
            output.push_str(&create_horizontal_border(&widths));
            output.push('\n');
        }

        for row in rows {
            output.push_str(&create_row(row, &widths, format, borders));
            output.push('\n');
        }

        if borders {
            output.push_str(&create_horizontal_border(&widths));
        }

        output.trim_end().to_string()
    }
}

/// Column widths from headers and content, within the column limits
fn calculate_column_widths(format: &TableFormat, rows: &[RowData], max_width: usize) -> Vec<usize> {
    let num_columns = format
        .columns
        .len()
        .max(rows.iter().map(|r| r.len()).max().unwrap_or(0));

    let mut widths = Vec::with_capacity(num_columns);
    for col_idx in 0..num_columns {
        let column = format.columns.get(col_idx);
        let mut width = column
            .map(|c| c.min_width.max(c.header.chars().count()))
            .unwrap_or(format.min_column_width);

        for row in rows {
            if let Some(cell) = row.get(col_idx) {
                width = width.max(cell.chars().count());
            }
        }

        let limit = column.map(|c| c.max_width).unwrap_or(format.max_column_width);
        widths.push(width.min(limit).min(max_width));
    }
    widths
}

fn create_row(data: &[String], widths: &[usize], format: &TableFormat, borders: bool) -> String {
    let mut row = String::new();
    if borders {
        row.push('|');
    }

    for (idx, &width) in widths.iter().enumerate() {
        let cell = data.get(idx).map(String::as_str).unwrap_or("");
        let alignment = format
            .columns
            .get(idx)
            .map(|c| &c.alignment)
            .unwrap_or(&Alignment::Left);

        if borders {
            row.push(' ');
        }
        row.push_str(&align_text(cell, width, alignment));
        if borders {
            row.push_str(" |");
        } else {
            row.push_str("  ");
        }
    }

    row.trim_end().to_string()
}

fn create_horizontal_border(widths: &[usize]) -> String {
    let mut border = String::new();
    if !widths.is_empty() {
        border.push('+');
        for &width in widths {
            border.push_str(&"-".repeat(width + 2));
            border.push('+');
        }
    }
    border
}

/// Align text within the given width, truncating when too long
pub(crate) fn align_text(text: &str, width: usize, alignment: &Alignment) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.chars().take(width).collect();
    }

    let padding = width - len;
    match alignment {
        Alignment::Left => format!("{}{}", text, " ".repeat(padding)),
        Alignment::Right => format!("{}{}", " ".repeat(padding), text),
        Alignment::Center => {
            let left_pad = padding / 2;
            let right_pad = padding - left_pad;
            format!("{}{}{}", " ".repeat(left_pad), text, " ".repeat(right_pad))
        }
    }
}

/// `mean=…, std=…` with the unit after each value
pub(crate) fn metric_values(summary: &Summary, unit: &str, precision: usize) -> String {
    format!(
        "mean={:.p$}{u}, std={:.p$}{u}",
        summary.mean,
        summary.std_dev,
        p = precision,
        u = unit
    )
}

/// One line per job: `ok`/`failed` plus what the job produced
pub(crate) fn job_lines(report: &IterationReport) -> Vec<(bool, String)> {
    report
        .jobs
        .iter()
        .map(|job| match &job.outcome {
            Ok(JobResult::Monitor(r)) => (
                true,
                format!("{}: {} samples in {:.1}s", job.name, r.samples, r.elapsed.as_secs_f64()),
            ),
            Ok(JobResult::Traffic(t)) => (
                true,
                format!("{}: {} in {:.1}s", job.name, t.json_path.display(), t.elapsed.as_secs_f64()),
            ),
            Err(e) => (false, format!("{}: {}", job.name, e)),
        })
        .collect()
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.chars().count() + 4);

        writeln!(output, "{}", border)
            .map_err(|e| AppError::io(format!("Failed to format header: {}", e)))?;
        writeln!(output, "  {}  ", title)
            .map_err(|e| AppError::io(format!("Failed to format header: {}", e)))?;
        write!(output, "{}", border)
            .map_err(|e| AppError::io(format!("Failed to format header: {}", e)))?;

        Ok(output)
    }

    fn format_metric(&self, name: &str, summary: &Summary, unit: &str, precision: usize) -> Result<String> {
        let mut output = format!("{}: {}", name, metric_values(summary, unit, precision));
        if self.options.verbose_mode {
            write!(output, " (n={})", summary.count)
                .map_err(|e| AppError::io(format!("Failed to format metric: {}", e)))?;
        }
        Ok(output)
    }

    fn format_table(&self, format: &TableFormat, rows: &[RowData]) -> Result<String> {
        if rows.is_empty() {
            return Ok("No data available.".to_string());
        }
        Ok(self.create_table(format, rows))
    }

    fn format_iteration(&self, report: &IterationReport) -> Result<String> {
        let mut output = String::new();
        let status = if report.is_success() { "completed" } else { "completed with failures" };

        write!(output, "Experiment {} {}", report.idx, status)
            .map_err(|e| AppError::io(format!("Failed to format iteration: {}", e)))?;
        for (ok, line) in job_lines(report) {
            if ok && !self.options.verbose_mode {
                continue;
            }
            write!(output, "\n  {} {}", if ok { "ok" } else { "FAILED" }, line)
                .map_err(|e| AppError::io(format!("Failed to format iteration: {}", e)))?;
        }

        Ok(output)
    }

    fn format_saved(&self, what: &str, path: &Path) -> Result<String> {
        Ok(format!("Saved {} to: {}", what, path.display()))
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("SUCCESS: {}", message))
    }
}
