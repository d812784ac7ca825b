//! Colored formatter implementation with terminal color support
//!
//! This module provides a colored output formatter that uses
//! ANSI colors and Unicode symbols for console summaries.

use super::formatter::{
    job_lines, metric_values, FormattingOptions, OutputFormatter, PlainFormatter, RowData, TableFormat,
};
use crate::{
    error::{AppError, Result},
    experiment::IterationReport,
    stats::Summary,
};
use colored::*;
use std::fmt::Write as _;
use std::path::Path;

/// Queue delay classification for color coding, in milliseconds
#[derive(Debug, Clone, PartialEq)]
pub enum DelayLevel {
    Low,      // < 1ms, what L4S aims for
    Moderate, // 1-5ms
    High,     // 5-20ms
    Bloated,  // > 20ms
}

impl DelayLevel {
    pub fn from_delay_ms(delay_ms: f64) -> Self {
        if delay_ms < 1.0 {
            Self::Low
        } else if delay_ms < 5.0 {
            Self::Moderate
        } else if delay_ms < 20.0 {
            Self::High
        } else {
            Self::Bloated
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Low => Color::Green,
            Self::Moderate => Color::Cyan,
            Self::High => Color::Yellow,
            Self::Bloated => Color::Red,
        }
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
    pub border: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
            border: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    plain_formatter: PlainFormatter,
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    /// Create a new colored formatter with options
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    /// Create a colored formatter with custom color scheme
    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        let plain_formatter = PlainFormatter::new(options.clone());
        Self {
            plain_formatter,
            options,
            color_scheme,
        }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    /// Apply bold formatting if colors are enabled
    fn bold(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.bold()
        } else {
            text.normal()
        }
    }

    fn dimmed(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.dimmed()
        } else {
            text.normal()
        }
    }

    /// Delay metrics get their level color, everything else the info color
    fn metric_color(&self, summary: &Summary, unit: &str) -> Color {
        match unit.trim() {
            "ms" => DelayLevel::from_delay_ms(summary.mean).color(),
            "s" => DelayLevel::from_delay_ms(summary.mean * 1000.0).color(),
            _ => self.color_scheme.info,
        }
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();

        let decorated_title = format!("📊 {}", title);
        let border = "═".repeat(decorated_title.chars().count() + 4);

        writeln!(output, "{}", self.colorize(&border, self.color_scheme.border))
            .map_err(|e| AppError::io(format!("Failed to format header: {}", e)))?;
        writeln!(output, "  {}  ", self.bold(&decorated_title).color(self.color_scheme.header))
            .map_err(|e| AppError::io(format!("Failed to format header: {}", e)))?;
        write!(output, "{}", self.colorize(&border, self.color_scheme.border))
            .map_err(|e| AppError::io(format!("Failed to format header: {}", e)))?;

        Ok(output)
    }

    fn format_metric(&self, name: &str, summary: &Summary, unit: &str, precision: usize) -> Result<String> {
        let values = metric_values(summary, unit, precision);
        let mut output = format!(
            "{}: {}",
            self.bold(name),
            self.colorize(&values, self.metric_color(summary, unit))
        );
        if self.options.verbose_mode {
            write!(output, " {}", self.dimmed(&format!("(n={})", summary.count)))
                .map_err(|e| AppError::io(format!("Failed to format metric: {}", e)))?;
        }
        Ok(output)
    }

    fn format_table(&self, format: &TableFormat, rows: &[RowData]) -> Result<String> {
        if rows.is_empty() {
            return Ok(self.colorize("No data available.", self.color_scheme.muted).to_string());
        }

        let table = self.plain_formatter.create_table(format, rows);
        if !self.options.enable_color {
            return Ok(table);
        }

        // borders muted, header row bold
        let header_line = if format.show_borders && self.options.table_borders { 1 } else { 0 };
        let lines: Vec<String> = table
            .lines()
            .enumerate()
            .map(|(i, line)| {
                if line.starts_with('+') {
                    line.color(self.color_scheme.border).to_string()
                } else if i == header_line {
                    line.bold().to_string()
                } else {
                    line.to_string()
                }
            })
            .collect();
        Ok(lines.join("\n"))
    }

    fn format_iteration(&self, report: &IterationReport) -> Result<String> {
        let mut output = String::new();
        let title = format!("Experiment {}", report.idx);

        let status = if report.is_success() {
            format!("✅ {} completed", self.colorize(&title, self.color_scheme.success))
        } else {
            format!("⚠️  {} completed with failures", self.colorize(&title, self.color_scheme.warning))
        };
        output.push_str(&status);

        for (ok, line) in job_lines(report) {
            if ok && !self.options.verbose_mode {
                continue;
            }
            let line = if ok {
                format!("  ✓ {}", self.dimmed(&line))
            } else {
                format!("  ✗ {}", self.colorize(&line, self.color_scheme.error))
            };
            write!(output, "\n{}", line)
                .map_err(|e| AppError::io(format!("Failed to format iteration: {}", e)))?;
        }

        Ok(output)
    }

    fn format_saved(&self, what: &str, path: &Path) -> Result<String> {
        Ok(format!(
            "💾 Saved {} to: {}",
            what,
            self.colorize(&path.display().to_string(), self.color_scheme.info)
        ))
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("❌ {}", self.colorize(error, self.color_scheme.error)))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("⚠️  {}", self.colorize(warning, self.color_scheme.warning)))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("✅ {}", self.colorize(message, self.color_scheme.success)))
    }
}

/// Helper functions for color management
impl ColoredFormatter {
    /// Check if terminal supports colors
    pub fn supports_color() -> bool {
        std::env::var("NO_COLOR").is_err() && std::env::var("TERM").map(|term| term != "dumb").unwrap_or(true)
    }

    /// Enable or disable colors at runtime
    pub fn set_colors_enabled(&mut self, enabled: bool) {
        self.options.enable_color = enabled && Self::supports_color();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_color() -> ColoredFormatter {
        ColoredFormatter::new(FormattingOptions {
            enable_color: false,
            ..FormattingOptions::default()
        })
    }

    #[test]
    fn test_delay_levels() {
        assert_eq!(DelayLevel::from_delay_ms(0.4), DelayLevel::Low);
        assert_eq!(DelayLevel::from_delay_ms(3.0), DelayLevel::Moderate);
        assert_eq!(DelayLevel::from_delay_ms(15.0), DelayLevel::High);
        assert_eq!(DelayLevel::from_delay_ms(120.0), DelayLevel::Bloated);
    }

    #[test]
    fn test_without_color_matches_plain_text() {
        let formatter = no_color();
        let summary = Summary::of(&[2.0, 4.0]);
        assert_eq!(
            formatter.format_metric("L4S Delay", &summary, " ms", 3).unwrap(),
            "L4S Delay: mean=3.000 ms, std=1.000 ms"
        );
        assert_eq!(formatter.format_warning("File not found").unwrap(), "⚠️  File not found");
    }

    #[test]
    fn test_table_delegates_layout() {
        let format = TableFormat::numeric(&["Slice", "Mean"]);
        let rows = vec![vec!["2".to_string(), "400.00".to_string()]];
        let table = no_color().format_table(&format, &rows).unwrap();
        assert!(table.contains("| 2      | 400.00 |"));
    }
}
