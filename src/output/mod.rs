//! Console output formatting
//!
//! Summaries printed by the analysis and experiment subcommands go through an
//! [`OutputFormatter`], either plain text or colored. CSV files are the real
//! product; console output is for the operator.

mod colored;
mod formatter;

pub use colored::{ColorScheme, ColoredFormatter, DelayLevel};
pub use formatter::{Alignment, Column, FormattingOptions, OutputFormatter, PlainFormatter, RowData, TableFormat};

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
            table_borders: true,
            max_width: 120,
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    /// Create a plain text formatter for scripts/logs
    pub fn create_plain_formatter() -> Box<dyn OutputFormatter> {
        Self::create_formatter(false, true)
    }
}
