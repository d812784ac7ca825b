//! Error handling for the testbed harness

use thiserror::Error;

/// Custom error types for the testbed harness
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (plans, arguments, ranges)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wrong invocation of a subcommand
    #[error("Usage error: {0}")]
    Usage(String),

    /// I/O errors (log files, CSV output, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (JSON, numbers, log lines)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// External command failures (iperf3, tc, ss)
    #[error("Command error: {0}")]
    Command(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Post-processing failures
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new usage error
    pub fn usage<S: Into<String>>(message: S) -> Self {
        Self::Usage(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new external command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        Self::Command(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new analysis error
    pub fn analysis<S: Into<String>>(message: S) -> Self {
        Self::Analysis(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Validation(_) => "VALIDATION",
            Self::Usage(_) => "USAGE",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Command(_) => "COMMAND",
            Self::Timeout(_) => "TIMEOUT",
            Self::Analysis(_) => "ANALYSIS",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Check if error is recoverable (rerunning the iteration may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Command(_) | Self::Timeout(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Usage(_) | Self::Parse(_) => false,
            Self::Io(_) | Self::Analysis(_) | Self::Internal(_) => false,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file, L4ST_* variables or command line arguments.", msg)
            }
            Self::Validation(msg) => {
                format!("Invalid input: {}\n\nSuggestion: Check intervals, durations and index ranges.", msg)
            }
            Self::Usage(msg) => {
                format!("Invalid invocation: {}\n\nSuggestion: Run with --help to see the expected arguments.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: Check that the log was produced by the expected tool.", msg)
            }
            Self::Command(msg) => {
                format!("External command failed: {}\n\nSuggestion: Make sure iperf3, tc and ss are installed and the server side is listening.", msg)
            }
            Self::Timeout(msg) => {
                format!("Operation timed out: {}\n\nSuggestion: Check that the iperf3 server is reachable.", msg)
            }
            Self::Analysis(msg) => {
                format!("Analysis failed: {}\n\nSuggestion: Check the index range and the flow labels.", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Usage(_) | Self::Parse(_) => 1,
            Self::Command(_) => 2,
            Self::Timeout(_) => 3,
            Self::Io(_) => 5,
            Self::Analysis(_) => 6,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Usage(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Command(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::Io(_) | Self::Analysis(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<csv::Error> for AppError {
    fn from(error: csv::Error) -> Self {
        Self::io(format!("CSV error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::str::ParseBoolError> for AppError {
    fn from(error: std::str::ParseBoolError) -> Self {
        Self::parse(format!("Boolean parse error: {}", error))
    }
}

impl From<regex::Error> for AppError {
    fn from(error: regex::Error) -> Self {
        Self::internal(format!("Invalid log pattern: {}", error))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::internal(format!("Background job failed: {}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error, keeping its category
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            match e.into() {
                AppError::Io(msg) => AppError::Io(format!("{}: {}", context, msg)),
                AppError::Parse(msg) => AppError::Parse(format!("{}: {}", context, msg)),
                AppError::Command(msg) => AppError::Command(format!("{}: {}", context, msg)),
                AppError::Config(msg) => AppError::Config(format!("{}: {}", context, msg)),
                other => AppError::internal(format!("{}: {}", context, other)),
            }
        })
    }
}

/// Error reporter for structured error logging and user feedback
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    /// Create a new error reporter
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.format_for_console(self.use_color));

        if self.verbose {
            eprintln!();
            eprintln!("{}", error.user_friendly_message());

            if error.is_recoverable() {
                eprintln!();
                if self.use_color {
                    use colored::Colorize;
                    eprintln!("{}", "This error might be temporary. You can try running the iteration again.".green());
                } else {
                    eprintln!("This error might be temporary. You can try running the iteration again.");
                }
            }
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_error = AppError::config("Invalid configuration");
        assert_eq!(config_error.category(), "CONFIG");
        assert!(!config_error.is_recoverable());
        assert_eq!(config_error.exit_code(), 1);

        let command_error = AppError::command("iperf3 exited with status 1");
        assert_eq!(command_error.category(), "COMMAND");
        assert!(command_error.is_recoverable());
        assert_eq!(command_error.exit_code(), 2);
    }

    #[test]
    fn test_error_display() {
        let error = AppError::usage("expected <START> <END> <PREFIX>");
        let display = error.to_string();
        assert!(display.contains("Usage error"));
        assert!(display.contains("<START> <END> <PREFIX>"));
    }

    #[test]
    fn test_exit_codes_are_non_zero() {
        let errors = [
            AppError::config("c"),
            AppError::validation("v"),
            AppError::usage("u"),
            AppError::io("i"),
            AppError::parse("p"),
            AppError::command("x"),
            AppError::timeout("t"),
            AppError::analysis("a"),
            AppError::internal("n"),
        ];
        for error in &errors {
            assert_ne!(error.exit_code(), 0, "{} must map to a failing exit code", error.category());
        }
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json");
        let error: AppError = io.into();
        assert_eq!(error.category(), "IO");
        assert!(error.to_string().contains("missing.json"));
    }

    #[test]
    fn test_context_keeps_category() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        let error = result.with_context(|| "writing 3-ss-prague.txt".to_string()).unwrap_err();
        assert_eq!(error.category(), "IO");
        assert!(error.to_string().contains("writing 3-ss-prague.txt"));
    }

    #[test]
    fn test_console_format_without_color() {
        let error = AppError::analysis("no runs in range");
        assert_eq!(
            error.format_for_console(false),
            "[ANALYSIS] Analysis error: no runs in range"
        );
    }
}
