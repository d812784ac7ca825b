//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists
    ///
    /// Variables already set in the process environment win over the file.
    pub fn load_env_file(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        dotenv::from_path(path)
            .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
        Ok(true)
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# L4S Testbed Harness Configuration
#
# Values here act as defaults; environment variables and command-line
# arguments take precedence.

# Diagnostic and traffic programs
# L4ST_TC_BIN=tc
# L4ST_SS_BIN=ss
# L4ST_IPERF_BIN=iperf3

# Directory experiment files are written to and read from
# L4ST_OUTPUT_DIR=.

# Flow labels in analysis order (comma-separated)
# L4ST_FLOW_LABELS=cubic,cubic-2,cubic-3,prague

# Socket fds that are never data flows (iperf3 control connection)
# L4ST_EXCLUDED_FDS=4

# Bottleneck link rate used to infer FIFO queueing delay
# L4ST_LINK_MBPS=50

# Warm-up excluded from steady-state means, in seconds
# L4ST_WARMUP_SECS=60

# Inferred FIFO delays above this are dropped when pooling runs
# L4ST_DELAY_CAP_SECS=0.1

# Enable colored output (true/false)
# L4ST_ENABLE_COLOR=true
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "L4ST_TC_BIN" | "L4ST_SS_BIN" | "L4ST_IPERF_BIN" if value.trim().is_empty() => {
                Err(AppError::config(format!("{} cannot be empty", key)))
            }
            "L4ST_FLOW_LABELS" => {
                let labels = crate::models::config::split_list(value);
                if labels.is_empty() {
                    return Err(AppError::config("L4ST_FLOW_LABELS must name at least one label"));
                }
                for label in &labels {
                    crate::models::config::validate_label(label)?;
                }
                Ok(())
            }
            "L4ST_EXCLUDED_FDS" => {
                for fd in crate::models::config::split_list(value) {
                    fd.parse::<u32>()
                        .map_err(|e| AppError::config(format!("Invalid L4ST_EXCLUDED_FDS entry '{}': {}", fd, e)))?;
                }
                Ok(())
            }
            "L4ST_LINK_MBPS" | "L4ST_DELAY_CAP_SECS" => {
                let number: f64 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if !(number.is_finite() && number > 0.0) {
                    return Err(AppError::config(format!("{} must be positive, got: {}", key, value)));
                }
                Ok(())
            }
            "L4ST_WARMUP_SECS" => {
                let secs: f64 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid L4ST_WARMUP_SECS value '{}': {}", value, e)))?;
                if !(secs.is_finite() && secs >= 0.0) {
                    return Err(AppError::config(format!("L4ST_WARMUP_SECS must not be negative, got: {}", value)));
                }
                Ok(())
            }
            "L4ST_ENABLE_COLOR" => {
                value
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid L4ST_ENABLE_COLOR value '{}': {}", value, e)))?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("L4ST_TC_BIN", "Program used for qdisc statistics", "tc"),
            ("L4ST_SS_BIN", "Program used for socket statistics", "ss"),
            ("L4ST_IPERF_BIN", "Program used for traffic generation", "iperf3"),
            ("L4ST_OUTPUT_DIR", "Directory for experiment and analysis files", "results"),
            ("L4ST_FLOW_LABELS", "Comma-separated flow labels", "cubic,cubic-2,cubic-3,prague"),
            ("L4ST_EXCLUDED_FDS", "Socket fds ignored by ss-csv", "4"),
            ("L4ST_LINK_MBPS", "Bottleneck rate for inferred FIFO delay", "50"),
            ("L4ST_WARMUP_SECS", "Warm-up excluded from steady-state means", "60"),
            ("L4ST_DELAY_CAP_SECS", "Largest inferred FIFO delay kept across runs", "0.1"),
            ("L4ST_ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<20} {}\n", var, description));
            help.push_str(&format!("  {:<20} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(var_name, _, _)| {
                let value = std::env::var(var_name).ok()?;
                Self::validate_env_var(var_name, &value).err()
            })
            .map(|e| format!("Warning: {}", e))
            .collect()
    }

    /// Validate the entries of a .env file without loading it
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut warnings = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => {
                    if let Err(e) = Self::validate_env_var(key.trim(), value.trim()) {
                        warnings.push(format!("Line '{}': {}", line, e));
                    }
                }
                None => warnings.push(format!("Line '{}': expected KEY=VALUE", line)),
            }
        }

        Ok(Some(warnings))
    }
}
