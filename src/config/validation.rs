//! Configuration validation utilities and rules

use crate::{error::Result, models::Config};
use colored::Colorize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Configuration validator with advisory rules on top of `Config::validate`
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration with comprehensive checks
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_programs(config));
        warnings.extend(Self::validate_output_dir(&config.output_dir));
        warnings.extend(Self::validate_labels(&config.flow_labels));
        warnings.extend(Self::validate_analysis_settings(config));

        Ok(warnings)
    }

    /// Programs that cannot be found are only fatal once a job runs them
    fn validate_programs(config: &Config) -> Vec<ValidationWarning> {
        [("tc", &config.tc_bin), ("ss", &config.ss_bin), ("iperf3", &config.iperf_bin)]
            .into_iter()
            .filter(|(_, program)| find_program(program).is_none())
            .map(|(name, program)| {
                ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("{} program '{}' was not found; commands using it will fail", name, program),
                )
            })
            .collect()
    }

    fn validate_output_dir(dir: &Path) -> Vec<ValidationWarning> {
        if dir.is_dir() {
            Vec::new()
        } else if dir.exists() {
            vec![ValidationWarning::new(
                ValidationLevel::Error,
                format!("Output path '{}' exists but is not a directory", dir.display()),
            )]
        } else {
            vec![ValidationWarning::new(
                ValidationLevel::Info,
                format!("Output directory '{}' does not exist yet and will be created by `run`", dir.display()),
            )]
        }
    }

    fn validate_labels(labels: &[String]) -> Vec<ValidationWarning> {
        let mut seen = HashSet::new();
        labels
            .iter()
            .filter(|label| !seen.insert(label.as_str()))
            .map(|label| {
                ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("Flow label '{}' is listed more than once; its files are read twice", label),
                )
            })
            .collect()
    }

    fn validate_analysis_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.excluded_fds.is_empty() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "No excluded fds; the iperf3 control connection will be counted as a flow".to_string(),
            ));
        }

        if config.link_mbps < 1.0 || config.link_mbps > 100_000.0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Link rate of {} Mbps is unusual; inferred FIFO delays scale with it", config.link_mbps),
            ));
        }

        if config.warmup_secs == 0.0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Warm-up is 0s; slow-start samples are included in steady-state means".to_string(),
            ));
        }

        if config.delay_cap_secs > 1.0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Delay cap of {}s keeps almost every FIFO sample", config.delay_cap_secs),
            ));
        }

        warnings
    }

    /// Advisory check of a monitor polling interval
    pub fn validate_monitor_interval(interval_secs: f64, duration_secs: f64) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if interval_secs < 0.001 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Polling interval of {}s is shorter than a command spawn; samples will lag behind",
                    interval_secs
                ),
            ));
        }

        if interval_secs > duration_secs && duration_secs > 0.0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Interval {}s exceeds duration {}s; exactly one sample will be taken",
                    interval_secs, duration_secs
                ),
            ));
        }

        warnings
    }
}

/// Resolve a program the way a shell would
fn find_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    })
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    /// Get display string for level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Get color for terminal display
    pub fn color(&self) -> colored::Color {
        match self {
            Self::Info => colored::Color::Blue,
            Self::Warning => colored::Color::Yellow,
            Self::Error => colored::Color::Red,
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    /// Create a new validation warning
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        if use_color {
            format!("{} {}", tag.color(self.level.color()).bold(), self.message)
        } else {
            format!("{} {}", tag, self.message)
        }
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
