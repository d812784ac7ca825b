//! Configuration data model and validation

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Program used for qdisc statistics
    #[serde(default = "default_tc_bin")]
    pub tc_bin: String,

    /// Program used for socket statistics
    #[serde(default = "default_ss_bin")]
    pub ss_bin: String,

    /// Program used for traffic generation
    #[serde(default = "default_iperf_bin")]
    pub iperf_bin: String,

    /// Directory that experiment output is written to and analysis reads from
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Flow labels in the order they are analysed (`cubic`, `cubic-2`, ...)
    #[serde(default = "default_flow_labels")]
    pub flow_labels: Vec<String>,

    /// Socket fds never treated as data flows
    #[serde(default = "default_excluded_fds")]
    pub excluded_fds: Vec<u32>,

    /// Bottleneck rate used to infer FIFO queueing delay
    #[serde(default = "default_link_mbps")]
    pub link_mbps: f64,

    /// Samples before this offset are excluded from steady-state means
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: f64,

    /// Upper bound on inferred FIFO delay when aggregating runs
    #[serde(default = "default_delay_cap_secs")]
    pub delay_cap_secs: f64,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tc_bin: default_tc_bin(),
            ss_bin: default_ss_bin(),
            iperf_bin: default_iperf_bin(),
            output_dir: default_output_dir(),
            flow_labels: default_flow_labels(),
            excluded_fds: default_excluded_fds(),
            link_mbps: default_link_mbps(),
            warmup_secs: default_warmup_secs(),
            delay_cap_secs: default_delay_cap_secs(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        for (name, program) in [("tc", &self.tc_bin), ("ss", &self.ss_bin), ("iperf3", &self.iperf_bin)] {
            if program.trim().is_empty() {
                return Err(AppError::config(format!("{} program path cannot be empty", name)));
            }
        }

        if self.flow_labels.is_empty() {
            return Err(AppError::config("At least one flow label is required"));
        }

        for label in &self.flow_labels {
            validate_label(label)?;
        }

        if !(self.link_mbps.is_finite() && self.link_mbps > 0.0) {
            return Err(AppError::config(format!("Link rate must be a positive number of Mbps, got {}", self.link_mbps)));
        }

        if !(self.warmup_secs.is_finite() && self.warmup_secs >= 0.0) {
            return Err(AppError::config(format!("Warm-up must be a non-negative number of seconds, got {}", self.warmup_secs)));
        }

        if !(self.delay_cap_secs.is_finite() && self.delay_cap_secs > 0.0) {
            return Err(AppError::config(format!("Delay cap must be positive, got {}", self.delay_cap_secs)));
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(tc) = std::env::var("L4ST_TC_BIN") {
            self.tc_bin = tc;
        }

        if let Ok(ss) = std::env::var("L4ST_SS_BIN") {
            self.ss_bin = ss;
        }

        if let Ok(iperf) = std::env::var("L4ST_IPERF_BIN") {
            self.iperf_bin = iperf;
        }

        if let Ok(dir) = std::env::var("L4ST_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }

        if let Ok(labels) = std::env::var("L4ST_FLOW_LABELS") {
            self.flow_labels = split_list(&labels);
        }

        if let Ok(fds) = std::env::var("L4ST_EXCLUDED_FDS") {
            self.excluded_fds = split_list(&fds)
                .iter()
                .map(|fd| fd.parse::<u32>()
                    .map_err(|e| AppError::config(format!("Invalid L4ST_EXCLUDED_FDS entry '{}': {}", fd, e))))
                .collect::<Result<Vec<_>>>()?;
        }

        if let Ok(rate) = std::env::var("L4ST_LINK_MBPS") {
            self.link_mbps = rate.parse()
                .map_err(|e| AppError::config(format!("Invalid L4ST_LINK_MBPS value '{}': {}", rate, e)))?;
        }

        if let Ok(warmup) = std::env::var("L4ST_WARMUP_SECS") {
            self.warmup_secs = warmup.parse()
                .map_err(|e| AppError::config(format!("Invalid L4ST_WARMUP_SECS value '{}': {}", warmup, e)))?;
        }

        if let Ok(cap) = std::env::var("L4ST_DELAY_CAP_SECS") {
            self.delay_cap_secs = cap.parse()
                .map_err(|e| AppError::config(format!("Invalid L4ST_DELAY_CAP_SECS value '{}': {}", cap, e)))?;
        }

        if let Ok(enable_color) = std::env::var("L4ST_ENABLE_COLOR") {
            self.enable_color = enable_color.parse()
                .map_err(|e| AppError::config(format!("Invalid L4ST_ENABLE_COLOR value '{}': {}", enable_color, e)))?;
        }

        Ok(())
    }
}

/// Flow labels end up in file names, so keep them to a safe alphabet
pub(crate) fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(AppError::config("Flow label cannot be empty"));
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(AppError::config(format!(
            "Flow label '{}' may only contain letters, digits, '-' and '_'",
            label
        )));
    }
    Ok(())
}

pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Default value functions for serde
fn default_tc_bin() -> String {
    crate::defaults::DEFAULT_TC_BIN.to_string()
}

fn default_ss_bin() -> String {
    crate::defaults::DEFAULT_SS_BIN.to_string()
}

fn default_iperf_bin() -> String {
    crate::defaults::DEFAULT_IPERF_BIN.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_OUTPUT_DIR)
}

fn default_flow_labels() -> Vec<String> {
    crate::defaults::DEFAULT_FLOW_LABELS
        .iter()
        .map(|&s| s.to_string())
        .collect()
}

fn default_excluded_fds() -> Vec<u32> {
    crate::defaults::DEFAULT_EXCLUDED_FDS.to_vec()
}

fn default_link_mbps() -> f64 {
    crate::defaults::DEFAULT_LINK_MBPS
}

fn default_warmup_secs() -> f64 {
    crate::defaults::DEFAULT_WARMUP_SECS
}

fn default_delay_cap_secs() -> f64 {
    crate::defaults::DEFAULT_DELAY_CAP_SECS
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flow_labels, vec!["cubic", "cubic-2", "cubic-3", "prague"]);
        assert_eq!(config.excluded_fds, vec![4]);
    }

    #[test]
    fn test_empty_label_list_invalid() {
        let mut config = Config::default();
        config.flow_labels.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_label_with_path_separator_invalid() {
        let mut config = Config::default();
        config.flow_labels = vec!["../prague".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_link_rate_invalid() {
        let mut config = Config::default();
        config.link_mbps = 0.0;
        assert!(config.validate().is_err());
        config.link_mbps = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_warmup_invalid() {
        let mut config = Config::default();
        config.warmup_secs = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_split_list_drops_blanks() {
        assert_eq!(split_list(" prague, ,cubic ,"), vec!["prague", "cubic"]);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: Config = serde_json::from_str(r#"{"link_mbps": 100.0}"#).unwrap();
        assert_eq!(config.link_mbps, 100.0);
        assert_eq!(config.iperf_bin, "iperf3");
    }
}
