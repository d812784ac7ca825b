//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::Result,
    models::{config::split_list, Config},
};
use std::path::{Path, PathBuf};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
    env_file: PathBuf,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            env_file: PathBuf::from(".env"),
        }
    }

    /// Read defaults from another .env file
    pub fn with_env_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.env_file = path.as_ref().to_path_buf();
        self
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        // .env only fills variables the environment does not set
        let loaded = EnvManager::load_env_file(&self.env_file)?;

        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config);
        config.validate()?;

        if config.debug {
            eprintln!(
                "{}",
                if loaded {
                    format!("Loaded configuration from {}", self.env_file.display())
                } else {
                    "No .env file found, using defaults and CLI arguments".to_string()
                }
            );
        }

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) {
        if let Some(ref dir) = self.cli.dir {
            config.output_dir = dir.clone();
        }

        if let Some(ref labels) = self.cli.labels {
            config.flow_labels = split_list(labels);
        }

        if self.cli.no_color {
            config.enable_color = false;
        } else if self.cli.color {
            config.enable_color = true;
        }

        // CLI-only flags
        config.verbose = self.cli.verbose;
        config.debug = self.cli.debug;
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Programs: tc={}, ss={}, iperf3={}", config.tc_bin, config.ss_bin, config.iperf_bin));
    summary.push(format!("Directory: {}", config.output_dir.display()));
    summary.push(format!("Flow Labels: {}", config.flow_labels.join(", ")));
    summary.push(format!(
        "Excluded fds: {}",
        config.excluded_fds.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
    ));
    summary.push(format!("Link Rate: {} Mbps", config.link_mbps));
    summary.push(format!("Warm-up: {}s", config.warmup_secs));
    summary.push(format!("Delay Cap: {}s", config.delay_cap_secs));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}
