//! L4S Testbed Harness
//!
//! Drives the measurement side of an L4S testbed: timed polling of `ss` and
//! `tc` statistics into timestamped logs, `iperf3` traffic runs, iterated
//! experiments combining both, and post-processing of the captured logs into
//! CSV summaries.

pub mod analysis;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod output;
pub mod stats;
pub mod traffic;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::Config;
pub use monitor::{CommandProbe, Monitor, MonitorConfig, Probe, SampleLayout};
pub use stats::Summary;
pub use traffic::{CongestionControl, FlowSpec, IperfClient, IperfServer};
pub use output::{OutputFormatter, ColoredFormatter, PlainFormatter, OutputFormatterFactory};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Build metadata captured by build.rs
pub fn build_info() -> String {
    format!(
        "{} v{} ({}, built {}, {})",
        PKG_NAME,
        VERSION,
        option_env!("GIT_COMMIT").unwrap_or("unknown commit"),
        option_env!("BUILD_TIME").unwrap_or("unknown time"),
        option_env!("TARGET_TRIPLE").unwrap_or("unknown target"),
    )
}

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_TC_BIN: &str = "tc";
    pub const DEFAULT_SS_BIN: &str = "ss";
    pub const DEFAULT_IPERF_BIN: &str = "iperf3";
    pub const DEFAULT_OUTPUT_DIR: &str = ".";
    pub const DEFAULT_FLOW_LABELS: &[&str] = &["cubic", "cubic-2", "cubic-3", "prague"];
    /// iperf3 control connection; never a data flow
    pub const DEFAULT_EXCLUDED_FDS: &[u32] = &[4];
    pub const DEFAULT_LINK_MBPS: f64 = 50.0;
    pub const DEFAULT_WARMUP_SECS: f64 = 60.0;
    /// Inferred FIFO delays above this are discarded when aggregating runs
    pub const DEFAULT_DELAY_CAP_SECS: f64 = 0.1;
    pub const DEFAULT_IPERF_PORT: u16 = 4008;
    pub const DEFAULT_FLOW_DURATION_SECS: u64 = 300;
    /// A client still running this long after its duration is killed
    pub const DEFAULT_FLOW_GRACE_SECS: u64 = 30;
    pub const DEFAULT_SOCKET_INTERVAL_SECS: f64 = 0.1;
    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
