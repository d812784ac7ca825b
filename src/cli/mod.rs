//! Command-line interface module with topic help

pub mod help;

pub use help::HelpSystem;

use crate::monitor::SampleLayout;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// L4S Testbed Harness - monitors, traffic runs and log post-processing
#[derive(Parser, Debug, Clone)]
#[command(name = "l4st")]
#[command(version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Force colored output
    #[arg(long, global = true)]
    pub color: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Directory experiment files are written to and read from
    #[arg(long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Flow labels in analysis order (comma-separated)
    #[arg(long, global = true, value_name = "LABELS")]
    pub labels: Option<String>,

    /// Show help for specific topic (env, files, experiment, analysis)
    #[arg(long, value_name = "TOPIC")]
    pub help_topic: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Poll `tc` or `ss` at a fixed interval into a timestamped log
    Monitor(MonitorArgs),

    /// Run one iperf3 client and capture its JSON report
    Traffic(TrafficArgs),

    /// Start an iperf3 server
    Server(ServerArgs),

    /// Run the iterations of an experiment plan
    Run {
        /// JSON experiment plan
        plan: PathBuf,
    },

    /// Summarize `{i}-iperf-{label}.json` files into CSV
    IperfCsv(RangeArgs),

    /// Summarize `{i}-ss-{label}.txt` SRTT logs into CSV
    SsCsv(RangeArgs),

    /// Queueing statistics from `tc` monitor logs
    #[command(subcommand)]
    Qdisc(QdiscCommand),

    /// RLC buffer occupancy from gNB logs
    Rlc(RlcArgs),
}

/// Which diagnostic command a monitor polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeKind {
    /// `tc -s -d qdisc show dev <IFACE>`
    Qdisc,
    /// `ss -tinp [FILTER...]`
    Sockets,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    /// Interface whose qdisc is polled (ignored for sockets)
    pub iface: String,

    /// Total monitoring time in seconds
    #[arg(value_parser = parse_secs)]
    pub duration_secs: f64,

    /// Polling interval in seconds
    #[arg(value_parser = parse_interval)]
    pub interval_secs: f64,

    /// Command to poll
    #[arg(long, value_enum, default_value_t = ProbeKind::Qdisc)]
    pub kind: ProbeKind,

    /// Extra `ss` filter tokens (can be used multiple times)
    #[arg(long, action = ArgAction::Append, allow_hyphen_values = true)]
    pub filter: Vec<String>,

    /// Sample layout; flat for qdisc and block for sockets by default
    #[arg(long, value_enum)]
    pub layout: Option<SampleLayout>,

    /// Log file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl MonitorArgs {
    pub fn effective_layout(&self) -> SampleLayout {
        self.layout.unwrap_or(match self.kind {
            ProbeKind::Qdisc => SampleLayout::Flat,
            ProbeKind::Sockets => SampleLayout::Block,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct TrafficArgs {
    /// Flow label, used for the default output name
    pub label: String,

    /// iperf3 server address
    pub server: String,

    /// Congestion control algorithm (`iperf3 -C`)
    #[arg(long, default_value = "prague")]
    pub cc: String,

    /// Server port
    #[arg(short, long, default_value_t = crate::defaults::DEFAULT_IPERF_PORT)]
    pub port: u16,

    /// Parallel streams (`-P`)
    #[arg(short = 'P', long, default_value_t = 1)]
    pub flows: u32,

    /// Test length in seconds
    #[arg(short = 't', long, default_value_t = crate::defaults::DEFAULT_FLOW_DURATION_SECS)]
    pub duration: u64,

    /// Local address to bind (`-B`)
    #[arg(short = 'B', long)]
    pub bind: Option<String>,

    /// JSON report file; `<DIR>/<LABEL>.json` when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Listen port
    #[arg(short, long, default_value_t = crate::defaults::DEFAULT_IPERF_PORT)]
    pub port: u16,

    /// Stay in the foreground instead of daemonizing (`-D`)
    #[arg(long)]
    pub foreground: bool,

    /// Serve more than one test (omits `-1`)
    #[arg(long)]
    pub persistent: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// First experiment index
    pub start: u32,

    /// Last experiment index (inclusive)
    pub end: u32,

    /// Prefix of the CSV files written
    pub prefix: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum QdiscCommand {
    /// DualPI2 classic and L4S queue delay from one monitor log
    Dualq {
        /// `dualq_monitor_<i>.txt` log
        file: PathBuf,

        /// Write the time series to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// FIFO backlog, drops and inferred delay from one monitor log
    Fifo {
        /// `fifo_monitor_<i>.txt` log
        file: PathBuf,

        /// Bottleneck link rate in Mbps
        #[arg(long)]
        link_mbps: Option<f64>,

        /// Write the time series to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Inferred FIFO delay pooled over a range of runs
    FifoRuns {
        /// First experiment index
        start: u32,

        /// Last experiment index (inclusive)
        end: u32,

        /// Bottleneck link rate in Mbps
        link_mbps: f64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RlcArgs {
    /// Experiment index, or first index of a range
    pub start: u32,

    /// Last experiment index; aggregates the range when given
    pub end: Option<u32>,

    /// Logs carry `, slice <s>` on buffer lines
    #[arg(long)]
    pub sliced: bool,

    /// Seconds excluded from the after-warm-up mean
    #[arg(long)]
    pub warmup: Option<f64>,

    /// Write the per-UE rows to this CSV file
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        if self.command.is_none() && self.help_topic.is_none() {
            return Err("A subcommand is required".to_string());
        }

        match &self.command {
            Some(Commands::IperfCsv(range)) | Some(Commands::SsCsv(range)) => {
                check_range(range.start, range.end)?;
                if range.prefix.trim().is_empty() {
                    return Err("CSV prefix cannot be empty".to_string());
                }
            }
            Some(Commands::Qdisc(QdiscCommand::FifoRuns { start, end, link_mbps })) => {
                check_range(*start, *end)?;
                check_rate(*link_mbps)?;
            }
            Some(Commands::Qdisc(QdiscCommand::Fifo { link_mbps: Some(rate), .. })) => {
                check_rate(*rate)?;
            }
            Some(Commands::Rlc(args)) => {
                if let Some(end) = args.end {
                    check_range(args.start, end)?;
                }
                if let Some(warmup) = args.warmup {
                    if !(warmup.is_finite() && warmup >= 0.0) {
                        return Err(format!("Warm-up must be a non-negative number of seconds, got {}", warmup));
                    }
                }
            }
            Some(Commands::Monitor(args)) => {
                if args.kind == ProbeKind::Qdisc && args.iface.trim().is_empty() {
                    return Err("Interface name cannot be empty".to_string());
                }
                if args.kind == ProbeKind::Qdisc && !args.filter.is_empty() {
                    return Err("--filter only applies to --kind sockets".to_string());
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Check if help should be displayed for a specific topic
    pub fn should_show_topic_help(&self) -> bool {
        self.help_topic.is_some()
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Display help for the specified topic or main help
    pub fn display_help(&self) -> String {
        let help_system = HelpSystem::new();
        let use_colors = self.use_colors();

        if let Some(topic) = &self.help_topic {
            help_system.display_topic_help(topic, use_colors).unwrap_or_else(|| {
                format!(
                    "Unknown help topic: '{}'\n\nAvailable topics: {}\n\n{}",
                    topic,
                    HelpSystem::topics().join(", "),
                    help_system.display_main_help(use_colors)
                )
            })
        } else {
            help_system.display_main_help(use_colors)
        }
    }

    /// Name of the selected subcommand, for logging
    pub fn command_name(&self) -> &'static str {
        match &self.command {
            Some(Commands::Monitor(_)) => "monitor",
            Some(Commands::Traffic(_)) => "traffic",
            Some(Commands::Server(_)) => "server",
            Some(Commands::Run { .. }) => "run",
            Some(Commands::IperfCsv(_)) => "iperf-csv",
            Some(Commands::SsCsv(_)) => "ss-csv",
            Some(Commands::Qdisc(QdiscCommand::Dualq { .. })) => "qdisc dualq",
            Some(Commands::Qdisc(QdiscCommand::Fifo { .. })) => "qdisc fifo",
            Some(Commands::Qdisc(QdiscCommand::FifoRuns { .. })) => "qdisc fifo-runs",
            Some(Commands::Rlc(_)) => "rlc",
            None => "help",
        }
    }

    /// Get configuration summary for display
    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Configuration Summary:\n");
        summary.push_str(&format!("  Command: {}\n", self.command_name()));
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary.push_str(&format!("  Verbose mode: {}\n", self.verbose));
        summary.push_str(&format!("  Debug mode: {}\n", self.debug));

        if let Some(ref dir) = self.dir {
            summary.push_str(&format!("  Directory: {}\n", dir.display()));
        }

        if let Some(ref labels) = self.labels {
            summary.push_str(&format!("  Flow labels: {}\n", labels));
        }

        summary
    }
}

fn check_range(start: u32, end: u32) -> Result<(), String> {
    if end < start {
        Err(format!("End index {} is before start index {}", end, start))
    } else {
        Ok(())
    }
}

fn check_rate(link_mbps: f64) -> Result<(), String> {
    if link_mbps.is_finite() && link_mbps > 0.0 {
        Ok(())
    } else {
        Err(format!("Link rate must be a positive number of Mbps, got {}", link_mbps))
    }
}

/// Parse a non-negative number of seconds
fn parse_secs(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("Invalid number of seconds: {}", s))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("Seconds must be a non-negative number, got {}", s));
    }
    Ok(secs)
}

/// Parse a positive polling interval
fn parse_interval(s: &str) -> Result<f64, String> {
    let secs = parse_secs(s)?;
    if secs == 0.0 {
        return Err("Interval must be greater than 0".to_string());
    }
    Ok(secs)
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_monitor_positionals() {
        let cli = Cli::parse_from(["l4st", "monitor", "br0", "300", "0.002"]);
        let Some(Commands::Monitor(args)) = cli.command else {
            panic!("expected monitor");
        };
        assert_eq!(args.iface, "br0");
        assert_eq!(args.duration_secs, 300.0);
        assert_eq!(args.interval_secs, 0.002);
        assert_eq!(args.kind, ProbeKind::Qdisc);
        assert_eq!(args.effective_layout(), SampleLayout::Flat);
        assert!(args.output.is_none());
    }

    #[test]
    fn test_monitor_wrong_argument_count() {
        let err = Cli::try_parse_from(["l4st", "monitor", "br0", "300"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let err = Cli::try_parse_from(["l4st", "monitor", "br0", "300", "1", "extra"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_monitor_rejects_zero_interval() {
        assert!(Cli::try_parse_from(["l4st", "monitor", "br0", "10", "0"]).is_err());
        assert!(Cli::try_parse_from(["l4st", "monitor", "br0", "-1", "0.1"]).is_err());
    }

    #[test]
    fn test_socket_monitor_filters() {
        let cli = Cli::parse_from([
            "l4st", "monitor", "any", "60", "0.1", "--kind", "sockets",
            "--filter", "dport", "--filter", "=", "--filter", ":4008",
        ]);
        let Some(Commands::Monitor(args)) = cli.command else {
            panic!("expected monitor");
        };
        assert_eq!(args.filter, vec!["dport", "=", ":4008"]);
        assert_eq!(args.effective_layout(), SampleLayout::Block);
    }

    #[test]
    fn test_traffic_defaults() {
        let cli = Cli::parse_from(["l4st", "traffic", "prague", "10.0.5.100"]);
        let Some(Commands::Traffic(args)) = cli.command else {
            panic!("expected traffic");
        };
        assert_eq!(args.cc, "prague");
        assert_eq!(args.port, 4008);
        assert_eq!(args.duration, 300);
        assert_eq!(args.flows, 1);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["l4st", "ss-csv", "1", "5", "run", "--dir", "/tmp/exp", "--no-color"]);
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/exp")));
        assert!(cli.no_color);
        assert!(!cli.use_colors());
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_reversed_range() {
        let cli = Cli::parse_from(["l4st", "iperf-csv", "5", "1", "run"]);
        assert!(cli.validate().unwrap_err().contains("before start"));

        let cli = Cli::parse_from(["l4st", "qdisc", "fifo-runs", "1", "3", "0"]);
        assert!(cli.validate().unwrap_err().contains("Link rate"));
    }

    #[test]
    fn test_validate_color_conflict() {
        let cli = Cli::parse_from(["l4st", "--color", "--no-color", "rlc", "3"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_rlc_single_and_range() {
        let cli = Cli::parse_from(["l4st", "rlc", "3", "--sliced"]);
        let Some(Commands::Rlc(args)) = &cli.command else {
            panic!("expected rlc");
        };
        assert_eq!(args.end, None);
        assert!(args.sliced);

        let cli = Cli::parse_from(["l4st", "rlc", "3", "9", "--warmup", "30"]);
        let Some(Commands::Rlc(args)) = &cli.command else {
            panic!("expected rlc");
        };
        assert_eq!(args.end, Some(9));
        assert_eq!(args.warmup, Some(30.0));
    }

    #[test]
    fn test_help_topic_without_subcommand() {
        let cli = Cli::parse_from(["l4st", "--help-topic", "env"]);
        assert!(cli.should_show_topic_help());
        assert!(cli.validate().is_ok());
        assert_eq!(cli.command_name(), "help");
    }

    #[test]
    fn test_color_support_detection() {
        std::env::set_var("NO_COLOR", "1");
        assert!(!supports_color());
        std::env::remove_var("NO_COLOR");

        std::env::set_var("FORCE_COLOR", "1");
        assert!(supports_color());
        std::env::remove_var("FORCE_COLOR");
    }

    #[test]
    fn test_config_summary() {
        let cli = Cli::parse_from(["l4st", "--labels", "cubic,prague", "iperf-csv", "1", "2", "x"]);
        let summary = cli.get_config_summary();
        assert!(summary.contains("Command: iperf-csv"));
        assert!(summary.contains("Flow labels: cubic,prague"));
    }
}
