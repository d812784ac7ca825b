//! Extended command-line help with examples and file layout guidance
//!
//! clap renders the per-subcommand `--help`; this module adds the topics that
//! do not fit there: environment variables, experiment file naming, plan
//! files and the analysis commands.

use crate::config::env::EnvManager;
use colored::*;

/// Topic help for the CLI application
pub struct HelpSystem {
    platform: String,
}

impl HelpSystem {
    /// Create a new help system
    pub fn new() -> Self {
        Self {
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }

    /// Topics accepted by `--help-topic`
    pub fn topics() -> &'static [&'static str] {
        &["env", "files", "experiment", "analysis"]
    }

    /// Display the main help message
    pub fn display_main_help(&self, use_colors: bool) -> String {
        let mut help = String::new();

        help.push_str(&self.format_header(use_colors));
        help.push('\n');
        help.push_str(&self.format_usage_section(use_colors));
        help.push('\n');
        help.push_str(&self.format_options_section(use_colors));
        help.push('\n');
        help.push_str(&self.format_examples_section(use_colors));
        help.push('\n');
        help.push_str(&self.format_footer(use_colors));

        help
    }

    /// Display help for one topic
    pub fn display_topic_help(&self, topic: &str, use_colors: bool) -> Option<String> {
        match topic.to_lowercase().as_str() {
            "env" | "environment" | "config" => Some(self.format_environment_help(use_colors)),
            "files" | "naming" => Some(self.format_files_help(use_colors)),
            "experiment" | "plan" | "run" => Some(self.format_experiment_help(use_colors)),
            "analysis" | "csv" => Some(self.format_analysis_help(use_colors)),
            "examples" => Some(self.format_examples_section(use_colors)),
            _ => None,
        }
    }

    fn format_header(&self, use_colors: bool) -> String {
        let title = "L4S Testbed Harness";
        let subtitle = "Timed tc/ss monitoring, iperf3 traffic runs and CSV post-processing";
        let version = env!("CARGO_PKG_VERSION");

        if use_colors {
            format!(
                "{}\n{}\nVersion: {} | Platform: {}\n",
                title.bright_cyan().bold(),
                subtitle.bright_blue(),
                version.green(),
                self.platform.yellow()
            )
        } else {
            format!("{}\n{}\nVersion: {} | Platform: {}\n", title, subtitle, version, self.platform)
        }
    }

    fn format_usage_section(&self, use_colors: bool) -> String {
        let usage_patterns = [
            "l4st monitor <IFACE> <DURATION_SECS> <INTERVAL_SECS> [OPTIONS]",
            "l4st traffic <LABEL> <SERVER> [OPTIONS]",
            "l4st server [OPTIONS]",
            "l4st run <PLAN>",
            "l4st iperf-csv|ss-csv <START> <END> <PREFIX>",
            "l4st qdisc dualq|fifo <FILE> | fifo-runs <START> <END> <LINK_MBPS>",
            "l4st rlc <START> [END] [--sliced]",
            "l4st --help-topic <TOPIC>",
        ];

        let mut usage = format!("{}\n", heading("USAGE:", use_colors));
        for pattern in usage_patterns {
            if use_colors {
                usage.push_str(&format!("  {}\n", pattern.bright_white()));
            } else {
                usage.push_str(&format!("  {}\n", pattern));
            }
        }
        usage
    }

    fn format_options_section(&self, use_colors: bool) -> String {
        let options = [
            OptionHelp {
                long: "dir",
                value: "<DIR>",
                description: "Directory experiment files are written to and read from",
                example: Some("--dir results/run-3"),
            },
            OptionHelp {
                long: "labels",
                value: "<LABELS>",
                description: "Flow labels in analysis order",
                example: Some("--labels cubic,cubic-2,prague"),
            },
            OptionHelp {
                long: "color",
                value: "",
                description: "Force colored output",
                example: None,
            },
            OptionHelp {
                long: "no-color",
                value: "",
                description: "Disable colored output",
                example: None,
            },
            OptionHelp {
                long: "verbose",
                value: "",
                description: "Show every job and sample count",
                example: None,
            },
            OptionHelp {
                long: "debug",
                value: "",
                description: "JSON debug logs on stderr",
                example: None,
            },
        ];

        let mut output = format!("{}\n", heading("GLOBAL OPTIONS:", use_colors));
        for option in options {
            output.push_str(&option.format(use_colors));
            output.push('\n');
        }
        output
    }

    fn format_examples_section(&self, use_colors: bool) -> String {
        let examples = [
            ExampleHelp {
                title: "DualPI2 monitor",
                command: "l4st monitor br0 300 0.002 -o dualq_monitor_1.txt",
                description: "Sample `tc -s -d qdisc show dev br0` every 2 ms for five minutes",
            },
            ExampleHelp {
                title: "Prague flow",
                command: "l4st traffic prague 10.0.5.100 --cc prague -P 4 -o 1-iperf-prague.json",
                description: "Four parallel Prague streams against the iperf3 server",
            },
            ExampleHelp {
                title: "Experiment series",
                command: "l4st run plan.json --dir results",
                description: "Run every iteration of the plan, monitors and flows together",
            },
            ExampleHelp {
                title: "Throughput summary",
                command: "l4st iperf-csv 1 20 baseline --dir results",
                description: "Writes baseline_iperf_results.csv and baseline_iperf_results_multi_ue.csv",
            },
        ];

        let mut output = format!("{}\n", heading("EXAMPLES:", use_colors));
        for example in examples {
            output.push_str(&example.format(use_colors));
            output.push('\n');
        }
        output
    }

    fn format_footer(&self, use_colors: bool) -> String {
        let mut footer = format!("{}\n", heading("ADDITIONAL HELP:", use_colors));

        let help_topics = [
            ("--help-topic env", "Environment variables and .env files"),
            ("--help-topic files", "Names of the files experiments produce"),
            ("--help-topic experiment", "Experiment plan format"),
            ("--help-topic analysis", "CSV outputs of the analysis commands"),
        ];

        for (command, description) in help_topics {
            if use_colors {
                footer.push_str(&format!("  {}: {}\n", command.bright_yellow(), description.white()));
            } else {
                footer.push_str(&format!("  {}: {}\n", command, description));
            }
        }
        footer.push_str("\nEvery subcommand also accepts --help.\n");
        footer
    }

    fn format_environment_help(&self, use_colors: bool) -> String {
        let mut help = format!("{}\n\n", heading("ENVIRONMENT VARIABLES", use_colors));
        help.push_str(&EnvManager::display_env_help());
        help.push_str("\nExample .env file:\n");
        for line in ["L4ST_OUTPUT_DIR=results", "L4ST_FLOW_LABELS=cubic,prague", "L4ST_LINK_MBPS=100"] {
            if use_colors {
                help.push_str(&format!("  {}\n", line.bright_blue()));
            } else {
                help.push_str(&format!("  {}\n", line));
            }
        }
        help
    }

    fn format_files_help(&self, use_colors: bool) -> String {
        let mut help = format!("{}\n\n", heading("EXPERIMENT FILES", use_colors));
        help.push_str("Per iteration index <i> and flow label <L>:\n\n");

        let files = [
            ("<i>-iperf-<L>.json", "iperf3 -J report of the flow"),
            ("<i>-ss-<L>.txt", "ss -tinp samples of the flow's connections"),
            ("<name>_monitor_<i>.txt", "Samples of a plan monitor (dualq, fifo, ...)"),
            ("gnb_log_<i>.log", "gNB MAC log read by `l4st rlc`"),
        ];
        for (file, description) in files {
            if use_colors {
                help.push_str(&format!("  {:<24} {}\n", file.bright_yellow(), description));
            } else {
                help.push_str(&format!("  {:<24} {}\n", file, description));
            }
        }

        help.push_str("\nThe family of a label is the text before the first '-' (cubic-2 -> cubic).\n");
        help.push_str("Samples start with a `seconds.nanoseconds` timestamp.\n");
        help
    }

    fn format_experiment_help(&self, use_colors: bool) -> String {
        let mut help = format!("{}\n\n", heading("EXPERIMENT PLANS", use_colors));
        help.push_str("`l4st run` reads a JSON plan and runs its iterations one after another.\n");
        help.push_str("Within an iteration every monitor and flow runs concurrently; each flow\n");
        help.push_str("also gets an ss monitor filtered on its server and port.\n\n");
        help.push_str(
            r#"  {
    "iterations": 20,
    "begin_idx": 1,
    "servers": [{ "port": 4008 }],
    "monitors": [
      { "name": "dualq", "kind": { "type": "qdisc", "iface": "br0" },
        "duration_secs": 300, "interval_secs": 0.002 }
    ],
    "flows": [
      { "label": "prague", "server": "10.0.5.100", "congestion": "prague", "flows": 4 },
      { "label": "cubic", "server": "10.0.6.100", "congestion": "cubic" }
    ]
  }
"#,
        );
        help.push_str("\nA failed job is reported and the rest of the iteration still completes.\n");
        help
    }

    fn format_analysis_help(&self, use_colors: bool) -> String {
        let mut help = format!("{}\n\n", heading("ANALYSIS OUTPUTS", use_colors));

        let outputs = [
            ("iperf-csv", "<prefix>_iperf_results.csv", "idx,file,socket,mbps"),
            ("iperf-csv", "<prefix>_iperf_results_multi_ue.csv", "type,ue,mean_mbps,std_mbps,count"),
            ("ss-csv", "<prefix>_srtt_results.csv", "idx,file,flow,mean_srtt"),
            ("qdisc dualq", "--csv FILE", "time_s,classic_delay_ms,l4s_delay_ms"),
            ("qdisc fifo", "--csv FILE", "time_s,backlog_pkts,drops,delay_s"),
            ("rlc", "--csv FILE", "ue,rnti,slice,samples,mean_bytes,mean_bytes_after_warmup"),
        ];
        for (command, file, header) in outputs {
            if use_colors {
                help.push_str(&format!("  {} -> {}\n      {}\n", command.bright_cyan(), file.bright_yellow(), header.dimmed()));
            } else {
                help.push_str(&format!("  {} -> {}\n      {}\n", command, file, header));
            }
        }

        help.push_str("\nMissing input files are skipped with a warning.\n");
        help.push_str("A prefix without a directory component is placed under --dir.\n");
        help
    }
}

impl Default for HelpSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn heading(text: &str, use_colors: bool) -> String {
    if use_colors {
        text.bright_green().bold().to_string()
    } else {
        text.to_string()
    }
}

/// Helper struct for formatting individual options
struct OptionHelp {
    long: &'static str,
    value: &'static str,
    description: &'static str,
    example: Option<&'static str>,
}

impl OptionHelp {
    fn format(&self, use_colors: bool) -> String {
        let long_with_value = if self.value.is_empty() {
            format!("--{}", self.long)
        } else {
            format!("--{} {}", self.long, self.value)
        };

        let mut option_str = if use_colors {
            format!("  {:<24} {}", long_with_value.bright_cyan(), self.description.white())
        } else {
            format!("  {:<24} {}", long_with_value, self.description)
        };

        if let Some(example) = self.example {
            if use_colors {
                option_str.push_str(&format!(
                    "\n{}{}",
                    " ".repeat(27),
                    format!("Example: {}", example).bright_blue().italic()
                ));
            } else {
                option_str.push_str(&format!("\n{}Example: {}", " ".repeat(27), example));
            }
        }

        option_str
    }
}

/// Helper struct for formatting examples
struct ExampleHelp {
    title: &'static str,
    command: &'static str,
    description: &'static str,
}

impl ExampleHelp {
    fn format(&self, use_colors: bool) -> String {
        if use_colors {
            format!(
                "  {}:\n    {}\n    {}\n",
                self.title.bright_yellow().bold(),
                self.command.bright_white(),
                self.description.bright_blue().italic()
            )
        } else {
            format!("  {}:\n    {}\n    {}\n", self.title, self.command, self.description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_help_sections() {
        let help = HelpSystem::new().display_main_help(false);
        assert!(help.contains("L4S Testbed Harness"));
        assert!(help.contains("USAGE:"));
        assert!(help.contains("GLOBAL OPTIONS:"));
        assert!(help.contains("EXAMPLES:"));
        assert!(help.contains("--help-topic files"));
    }

    #[test]
    fn test_every_topic_resolves() {
        let help_system = HelpSystem::new();
        for topic in HelpSystem::topics() {
            assert!(help_system.display_topic_help(topic, false).is_some(), "topic {}", topic);
        }
        assert!(help_system.display_topic_help("ENV", false).is_some());
        assert!(help_system.display_topic_help("throughput", false).is_none());
    }

    #[test]
    fn test_environment_topic_lists_variables() {
        let help = HelpSystem::new().display_topic_help("env", false).unwrap();
        assert!(help.contains("L4ST_TC_BIN"));
        assert!(help.contains("L4ST_FLOW_LABELS"));
        assert!(help.contains("Configuration Priority"));
    }

    #[test]
    fn test_analysis_topic_names_headers() {
        let help = HelpSystem::new().display_topic_help("analysis", false).unwrap();
        assert!(help.contains("idx,file,socket,mbps"));
        assert!(help.contains("type,ue,mean_mbps,std_mbps,count"));
        assert!(help.contains("idx,file,flow,mean_srtt"));
    }

    #[test]
    fn test_plan_example_is_valid_json() {
        let help = HelpSystem::new().display_topic_help("experiment", false).unwrap();
        let start = help.find("  {").unwrap();
        let end = help.rfind('}').unwrap();
        let plan: crate::experiment::ExperimentPlan = serde_json::from_str(&help[start..=end]).unwrap();
        assert_eq!(plan.iterations, 20);
        assert_eq!(plan.flows.len(), 2);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_option_help_formatting() {
        let option = OptionHelp {
            long: "dir",
            value: "<DIR>",
            description: "Directory",
            example: Some("--dir x"),
        };
        let formatted = option.format(false);
        assert!(formatted.starts_with("  --dir <DIR>"));
        assert!(formatted.contains("Example: --dir x"));
    }

    #[test]
    fn test_colored_help_differs() {
        colored::control::set_override(true);
        let help_system = HelpSystem::new();
        assert_ne!(help_system.display_main_help(true), help_system.display_main_help(false));
        colored::control::unset_override();
    }
}
