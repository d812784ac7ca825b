//! Sources of monitor samples

use async_trait::async_trait;
use tokio::process::Command;

/// Something that can be sampled once per polling interval
#[async_trait]
pub trait Probe: Send + Sync {
    /// Human-readable description, used in logs
    fn describe(&self) -> String;

    /// Take one sample. Failures are reported inside the returned text.
    async fn sample(&self) -> String;
}

/// Runs a fixed external diagnostic command for every sample
#[derive(Debug, Clone, PartialEq)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `tc -s -d qdisc show dev <iface>`
    pub fn qdisc(tc_bin: &str, iface: &str) -> Self {
        Self::new(
            tc_bin,
            ["-s", "-d", "qdisc", "show", "dev", iface]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    /// `ss -tinp [filter...]`; `-p` is needed to attribute sockets to fds
    pub fn sockets(ss_bin: &str, filter: &[String]) -> Self {
        let mut args = vec!["-tinp".to_string()];
        args.extend(filter.iter().cloned());
        Self::new(ss_bin, args)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl Probe for CommandProbe {
    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    async fn sample(&self) -> String {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                if !output.status.success() || text.trim().is_empty() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if !stderr.trim().is_empty() {
                        if !text.is_empty() && !text.ends_with('\n') {
                            text.push('\n');
                        }
                        text.push_str(&stderr);
                    }
                }
                text
            }
            Err(e) => format!("{}: {}", self.program, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qdisc_command_line() {
        let probe = CommandProbe::qdisc("tc", "br0");
        assert_eq!(probe.describe(), "tc -s -d qdisc show dev br0");
    }

    #[test]
    fn test_socket_command_line_with_filter() {
        let filter = vec!["dport".to_string(), "=".to_string(), ":4008".to_string()];
        let probe = CommandProbe::sockets("ss", &filter);
        assert_eq!(probe.describe(), "ss -tinp dport = :4008");
    }

    #[tokio::test]
    async fn test_missing_program_is_reported_in_sample() {
        let probe = CommandProbe::new("/nonexistent/l4st-probe", vec![]);
        let sample = probe.sample().await;
        assert!(sample.starts_with("/nonexistent/l4st-probe: "));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_is_captured() {
        let probe = CommandProbe::new("echo", vec!["qdisc".to_string(), "fq_codel".to_string()]);
        assert_eq!(probe.sample().await, "qdisc fq_codel\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_stderr_is_appended() {
        let probe = CommandProbe::new(
            "sh",
            vec!["-c".to_string(), "echo 'Cannot find device \"br9\"' >&2; exit 1".to_string()],
        );
        assert_eq!(probe.sample().await, "Cannot find device \"br9\"\n");
    }
}
