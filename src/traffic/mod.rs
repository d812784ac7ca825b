//! iperf3 traffic generation
//!
//! Clients run with a fixed flow count and duration and always emit the JSON
//! report (`-J`), which is what the analysis step consumes. Servers default
//! to one-off daemons (`-s -1 -D`), matching how each experiment iteration
//! re-arms its receivers.

use crate::error::{AppError, ErrorContext, Result};
use crate::models::FlowLabel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;

/// TCP congestion-control algorithm passed through `iperf3 -C`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CongestionControl {
    Prague,
    Cubic,
    Other(String),
}

impl CongestionControl {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Prague => "prague",
            Self::Cubic => "cubic",
            Self::Other(name) => name,
        }
    }
}

impl FromStr for CongestionControl {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "prague" => Ok(Self::Prague),
            "cubic" => Ok(Self::Cubic),
            "" => Err(AppError::validation("Congestion control name cannot be empty")),
            _ if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => Ok(Self::Other(name)),
            _ => Err(AppError::validation(format!("Invalid congestion control name: {}", s))),
        }
    }
}

impl fmt::Display for CongestionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CongestionControl {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CongestionControl {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// One iperf3 client invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub label: FlowLabel,
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Parallel streams (`-P`)
    #[serde(default = "default_flows")]
    pub flows: u32,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    pub congestion: CongestionControl,
    /// Local address to bind (`-B`)
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl FlowSpec {
    pub fn new(label: FlowLabel, server: &str, congestion: CongestionControl) -> Self {
        Self {
            label,
            server: server.to_string(),
            port: default_port(),
            flows: default_flows(),
            duration_secs: default_duration_secs(),
            congestion,
            bind: None,
            extra_args: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        crate::models::config::validate_label(self.label.as_str())?;
        if self.server.trim().is_empty() {
            return Err(AppError::validation(format!("Flow '{}' has no server", self.label)));
        }
        if self.flows == 0 || self.flows > 128 {
            return Err(AppError::validation(format!(
                "Flow '{}' must use between 1 and 128 parallel streams, got {}",
                self.label, self.flows
            )));
        }
        if self.duration_secs == 0 {
            return Err(AppError::validation(format!("Flow '{}' must run for at least one second", self.label)));
        }
        if self.port == 0 {
            return Err(AppError::validation(format!("Flow '{}' has port 0", self.label)));
        }
        Ok(())
    }

    /// iperf3 arguments for this client
    pub fn client_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            self.server.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-t".to_string(),
            self.duration_secs.to_string(),
            "-P".to_string(),
            self.flows.to_string(),
            "-C".to_string(),
            self.congestion.to_string(),
            "-J".to_string(),
        ];
        if let Some(bind) = &self.bind {
            args.push("-B".to_string());
            args.push(bind.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

fn default_port() -> u16 {
    crate::defaults::DEFAULT_IPERF_PORT
}

fn default_flows() -> u32 {
    1
}

fn default_duration_secs() -> u64 {
    crate::defaults::DEFAULT_FLOW_DURATION_SECS
}

/// Result of one finished client run
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficOutcome {
    pub label: FlowLabel,
    pub json_path: PathBuf,
    pub elapsed: Duration,
}

/// Runs iperf3 clients
#[derive(Debug, Clone)]
pub struct IperfClient {
    program: String,
    /// Time allowed past the flow duration before the client counts as hung
    grace: Duration,
}

impl IperfClient {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            grace: Duration::from_secs(crate::defaults::DEFAULT_FLOW_GRACE_SECS),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run one client to completion, storing its JSON report at `json_path`
    pub async fn run(&self, spec: &FlowSpec, json_path: &Path) -> Result<TrafficOutcome> {
        spec.validate()?;
        let started = Instant::now();

        let limit = spec.duration() + self.grace;
        let running = Command::new(&self.program)
            .args(spec.client_args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        // timing out drops the child, which kills it
        let output = tokio::time::timeout(limit, running)
            .await
            .map_err(|_| {
                AppError::timeout(format!(
                    "{} flow '{}' still running after {}s",
                    self.program,
                    spec.label,
                    limit.as_secs()
                ))
            })?
            .map_err(|e| AppError::command(format!("failed to start {}: {}", self.program, e)))?;

        // iperf3 writes its error object into the JSON report as well, so keep it
        tokio::fs::write(json_path, &output.stdout)
            .await
            .with_context(|| format!("writing {}", json_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = if stderr.trim().is_empty() {
                json_error(&output.stdout).unwrap_or_else(|| "no error output".to_string())
            } else {
                stderr.trim().to_string()
            };
            return Err(AppError::command(format!(
                "{} flow '{}' exited with {}: {}",
                self.program, spec.label, output.status, reason
            )));
        }

        Ok(TrafficOutcome {
            label: spec.label.clone(),
            json_path: json_path.to_path_buf(),
            elapsed: started.elapsed(),
        })
    }
}

/// `error` member of an iperf3 JSON report, if any
fn json_error(stdout: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    value.get("error")?.as_str().map(|s| s.to_string())
}

/// iperf3 server launcher
#[derive(Debug, Clone, PartialEq)]
pub struct IperfServer {
    pub port: u16,
    /// Exit after a single test (`-1`)
    pub one_off: bool,
    /// Detach into the background (`-D`)
    pub daemon: bool,
}

impl Default for IperfServer {
    fn default() -> Self {
        Self {
            port: crate::defaults::DEFAULT_IPERF_PORT,
            one_off: true,
            daemon: true,
        }
    }
}

impl IperfServer {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-s".to_string(), "-p".to_string(), self.port.to_string()];
        if self.one_off {
            args.push("-1".to_string());
        }
        if self.daemon {
            args.push("-D".to_string());
        }
        args
    }

    /// Start the server; returns once the launcher exits
    pub async fn start(&self, program: &str) -> Result<()> {
        let status = Command::new(program)
            .args(self.args())
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| AppError::command(format!("failed to start {}: {}", program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(AppError::command(format!("{} server on port {} exited with {}", program, self.port, status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prague_spec() -> FlowSpec {
        let mut spec = FlowSpec::new(FlowLabel::new("prague").unwrap(), "10.0.5.100", CongestionControl::Prague);
        spec.flows = 4;
        spec.duration_secs = 60;
        spec
    }

    #[test]
    fn test_client_args() {
        assert_eq!(
            prague_spec().client_args(),
            vec!["-c", "10.0.5.100", "-p", "4008", "-t", "60", "-P", "4", "-C", "prague", "-J"]
        );
    }

    #[test]
    fn test_client_args_with_bind_and_extra() {
        let mut spec = prague_spec();
        spec.bind = Some("10.0.1.2".to_string());
        spec.extra_args = vec!["--omit".to_string(), "2".to_string()];
        let args = spec.client_args();
        assert_eq!(&args[11..], &["-B", "10.0.1.2", "--omit", "2"]);
    }

    #[test]
    fn test_server_args() {
        assert_eq!(IperfServer::default().args(), vec!["-s", "-p", "4008", "-1", "-D"]);
        let foreground = IperfServer { port: 5201, one_off: false, daemon: false };
        assert_eq!(foreground.args(), vec!["-s", "-p", "5201"]);
    }

    #[test]
    fn test_congestion_control_parsing() {
        assert_eq!("Prague".parse::<CongestionControl>().unwrap(), CongestionControl::Prague);
        assert_eq!("cubic".parse::<CongestionControl>().unwrap(), CongestionControl::Cubic);
        assert_eq!(
            "bbr".parse::<CongestionControl>().unwrap(),
            CongestionControl::Other("bbr".to_string())
        );
        assert!("cubic; rm".parse::<CongestionControl>().is_err());
        assert!("".parse::<CongestionControl>().is_err());
    }

    #[test]
    fn test_spec_validation() {
        let mut spec = prague_spec();
        assert!(spec.validate().is_ok());
        spec.flows = 0;
        assert!(spec.validate().is_err());
        spec.flows = 1;
        spec.duration_secs = 0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_spec_deserialize_defaults() {
        let spec: FlowSpec = serde_json::from_str(
            r#"{"label": "cubic-2", "server": "10.0.6.100", "congestion": "cubic"}"#,
        )
        .unwrap();
        assert_eq!(spec.port, 4008);
        assert_eq!(spec.flows, 1);
        assert_eq!(spec.duration_secs, 300);
        assert_eq!(spec.congestion, CongestionControl::Cubic);
        assert_eq!(spec.label.family(), "cubic");
    }

    #[test]
    fn test_json_error_extraction() {
        assert_eq!(
            json_error(br#"{"start": {}, "error": "unable to connect to server"}"#),
            Some("unable to connect to server".to_string())
        );
        assert_eq!(json_error(b"not json"), None);
    }

    #[tokio::test]
    async fn test_missing_program_is_command_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = IperfClient::new("/nonexistent/iperf3");
        let err = client.run(&prague_spec(), &dir.path().join("1-iperf-prague.json")).await.unwrap_err();
        assert_eq!(err.category(), "COMMAND");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_report_written_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-iperf3");
        std::fs::write(&script, "#!/bin/sh\necho '{\"end\": {\"streams\": []}}'\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client = IperfClient::new(script.to_string_lossy().into_owned());
        let json_path = dir.path().join("3-iperf-prague.json");
        let outcome = client.run(&prague_spec(), &json_path).await.unwrap();
        assert_eq!(outcome.label.as_str(), "prague");
        let written = std::fs::read_to_string(&json_path).unwrap();
        assert!(written.contains("\"streams\""));
    }

    #[cfg(unix)]
    fn fake_iperf(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-iperf3");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_client_keeps_report_and_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_iperf(dir.path(), "echo '{\"error\": \"unable to connect to server\"}'\nexit 1");
        let json_path = dir.path().join("2-iperf-prague.json");

        let err = IperfClient::new(program).run(&prague_spec(), &json_path).await.unwrap_err();
        assert_eq!(err.category(), "COMMAND");
        assert!(err.to_string().contains("unable to connect to server"));
        assert!(std::fs::read_to_string(&json_path).unwrap().contains("\"error\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_client_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_iperf(dir.path(), "exec sleep 30");
        let mut spec = prague_spec();
        spec.duration_secs = 1;

        let client = IperfClient::new(program).with_grace(Duration::ZERO);
        let started = Instant::now();
        let err = client.run(&spec, &dir.path().join("4-iperf-prague.json")).await.unwrap_err();

        assert_eq!(err.category(), "TIMEOUT");
        assert_eq!(err.exit_code(), 3);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!dir.path().join("4-iperf-prague.json").exists());
    }
}
