//! Iterated experiments
//!
//! One iteration launches every plan monitor, every iperf3 flow and one
//! socket monitor per flow as concurrent tasks, then waits for all of them.
//! Jobs share nothing except the read-only plan, and no ordering between
//! them is guaranteed.

pub mod plan;

pub use plan::{ExperimentPlan, MonitorKind, MonitorSpec, ServerSpec};

use crate::error::{AppError, ErrorContext, Result};
use crate::logging::Logger;
use crate::models::{flows::monitor_file, Config};
use crate::monitor::{CommandProbe, Monitor, MonitorConfig, MonitorReport, SampleLayout};
use crate::traffic::{FlowSpec, IperfClient, TrafficOutcome};
use futures::future::join_all;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What a finished job produced
#[derive(Debug)]
pub enum JobResult {
    Monitor(MonitorReport),
    Traffic(TrafficOutcome),
}

/// One job of an iteration and how it ended
#[derive(Debug)]
pub struct JobRecord {
    pub name: String,
    pub outcome: Result<JobResult>,
}

/// Outcome of one iteration
#[derive(Debug)]
pub struct IterationReport {
    pub idx: u32,
    pub jobs: Vec<JobRecord>,
}

impl IterationReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &AppError)> {
        self.jobs.iter().filter_map(|job| match &job.outcome {
            Err(e) => Some((job.name.as_str(), e)),
            Ok(_) => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Program paths used by the jobs
#[derive(Debug, Clone)]
struct Tools {
    tc: String,
    ss: String,
    iperf: String,
}

/// Jobs of one iteration; dropping the set aborts whatever is still running
///
/// An aborted job drops its child process, which `kill_on_drop` then kills.
struct JobSet(Vec<JoinHandle<Result<JobResult>>>);

impl Drop for JobSet {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Runs the iterations of an [`ExperimentPlan`]
pub struct ExperimentRunner {
    plan: Arc<ExperimentPlan>,
    tools: Tools,
    output_dir: PathBuf,
    logger: Logger,
}

impl ExperimentRunner {
    pub fn new(plan: ExperimentPlan, config: &Config, logger: &Logger) -> Result<Self> {
        plan.validate()?;
        let output_dir = plan.output_dir.clone().unwrap_or_else(|| config.output_dir.clone());
        Ok(Self {
            plan: Arc::new(plan),
            tools: Tools {
                tc: config.tc_bin.clone(),
                ss: config.ss_bin.clone(),
                iperf: config.iperf_bin.clone(),
            },
            output_dir,
            logger: logger.child("RUN"),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Run every iteration in order
    pub async fn run_all(&self) -> Result<Vec<IterationReport>> {
        let mut reports = Vec::new();
        for idx in self.plan.indices() {
            reports.push(self.run_iteration(idx).await?);
        }
        Ok(reports)
    }

    /// Run one iteration; job failures are recorded, not propagated
    pub async fn run_iteration(&self, idx: u32) -> Result<IterationReport> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating {}", self.output_dir.display()))?;

        self.remove_stale_reports(idx)?;

        let correlation_id = self.logger.start_operation(&format!("experiment {}", idx)).await;

        for server in &self.plan.servers {
            server.server().start(&self.tools.iperf).await?;
            self.logger.debug(&format!("iperf3 server armed on port {}", server.port))
                .correlation_id(&correlation_id)
                .log()
                .await;
        }

        let mut names = Vec::new();
        let mut running = JobSet(Vec::new());

        for spec in &self.plan.monitors {
            let path = self.output_dir.join(monitor_file(&spec.name, idx));
            let probe = match &spec.kind {
                MonitorKind::Qdisc { iface } => CommandProbe::qdisc(&self.tools.tc, iface),
                MonitorKind::Sockets { filter } => CommandProbe::sockets(&self.tools.ss, filter),
            };
            names.push(format!("monitor {}", spec.name));
            running.0.push(spawn_monitor(probe, spec.monitor_config()?, path));
        }

        for flow in &self.plan.flows {
            let ss_path = self.output_dir.join(flow.label.ss_file(idx));
            let socket_config = MonitorConfig::from_secs(
                self.plan.socket_interval_secs,
                flow.duration_secs as f64,
                SampleLayout::Block,
            )?;
            names.push(format!("sockets {}", flow.label));
            running.0.push(spawn_monitor(
                CommandProbe::sockets(&self.tools.ss, &socket_filter(flow)),
                socket_config,
                ss_path,
            ));

            let json_path = self.output_dir.join(flow.label.iperf_file(idx));
            let client = IperfClient::new(self.tools.iperf.clone());
            let flow = flow.clone();
            names.push(format!("flow {}", flow.label));
            running.0.push(tokio::spawn(async move {
                client.run(&flow, &json_path).await.map(JobResult::Traffic)
            }));
        }

        let results = join_all(running.0.iter_mut()).await;
        let jobs: Vec<JobRecord> = names
            .into_iter()
            .zip(results)
            .map(|(name, joined)| JobRecord {
                name,
                outcome: joined.map_err(AppError::from).and_then(|r| r),
            })
            .collect();

        let report = IterationReport { idx, jobs };
        for (name, error) in report.failures() {
            self.logger.warn(&format!("{} failed in experiment {}", name, idx))
                .correlation_id(&correlation_id)
                .error_info(error)
                .log()
                .await;
        }
        self.logger.end_operation(&correlation_id, &format!("experiment {}", idx), report.is_success()).await;

        Ok(report)
    }

    /// A flow that fails before writing its report must not leave an earlier run's report behind
    fn remove_stale_reports(&self, idx: u32) -> Result<()> {
        for flow in &self.plan.flows {
            let path = self.output_dir.join(flow.label.iperf_file(idx));
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("removing {}", path.display())),
            }
        }
        Ok(())
    }
}

/// Sockets towards the flow's server port; the fd filter in analysis drops the control connection
fn socket_filter(flow: &FlowSpec) -> Vec<String> {
    vec![
        "dst".to_string(),
        flow.server.clone(),
        "and".to_string(),
        "dport".to_string(),
        "=".to_string(),
        format!(":{}", flow.port),
    ]
}

/// Start a monitor writing a fresh log at `path`
fn spawn_monitor(probe: CommandProbe, config: MonitorConfig, path: PathBuf) -> JoinHandle<Result<JobResult>> {
    tokio::spawn(async move {
        let mut file = File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        Monitor::new(probe, config).run(&mut file).await.map(JobResult::Monitor)
    })
}
