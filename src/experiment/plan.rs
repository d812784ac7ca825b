//! Experiment plan files

use crate::error::{AppError, ErrorContext, Result};
use crate::monitor::{MonitorConfig, SampleLayout};
use crate::traffic::{FlowSpec, IperfServer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What a plan-level monitor samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MonitorKind {
    /// `tc -s -d qdisc show dev <iface>`
    Qdisc { iface: String },
    /// `ss -tinp [filter...]`
    Sockets {
        #[serde(default)]
        filter: Vec<String>,
    },
}

impl MonitorKind {
    pub fn default_layout(&self) -> SampleLayout {
        match self {
            Self::Qdisc { .. } => SampleLayout::Flat,
            Self::Sockets { .. } => SampleLayout::Block,
        }
    }
}

/// A monitor started with every iteration, logging to `{name}_monitor_{i}.txt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSpec {
    pub name: String,
    pub kind: MonitorKind,
    pub duration_secs: f64,
    pub interval_secs: f64,
    #[serde(default)]
    pub layout: Option<SampleLayout>,
}

impl MonitorSpec {
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let layout = self.layout.unwrap_or_else(|| self.kind.default_layout());
        MonitorConfig::from_secs(self.interval_secs, self.duration_secs, layout)
    }
}

/// Local iperf3 server armed before each iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSpec {
    pub fn server(&self) -> IperfServer {
        IperfServer {
            port: self.port,
            ..IperfServer::default()
        }
    }
}

fn default_port() -> u16 {
    crate::defaults::DEFAULT_IPERF_PORT
}

/// Complete description of an experiment series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub iterations: u32,
    #[serde(default = "default_begin_idx")]
    pub begin_idx: u32,
    /// Falls back to the configured output directory
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Sampling interval of the per-flow socket monitors
    #[serde(default = "default_socket_interval")]
    pub socket_interval_secs: f64,
    #[serde(default)]
    pub servers: Vec<ServerSpec>,
    #[serde(default)]
    pub monitors: Vec<MonitorSpec>,
    pub flows: Vec<FlowSpec>,
}

fn default_begin_idx() -> u32 {
    1
}

fn default_socket_interval() -> f64 {
    crate::defaults::DEFAULT_SOCKET_INTERVAL_SECS
}

impl ExperimentPlan {
    /// Read and validate a JSON plan
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading plan {}", path.display()))?;
        let plan: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing plan {}", path.display()))?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(AppError::validation("Plan must run at least one iteration"));
        }
        if self.begin_idx.checked_add(self.iterations - 1).is_none() {
            return Err(AppError::validation("Iteration indices overflow"));
        }
        if self.flows.is_empty() {
            return Err(AppError::validation("Plan must contain at least one flow"));
        }

        let mut labels = HashSet::new();
        for flow in &self.flows {
            flow.validate()?;
            if !labels.insert(flow.label.as_str()) {
                return Err(AppError::validation(format!("Duplicate flow label '{}'", flow.label)));
            }
        }

        let mut names = HashSet::new();
        for monitor in &self.monitors {
            crate::models::config::validate_label(&monitor.name)?;
            if !names.insert(monitor.name.as_str()) {
                return Err(AppError::validation(format!("Duplicate monitor name '{}'", monitor.name)));
            }
            monitor.monitor_config()?;
        }

        MonitorConfig::from_secs(self.socket_interval_secs, 0.0, SampleLayout::Block)?;
        Ok(())
    }

    /// Iteration indices in execution order
    pub fn indices(&self) -> impl Iterator<Item = u32> {
        self.begin_idx..self.begin_idx + self.iterations
    }
}
