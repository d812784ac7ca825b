//! Timed polling of diagnostic commands into timestamped logs
//!
//! Every `interval`, for up to `duration`, the monitor takes one sample from
//! its [`Probe`] and appends it to a sink, prefixed by a wall-clock timestamp
//! in `seconds.nanoseconds` form. The first sample is taken immediately; no
//! sample is taken once the elapsed time reaches `duration`.

pub mod probe;

pub use probe::{CommandProbe, Probe};

use crate::error::{AppError, ErrorContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// How one sample is laid out in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SampleLayout {
    /// Timestamp and output on one line, whitespace collapsed
    Flat,
    /// Timestamp line followed by the raw output
    Block,
}

/// Polling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub duration: Duration,
    pub layout: SampleLayout,
}

impl MonitorConfig {
    /// Build from seconds as given on the command line
    pub fn from_secs(interval_secs: f64, duration_secs: f64, layout: SampleLayout) -> Result<Self> {
        if !(interval_secs.is_finite() && interval_secs > 0.0) {
            return Err(AppError::validation(format!(
                "Polling interval must be a positive number of seconds, got {}",
                interval_secs
            )));
        }
        if !(duration_secs.is_finite() && duration_secs >= 0.0) {
            return Err(AppError::validation(format!(
                "Monitor duration must be a non-negative number of seconds, got {}",
                duration_secs
            )));
        }

        let interval = Duration::try_from_secs_f64(interval_secs)
            .map_err(|e| AppError::validation(format!("Polling interval {}: {}", interval_secs, e)))?;
        let duration = Duration::try_from_secs_f64(duration_secs)
            .map_err(|e| AppError::validation(format!("Monitor duration {}: {}", duration_secs, e)))?;
        if interval.is_zero() {
            return Err(AppError::validation("Polling interval is below one nanosecond"));
        }

        Ok(Self { interval, duration, layout })
    }
}

/// Outcome of one monitor run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorReport {
    pub samples: usize,
    pub elapsed: Duration,
}

/// Polling loop over a single probe
pub struct Monitor<P: Probe> {
    probe: P,
    config: MonitorConfig,
}

impl<P: Probe> Monitor<P> {
    pub fn new(probe: P, config: MonitorConfig) -> Self {
        Self { probe, config }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Sample until the duration is reached, writing each sample to `sink`
    pub async fn run<W: Write>(&self, sink: &mut W) -> Result<MonitorReport> {
        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut samples = 0;
        loop {
            ticker.tick().await;
            if start.elapsed() >= self.config.duration {
                break;
            }

            let output = self.probe.sample().await;
            let record = format_sample(&timestamp(Utc::now()), &output, self.config.layout);
            sink.write_all(record.as_bytes())?;
            sink.flush()?;
            samples += 1;
        }

        Ok(MonitorReport {
            samples,
            elapsed: start.elapsed(),
        })
    }

    /// Append samples to `path`, creating it if needed
    pub async fn run_to_file(&self, path: &Path) -> Result<MonitorReport> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening monitor log {}", path.display()))?;
        self.run(&mut file).await
    }
}

/// Wall-clock timestamp as `seconds.nanoseconds`
pub fn timestamp(now: DateTime<Utc>) -> String {
    // leap seconds report nanos >= 1e9
    let nanos = now.timestamp_subsec_nanos().min(999_999_999);
    format!("{}.{:09}", now.timestamp(), nanos)
}

/// Render one sample record, always newline-terminated
pub fn format_sample(timestamp: &str, output: &str, layout: SampleLayout) -> String {
    match layout {
        SampleLayout::Flat => {
            let body = output.split_whitespace().collect::<Vec<_>>().join(" ");
            if body.is_empty() {
                format!("{}\n", timestamp)
            } else {
                format!("{} {}\n", timestamp, body)
            }
        }
        SampleLayout::Block => {
            let mut record = format!("{}\n{}", timestamp, output);
            if !record.ends_with('\n') {
                record.push('\n');
            }
            record
        }
    }
}
