//! Smoothed RTT extraction from `ss -tinp` monitor logs

use super::{open_existing, output_path, write_csv};
use crate::error::Result;
use crate::models::flows::{FlowLabel, RunRange};
use crate::stats::mean;
use regex::Regex;
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};

pub const SRTT_HEADER: [&str; 4] = ["idx", "file", "flow", "mean_srtt"];

/// Line-oriented SRTT parser
///
/// `ss -tinp` prints a socket line carrying `users:(("iperf3",pid=..,fd=N))`
/// followed by an indented line with the TCP info, including
/// `rtt:<srtt>/<rttvar>`. Only the line right after an fd line is inspected.
pub struct SrttParser {
    fd: Regex,
    srtt: Regex,
    excluded_fds: Vec<u32>,
}

impl SrttParser {
    pub fn new(excluded_fds: &[u32]) -> Result<Self> {
        Ok(Self {
            fd: Regex::new(r"fd=(\d+)")?,
            // word boundary keeps minrtt: out
            srtt: Regex::new(r"\brtt:(\d+\.\d+)")?,
            excluded_fds: excluded_fds.to_vec(),
        })
    }

    /// SRTT samples in ms per fd, in first-seen fd order
    pub fn parse<R: BufRead>(&self, reader: R) -> Result<Vec<(u32, Vec<f64>)>> {
        let mut samples: Vec<(u32, Vec<f64>)> = Vec::new();
        let mut pending: Option<u32> = None;

        for line in reader.split(b'\n') {
            let line = line?;
            let line = String::from_utf8_lossy(&line);

            if let Some(caps) = self.fd.captures(&line) {
                pending = caps[1].parse::<u32>().ok().filter(|fd| !self.excluded_fds.contains(fd));
                continue;
            }

            if let Some(fd) = pending.take() {
                if let Some(value) = self.srtt.captures(&line).and_then(|c| c[1].parse::<f64>().ok()) {
                    match samples.iter_mut().find(|(seen, _)| *seen == fd) {
                        Some((_, values)) => values.push(value),
                        None => samples.push((fd, vec![value])),
                    }
                }
            }
        }

        Ok(samples)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SrttRow {
    pub idx: u32,
    pub file: String,
    pub flow: String,
    pub mean_srtt: String,
}

impl SrttRow {
    fn new(idx: u32, file: String, flow: String, samples: &[f64]) -> Self {
        Self {
            idx,
            file,
            flow,
            mean_srtt: format!("{:.3}", mean(samples)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SrttSummary {
    pub rows: Vec<SrttRow>,
    pub files_read: usize,
}

impl SrttSummary {
    /// Write `{prefix}_srtt_results.csv`
    pub fn write(&self, dir: &Path, prefix: &str) -> Result<PathBuf> {
        let path = output_path(dir, prefix, "srtt_results.csv");
        write_csv(&path, &SRTT_HEADER, &self.rows)?;
        Ok(path)
    }
}

/// Mean SRTT per flow and file for `{idx}-ss-{label}.txt` across the range
///
/// Families spanning more than one label get an extra `ALL_<FAMILY>` row per
/// idx over every sample of that family.
pub fn summarize_srtt(
    dir: &Path,
    range: RunRange,
    labels: &[FlowLabel],
    parser: &SrttParser,
) -> Result<SrttSummary> {
    let mut summary = SrttSummary::default();

    let mut aggregated: Vec<&str> = Vec::new();
    for label in labels {
        let family = label.family();
        let members = labels.iter().filter(|l| l.family() == family).count();
        if members > 1 && !aggregated.contains(&family) {
            aggregated.push(family);
        }
    }

    for idx in range.iter() {
        let mut family_samples: Vec<Vec<f64>> = vec![Vec::new(); aggregated.len()];

        for label in labels {
            let file = label.ss_file(idx);
            let Some(reader) = open_existing(&dir.join(&file))? else {
                continue;
            };
            summary.files_read += 1;

            let per_flow = parser.parse(reader)?;
            for (fd, samples) in &per_flow {
                summary
                    .rows
                    .push(SrttRow::new(idx, file.clone(), fd.to_string(), samples));
            }

            let all: Vec<f64> = per_flow.iter().flat_map(|(_, s)| s).copied().collect();
            if !all.is_empty() {
                summary
                    .rows
                    .push(SrttRow::new(idx, file, "ALL_FLOWS".to_string(), &all));
            }

            if let Some(i) = aggregated.iter().position(|f| *f == label.family()) {
                family_samples[i].extend(all);
            }
        }

        for (family, samples) in aggregated.iter().zip(&family_samples) {
            if !samples.is_empty() {
                summary.rows.push(SrttRow::new(
                    idx,
                    format!("ALL_{}", family.to_uppercase()),
                    "ALL_FLOWS".to_string(),
                    samples,
                ));
            }
        }
    }

    Ok(summary)
}
