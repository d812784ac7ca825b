//! DualPI2 and FIFO/TBF qdisc monitor logs
//!
//! Input lines are flat-layout monitor samples:
//! `<ts> qdisc dualpi2 ... delay_c 123us delay_l 45us ...` or
//! `<ts> qdisc tbf ... (dropped 3, overlimits ...) backlog 15140b 10p ...`.
//! Lines without a float first token or without the expected fields are skipped.

use super::{open_existing, write_csv};
use crate::error::{AppError, Result};
use crate::models::flows::{monitor_file, RunRange};
use crate::stats::Summary;
use regex::Regex;
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;

pub const DUALQ_HEADER: [&str; 3] = ["time_s", "classic_delay_ms", "l4s_delay_ms"];
pub const FIFO_HEADER: [&str; 4] = ["time_s", "backlog_pkts", "drops", "delay_s"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualqSample {
    pub time: f64,
    pub delay_c_us: f64,
    pub delay_l_us: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FifoSample {
    pub time: f64,
    /// Cumulative drop counter
    pub dropped: u64,
    pub backlog_bytes: u64,
    pub backlog_packets: u64,
}

pub struct QdiscParser {
    delay: Regex,
    dropped: Regex,
    backlog: Regex,
}

impl QdiscParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            delay: Regex::new(r"delay_c\s+(\d+)us\s+delay_l\s+(\d+)us")?,
            dropped: Regex::new(r"\(dropped\s+(\d+),")?,
            backlog: Regex::new(r"backlog\s+(\d+)b\s+(\d+)p")?,
        })
    }

    /// DualPI2 queue delays, sorted by time
    pub fn parse_dualq<R: BufRead>(&self, reader: R) -> Result<Vec<DualqSample>> {
        let mut samples = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let Some(time) = leading_timestamp(&line) else {
                continue;
            };
            let Some(caps) = self.delay.captures(&line) else {
                continue;
            };
            let (Ok(delay_c_us), Ok(delay_l_us)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) else {
                continue;
            };
            samples.push(DualqSample { time, delay_c_us, delay_l_us });
        }
        samples.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(samples)
    }

    /// FIFO drop counter and backlog, sorted by time
    pub fn parse_fifo<R: BufRead>(&self, reader: R) -> Result<Vec<FifoSample>> {
        let (_, mut samples) = self.scan_fifo(reader)?;
        samples.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(samples)
    }

    /// FIFO samples in file order, plus the timestamp of the first timestamped line
    ///
    /// The first timestamp counts even when that line carries no counters.
    fn scan_fifo<R: BufRead>(&self, reader: R) -> Result<(Option<f64>, Vec<FifoSample>)> {
        let mut begin = None;
        let mut samples = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let Some(time) = leading_timestamp(&line) else {
                continue;
            };
            begin.get_or_insert(time);
            let Some(dropped) = self.dropped.captures(&line).and_then(|c| c[1].parse::<u64>().ok()) else {
                continue;
            };
            let Some(caps) = self.backlog.captures(&line) else {
                continue;
            };
            let (Ok(backlog_bytes), Ok(backlog_packets)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) else {
                continue;
            };
            samples.push(FifoSample {
                time,
                dropped,
                backlog_bytes,
                backlog_packets,
            });
        }
        Ok((begin, samples))
    }
}

/// First whitespace-separated token as a finite float
fn leading_timestamp(line: &str) -> Option<f64> {
    let token = line.split_whitespace().next()?;
    if !token.contains('.') {
        return None;
    }
    token.parse::<f64>().ok().filter(|t| t.is_finite())
}

fn check_link_rate(link_mbps: f64) -> Result<f64> {
    if link_mbps.is_finite() && link_mbps > 0.0 {
        Ok(link_mbps * 1e6)
    } else {
        Err(AppError::validation(format!(
            "Link rate must be a positive number of Mbit/s, got {}",
            link_mbps
        )))
    }
}

/// Time it takes to drain `backlog_bytes` at the link rate
pub fn inferred_delay_secs(backlog_bytes: u64, link_bps: f64) -> f64 {
    backlog_bytes as f64 * 8.0 / link_bps
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DualqPoint {
    pub time_s: f64,
    pub classic_delay_ms: f64,
    pub l4s_delay_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualqSummary {
    pub classic_ms: Summary,
    pub l4s_ms: Summary,
}

/// DualPI2 delays on a time axis starting at zero
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DualqSeries {
    pub points: Vec<DualqPoint>,
}

impl DualqSeries {
    pub fn from_samples(samples: &[DualqSample]) -> Self {
        let t0 = samples.first().map(|s| s.time).unwrap_or_default();
        let points = samples
            .iter()
            .map(|s| DualqPoint {
                time_s: s.time - t0,
                classic_delay_ms: s.delay_c_us / 1000.0,
                l4s_delay_ms: s.delay_l_us / 1000.0,
            })
            .collect();
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn summary(&self) -> DualqSummary {
        let classic: Vec<f64> = self.points.iter().map(|p| p.classic_delay_ms).collect();
        let l4s: Vec<f64> = self.points.iter().map(|p| p.l4s_delay_ms).collect();
        DualqSummary {
            classic_ms: Summary::of(&classic),
            l4s_ms: Summary::of(&l4s),
        }
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_csv(path, &DUALQ_HEADER, &self.points)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FifoPoint {
    pub time_s: f64,
    pub backlog_pkts: u64,
    pub drops: u64,
    pub delay_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FifoSummary {
    pub backlog_pkts: Summary,
    pub drops: Summary,
    pub delay_s: Summary,
}

/// FIFO backlog, drops per interval and inferred queueing delay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FifoSeries {
    pub points: Vec<FifoPoint>,
}

impl FifoSeries {
    pub fn from_samples(samples: &[FifoSample], link_mbps: f64) -> Result<Self> {
        let link_bps = check_link_rate(link_mbps)?;
        let t0 = samples.first().map(|s| s.time).unwrap_or_default();

        let mut previous: Option<u64> = None;
        let points = samples
            .iter()
            .map(|s| {
                // counter resets clamp to zero
                let drops = previous.map_or(0, |p| s.dropped.saturating_sub(p));
                previous = Some(s.dropped);
                FifoPoint {
                    time_s: s.time - t0,
                    backlog_pkts: s.backlog_packets,
                    drops,
                    delay_s: inferred_delay_secs(s.backlog_bytes, link_bps),
                }
            })
            .collect();
        Ok(Self { points })
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn summary(&self) -> FifoSummary {
        let backlog: Vec<f64> = self.points.iter().map(|p| p.backlog_pkts as f64).collect();
        let drops: Vec<f64> = self.points.iter().map(|p| p.drops as f64).collect();
        let delay: Vec<f64> = self.points.iter().map(|p| p.delay_s).collect();
        FifoSummary {
            backlog_pkts: Summary::of(&backlog),
            drops: Summary::of(&drops),
            delay_s: Summary::of(&delay),
        }
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_csv(path, &FIFO_HEADER, &self.points)
    }
}

/// Options of [`fifo_delay_over_runs`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FifoRunsOptions {
    pub link_mbps: f64,
    /// Samples with a larger inferred delay are dropped as outliers
    pub cap_secs: f64,
    /// Samples this close to the first one of their file are skipped
    pub warmup_secs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FifoRunsReport {
    pub delay_s: Summary,
    pub files_read: usize,
    pub warnings: Vec<String>,
}

/// Inferred FIFO delay pooled over `fifo_monitor_{i}.txt` for every run in `range`
pub fn fifo_delay_over_runs(
    dir: &Path,
    range: RunRange,
    options: FifoRunsOptions,
    parser: &QdiscParser,
) -> Result<FifoRunsReport> {
    let link_bps = check_link_rate(options.link_mbps)?;
    let mut report = FifoRunsReport::default();
    let mut delays = Vec::new();

    for idx in range.iter() {
        let file = monitor_file("fifo", idx);
        let Some(reader) = open_existing(&dir.join(&file))? else {
            report.warnings.push(format!("File not found: {}", file));
            continue;
        };
        report.files_read += 1;

        let (begin, samples) = parser.scan_fifo(reader)?;
        let steady: Vec<&FifoSample> = match begin {
            Some(begin) => samples
                .iter()
                .filter(|s| s.time - begin >= options.warmup_secs)
                .collect(),
            None => Vec::new(),
        };
        if steady.is_empty() {
            report.warnings.push(format!("No valid data in {}", file));
            continue;
        }

        delays.extend(
            steady
                .iter()
                .map(|s| inferred_delay_secs(s.backlog_bytes, link_bps))
                .filter(|d| *d <= options.cap_secs),
        );
    }

    report.delay_s = Summary::of(&delays);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DUALQ_LOG: &str = "\
1735917316.312567164 qdisc dualpi2 8001: root refcnt 2 limit 10000p target 15ms tupdate 16ms alpha 0.156250 beta 3.195312 Sent 9128 bytes 12 pkt (dropped 0, overlimits 0 requeues 0) backlog 0b 0p requeues 0 prob 0 delay_c 2000us delay_l 500us pkts_in_c 4 pkts_in_l 8
garbage line delay_c 1us delay_l 1us
1735917316.212567164 qdisc dualpi2 8001: root refcnt 2 limit 10000p delay_c 1000us delay_l 0us pkts_in_c 0
1735917316.412567164 qdisc dualpi2 8001: root refcnt 2 limit 10000p
";

    const FIFO_LOG: &str = "\
1735868880.000000000 qdisc tbf 8004: root refcnt 2 rate 50Mbit burst 1537b lat 50ms Sent 1268961 bytes 916 pkt (dropped 10, overlimits 347 requeues 0) backlog 0b 0p requeues 0
1735868880.100000000 qdisc tbf 8004: root refcnt 2 rate 50Mbit burst 1537b lat 50ms Sent 1300000 bytes 940 pkt (dropped 13, overlimits 360 requeues 0) backlog 62500b 42p requeues 0
1735868880.200000000 qdisc tbf 8004: root refcnt 2 rate 50Mbit burst 1537b lat 50ms Sent 1400000 bytes 1010 pkt (dropped 12, overlimits 380 requeues 0) backlog 125000b 84p requeues 0
";

    fn parser() -> QdiscParser {
        QdiscParser::new().unwrap()
    }

    #[test]
    fn test_parse_dualq_sorted_and_filtered() {
        let samples = parser().parse_dualq(DUALQ_LOG.as_bytes()).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples[0].time < samples[1].time);
        assert_eq!(samples[0].delay_c_us, 1000.0);
        assert_eq!(samples[1].delay_l_us, 500.0);
    }

    #[test]
    fn test_dualq_series_in_ms() {
        let samples = parser().parse_dualq(DUALQ_LOG.as_bytes()).unwrap();
        let series = DualqSeries::from_samples(&samples);
        assert_eq!(series.points[0].time_s, 0.0);
        assert!((series.points[1].time_s - 0.1).abs() < 1e-6);
        assert_eq!(series.points[0].classic_delay_ms, 1.0);
        assert_eq!(series.points[1].classic_delay_ms, 2.0);

        let summary = series.summary();
        assert_eq!(summary.classic_ms.mean, 1.5);
        assert_eq!(summary.classic_ms.std_dev, 0.5);
        assert_eq!(summary.l4s_ms.mean, 0.25);
        assert_eq!(summary.l4s_ms.count, 2);
    }

    #[test]
    fn test_fifo_drops_and_delay() {
        let samples = parser().parse_fifo(FIFO_LOG.as_bytes()).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].backlog_packets, 42);

        let series = FifoSeries::from_samples(&samples, 50.0).unwrap();
        let drops: Vec<u64> = series.points.iter().map(|p| p.drops).collect();
        assert_eq!(drops, vec![0, 3, 0]);

        // 62500 bytes at 50 Mbit/s
        assert!((series.points[1].delay_s - 0.01).abs() < 1e-12);
        assert!((series.points[2].delay_s - 0.02).abs() < 1e-12);

        let summary = series.summary();
        assert_eq!(summary.backlog_pkts.mean, 42.0);
        assert_eq!(summary.drops.mean, 1.0);
        assert!((summary.delay_s.mean - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_fifo_rejects_bad_link_rate() {
        assert!(FifoSeries::from_samples(&[], 0.0).is_err());
        assert!(FifoSeries::from_samples(&[], f64::NAN).is_err());
    }

    #[test]
    fn test_fifo_csv_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo.csv");
        let samples = parser().parse_fifo(FIFO_LOG.as_bytes()).unwrap();
        FifoSeries::from_samples(&samples[..1], 50.0).unwrap().write_csv(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "time_s,backlog_pkts,drops,delay_s\n0.0,0,0,0.0\n"
        );
    }

    fn fifo_line(time: f64, backlog_bytes: u64) -> String {
        format!(
            "{:.9} qdisc tbf 8004: root Sent 1 bytes 1 pkt (dropped 0, overlimits 0 requeues 0) backlog {}b 1p requeues 0\n",
            time, backlog_bytes
        )
    }

    #[test]
    fn test_delay_over_runs_applies_warmup_and_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = String::new();
        log.push_str(&fifo_line(100.0, 999_999)); // warm-up
        log.push_str(&fifo_line(160.0, 62_500)); // 10 ms
        log.push_str(&fifo_line(161.0, 1_000_000)); // 160 ms, above cap
        std::fs::write(dir.path().join("fifo_monitor_1.txt"), log).unwrap();
        std::fs::write(dir.path().join("fifo_monitor_2.txt"), fifo_line(5.0, 0) + &fifo_line(70.0, 187_500)).unwrap();

        let options = FifoRunsOptions {
            link_mbps: 50.0,
            cap_secs: 0.1,
            warmup_secs: 60.0,
        };
        let report = fifo_delay_over_runs(dir.path(), RunRange::new(1, 3).unwrap(), options, &parser()).unwrap();
        assert_eq!(report.files_read, 2);
        assert_eq!(report.warnings, vec!["File not found: fifo_monitor_3.txt".to_string()]);
        assert_eq!(report.delay_s.count, 2);
        assert!((report.delay_s.mean - 0.02).abs() < 1e-12);
        assert!((report.delay_s.std_dev - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_delay_over_runs_empty_range() {
        let dir = tempfile::tempdir().unwrap();
        let options = FifoRunsOptions {
            link_mbps: 50.0,
            cap_secs: 0.1,
            warmup_secs: 60.0,
        };
        let report = fifo_delay_over_runs(dir.path(), RunRange::new(4, 4).unwrap(), options, &parser()).unwrap();
        assert_eq!(report.delay_s, Summary::of(&[]));
    }

    #[test]
    fn test_delay_over_runs_warmup_starts_at_first_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        // the first line has no counters but still starts the warm-up clock
        let mut log = String::from("1000.000000000 qdisc tbf 8004: root refcnt 2 rate 50Mbit\n");
        log.push_str(&fifo_line(1030.0, 62_500));
        log.push_str(&fifo_line(1060.0, 125_000));
        std::fs::write(dir.path().join("fifo_monitor_1.txt"), log).unwrap();
        // every sample is inside the warm-up
        std::fs::write(dir.path().join("fifo_monitor_2.txt"), fifo_line(5.0, 0) + &fifo_line(20.0, 62_500)).unwrap();

        let options = FifoRunsOptions {
            link_mbps: 50.0,
            cap_secs: 0.1,
            warmup_secs: 60.0,
        };
        let report = fifo_delay_over_runs(dir.path(), RunRange::new(1, 2).unwrap(), options, &parser()).unwrap();
        assert_eq!(report.files_read, 2);
        assert_eq!(report.warnings, vec!["No valid data in fifo_monitor_2.txt".to_string()]);
        assert_eq!(report.delay_s.count, 1);
        assert!((report.delay_s.mean - 0.02).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_parsers_never_fail_on_text(input in "[ -~\n]{0,400}") {
            let parser = parser();
            prop_assert!(parser.parse_dualq(input.as_bytes()).is_ok());
            prop_assert!(parser.parse_fifo(input.as_bytes()).is_ok());
        }

        #[test]
        fn prop_instantaneous_drops_sum_to_increase(counters in proptest::collection::vec(0u64..1000, 1..50)) {
            let mut sorted = counters.clone();
            sorted.sort_unstable();
            let samples: Vec<FifoSample> = sorted
                .iter()
                .enumerate()
                .map(|(i, d)| FifoSample { time: i as f64, dropped: *d, backlog_bytes: 0, backlog_packets: 0 })
                .collect();
            let series = FifoSeries::from_samples(&samples, 50.0).unwrap();
            let total: u64 = series.points.iter().map(|p| p.drops).sum();
            prop_assert_eq!(total, sorted[sorted.len() - 1] - sorted[0]);
        }
    }
}
