//! RLC buffer occupancy from OpenAirInterface gNB MAC logs
//!
//! Two kinds of lines matter:
//! `UE RNTI c566 CU-UE-ID 1 in-sync ...` maps a hex RNTI to a CU-UE-ID, and
//! `[MAC] [gNB 0][ 100.123][100.123] DTCH4->DLSCH, RLC status for UE 50534[, slice 2]: 1024 bytes in buffer`
//! carries one buffer sample for a decimal RNTI.

use super::{open_existing, open_required, write_csv};
use crate::error::{ErrorContext, Result};
use crate::models::flows::{gnb_log_file, RunRange};
use crate::stats::mean;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

pub const UE_HEADER: [&str; 6] = ["ue", "rnti", "slice", "samples", "mean_bytes", "mean_bytes_after_warmup"];

/// Reported for RNTIs that never appear in an in-sync line
pub const UNKNOWN_UE: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSample {
    /// Seconds since the first buffer line of the log
    pub rel_time: f64,
    pub bytes: u64,
}

/// Series key: decimal RNTI and, in sliced logs, the slice id
pub type SeriesKey = (u32, Option<u32>);

/// One parsed gNB log
#[derive(Debug, Clone, Default)]
pub struct GnbLog {
    pub rnti_to_ue: BTreeMap<u32, String>,
    pub series: BTreeMap<SeriesKey, Vec<BufferSample>>,
}

impl GnbLog {
    pub fn ue_id(&self, rnti: u32) -> &str {
        self.rnti_to_ue.get(&rnti).map(String::as_str).unwrap_or(UNKNOWN_UE)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

pub struct GnbLogParser {
    rnti_map: Regex,
    buffer: Regex,
    sliced: bool,
}

impl GnbLogParser {
    pub fn new(sliced: bool) -> Result<Self> {
        let status = if sliced {
            r"RLC status for UE\s+(\d+),\s*slice\s+(\d+):\s+(\d+)\s+bytes in buffer"
        } else {
            r"RLC status for UE\s+(\d+):\s+(\d+)\s+bytes in buffer"
        };
        Ok(Self {
            rnti_map: Regex::new(r"UE\s+RNTI\s+([0-9a-fA-F]+)\s+CU-UE-ID\s+(\d+)\s+in-sync")?,
            buffer: Regex::new(&format!(
                r"\[MAC\]\s+\[gNB\s+\d+\]\[\s*\d+\.\d+\]\[(\d+\.\d+)\]\s+DTCH\d*->DLSCH,\s+{}",
                status
            ))?,
            sliced,
        })
    }

    pub fn parse<R: BufRead>(&self, reader: R) -> Result<GnbLog> {
        let mut log = GnbLog::default();
        let mut first: Option<f64> = None;

        for line in reader.split(b'\n') {
            let line = line?;
            let line = String::from_utf8_lossy(&line);

            if let Some(caps) = self.rnti_map.captures(&line) {
                if let Ok(rnti) = u32::from_str_radix(&caps[1], 16) {
                    log.rnti_to_ue.insert(rnti, caps[2].to_string());
                }
                continue;
            }

            let Some(caps) = self.buffer.captures(&line) else {
                continue;
            };
            let (slice, bytes) = if self.sliced { (caps.get(3), &caps[4]) } else { (None, &caps[3]) };
            let (Ok(timestamp), Ok(rnti), Ok(bytes)) = (caps[1].parse::<f64>(), caps[2].parse::<u32>(), bytes.parse::<u64>())
            else {
                continue;
            };
            let slice = slice.and_then(|s| s.as_str().parse::<u32>().ok());

            let t0 = *first.get_or_insert(timestamp);
            log.series.entry((rnti, slice)).or_default().push(BufferSample {
                rel_time: timestamp - t0,
                bytes,
            });
        }

        Ok(log)
    }
}

/// How the warm-up boundary itself is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupBoundary {
    /// Keep samples strictly after the warm-up
    Exclusive,
    /// Keep samples at or after the warm-up
    Inclusive,
}

impl WarmupBoundary {
    fn keeps(self, rel_time: f64, warmup_secs: f64) -> bool {
        match self {
            Self::Exclusive => rel_time > warmup_secs,
            Self::Inclusive => rel_time >= warmup_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UeBufferRow {
    pub ue: String,
    /// Empty when rows are aggregated by CU-UE-ID across runs
    pub rnti: Option<u32>,
    pub slice: Option<u32>,
    pub samples: usize,
    pub mean_bytes: f64,
    /// 0 when no sample survives the warm-up
    pub mean_bytes_after_warmup: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceBufferRow {
    pub slice: u32,
    pub mean_bytes: f64,
    pub mean_bytes_after_warmup: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RlcReport {
    pub ues: Vec<UeBufferRow>,
    pub slices: Vec<SliceBufferRow>,
    pub warnings: Vec<String>,
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        mean(values)
    }
}

/// Buffer samples of one row, with and without warm-up
#[derive(Default)]
struct Occupancy {
    all: Vec<f64>,
    after_warmup: Vec<f64>,
}

impl Occupancy {
    fn extend(&mut self, samples: &[BufferSample], warmup_secs: f64, boundary: WarmupBoundary) {
        for s in samples {
            self.all.push(s.bytes as f64);
            if boundary.keeps(s.rel_time, warmup_secs) {
                self.after_warmup.push(s.bytes as f64);
            }
        }
    }
}

impl RlcReport {
    /// Rows per (RNTI, slice) of a single log
    pub fn from_log(log: &GnbLog, warmup_secs: f64) -> Self {
        let mut report = Self::default();
        let mut slices: BTreeMap<u32, Occupancy> = BTreeMap::new();

        for (&(rnti, slice), samples) in &log.series {
            let mut occupancy = Occupancy::default();
            occupancy.extend(samples, warmup_secs, WarmupBoundary::Exclusive);
            if let Some(slice) = slice {
                slices.entry(slice).or_default().extend(samples, warmup_secs, WarmupBoundary::Exclusive);
            }
            report.ues.push(UeBufferRow {
                ue: log.ue_id(rnti).to_string(),
                rnti: Some(rnti),
                slice,
                samples: occupancy.all.len(),
                mean_bytes: mean_or_zero(&occupancy.all),
                mean_bytes_after_warmup: mean_or_zero(&occupancy.after_warmup),
            });
        }

        report.slices = slice_rows(slices);
        report
    }

    /// Row with the smallest overall mean and the mean of the remaining rows
    pub fn lowest_ue(&self) -> Option<(&UeBufferRow, f64)> {
        let lowest = self
            .ues
            .iter()
            .min_by(|a, b| a.mean_bytes.total_cmp(&b.mean_bytes))?;
        let others: Vec<f64> = self
            .ues
            .iter()
            .filter(|row| !std::ptr::eq(*row, lowest))
            .map(|row| row.mean_bytes)
            .collect();
        Some((lowest, mean_or_zero(&others)))
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_csv(path, &UE_HEADER, &self.ues)
    }
}

fn slice_rows(slices: BTreeMap<u32, Occupancy>) -> Vec<SliceBufferRow> {
    slices
        .into_iter()
        .map(|(slice, occupancy)| SliceBufferRow {
            slice,
            mean_bytes: mean_or_zero(&occupancy.all),
            mean_bytes_after_warmup: mean_or_zero(&occupancy.after_warmup),
        })
        .collect()
}

/// Order CU-UE-IDs numerically, `UNKNOWN` last
fn ue_order(ue: &str) -> (u64, String) {
    (ue.parse::<u64>().unwrap_or(u64::MAX), ue.to_string())
}

/// Parse `gnb_log_{idx}.log` from `dir`
pub fn parse_run(dir: &Path, idx: u32, sliced: bool) -> Result<GnbLog> {
    let path = dir.join(gnb_log_file(idx));
    let reader = open_required(&path)?;
    GnbLogParser::new(sliced)?
        .parse(reader)
        .with_context(|| format!("reading {}", path.display()))
}

/// Pool buffer samples by CU-UE-ID (and slice) over `gnb_log_{i}.log` for every run
pub fn aggregate_runs(dir: &Path, range: RunRange, sliced: bool, warmup_secs: f64) -> Result<RlcReport> {
    let parser = GnbLogParser::new(sliced)?;
    // sliced range reports drop the boundary sample, unsliced ones keep it
    let boundary = if sliced { WarmupBoundary::Exclusive } else { WarmupBoundary::Inclusive };
    let mut report = RlcReport::default();
    let mut ues: BTreeMap<((u64, String), Option<u32>), Occupancy> = BTreeMap::new();
    let mut slices: BTreeMap<u32, Occupancy> = BTreeMap::new();

    for idx in range.iter() {
        let file = gnb_log_file(idx);
        let Some(reader) = open_existing(&dir.join(&file))? else {
            report.warnings.push(format!("File not found: {}", file));
            continue;
        };
        let log = parser.parse(reader)?;
        if log.is_empty() {
            report.warnings.push(format!("No valid data found in {}", file));
            continue;
        }

        for (&(rnti, slice), samples) in &log.series {
            ues.entry((ue_order(log.ue_id(rnti)), slice))
                .or_default()
                .extend(samples, warmup_secs, boundary);
            if let Some(slice) = slice {
                slices
                    .entry(slice)
                    .or_default()
                    .extend(samples, warmup_secs, boundary);
            }
        }
    }

    report.ues = ues
        .into_iter()
        .map(|(((_, ue), slice), occupancy)| UeBufferRow {
            ue,
            rnti: None,
            slice,
            samples: occupancy.all.len(),
            mean_bytes: mean_or_zero(&occupancy.all),
            mean_bytes_after_warmup: mean_or_zero(&occupancy.after_warmup),
        })
        .collect();
    report.slices = slice_rows(slices);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_line(t: f64, rnti: u32, slice: Option<u32>, bytes: u64) -> String {
        let slice = slice.map(|s| format!(", slice {}", s)).unwrap_or_default();
        format!(
            "[MAC]   [gNB 0][ {:.3}][{:.3}] DTCH4->DLSCH, RLC status for UE {}{}: {} bytes in buffer\n",
            t, t, rnti, slice, bytes
        )
    }

    fn unsliced_log() -> String {
        let mut log = String::new();
        log.push_str("[NR_MAC]   Frame.Slot 128.0\nUE RNTI c566 CU-UE-ID 1 in-sync PH 52 dB PCMAX 20 dBm\n");
        log.push_str("UE RNTI 1a2b CU-UE-ID 2 in-sync PH 40 dB PCMAX 20 dBm\n");
        log.push_str(&buffer_line(100.0, 50534, None, 1000));
        log.push_str(&buffer_line(130.0, 6699, None, 200));
        log.push_str(&buffer_line(160.0, 50534, None, 3000));
        log.push_str(&buffer_line(161.0, 50534, None, 5000));
        log.push_str(&buffer_line(170.0, 4242, None, 10));
        log
    }

    #[test]
    fn test_parse_maps_hex_rnti() {
        let log = GnbLogParser::new(false).unwrap().parse(unsliced_log().as_bytes()).unwrap();
        assert_eq!(log.ue_id(50534), "1");
        assert_eq!(log.ue_id(0x1a2b), "2");
        assert_eq!(log.ue_id(4242), UNKNOWN_UE);

        let series = &log.series[&(50534, None)];
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].rel_time, 0.0);
        assert_eq!(series[1].rel_time, 60.0);
    }

    #[test]
    fn test_single_run_warmup_is_strict() {
        let log = GnbLogParser::new(false).unwrap().parse(unsliced_log().as_bytes()).unwrap();
        let report = RlcReport::from_log(&log, 60.0);

        let ue1 = report.ues.iter().find(|r| r.rnti == Some(50534)).unwrap();
        assert_eq!(ue1.ue, "1");
        assert_eq!(ue1.mean_bytes, 3000.0);
        // rel_time 60.0 itself is still warm-up
        assert_eq!(ue1.mean_bytes_after_warmup, 5000.0);

        let ue2 = report.ues.iter().find(|r| r.rnti == Some(6699)).unwrap();
        assert_eq!(ue2.mean_bytes_after_warmup, 0.0);
        assert!(report.slices.is_empty());
    }

    #[test]
    fn test_lowest_ue() {
        let log = GnbLogParser::new(false).unwrap().parse(unsliced_log().as_bytes()).unwrap();
        let report = RlcReport::from_log(&log, 60.0);
        let (lowest, others) = report.lowest_ue().unwrap();
        assert_eq!(lowest.ue, UNKNOWN_UE);
        assert_eq!(others, 1600.0);
        assert!(RlcReport::default().lowest_ue().is_none());
    }

    #[test]
    fn test_unsliced_parser_ignores_sliced_lines() {
        let line = buffer_line(1.0, 50534, Some(2), 77);
        assert!(GnbLogParser::new(false).unwrap().parse(line.as_bytes()).unwrap().is_empty());
        let log = GnbLogParser::new(true).unwrap().parse(line.as_bytes()).unwrap();
        assert_eq!(log.series[&(50534, Some(2))][0].bytes, 77);
    }

    #[test]
    fn test_sliced_report_per_slice() {
        let mut text = String::from("UE RNTI c566 CU-UE-ID 1 in-sync\n");
        text.push_str(&buffer_line(0.0, 50534, Some(1), 100));
        text.push_str(&buffer_line(0.0, 50534, Some(2), 300));
        text.push_str(&buffer_line(61.0, 7, Some(2), 500));

        let log = GnbLogParser::new(true).unwrap().parse(text.as_bytes()).unwrap();
        let report = RlcReport::from_log(&log, 60.0);
        assert_eq!(report.ues.len(), 3);
        assert_eq!(
            report.slices,
            vec![
                SliceBufferRow { slice: 1, mean_bytes: 100.0, mean_bytes_after_warmup: 0.0 },
                SliceBufferRow { slice: 2, mean_bytes: 400.0, mean_bytes_after_warmup: 500.0 },
            ]
        );
    }

    #[test]
    fn test_aggregate_runs_by_cu_ue_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gnb_log_1.log"), unsliced_log()).unwrap();

        // same UE, different RNTI in the second run
        let mut second = String::from("UE RNTI 00ff CU-UE-ID 1 in-sync\n");
        second.push_str(&buffer_line(10.0, 255, None, 1000));
        second.push_str(&buffer_line(70.0, 255, None, 2000));
        std::fs::write(dir.path().join("gnb_log_2.log"), second).unwrap();

        let report = aggregate_runs(dir.path(), RunRange::new(1, 3).unwrap(), false, 60.0).unwrap();
        assert_eq!(report.warnings, vec!["File not found: gnb_log_3.log".to_string()]);

        let ues: Vec<&str> = report.ues.iter().map(|r| r.ue.as_str()).collect();
        assert_eq!(ues, vec!["1", "2", UNKNOWN_UE]);

        let ue1 = &report.ues[0];
        assert_eq!(ue1.rnti, None);
        assert_eq!(ue1.samples, 5);
        assert_eq!(ue1.mean_bytes, 2400.0);
        // range aggregation keeps the 60 s boundary sample
        assert_eq!(ue1.mean_bytes_after_warmup, 10_000.0 / 3.0);
    }

    #[test]
    fn test_sliced_range_drops_boundary_sample() {
        let dir = tempfile::tempdir().unwrap();
        let mut text = String::from("UE RNTI c566 CU-UE-ID 1 in-sync\n");
        text.push_str(&buffer_line(0.0, 50534, Some(1), 100));
        text.push_str(&buffer_line(60.0, 50534, Some(1), 900));
        std::fs::write(dir.path().join("gnb_log_1.log"), &text).unwrap();

        let range = RunRange::new(1, 1).unwrap();
        let sliced = aggregate_runs(dir.path(), range, true, 60.0).unwrap();
        assert_eq!(sliced.ues[0].mean_bytes, 500.0);
        assert_eq!(sliced.ues[0].mean_bytes_after_warmup, 0.0);
        assert_eq!(sliced.slices[0].mean_bytes_after_warmup, 0.0);

        // the same samples without slice ids keep the 60 s line
        let unsliced_text = text.replace(", slice 1", "");
        std::fs::write(dir.path().join("gnb_log_1.log"), unsliced_text).unwrap();
        let unsliced = aggregate_runs(dir.path(), range, false, 60.0).unwrap();
        assert_eq!(unsliced.ues[0].mean_bytes_after_warmup, 900.0);
    }

    #[test]
    fn test_parse_run_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_run(dir.path(), 9, false).is_err());
    }

    #[test]
    fn test_csv_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rlc.csv");
        let log = GnbLogParser::new(false)
            .unwrap()
            .parse(buffer_line(5.0, 9, None, 12).as_bytes())
            .unwrap();
        RlcReport::from_log(&log, 60.0).write_csv(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "ue,rnti,slice,samples,mean_bytes,mean_bytes_after_warmup\nUNKNOWN,9,,1,12.0,0.0\n"
        );
    }
}
