//! iperf3 JSON reports to per-flow and multi-UE throughput CSVs

use super::{open_existing, output_path, write_csv};
use crate::error::{ErrorContext, Result};
use crate::models::flows::{families, FlowLabel, RunRange};
use crate::stats::Summary;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};

pub const FLOW_HEADER: [&str; 4] = ["idx", "file", "socket", "mbps"];
pub const MULTI_UE_HEADER: [&str; 5] = ["type", "ue", "mean_mbps", "std_mbps", "count"];

/// Marker in the `socket` column for the file total
pub const ALL_FLOWS: &str = "ALL_FLOWS";

#[derive(Debug, Default, Deserialize)]
struct Report {
    #[serde(default)]
    end: End,
}

#[derive(Debug, Default, Deserialize)]
struct End {
    #[serde(default)]
    streams: Vec<Stream>,
}

#[derive(Debug, Default, Deserialize)]
struct Stream {
    #[serde(default)]
    sender: Sender,
}

#[derive(Debug, Default, Deserialize)]
struct Sender {
    #[serde(default)]
    bits_per_second: f64,
    #[serde(default)]
    socket: Option<i64>,
}

/// Sender-side throughput of one stream
#[derive(Debug, Clone, PartialEq)]
pub struct FlowThroughput {
    pub socket: Option<i64>,
    pub mbps: f64,
}

/// Streams of one iperf3 run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IperfRun {
    pub flows: Vec<FlowThroughput>,
    pub total_mbps: f64,
}

/// Parse the `-J` report of an iperf3 client
pub fn parse_iperf_report<R: Read>(reader: R) -> Result<IperfRun> {
    let report: Report = serde_json::from_reader(reader)?;
    let flows: Vec<FlowThroughput> = report
        .end
        .streams
        .into_iter()
        .map(|s| FlowThroughput {
            socket: s.sender.socket,
            mbps: s.sender.bits_per_second / 1e6,
        })
        .collect();
    let total_mbps = flows.iter().map(|f| f.mbps).sum();
    Ok(IperfRun { flows, total_mbps })
}

pub fn parse_iperf_json(path: &Path) -> Result<IperfRun> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_iperf_report(std::io::BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRow {
    pub idx: u32,
    pub file: String,
    pub socket: String,
    pub mbps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiUeRow {
    #[serde(rename = "type")]
    pub family: String,
    pub ue: String,
    pub mean_mbps: f64,
    pub std_mbps: f64,
    pub count: usize,
}

impl MultiUeRow {
    fn new(family: &str, ue: String, summary: Summary) -> Self {
        Self {
            family: family.to_string(),
            ue,
            mean_mbps: summary.mean,
            std_mbps: summary.std_dev,
            count: summary.count,
        }
    }
}

/// Throughput tables for a run range
#[derive(Debug, Clone, Default)]
pub struct IperfSummary {
    pub rows: Vec<FlowRow>,
    pub multi_ue: Vec<MultiUeRow>,
    pub warnings: Vec<String>,
    pub files_read: usize,
}

impl IperfSummary {
    /// Write `{prefix}_iperf_results.csv` and `{prefix}_iperf_results_multi_ue.csv`
    pub fn write(&self, dir: &Path, prefix: &str) -> Result<(PathBuf, PathBuf)> {
        let flows_path = output_path(dir, prefix, "iperf_results.csv");
        let multi_path = output_path(dir, prefix, "iperf_results_multi_ue.csv");
        write_csv(&flows_path, &FLOW_HEADER, &self.rows)?;
        write_csv(&multi_path, &MULTI_UE_HEADER, &self.multi_ue)?;
        Ok((flows_path, multi_path))
    }
}

/// Throughput of one family across runs
struct FamilyStats {
    family: String,
    // first-seen socket order
    per_socket: Vec<(Option<i64>, Vec<f64>)>,
    per_run_sum: Vec<f64>,
}

impl FamilyStats {
    fn record(&mut self, socket: Option<i64>, mbps: f64) {
        match self.per_socket.iter_mut().find(|(s, _)| *s == socket) {
            Some((_, values)) => values.push(mbps),
            None => self.per_socket.push((socket, vec![mbps])),
        }
    }
}

fn socket_column(socket: Option<i64>) -> String {
    socket.map(|s| s.to_string()).unwrap_or_default()
}

/// Collect `{idx}-iperf-{label}.json` for every idx in `range` and every label
pub fn summarize_iperf(dir: &Path, range: RunRange, labels: &[FlowLabel]) -> Result<IperfSummary> {
    let mut summary = IperfSummary::default();
    let mut stats: Vec<FamilyStats> = families(labels)
        .into_iter()
        .map(|family| FamilyStats {
            family,
            per_socket: Vec::new(),
            per_run_sum: Vec::new(),
        })
        .collect();

    for idx in range.iter() {
        let mut run_sums = vec![0.0; stats.len()];

        for label in labels {
            let file = label.iperf_file(idx);
            let path = dir.join(&file);
            let Some(reader) = open_existing(&path)? else {
                continue;
            };
            summary.files_read += 1;

            let run = match parse_iperf_report(reader) {
                Ok(run) => run,
                Err(e) => {
                    summary.warnings.push(format!("Could not parse {}: {}", file, e));
                    IperfRun::default()
                }
            };

            let family = stats.iter().position(|f| f.family == label.family());
            for flow in &run.flows {
                summary.rows.push(FlowRow {
                    idx,
                    file: file.clone(),
                    socket: socket_column(flow.socket),
                    mbps: flow.mbps,
                });
                if let Some(i) = family {
                    stats[i].record(flow.socket, flow.mbps);
                    run_sums[i] += flow.mbps;
                }
            }
            summary.rows.push(FlowRow {
                idx,
                file,
                socket: ALL_FLOWS.to_string(),
                mbps: run.total_mbps,
            });
        }

        for (family, sum) in stats.iter_mut().zip(run_sums) {
            family.per_run_sum.push(sum);
        }
    }

    for family in &stats {
        for (socket, values) in &family.per_socket {
            summary
                .multi_ue
                .push(MultiUeRow::new(&family.family, socket_column(*socket), Summary::of(values)));
        }
        summary
            .multi_ue
            .push(MultiUeRow::new(&family.family, "ALL".to_string(), Summary::of(&family.per_run_sum)));
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::flows::parse_labels;

    fn report(streams: &[(i64, f64)]) -> String {
        let streams: Vec<serde_json::Value> = streams
            .iter()
            .map(|(socket, bps)| {
                serde_json::json!({
                    "sender": { "socket": socket, "bits_per_second": bps, "bytes": 1000 },
                    "receiver": { "socket": socket, "bits_per_second": bps * 0.9 }
                })
            })
            .collect();
        serde_json::json!({ "start": {}, "intervals": [], "end": { "streams": streams } }).to_string()
    }

    fn labels() -> Vec<FlowLabel> {
        parse_labels(&["cubic".into(), "cubic-2".into(), "prague".into()]).unwrap()
    }

    #[test]
    fn test_sender_throughput_in_mbps() {
        let run = parse_iperf_report(report(&[(5, 1_403_980.186_928_651_8), (7, 2_000_000.0)]).as_bytes()).unwrap();
        assert_eq!(run.flows.len(), 2);
        assert_eq!(run.flows[0].socket, Some(5));
        assert!((run.flows[0].mbps - 1.403_980_186_928_651_8).abs() < 1e-12);
        assert!((run.total_mbps - 3.403_980_186_928_651_8).abs() < 1e-12);
    }

    #[test]
    fn test_missing_fields_default() {
        let run = parse_iperf_report(r#"{"end": {"streams": [{"sender": {}}, {}]}}"#.as_bytes()).unwrap();
        assert_eq!(
            run.flows,
            vec![
                FlowThroughput { socket: None, mbps: 0.0 },
                FlowThroughput { socket: None, mbps: 0.0 },
            ]
        );
        assert_eq!(parse_iperf_report("{}".as_bytes()).unwrap(), IperfRun::default());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(parse_iperf_report("iperf3: error - unable to connect".as_bytes()).is_err());
    }

    #[test]
    fn test_summary_rows_and_multi_ue() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1-iperf-cubic.json"), report(&[(5, 10e6)])).unwrap();
        std::fs::write(dir.path().join("1-iperf-cubic-2.json"), report(&[(5, 20e6)])).unwrap();
        std::fs::write(dir.path().join("1-iperf-prague.json"), report(&[(5, 30e6), (7, 10e6)])).unwrap();
        std::fs::write(dir.path().join("2-iperf-cubic.json"), report(&[(5, 14e6)])).unwrap();

        let summary = summarize_iperf(dir.path(), RunRange::new(1, 2).unwrap(), &labels()).unwrap();
        assert_eq!(summary.files_read, 4);
        assert!(summary.warnings.is_empty());

        let files: Vec<(&str, &str)> = summary.rows.iter().map(|r| (r.file.as_str(), r.socket.as_str())).collect();
        assert_eq!(
            files,
            vec![
                ("1-iperf-cubic.json", "5"),
                ("1-iperf-cubic.json", "ALL_FLOWS"),
                ("1-iperf-cubic-2.json", "5"),
                ("1-iperf-cubic-2.json", "ALL_FLOWS"),
                ("1-iperf-prague.json", "5"),
                ("1-iperf-prague.json", "7"),
                ("1-iperf-prague.json", "ALL_FLOWS"),
                ("2-iperf-cubic.json", "5"),
                ("2-iperf-cubic.json", "ALL_FLOWS"),
            ]
        );
        assert_eq!(summary.rows[6].mbps, 40.0);

        let multi: Vec<(&str, &str, usize)> =
            summary.multi_ue.iter().map(|r| (r.family.as_str(), r.ue.as_str(), r.count)).collect();
        assert_eq!(
            multi,
            vec![("cubic", "5", 3), ("cubic", "ALL", 2), ("prague", "5", 1), ("prague", "7", 1), ("prague", "ALL", 2)]
        );

        // cubic sums per run: 30 then 14
        let cubic_all = &summary.multi_ue[1];
        assert!((cubic_all.mean_mbps - 22.0).abs() < 1e-9);
        assert!((cubic_all.std_mbps - 8.0).abs() < 1e-9);

        // run 2 has no prague file and counts as 0
        let prague_all = &summary.multi_ue[4];
        assert!((prague_all.mean_mbps - 20.0).abs() < 1e-9);
        assert!((prague_all.std_mbps - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_unparseable_file_warns_and_counts_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("3-iperf-cubic.json"), "not json").unwrap();

        let summary = summarize_iperf(dir.path(), RunRange::new(3, 3).unwrap(), &labels()).unwrap();
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("3-iperf-cubic.json"));
        assert_eq!(
            summary.rows,
            vec![FlowRow {
                idx: 3,
                file: "3-iperf-cubic.json".to_string(),
                socket: ALL_FLOWS.to_string(),
                mbps: 0.0,
            }]
        );
    }

    #[test]
    fn test_write_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1-iperf-prague.json"), report(&[(5, 1.5e6)])).unwrap();
        let summary = summarize_iperf(dir.path(), RunRange::new(1, 1).unwrap(), &labels()).unwrap();

        let (flows, multi) = summary.write(dir.path(), "exp").unwrap();
        assert_eq!(
            std::fs::read_to_string(flows).unwrap(),
            "idx,file,socket,mbps\n1,1-iperf-prague.json,5,1.5\n1,1-iperf-prague.json,ALL_FLOWS,1.5\n"
        );
        assert_eq!(
            std::fs::read_to_string(multi).unwrap(),
            "type,ue,mean_mbps,std_mbps,count\ncubic,ALL,0.0,0.0,1\nprague,5,1.5,0.0,1\nprague,ALL,1.5,0.0,1\n"
        );
    }
}
