//! Flow labels, run ranges and the file naming shared by experiments and analysis

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label of one traffic source within an experiment (`cubic`, `cubic-2`, `prague`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowLabel(String);

impl FlowLabel {
    pub fn new<S: Into<String>>(label: S) -> Result<Self> {
        let label = label.into();
        crate::models::config::validate_label(&label)?;
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Congestion-control family: text before the first `-`
    pub fn family(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// `{idx}-iperf-{label}.json`
    pub fn iperf_file(&self, idx: u32) -> String {
        format!("{}-iperf-{}.json", idx, self.0)
    }

    /// `{idx}-ss-{label}.txt`
    pub fn ss_file(&self, idx: u32) -> String {
        format!("{}-ss-{}.txt", idx, self.0)
    }
}

impl fmt::Display for FlowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convert configured label strings, rejecting unsafe ones
pub fn parse_labels(labels: &[String]) -> Result<Vec<FlowLabel>> {
    labels.iter().map(|l| FlowLabel::new(l.clone())).collect()
}

/// Families in order of first appearance among the labels
pub fn families(labels: &[FlowLabel]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        if !out.iter().any(|f| f == label.family()) {
            out.push(label.family().to_string());
        }
    }
    out
}

/// `{name}_monitor_{idx}.txt`
pub fn monitor_file(name: &str, idx: u32) -> String {
    format!("{}_monitor_{}.txt", name, idx)
}

/// `gnb_log_{idx}.log`
pub fn gnb_log_file(idx: u32) -> String {
    format!("gnb_log_{}.log", idx)
}

/// Inclusive range of experiment indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRange {
    pub start: u32,
    pub end: u32,
}

impl RunRange {
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if end < start {
            return Err(AppError::validation(format!(
                "End index {} is before start index {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_family() {
        assert_eq!(FlowLabel::new("cubic-2").unwrap().family(), "cubic");
        assert_eq!(FlowLabel::new("prague").unwrap().family(), "prague");
        assert_eq!(FlowLabel::new("prague-cross-traffic").unwrap().family(), "prague");
    }

    #[test]
    fn test_file_names() {
        let label = FlowLabel::new("cubic-3").unwrap();
        assert_eq!(label.iperf_file(47), "47-iperf-cubic-3.json");
        assert_eq!(label.ss_file(47), "47-ss-cubic-3.txt");
        assert_eq!(monitor_file("dualq", 5), "dualq_monitor_5.txt");
        assert_eq!(gnb_log_file(12), "gnb_log_12.log");
    }

    #[test]
    fn test_families_keep_first_seen_order() {
        let labels = parse_labels(&[
            "cubic".to_string(),
            "cubic-2".to_string(),
            "prague".to_string(),
            "cubic-3".to_string(),
        ])
        .unwrap();
        assert_eq!(families(&labels), vec!["cubic", "prague"]);
    }

    #[test]
    fn test_run_range() {
        let range = RunRange::new(3, 5).unwrap();
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(range.len(), 3);
        assert!(RunRange::new(5, 3).is_err());
        assert_eq!(RunRange::new(7, 7).unwrap().len(), 1);
    }
}
