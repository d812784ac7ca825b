//! Post-processing of captured logs into CSV summaries
//!
//! Every reader in this module follows the same convention: a missing input
//! file within a run range is skipped with a warning, never an error.

pub mod iperf;
pub mod qdisc;
pub mod rlc;
pub mod ss;

use crate::error::{ErrorContext, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Open an input log, or `None` when it does not exist
pub(crate) fn open_existing(path: &Path) -> Result<Option<BufReader<File>>> {
    if !path.is_file() {
        return Ok(None);
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Some(BufReader::new(file)))
}

/// Open an input log that must exist
pub(crate) fn open_required(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// `{prefix}_{suffix}` resolved against `dir`, unless the prefix already names a directory
pub fn output_path(dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let name = format!("{}_{}", prefix, suffix);
    let prefix_path = Path::new(prefix);
    if prefix_path.is_absolute() || prefix_path.parent().is_some_and(|p| !p.as_os_str().is_empty()) {
        PathBuf::from(name)
    } else {
        dir.join(name)
    }
}

/// Write a header row and then `rows`; the header is written even with no rows
pub fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_csv_to(file, header, rows).with_context(|| format!("writing {}", path.display()))
}

pub(crate) fn write_csv_to<W: Write, T: Serialize>(sink: W, header: &[&str], rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(sink);
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
