//! Durable output of a run.
//!
//! The harness emits a stream of [`ReportRecord`]s into a [`ReportSink`].
//! [`CsvReportSink`] lays them out as the readings directory:
//!
//! | file                | columns                                   |
//! |---------------------|-------------------------------------------|
//! | `block_details.csv` | `blockNumber,gasUsed,baseFeePerGas,txCount` |
//! | `cpu_details.csv`   | `profileNumber,CPUUsage(%)`               |
//! | `txn_report.csv`    | `hash,nonce,blockNumber,status`           |
//! | `summary.txt`       | one `key: value` line per summary field   |

use alloy_primitives::B256;
use serde::Serialize;
use std::{
    collections::{hash_map::Entry, HashMap},
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::info;

use crate::{
    chain::BlockTelemetry,
    metrics::{Maybe, ProfileWindowUsage, Report},
};

pub const BLOCK_DETAILS_FILE: &str = "block_details.csv";
pub const CPU_DETAILS_FILE: &str = "cpu_details.csv";
pub const TXN_REPORT_FILE: &str = "txn_report.csv";
pub const SUMMARY_FILE: &str = "summary.txt";
pub const JSON_REPORT_FILE: &str = "report.json";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// A confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRow {
    pub hash: B256,
    pub nonce: u64,
    pub block_number: u64,
    pub success: bool,
}

/// Headline figures of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub blocks_used: usize,
    pub total_gas: u64,
    /// Gas per second.
    pub throughput: Option<f64>,
    pub missed_blocks: usize,
    pub cpu_average_percent: Option<f64>,
}

impl From<&Report> for SummaryRecord {
    fn from(report: &Report) -> Self {
        Self {
            blocks_used: report.blocks_summary.block_count,
            total_gas: report.blocks_summary.total_gas,
            throughput: report.blocks_summary.gas_throughput,
            missed_blocks: report.blocks_summary.missed_block_count,
            cpu_average_percent: report.cpu_utilization_percent,
        }
    }
}

/// One record of run output.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportRecord {
    Block(BlockTelemetry),
    ProfileWindow(ProfileWindowUsage),
    Transaction(TransactionRow),
    Summary(SummaryRecord),
}

/// Anything that durably records report records.
pub trait ReportSink {
    fn append(&mut self, record: &ReportRecord) -> Result<(), SinkError>;

    /// Makes everything appended so far durable.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes records as CSV tables and a text summary under one directory.
#[derive(Debug)]
pub struct CsvReportSink {
    dir: PathBuf,
    tables: HashMap<&'static str, BufWriter<File>>,
}

impl CsvReportSink {
    /// Creates `dir` if needed. Tables are created (and truncated) on their
    /// first record.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            tables: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_row(
        &mut self,
        file: &'static str,
        header: &str,
        row: std::fmt::Arguments<'_>,
    ) -> Result<(), SinkError> {
        let path = self.dir.join(file);
        let result = match self.tables.entry(file) {
            Entry::Occupied(entry) => writeln!(entry.into_mut(), "{row}"),
            Entry::Vacant(entry) => File::create(&path).and_then(|f| {
                let writer = entry.insert(BufWriter::new(f));
                writeln!(writer, "{header}")?;
                writeln!(writer, "{row}")
            }),
        };
        result.map_err(|source| SinkError::Io { path, source })
    }

    fn write_summary(&mut self, summary: &SummaryRecord) -> Result<(), SinkError> {
        let path = self.dir.join(SUMMARY_FILE);
        let text = format!(
            concat!(
                "Blocks Used: {}\n",
                "Total Gas: {}\n",
                "Throughput (gas/s): {}\n",
                "Missed Blocks: {}\n",
                "CPU Average Usage (%): {}\n",
            ),
            summary.blocks_used,
            summary.total_gas,
            Maybe(summary.throughput),
            summary.missed_blocks,
            Maybe(summary.cpu_average_percent),
        );
        std::fs::write(&path, text).map_err(|source| SinkError::Io { path, source })
    }
}

impl ReportSink for CsvReportSink {
    fn append(&mut self, record: &ReportRecord) -> Result<(), SinkError> {
        match record {
            ReportRecord::Block(b) => self.write_row(
                BLOCK_DETAILS_FILE,
                "blockNumber,gasUsed,baseFeePerGas,txCount",
                format_args!(
                    "{},{},{},{}",
                    b.block_number, b.gas_used, b.base_fee_per_gas, b.tx_count
                ),
            ),
            ReportRecord::ProfileWindow(w) => self.write_row(
                CPU_DETAILS_FILE,
                "profileNumber,CPUUsage(%)",
                format_args!("{},{:.2}", w.window, w.cpu_percent),
            ),
            ReportRecord::Transaction(t) => self.write_row(
                TXN_REPORT_FILE,
                "hash,nonce,blockNumber,status",
                format_args!("{},{},{},{}", t.hash, t.nonce, t.block_number, u8::from(t.success)),
            ),
            ReportRecord::Summary(summary) => self.write_summary(summary),
        }
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for (file, writer) in &mut self.tables {
            writer.flush().map_err(|source| SinkError::Io {
                path: self.dir.join(file),
                source,
            })?;
        }
        Ok(())
    }
}

/// Writes `value` as pretty JSON to `path`.
pub fn write_json_report<T: Serialize>(path: &Path, value: &T) -> Result<(), SinkError> {
    let file = File::create(path).map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Generated report");
    Ok(())
}
