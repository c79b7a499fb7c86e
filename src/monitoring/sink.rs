//! Measurement Log Sink
//!
//! Append-only CSV sink for samples. Each run appends to its algorithm's
//! log; the header row is written exactly once per file lifetime, when the
//! file is still empty. Every row is flushed immediately so partial data
//! survives an abrupt stop.

use std::fs::{File, OpenOptions};
use std::path::Path;

use csv::Writer;

use crate::error::BenchError;

/// One timestamped resource-usage observation of a running target.
///
/// Immutable once recorded; rows are appended in elapsed-time order
/// within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Current experiment parameter value, already formatted
    pub parameter_value: String,
    /// Seconds since sampling started, rounded to one decimal
    pub elapsed_secs: f64,
    /// Normalized CPU percentage; `None` between CPU refreshes
    pub cpu_percent: Option<f64>,
    /// Resident memory in MiB
    pub memory_mb: f64,
    /// Thread count (local) or PID count (container)
    pub thread_count: u64,
    /// CPU percentage of the secondary container, when configured
    pub db_cpu_percent: Option<f64>,
}

/// Append-only CSV log holding one algorithm's samples.
pub struct SampleLog {
    writer: Writer<File>,
    with_db_cpu: bool,
}

impl SampleLog {
    /// Opens the log for appending, creating it if needed.
    ///
    /// The header row `[<parameter_name>, timestamp, cpu_usage,
    /// memory_usage, num_threads (, db_cpu_usage)]` is written only when
    /// the file is empty, so repeated runs appending to the same file
    /// never duplicate it.
    pub fn open(
        path: &Path,
        parameter_name: &str,
        with_db_cpu: bool,
    ) -> Result<Self, BenchError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = Writer::from_writer(file);

        if is_empty {
            let mut header = vec![
                parameter_name,
                "timestamp",
                "cpu_usage",
                "memory_usage",
                "num_threads",
            ];
            if with_db_cpu {
                header.push("db_cpu_usage");
            }
            writer.write_record(&header)?;
            writer.flush()?;
        }

        Ok(Self {
            writer,
            with_db_cpu,
        })
    }

    /// Appends one sample and flushes it to disk.
    ///
    /// Missing CPU readings become empty cells, which downstream
    /// aggregation coerces to missing values.
    pub fn append(&mut self, sample: &Sample) -> Result<(), BenchError> {
        let mut record = vec![
            sample.parameter_value.clone(),
            format!("{:.1}", sample.elapsed_secs),
            sample
                .cpu_percent
                .map(|cpu| format!("{:.2}", cpu))
                .unwrap_or_default(),
            format!("{:.2}", sample.memory_mb),
            sample.thread_count.to_string(),
        ];

        if self.with_db_cpu {
            record.push(
                sample
                    .db_cpu_percent
                    .map(|cpu| format!("{:.2}", cpu))
                    .unwrap_or_default(),
            );
        }

        self.writer.write_record(&record)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample(value: &str, elapsed: f64) -> Sample {
        Sample {
            parameter_value: value.to_string(),
            elapsed_secs: elapsed,
            cpu_percent: Some(25.0),
            memory_mb: 128.5,
            thread_count: 8,
            db_cpu_percent: None,
        }
    }

    #[test]
    fn test_header_written_once_across_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("measurement_log_platform.csv");

        {
            let mut log = SampleLog::open(&path, "transactions", false).unwrap();
            log.append(&sample("100000", 0.2)).unwrap();
        }
        {
            let mut log = SampleLog::open(&path, "transactions", false).unwrap();
            log.append(&sample("200000", 0.2)).unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content
            .lines()
            .filter(|line| line.starts_with("transactions,"))
            .count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_header_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        SampleLog::open(&path, "max_depth", false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.lines().next().unwrap(),
            "max_depth,timestamp,cpu_usage,memory_usage,num_threads"
        );
    }

    #[test]
    fn test_header_with_db_cpu_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        SampleLog::open(&path, "transactions", true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.lines().next().unwrap().ends_with(",db_cpu_usage"));
    }

    #[test]
    fn test_missing_cpu_is_empty_cell() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut log = SampleLog::open(&path, "transactions", false).unwrap();
        let mut s = sample("100000", 0.4);
        s.cpu_percent = None;
        log.append(&s).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert_eq!(row, "100000,0.4,,128.50,8");
    }

    #[test]
    fn test_rows_preserve_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut log = SampleLog::open(&path, "transactions", false).unwrap();
        for i in 1..=3 {
            log.append(&sample("100000", i as f64 * 0.2)).unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let timestamps: Vec<&str> = content
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(1).unwrap())
            .collect();
        assert_eq!(timestamps, vec!["0.2", "0.4", "0.6"]);
    }
}
