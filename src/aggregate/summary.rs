//! Summary Tables
//!
//! Groups all samples sharing a parameter value, reduces each tracked
//! metric with max and mean per algorithm, and writes one wide CSV per
//! metric. Tables align on the full set of parameter values observed
//! across all algorithms' logs (outer join): an algorithm missing data
//! for a value leaves blank cells, the row is never dropped. Summary
//! rows are recomputed fully from the raw logs, never updated
//! incrementally.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csv::{Reader, Writer};
use log::{info, warn};

use crate::config::format_value;
use crate::error::BenchError;
use crate::sweep::{NOT_AVAILABLE, TIME_LOG_FILE};

/// Metrics reduced out of the raw sample logs, in output order.
const METRICS: &[&str] = &["cpu_usage", "memory_usage", "num_threads", "db_cpu_usage"];

/// Samples grouped by canonical parameter value.
type MetricGroups = BTreeMap<String, Vec<f64>>;

/// Per-algorithm data loaded from one sample log: metric name to groups.
type AlgorithmData = BTreeMap<String, MetricGroups>;

/// Builds summary tables from the per-algorithm sample logs and the
/// sweep's time-series log.
///
/// # Example
///
/// ```rust,no_run
/// use benchrunner::aggregate::Aggregator;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let aggregator = Aggregator::new(
///         "measurements",
///         "transactions",
///         vec!["platform".to_string(), "goroutines".to_string()],
///     );
///     for table in aggregator.aggregate()? {
///         println!("wrote {}", table.display());
///     }
///     Ok(())
/// }
/// ```
pub struct Aggregator {
    measurements_dir: PathBuf,
    parameter_name: String,
    algorithms: Vec<String>,
}

impl Aggregator {
    pub fn new(
        measurements_dir: impl Into<PathBuf>,
        parameter_name: impl Into<String>,
        algorithms: Vec<String>,
    ) -> Self {
        Self {
            measurements_dir: measurements_dir.into(),
            parameter_name: parameter_name.into(),
            algorithms,
        }
    }

    /// Builds every summary table and returns the written paths.
    ///
    /// Metrics with no data in any log are skipped; a missing log file
    /// contributes blank cells for its algorithm rather than failing the
    /// aggregation.
    pub fn aggregate(&self) -> Result<Vec<PathBuf>, BenchError> {
        let mut data: Vec<(String, AlgorithmData)> = Vec::new();

        for algorithm in &self.algorithms {
            let path = self
                .measurements_dir
                .join(format!("measurement_log_{}.csv", algorithm));

            let loaded = if path.exists() {
                load_sample_log(&path, &self.parameter_name)?
            } else {
                warn!(
                    "No sample log for '{}' at {} - leaving its columns blank",
                    algorithm,
                    path.display()
                );
                AlgorithmData::new()
            };
            data.push((algorithm.clone(), loaded));
        }

        let mut written = Vec::new();

        for &metric in METRICS {
            let has_data = data
                .iter()
                .any(|(_, algorithm_data)| algorithm_data.contains_key(metric));
            if !has_data {
                continue;
            }

            let path = self
                .measurements_dir
                .join(format!("summary_{}.csv", metric));
            self.write_metric_table(&path, metric, &data)?;
            written.push(path);
        }

        if let Some(path) = self.write_duration_table()? {
            written.push(path);
        }

        info!("Wrote {} summary tables", written.len());
        Ok(written)
    }

    /// Writes one wide table for `metric`, outer-joined on parameter value.
    fn write_metric_table(
        &self,
        path: &Path,
        metric: &str,
        data: &[(String, AlgorithmData)],
    ) -> Result<(), BenchError> {
        // Union of parameter values observed in any algorithm's log
        let mut keys: Vec<String> = data
            .iter()
            .filter_map(|(_, algorithm_data)| algorithm_data.get(metric))
            .flat_map(|groups| groups.keys().cloned())
            .collect();
        keys.sort_by(|a, b| {
            let a: f64 = a.parse().unwrap_or(f64::MAX);
            let b: f64 = b.parse().unwrap_or(f64::MAX);
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        });
        keys.dedup();

        let mut writer = Writer::from_path(path)?;

        let mut header = vec![self.parameter_name.clone()];
        for (algorithm, _) in data {
            header.push(format!("{}_max_{}", algorithm, metric));
            header.push(format!("{}_mean_{}", algorithm, metric));
        }
        writer.write_record(&header)?;

        for key in &keys {
            let mut record = vec![key.clone()];
            for (_, algorithm_data) in data {
                let values = algorithm_data
                    .get(metric)
                    .and_then(|groups| groups.get(key));

                let (max, mean) = match values {
                    Some(values) => (max_of(values), mean_of(values)),
                    None => (None, None),
                };
                record.push(max.map(format_stat).unwrap_or_default());
                record.push(mean.map(format_stat).unwrap_or_default());
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Folds the sweep's time-series log into a per-algorithm duration
    /// table, coercing `N/A` and malformed cells to blanks.
    fn write_duration_table(&self) -> Result<Option<PathBuf>, BenchError> {
        let time_log = self.measurements_dir.join(TIME_LOG_FILE);
        if !time_log.exists() {
            warn!(
                "No time-series log at {} - skipping duration summary",
                time_log.display()
            );
            return Ok(None);
        }

        let mut reader = Reader::from_path(&time_log)?;
        let headers = reader.headers()?.clone();

        let path = self.measurements_dir.join("summary_duration.csv");
        let mut writer = Writer::from_path(&path)?;

        let mut header = vec![self.parameter_name.clone()];
        header.extend(
            headers
                .iter()
                .skip(1)
                .map(|algorithm| format!("{}_duration", algorithm)),
        );
        writer.write_record(&header)?;

        for result in reader.records() {
            let record = result?;
            let Some(value) = record.get(0).and_then(parse_cell) else {
                continue;
            };

            let mut row = vec![format_value(value)];
            row.extend(record.iter().skip(1).map(|cell| {
                parse_cell(cell).map(format_stat).unwrap_or_default()
            }));
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(Some(path))
    }
}

/// Loads one sample log, grouping every metric column by parameter value.
///
/// Columns are resolved by header name; the parameter column is the one
/// matching `parameter_name` (falling back to the first column), and the
/// `timestamp` column is not a metric. Non-numeric cells are coerced to
/// missing rather than raising.
fn load_sample_log(path: &Path, parameter_name: &str) -> Result<AlgorithmData, BenchError> {
    let mut reader = Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let parameter_index = headers
        .iter()
        .position(|name| name == parameter_name)
        .unwrap_or(0);

    let metric_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(index, name)| *index != parameter_index && *name != "timestamp")
        .map(|(index, name)| (index, name.to_string()))
        .collect();

    let mut data = AlgorithmData::new();

    for result in reader.records() {
        let record = result?;

        // Rows whose parameter cell does not parse are dropped, the way
        // a coerced groupby drops NaN keys
        let Some(value) = record.get(parameter_index).and_then(parse_cell) else {
            continue;
        };
        let key = format_value(value);

        for (index, name) in &metric_columns {
            let groups = data.entry(name.clone()).or_default();
            let samples = groups.entry(key.clone()).or_default();
            if let Some(number) = record.get(*index).and_then(parse_cell) {
                samples.push(number);
            }
        }
    }

    Ok(data)
}

/// Coerces one CSV cell to a number; empty, `N/A` and malformed cells
/// become missing.
fn parse_cell(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == NOT_AVAILABLE {
        return None;
    }
    trimmed.parse().ok()
}

/// Maximum of a group, `None` when the group holds no numbers.
pub fn max_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Arithmetic mean of a group, `None` when the group holds no numbers.
pub fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn format_stat(value: f64) -> String {
    format!("{:.2}", value)
}
