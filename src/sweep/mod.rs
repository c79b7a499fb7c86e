//! Experiment Sweep
//!
//! Iterates the experiment parameter across its configured values and,
//! for each value, measures every algorithm once. Durations land in a
//! time-series log with one row per parameter value and one column per
//! algorithm; failed runs are recorded as an explicit `N/A` so rows stay
//! complete and aligned for downstream aggregation.

use std::error::Error;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use colored::Colorize;
use csv::Writer;
use log::{error, info};

use crate::config::{format_value, BenchConfig};
use crate::error::BenchError;
use crate::execution::{run_data_generator, RunOrchestrator};

/// Marker written for runs that produced no duration.
pub const NOT_AVAILABLE: &str = "N/A";

/// File name of the per-sweep duration log.
pub const TIME_LOG_FILE: &str = "measurement_log_time.csv";

/// Time-series log of run durations.
///
/// Header `[<parameter_name>, <algorithm_1>, <algorithm_2>, ...]`; one
/// row per parameter value, written once all algorithms for that value
/// finished.
pub struct TimeSeriesLog {
    writer: Writer<File>,
}

impl TimeSeriesLog {
    /// Creates the log (truncating a previous one) and writes the header.
    pub fn create(
        path: &Path,
        parameter_name: &str,
        algorithms: &[String],
    ) -> Result<Self, BenchError> {
        let mut writer = Writer::from_path(path)?;

        let mut header = vec![parameter_name.to_string()];
        header.extend(algorithms.iter().cloned());
        writer.write_record(&header)?;
        writer.flush()?;

        Ok(Self { writer })
    }

    /// Appends one row; `None` durations become the `N/A` marker, never a
    /// zero or an omitted column.
    pub fn append(
        &mut self,
        value_str: &str,
        durations: &[Option<f64>],
    ) -> Result<(), BenchError> {
        let mut record = vec![value_str.to_string()];
        record.extend(durations.iter().map(|duration| match duration {
            Some(secs) => format!("{:.1}", secs),
            None => NOT_AVAILABLE.to_string(),
        }));

        self.writer.write_record(&record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Drives the full parameter sweep.
///
/// # Example
///
/// ```rust,no_run
/// use benchrunner::config::load_config;
/// use benchrunner::sweep::ExperimentSweep;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("bench.yaml")?;
///     ExperimentSweep::new(config).execute()?;
///     Ok(())
/// }
/// ```
pub struct ExperimentSweep {
    config: BenchConfig,
    stop_flag_path: Option<PathBuf>,
}

impl ExperimentSweep {
    /// Creates a sweep over the given configuration.
    pub fn new(config: BenchConfig) -> Self {
        Self {
            config,
            stop_flag_path: None,
        }
    }

    /// Sets the path of the stop-flag file.
    ///
    /// When the file exists, the sweep stops cleanly at the next
    /// between-runs checkpoint; values not yet measured are recorded as
    /// `N/A` and already-written samples are retained.
    pub fn set_stop_flag_path(&mut self, path: impl Into<PathBuf>) {
        self.stop_flag_path = Some(path.into());
    }

    /// Executes the sweep: one run per (parameter value, algorithm), in
    /// sweep order, one algorithm at a time.
    pub fn execute(&self) -> Result<(), Box<dyn Error>> {
        fs::create_dir_all(&self.config.measurements_dir)?;

        let algorithm_ids: Vec<String> = self
            .config
            .algorithms
            .iter()
            .map(|algorithm| algorithm.id.clone())
            .collect();

        let time_log_path = self.config.measurements_dir.join(TIME_LOG_FILE);
        let mut time_log = TimeSeriesLog::create(
            &time_log_path,
            &self.config.parameter.name,
            &algorithm_ids,
        )?;

        let values = self.config.parameter.expand();
        let orchestrator = RunOrchestrator::new(&self.config);
        let cooldown = Duration::from_secs(self.config.cooldown_secs);

        info!(
            "Sweep: {} parameter values x {} algorithms",
            values.len(),
            algorithm_ids.len()
        );

        for &value in &values {
            let value_str = format_value(value);

            if self.stop_requested() {
                info!("Stop flag present - ending sweep before {} = {}",
                    self.config.parameter.name, value_str);
                break;
            }

            println!();
            println!(
                "{}",
                format!("{} set to {}", self.config.parameter.name, value_str).bold()
            );

            if let Some(ref generator) = self.config.data_generator {
                run_data_generator(generator, value)?;
            }

            let mut durations: Vec<Option<f64>> = Vec::with_capacity(algorithm_ids.len());
            let mut stopped = false;

            for algorithm in &self.config.algorithms {
                if !stopped && self.stop_requested() {
                    info!("Stop flag present - remaining runs recorded as {}", NOT_AVAILABLE);
                    stopped = true;
                }
                if stopped {
                    durations.push(None);
                    continue;
                }

                match orchestrator.run(algorithm, value) {
                    Ok(result) => {
                        println!(
                            "{}",
                            format!(
                                "Measurement complete: {} ({}s)",
                                result.algorithm_id, result.duration_secs
                            )
                            .green()
                        );
                        durations.push(Some(result.duration_secs));
                    }
                    Err(e) => {
                        error!(
                            "Run failed for '{}' ({} = {}): {}",
                            algorithm.id, self.config.parameter.name, value_str, e
                        );
                        durations.push(None);
                    }
                }

                if !cooldown.is_zero() {
                    thread::sleep(cooldown);
                }
            }

            time_log.append(&value_str, &durations)?;

            if stopped {
                break;
            }
        }

        info!("Sweep finished; durations in {}", time_log_path.display());
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag_path
            .as_ref()
            .map(|path| path.exists())
            .unwrap_or(false)
    }
}
