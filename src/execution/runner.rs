//! Run Orchestration
//!
//! Drives one (algorithm, parameter value) execution end to end: launch,
//! readiness wait, timed sampling, exit classification.

use std::fs;
use std::io::BufReader;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::{format_value, AlgorithmSpec, BenchConfig, LaunchSpec};
use crate::error::BenchError;
use crate::monitoring::{
    DockerSource, ExitClass, ProcessSource, SampleLog, Sampler, StopReason,
};

use super::launcher::{self, launch, LaunchedTarget, TargetKind};
use super::readiness::wait_for_marker;

/// Result of one (algorithm, parameter value) execution.
///
/// Created at run completion; never mutated afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub algorithm_id: String,
    pub parameter_value: f64,
    /// Wall-clock duration from readiness to exit, rounded to one decimal
    pub duration_secs: f64,
    /// Exit classification, for diagnostics only
    pub exit: ExitClass,
}

/// Orchestrates single benchmark runs against a shared configuration.
///
/// # Example
///
/// ```rust,no_run
/// use benchrunner::config::load_config;
/// use benchrunner::execution::RunOrchestrator;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("bench.yaml")?;
///     let orchestrator = RunOrchestrator::new(&config);
///     let result = orchestrator.run(&config.algorithms[0], 100000.0)?;
///     println!("took {}s", result.duration_secs);
///     Ok(())
/// }
/// ```
pub struct RunOrchestrator<'a> {
    config: &'a BenchConfig,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(config: &'a BenchConfig) -> Self {
        Self { config }
    }

    /// Runs one measurement: launches the target, waits for the readiness
    /// marker on its stdout, samples until it exits, and returns the
    /// classified result.
    ///
    /// An instrumentation failure mid-run degrades sample quality but
    /// does not abort the run; a launch failure does.
    pub fn run(
        &self,
        algorithm: &AlgorithmSpec,
        value: f64,
    ) -> Result<RunResult, BenchError> {
        let value_str = format_value(value);

        info!(
            "Starting run: algorithm '{}', {} = {}",
            algorithm.id, self.config.parameter.name, value_str
        );

        let mut target = launch(algorithm, value, self.config)?;

        let stdout = target.child.stdout.take().ok_or_else(|| {
            BenchError::LaunchFailure {
                target: algorithm.launch.target().to_string(),
                reason: "stdout was not captured".to_string(),
            }
        })?;

        let mut reader = BufReader::new(stdout);
        let ready = wait_for_marker(&mut reader, &self.config.readiness_marker)?;
        if !ready {
            warn!(
                "'{}' closed its output without printing {:?} - measuring anyway",
                algorithm.id, self.config.readiness_marker
            );
        }

        let start = Instant::now();

        fs::create_dir_all(&self.config.measurements_dir)?;
        let log_path = self
            .config
            .measurements_dir
            .join(format!("measurement_log_{}.csv", algorithm.id));
        let with_db_cpu = matches!(
            &algorithm.launch,
            LaunchSpec::Container {
                db_container: Some(_),
                ..
            }
        );
        let mut log = SampleLog::open(&log_path, &self.config.parameter.name, with_db_cpu)?;

        let mut sampler =
            Sampler::new(Duration::from_millis(self.config.sample_interval_ms));

        let stop = match &algorithm.launch {
            LaunchSpec::Process { .. } => {
                let mut source = ProcessSource::new(target.child.id());
                sampler.run(&mut source, &value_str, &mut log)?
            }
            LaunchSpec::Container {
                container,
                db_container,
                ..
            } => {
                let mut source = DockerSource::new(
                    container.clone(),
                    db_container.clone(),
                    self.config.stop_on_zero_pids,
                );
                sampler.run(&mut source, &value_str, &mut log)?
            }
        };

        let duration_secs = (start.elapsed().as_secs_f64() * 10.0).round() / 10.0;
        let exit = finish(&mut target, stop)?;

        info!(
            "Run complete: '{}' took {}s ({})",
            algorithm.id, duration_secs, exit
        );

        Ok(RunResult {
            algorithm_id: algorithm.id.clone(),
            parameter_value: value,
            duration_secs,
            exit,
        })
    }
}

/// Reaps the launched target and settles its exit classification.
///
/// Local processes are waited on (the sampler saw them as zombies, so the
/// real exit code is only known here). Compose stacks get their `up`
/// process stopped and the stack torn down; their classification was
/// already read from the container runtime.
fn finish(target: &mut LaunchedTarget, stop: StopReason) -> Result<ExitClass, BenchError> {
    match target.kind {
        TargetKind::Process => {
            let status = target.child.wait()?;
            Ok(ExitClass::from_code(status.code()))
        }
        TargetKind::Compose { ref file } => {
            if let Err(e) = target.child.kill() {
                warn!("Could not stop compose process: {}", e);
            }
            let _ = target.child.wait();
            launcher::compose_down(file);

            Ok(match stop {
                StopReason::Exited(class) => class,
                StopReason::Vanished => ExitClass::Unknown,
            })
        }
    }
}
