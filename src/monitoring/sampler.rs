//! Sampling Loop
//!
//! Polls a [`SampleSource`] at a fixed cadence, appending one sample per
//! iteration to the run's log until the target exits. Query latency is
//! subtracted from the sleep so the cadence stays close to nominal.

use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::error::BenchError;

use super::sink::{Sample, SampleLog};
use super::source::{ExitClass, Probe, SampleSource};

/// Puts the current thread to sleep. Injectable so cadence behavior is
/// testable without wall-clock waits.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Default sleeper backed by [`std::thread::sleep`].
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Why the sampling loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Target reached a terminal state
    Exited(ExitClass),
    /// Target identifier vanished mid-run; partial data was kept
    Vanished,
}

/// Fixed-cadence polling loop.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use benchrunner::monitoring::{Sampler, ProcessSource, SampleLog};
///
/// let mut source = ProcessSource::new(child.id());
/// let mut log = SampleLog::open(&path, "transactions", false)?;
/// let mut sampler = Sampler::new(Duration::from_millis(200));
/// let stop = sampler.run(&mut source, "100000", &mut log)?;
/// ```
pub struct Sampler<S: Sleeper = ThreadSleeper> {
    interval: Duration,
    sleeper: S,
}

impl Sampler<ThreadSleeper> {
    /// Creates a sampler with the given nominal polling interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            sleeper: ThreadSleeper,
        }
    }
}

impl<S: Sleeper> Sampler<S> {
    /// Creates a sampler with a custom sleeper.
    pub fn with_sleeper(interval: Duration, sleeper: S) -> Self {
        Self { interval, sleeper }
    }

    /// Runs the poll loop to completion.
    ///
    /// Appends one sample per iteration, tagged with the parameter value
    /// and elapsed time since this call. Terminates when the source
    /// reports an exit or the identifier vanishes; transient errors
    /// (failed stats query, malformed sample) are logged and the
    /// iteration is skipped.
    pub fn run(
        &mut self,
        source: &mut dyn SampleSource,
        parameter_value: &str,
        log: &mut SampleLog,
    ) -> Result<StopReason, BenchError> {
        let start = Instant::now();

        loop {
            let poll_started = Instant::now();

            match source.probe() {
                Ok(Probe::Alive {
                    cpu_percent,
                    memory_mb,
                    thread_count,
                    db_cpu_percent,
                }) => {
                    let elapsed = start.elapsed().as_secs_f64();
                    log.append(&Sample {
                        parameter_value: parameter_value.to_string(),
                        elapsed_secs: (elapsed * 10.0).round() / 10.0,
                        cpu_percent,
                        memory_mb,
                        thread_count,
                        db_cpu_percent,
                    })?;
                }
                Ok(Probe::Exited { class }) => {
                    info!("{} exited ({})", source.describe(), class);
                    return Ok(StopReason::Exited(class));
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Skipping poll iteration for {}: {}",
                        source.describe(),
                        e
                    );
                }
                Err(BenchError::IdentifierNotFound(id)) => {
                    warn!("{} disappeared - keeping partial data", id);
                    return Ok(StopReason::Vanished);
                }
                Err(e) => return Err(e),
            }

            let latency = poll_started.elapsed();
            self.sleeper.sleep(self.interval.saturating_sub(latency));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// Replays a scripted sequence of probe results.
    struct FakeSource {
        script: Vec<Result<Probe, BenchError>>,
    }

    impl FakeSource {
        fn new(script: Vec<Result<Probe, BenchError>>) -> Self {
            let mut script = script;
            script.reverse();
            Self { script }
        }
    }

    impl SampleSource for FakeSource {
        fn describe(&self) -> String {
            "fake".to_string()
        }

        fn probe(&mut self) -> Result<Probe, BenchError> {
            self.script.pop().expect("probe called after script ended")
        }
    }

    /// Records every requested sleep instead of sleeping.
    struct RecordingSleeper {
        requests: Vec<Duration>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&mut self, duration: Duration) {
            self.requests.push(duration);
        }
    }

    fn alive(memory_mb: f64) -> Result<Probe, BenchError> {
        Ok(Probe::Alive {
            cpu_percent: Some(10.0),
            memory_mb,
            thread_count: 4,
            db_cpu_percent: None,
        })
    }

    fn exited() -> Result<Probe, BenchError> {
        Ok(Probe::Exited {
            class: ExitClass::Clean,
        })
    }

    fn data_rows(path: &std::path::Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(|line| line.to_string())
            .collect()
    }

    #[test]
    fn test_three_alive_then_exited_writes_three_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = SampleLog::open(&path, "transactions", false).unwrap();

        let mut source = FakeSource::new(vec![
            alive(100.0),
            alive(110.0),
            alive(120.0),
            exited(),
        ]);

        let mut sampler = Sampler::with_sleeper(
            Duration::from_millis(200),
            RecordingSleeper { requests: vec![] },
        );
        let stop = sampler.run(&mut source, "100000", &mut log).unwrap();

        assert_eq!(stop, StopReason::Exited(ExitClass::Clean));
        assert_eq!(data_rows(&path).len(), 3);
    }

    #[test]
    fn test_transient_errors_skip_iteration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = SampleLog::open(&path, "transactions", false).unwrap();

        let mut source = FakeSource::new(vec![
            alive(100.0),
            Err(BenchError::StatsQuery("docker hiccup".into())),
            Err(BenchError::MalformedSample {
                field: "memory",
                text: "1.5TB".into(),
            }),
            alive(105.0),
            exited(),
        ]);

        let mut sampler = Sampler::with_sleeper(
            Duration::from_millis(200),
            RecordingSleeper { requests: vec![] },
        );
        let stop = sampler.run(&mut source, "100000", &mut log).unwrap();

        assert_eq!(stop, StopReason::Exited(ExitClass::Clean));
        assert_eq!(data_rows(&path).len(), 2);
    }

    #[test]
    fn test_vanished_target_keeps_partial_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = SampleLog::open(&path, "transactions", false).unwrap();

        let mut source = FakeSource::new(vec![
            alive(100.0),
            Err(BenchError::IdentifierNotFound("pid 4711".into())),
        ]);

        let mut sampler = Sampler::with_sleeper(
            Duration::from_millis(200),
            RecordingSleeper { requests: vec![] },
        );
        let stop = sampler.run(&mut source, "100000", &mut log).unwrap();

        assert_eq!(stop, StopReason::Vanished);
        assert_eq!(data_rows(&path).len(), 1);
    }

    #[test]
    fn test_sleep_never_exceeds_interval() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = SampleLog::open(&path, "n", false).unwrap();

        let mut source =
            FakeSource::new(vec![alive(1.0), alive(2.0), alive(3.0), exited()]);

        let interval = Duration::from_millis(200);
        let mut sampler =
            Sampler::with_sleeper(interval, RecordingSleeper { requests: vec![] });
        sampler.run(&mut source, "1", &mut log).unwrap();

        // One sleep per Alive iteration, each shortened by query latency
        assert_eq!(sampler.sleeper.requests.len(), 3);
        for requested in &sampler.sleeper.requests {
            assert!(*requested <= interval);
        }
    }

    #[test]
    fn test_rows_carry_parameter_and_monotonic_elapsed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = SampleLog::open(&path, "max_depth", false).unwrap();

        let mut source = FakeSource::new(vec![alive(1.0), alive(2.0), exited()]);
        let mut sampler = Sampler::with_sleeper(
            Duration::from_millis(200),
            RecordingSleeper { requests: vec![] },
        );
        sampler.run(&mut source, "3", &mut log).unwrap();

        let rows = data_rows(&path);
        let mut last_elapsed = -1.0;
        for row in &rows {
            let mut cells = row.split(',');
            assert_eq!(cells.next().unwrap(), "3");
            let elapsed: f64 = cells.next().unwrap().parse().unwrap();
            assert!(elapsed >= last_elapsed);
            last_elapsed = elapsed;
        }
    }
}
