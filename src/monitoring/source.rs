//! Sample Sources
//!
//! A [`SampleSource`] answers one question per call: what are the target's
//! CPU, memory and thread figures right now, or has it exited? The local
//! process variant lives here; the container variant is in
//! [`super::docker`].

use std::fmt;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, System};

use crate::error::BenchError;

/// Minimum interval between real CPU readings.
///
/// Refreshing CPU deltas more often than this produces noisy percentages,
/// so polls in between report no CPU figure. Memory and thread count are
/// read on every poll.
pub const CPU_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Classification of a target's exit, used for diagnostic logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Exit code 0
    Clean,
    /// Exit code 1, conventionally an error inside the worker
    ApplicationError,
    /// Any other exit code
    Abnormal(i32),
    /// No exit code available (killed by signal, or not reaped yet)
    Unknown,
}

impl ExitClass {
    /// Maps a raw exit code to its classification.
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitClass::Clean,
            Some(1) => ExitClass::ApplicationError,
            Some(code) => ExitClass::Abnormal(code),
            None => ExitClass::Unknown,
        }
    }
}

impl fmt::Display for ExitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitClass::Clean => write!(f, "exit code 0"),
            ExitClass::ApplicationError => write!(f, "exit code 1 (worker error)"),
            ExitClass::Abnormal(code) => write!(f, "abnormal exit code {}", code),
            ExitClass::Unknown => write!(f, "no exit code"),
        }
    }
}

/// One point-in-time observation of a monitored target.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// Target is running; `cpu_percent` is `None` on polls between CPU
    /// refreshes, `db_cpu_percent` only set by container sources with a
    /// secondary container configured
    Alive {
        cpu_percent: Option<f64>,
        memory_mb: f64,
        thread_count: u64,
        db_cpu_percent: Option<f64>,
    },
    /// Target reached a terminal state
    Exited { class: ExitClass },
}

/// Queries point-in-time resource usage for one monitored target.
///
/// Implementations return [`BenchError::IdentifierNotFound`] when the
/// target identifier no longer resolves, and transient errors
/// ([`BenchError::StatsQuery`], [`BenchError::MalformedSample`]) when a
/// single poll fails without the target being gone.
pub trait SampleSource {
    /// Human-readable identifier for log messages.
    fn describe(&self) -> String;

    /// Takes one observation.
    fn probe(&mut self) -> Result<Probe, BenchError>;
}

/// Local-process sample source built on `sysinfo`.
///
/// The constructor performs the warmup refresh required for meaningful
/// CPU deltas; afterwards CPU percentages are the usage since the last
/// CPU refresh, normalized by the logical core count.
///
/// # Example
///
/// ```rust,ignore
/// use benchrunner::monitoring::{ProcessSource, SampleSource};
///
/// let mut source = ProcessSource::new(child.id());
/// let probe = source.probe()?;
/// ```
pub struct ProcessSource {
    system: System,
    pid: Pid,
    cores: f64,
    last_cpu_refresh: Instant,
}

impl ProcessSource {
    /// Creates a source for a local PID and performs the CPU warmup
    /// refresh.
    pub fn new(pid: u32) -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(pid);

        system.refresh_process_specifics(
            pid,
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );

        Self {
            system,
            pid,
            cores: num_cpus::get() as f64,
            last_cpu_refresh: Instant::now(),
        }
    }
}

impl SampleSource for ProcessSource {
    fn describe(&self) -> String {
        format!("pid {}", self.pid)
    }

    fn probe(&mut self) -> Result<Probe, BenchError> {
        let now = Instant::now();
        let refresh_cpu =
            now.duration_since(self.last_cpu_refresh) >= CPU_REFRESH_INTERVAL;

        let refresh_kind = if refresh_cpu {
            ProcessRefreshKind::new().with_cpu().with_memory()
        } else {
            ProcessRefreshKind::new().with_memory()
        };

        if !self.system.refresh_process_specifics(self.pid, refresh_kind) {
            return Err(BenchError::IdentifierNotFound(self.describe()));
        }

        let process = self
            .system
            .process(self.pid)
            .ok_or_else(|| BenchError::IdentifierNotFound(self.describe()))?;

        // A spawned child we have not reaped yet shows up as a zombie
        // once it finishes; the exit code is learned by the caller's wait.
        if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
            return Ok(Probe::Exited {
                class: ExitClass::Unknown,
            });
        }

        let cpu_percent = if refresh_cpu {
            self.last_cpu_refresh = now;
            Some(f64::from(process.cpu_usage()) / self.cores)
        } else {
            None
        };

        let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
        let thread_count = thread_count(process);

        Ok(Probe::Alive {
            cpu_percent,
            memory_mb,
            thread_count,
            db_cpu_percent: None,
        })
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn thread_count(process: &sysinfo::Process) -> u64 {
    process.tasks().map(|tasks| tasks.len() as u64).unwrap_or(1)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn thread_count(_process: &sysinfo::Process) -> u64 {
    1
}
