//! Resource Monitoring Module
//!
//! Provides point-in-time resource sampling for benchmark targets and the
//! polling loop that turns probes into append-only measurement logs.
//!
//! # Components
//!
//! - [`source`]: The [`SampleSource`] contract plus the local-process variant
//! - [`docker`]: Container variant shelling out to the docker CLI
//! - [`sampler`]: Fixed-cadence polling loop with an injectable sleeper
//! - [`sink`]: Append-only CSV sink for samples

pub mod docker;
pub mod sampler;
pub mod sink;
pub mod source;

pub use docker::{ContainerStats, DockerSource};
pub use sampler::{Sampler, Sleeper, StopReason, ThreadSleeper};
pub use sink::{Sample, SampleLog};
pub use source::{ExitClass, Probe, ProcessSource, SampleSource, CPU_REFRESH_INTERVAL};
