//! BenchRunner - Concurrency Model Benchmark Driver
//!
//! Benchmarks concurrency-model implementations (platform threads,
//! virtual threads, coroutines, goroutines) shipped as external programs:
//! each worker is launched under controlled load, its resource usage is
//! sampled at a fixed cadence until it exits, and the per-run logs are
//! aggregated into comparison tables.
//!
//! # Architecture
//!
//! The library is organized into five main modules:
//!
//! - [`config`]: Benchmark configuration and compose-file rewriting
//! - [`execution`]: Launching targets and driving single runs
//! - [`monitoring`]: Resource sampling and append-only measurement logs
//! - [`sweep`]: Parameter iteration across all algorithms
//! - [`aggregate`]: Post-hoc max/mean summary tables
//!
//! # Example
//!
//! ```rust,no_run
//! use benchrunner::config::load_config;
//! use benchrunner::sweep::ExperimentSweep;
//! use benchrunner::aggregate::Aggregator;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load the benchmark definition from YAML
//!     let config = load_config("bench.yaml")?;
//!
//!     // Measure every (parameter value, algorithm) combination
//!     let algorithms: Vec<String> =
//!         config.algorithms.iter().map(|a| a.id.clone()).collect();
//!     let parameter_name = config.parameter.name.clone();
//!     let measurements_dir = config.measurements_dir.clone();
//!     ExperimentSweep::new(config).execute()?;
//!
//!     // Reduce the raw logs into summary tables
//!     Aggregator::new(measurements_dir, parameter_name, algorithms).aggregate()?;
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod sweep;

// Re-export commonly used types
pub use aggregate::Aggregator;
pub use config::{load_config, BenchConfig};
pub use error::BenchError;
pub use execution::runner::{RunOrchestrator, RunResult};
pub use sweep::ExperimentSweep;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "BenchRunner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "BenchRunner");
    }

    #[test]
    fn test_module_exports_error() {
        let err = BenchError::Config("bad".to_string());
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
