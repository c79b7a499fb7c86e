//! Benchmark Configuration Model
//!
//! Core data structures describing a benchmark sweep: which concurrency
//! implementations to measure, how to launch each one, and which parameter
//! to vary between runs.
//!
//! # Example YAML Format
//!
//! ```yaml
//! parameter:
//!   name: transactions
//!   range:
//!     start: 100000
//!     end: 300000
//!     step: 100000
//!
//! readiness_marker: "File imported."
//!
//! algorithms:
//!   - id: platform
//!     launch:
//!       kind: process
//!       program: java
//!       args: ["-Xms4g", "-Xmx4g", "-jar", "executables/bank.jar", "platform", "{value}"]
//!
//!   - id: goroutines
//!     launch:
//!       kind: container
//!       image: bank-go
//!       service: bank
//!       container: bank-bank-1
//!       env:
//!         ALGORITHM: GOROUTINE
//!         NUMBER_OF_TRANSACTIONS: "{value}"
//!
//! compose:
//!   template: docker-compose_template.yaml
//! ```

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Top-level benchmark configuration.
///
/// Passed explicitly into the sweep and orchestrator; there is no
/// process-wide implicit state.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BenchConfig {
    /// The experiment parameter driving repeated measurement
    pub parameter: ParameterSpec,

    /// Concurrency implementations to compare, in run order
    pub algorithms: Vec<AlgorithmSpec>,

    /// Substring the worker prints on stdout once its setup phase is done
    #[serde(default = "default_readiness_marker")]
    pub readiness_marker: String,

    /// Nominal polling interval in milliseconds
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Settle time between successive runs, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Directory receiving all measurement CSVs
    #[serde(default = "default_measurements_dir")]
    pub measurements_dir: PathBuf,

    /// Optional data generator invoked once per parameter value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_generator: Option<CommandSpec>,

    /// Compose settings, required when any algorithm launches a container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<ComposeConfig>,

    /// Stop container sampling when the PID count reaches zero, even if
    /// the container lifecycle state is still `running`
    #[serde(default)]
    pub stop_on_zero_pids: bool,
}

/// The independent variable of the sweep (transaction count, delay,
/// list length, recursion depth, ...).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParameterSpec {
    /// Column name used in every log header (e.g. "transactions")
    pub name: String,

    /// Explicit value list; takes precedence over `range`
    #[serde(default)]
    pub values: Vec<f64>,

    /// Inclusive arithmetic range, used when `values` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ParameterRange>,
}

/// Inclusive `{start, end, step}` range of parameter values.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParameterRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl ParameterSpec {
    /// Expands the spec into the ordered sequence of parameter values.
    pub fn expand(&self) -> Vec<f64> {
        if !self.values.is_empty() {
            return self.values.clone();
        }

        let mut out = Vec::new();
        if let Some(ref range) = self.range {
            if range.step > 0.0 {
                let mut v = range.start;
                // Tolerance so float accumulation doesn't drop the endpoint
                while v <= range.end + range.step * 1e-9 {
                    out.push(v);
                    v += range.step;
                }
            }
        }
        out
    }
}

/// One concurrency implementation under benchmark.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AlgorithmSpec {
    /// Identifier used in log file names and summary column names
    pub id: String,

    /// How to start the target for one run
    pub launch: LaunchSpec,
}

/// Launch description for a benchmark target.
///
/// `args` and `env` values may contain the `{value}` placeholder, which is
/// replaced with the current parameter value at launch time.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchSpec {
    /// A local subprocess, monitored by PID
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },

    /// A docker-compose service, monitored by container name
    Container {
        image: String,
        /// Service key inside the compose file
        service: String,
        /// Runtime container name queried by `docker stats`/`inspect`
        container: String,
        /// Optional second container (e.g. the database) whose CPU is
        /// recorded alongside the primary one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        db_container: Option<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Compose `mem_limit` value, e.g. "4g"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mem_limit: Option<String>,
        /// Volume mounts written into the compose service
        #[serde(default)]
        volumes: Vec<String>,
    },
}

impl LaunchSpec {
    /// Display name of the launch target (binary or image).
    pub fn target(&self) -> &str {
        match self {
            LaunchSpec::Process { program, .. } => program,
            LaunchSpec::Container { image, .. } => image,
        }
    }

    /// True for container launches.
    pub fn is_container(&self) -> bool {
        matches!(self, LaunchSpec::Container { .. })
    }
}

/// An opaque external command (program plus fixed arguments).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Compose tool settings shared by all container launches.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ComposeConfig {
    /// Compose template that gets rewritten per algorithm
    pub template: PathBuf,

    /// Where the rewritten compose file is placed
    #[serde(default = "default_compose_output")]
    pub output: PathBuf,
}

fn default_readiness_marker() -> String {
    "File imported.".to_string()
}

fn default_sample_interval_ms() -> u64 {
    200
}

fn default_cooldown_secs() -> u64 {
    5
}

fn default_measurements_dir() -> PathBuf {
    PathBuf::from("measurements")
}

fn default_compose_output() -> PathBuf {
    PathBuf::from("docker-compose_modify.yaml")
}

/// Formats a parameter value the way it appears in CSV cells and launch
/// arguments: integral values without a decimal point.
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

impl BenchConfig {
    /// Checks the configuration for problems that would only surface
    /// mid-sweep otherwise.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.parameter.name.trim().is_empty() {
            return Err(BenchError::Config("parameter name is empty".into()));
        }

        if self.parameter.expand().is_empty() {
            return Err(BenchError::Config(
                "parameter sweep is empty: provide 'values' or a 'range' with a positive step"
                    .into(),
            ));
        }

        if let Some(ref range) = self.parameter.range {
            if self.parameter.values.is_empty() && range.step <= 0.0 {
                return Err(BenchError::Config(format!(
                    "parameter range step must be positive, got {}",
                    range.step
                )));
            }
        }

        if self.algorithms.is_empty() {
            return Err(BenchError::Config("no algorithms configured".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for algorithm in &self.algorithms {
            if algorithm.id.trim().is_empty() {
                return Err(BenchError::Config("algorithm with empty id".into()));
            }
            if algorithm.id.contains('/') || algorithm.id.contains('\\') {
                return Err(BenchError::Config(format!(
                    "algorithm id '{}' must not contain path separators",
                    algorithm.id
                )));
            }
            if !seen.insert(algorithm.id.clone()) {
                return Err(BenchError::Config(format!(
                    "duplicate algorithm id '{}'",
                    algorithm.id
                )));
            }
            if algorithm.launch.is_container() && self.compose.is_none() {
                return Err(BenchError::Config(format!(
                    "algorithm '{}' launches a container but no 'compose' section is configured",
                    algorithm.id
                )));
            }
        }

        if self.sample_interval_ms == 0 {
            return Err(BenchError::Config("sample_interval_ms must be > 0".into()));
        }

        Ok(())
    }
}

/// Loads and validates a benchmark configuration file.
///
/// YAML is the native format; files ending in `.json` are parsed as JSON.
///
/// # Example
///
/// ```rust,no_run
/// use benchrunner::config::load_config;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("bench.yaml")?;
///     println!("{} algorithms", config.algorithms.len());
///     Ok(())
/// }
/// ```
pub fn load_config(path: &str) -> Result<BenchConfig, Box<dyn Error>> {
    info!("Loading benchmark config from: {}", path);

    let content = fs::read_to_string(path).map_err(|e| {
        format!(
            "Failed to read config file '{}': {}. Check that the file exists and is readable.",
            path, e
        )
    })?;

    debug!("Config content loaded ({} bytes)", content.len());

    let is_json = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let config: BenchConfig = if is_json {
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config JSON: {}", e))?
    } else {
        serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse config YAML: {}", e))?
    };

    config.validate()?;

    info!(
        "Config loaded: {} algorithms, {} parameter values",
        config.algorithms.len(),
        config.parameter.expand().len()
    );

    Ok(config)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    pub(crate) fn process_algorithm(id: &str) -> AlgorithmSpec {
        AlgorithmSpec {
            id: id.to_string(),
            launch: LaunchSpec::Process {
                program: "sleep".to_string(),
                args: vec!["1".to_string()],
                env: BTreeMap::new(),
            },
        }
    }

    pub(crate) fn minimal_config() -> BenchConfig {
        BenchConfig {
            parameter: ParameterSpec {
                name: "transactions".to_string(),
                values: vec![100.0, 200.0],
                range: None,
            },
            algorithms: vec![process_algorithm("platform")],
            readiness_marker: default_readiness_marker(),
            sample_interval_ms: default_sample_interval_ms(),
            cooldown_secs: 0,
            measurements_dir: default_measurements_dir(),
            data_generator: None,
            compose: None,
            stop_on_zero_pids: false,
        }
    }

    #[test]
    fn test_parameter_expand_values_win() {
        let spec = ParameterSpec {
            name: "n".to_string(),
            values: vec![1.0, 2.0],
            range: Some(ParameterRange {
                start: 10.0,
                end: 20.0,
                step: 5.0,
            }),
        };
        assert_eq!(spec.expand(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_parameter_expand_range_inclusive() {
        let spec = ParameterSpec {
            name: "transactions".to_string(),
            values: vec![],
            range: Some(ParameterRange {
                start: 100000.0,
                end: 300000.0,
                step: 100000.0,
            }),
        };
        assert_eq!(spec.expand(), vec![100000.0, 200000.0, 300000.0]);
    }

    #[test]
    fn test_parameter_expand_empty() {
        let spec = ParameterSpec {
            name: "n".to_string(),
            values: vec![],
            range: None,
        };
        assert!(spec.expand().is_empty());
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(100000.0), "100000");
        assert_eq!(format_value(0.5), "0.5");
        assert_eq!(format_value(3.0), "3");
    }

    #[test]
    fn test_validate_minimal_ok() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_sweep() {
        let mut config = minimal_config();
        config.parameter.values.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut config = minimal_config();
        config.algorithms.push(process_algorithm("platform"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_container_requires_compose() {
        let mut config = minimal_config();
        config.algorithms.push(AlgorithmSpec {
            id: "goroutines".to_string(),
            launch: LaunchSpec::Container {
                image: "bank-go".to_string(),
                service: "bank".to_string(),
                container: "bank-bank-1".to_string(),
                db_container: None,
                env: BTreeMap::new(),
                mem_limit: None,
                volumes: vec![],
            },
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("compose"));
    }

    #[test]
    fn test_load_config_yaml() {
        let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
parameter:
  name: max_depth
  range:
    start: 0
    end: 3
    step: 1
algorithms:
  - id: platform
    launch:
      kind: process
      program: java
      args: ["-jar", "mergesort.jar", "platform", "{{value}}"]
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.parameter.name, "max_depth");
        assert_eq!(config.parameter.expand().len(), 4);
        assert_eq!(config.readiness_marker, "File imported.");
        assert_eq!(config.sample_interval_ms, 200);
        assert!(!config.algorithms[0].launch.is_container());
    }

    #[test]
    fn test_load_config_json() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
  "parameter": {{"name": "delay", "values": [0.5, 1.0]}},
  "algorithms": [
    {{"id": "virtual",
      "launch": {{"kind": "process", "program": "worker"}}}}
  ]
}}"#
        )
        .unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.parameter.expand(), vec![0.5, 1.0]);
        assert_eq!(config.algorithms[0].id, "virtual");
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/bench.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_launch_target_names() {
        let config = minimal_config();
        assert_eq!(config.algorithms[0].launch.target(), "sleep");
    }
}
