//! Container Sample Source
//!
//! Samples a docker container through the docker CLI: one
//! `docker stats --no-stream` snapshot per poll (covering the primary and,
//! optionally, a database container in the same call), with liveness taken
//! from `docker inspect`. The CLI's plain-text output is a brittle
//! contract, so all parsing lives in dedicated functions returning typed
//! results.

use std::process::Command;

use log::{error, info, warn};

use crate::error::BenchError;

use super::source::{ExitClass, Probe, SampleSource};

/// Format string handed to `docker stats`; fields are parsed back by
/// position and comma separator.
const STATS_FORMAT: &str = "{{.Name}},{{.CPUPerc}},{{.MemUsage}},{{.PIDs}}";

/// One parsed line of `docker stats` output.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerStats {
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub pids: u64,
}

/// Container sample source.
///
/// Liveness is determined by the container lifecycle state; on a terminal
/// state the recorded exit code is fetched and classified for diagnostic
/// logging. With `stop_on_zero_pids` set, a PID count of zero also counts
/// as exited even while the lifecycle state is still `running`.
pub struct DockerSource {
    container: String,
    db_container: Option<String>,
    stop_on_zero_pids: bool,
}

impl DockerSource {
    pub fn new(
        container: impl Into<String>,
        db_container: Option<String>,
        stop_on_zero_pids: bool,
    ) -> Self {
        Self {
            container: container.into(),
            db_container,
            stop_on_zero_pids,
        }
    }

    /// Takes one `docker stats` snapshot for all monitored containers.
    fn query_stats(&self) -> Result<Vec<ContainerStats>, BenchError> {
        let mut command = Command::new("docker");
        command
            .arg("stats")
            .arg("--no-stream")
            .arg("--format")
            .arg(STATS_FORMAT)
            .arg(&self.container);

        if let Some(ref db) = self.db_container {
            command.arg(db);
        }

        let output = command
            .output()
            .map_err(|e| BenchError::StatsQuery(format!("failed to run docker stats: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BenchError::StatsQuery(format!(
                "docker stats exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(BenchError::IdentifierNotFound(self.container.clone()));
        }

        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_stats_line)
            .collect()
    }

    /// Checks the container lifecycle state; returns the exit
    /// classification once the container reached a terminal state.
    fn check_exited(&self) -> Result<Option<ExitClass>, BenchError> {
        let state = inspect_field(&self.container, "{{.State.Status}}")?;

        if state != "exited" && state != "dead" {
            return Ok(None);
        }

        let class = match inspect_field(&self.container, "{{.State.ExitCode}}") {
            Ok(text) => ExitClass::from_code(text.parse().ok()),
            Err(e) => {
                warn!("Could not read exit code of '{}': {}", self.container, e);
                ExitClass::Unknown
            }
        };

        match class {
            ExitClass::Clean => {
                info!("Container '{}' finished with exit code 0", self.container)
            }
            ExitClass::ApplicationError => error!(
                "Container '{}' finished with exit code 1 - worker reported an error",
                self.container
            ),
            _ => warn!("Container '{}' finished: {}", self.container, class),
        }

        Ok(Some(class))
    }
}

impl SampleSource for DockerSource {
    fn describe(&self) -> String {
        format!("container '{}'", self.container)
    }

    fn probe(&mut self) -> Result<Probe, BenchError> {
        let stats = self.query_stats()?;

        let primary = stats
            .iter()
            .find(|s| s.name == self.container)
            .ok_or_else(|| BenchError::IdentifierNotFound(self.container.clone()))?;

        let db_cpu_percent = self.db_container.as_ref().and_then(|db| {
            stats
                .iter()
                .find(|s| &s.name == db)
                .map(|s| s.cpu_percent)
        });

        if let Some(class) = self.check_exited()? {
            return Ok(Probe::Exited { class });
        }

        if self.stop_on_zero_pids && primary.pids == 0 {
            info!(
                "All processes in container '{}' are gone (PIDs: 0) - ending sampling",
                self.container
            );
            return Ok(Probe::Exited {
                class: ExitClass::Unknown,
            });
        }

        Ok(Probe::Alive {
            cpu_percent: Some(primary.cpu_percent),
            memory_mb: primary.memory_mb,
            thread_count: primary.pids,
            db_cpu_percent,
        })
    }
}

/// Runs `docker inspect --format <template>` and returns the trimmed output.
fn inspect_field(container: &str, template: &str) -> Result<String, BenchError> {
    let output = Command::new("docker")
        .arg("inspect")
        .arg("--format")
        .arg(template)
        .arg(container)
        .output()
        .map_err(|e| BenchError::StatsQuery(format!("failed to run docker inspect: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BenchError::StatsQuery(format!(
            "docker inspect exited with {:?}: {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Parses one line of `docker stats` output in [`STATS_FORMAT`] order.
pub fn parse_stats_line(line: &str) -> Result<ContainerStats, BenchError> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != 4 {
        return Err(BenchError::MalformedSample {
            field: "stats line",
            text: line.to_string(),
        });
    }

    Ok(ContainerStats {
        name: fields[0].trim().to_string(),
        cpu_percent: parse_percent(fields[1])?,
        memory_mb: parse_mem_usage(fields[2])?,
        pids: fields[3].trim().parse().map_err(|_| BenchError::MalformedSample {
            field: "pids",
            text: fields[3].to_string(),
        })?,
    })
}

/// Parses a percentage field like `"3.47%"`.
pub fn parse_percent(text: &str) -> Result<f64, BenchError> {
    text.trim()
        .trim_end_matches('%')
        .parse()
        .map_err(|_| BenchError::MalformedSample {
            field: "cpu",
            text: text.to_string(),
        })
}

/// Extracts the used fraction of a composite memory field like
/// `"502.3MiB / 7.6GiB"` and normalizes it to MiB.
pub fn parse_mem_usage(text: &str) -> Result<f64, BenchError> {
    let used = text.split('/').next().unwrap_or("").trim();
    parse_mem_value(used)
}

/// Normalizes a magnitude+unit memory string to MiB.
///
/// GiB-scaled values convert by a factor of 1024; unknown unit suffixes
/// are a [`BenchError::MalformedSample`].
pub fn parse_mem_value(text: &str) -> Result<f64, BenchError> {
    let trimmed = text.trim();

    let malformed = || BenchError::MalformedSample {
        field: "memory",
        text: text.to_string(),
    };

    let unit_start = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(malformed)?;
    let (magnitude, unit) = trimmed.split_at(unit_start);
    let value: f64 = magnitude.trim().parse().map_err(|_| malformed())?;

    let factor = match unit.trim() {
        "B" => 1.0 / (1024.0 * 1024.0),
        "KiB" | "kB" | "KB" => 1.0 / 1024.0,
        "MiB" | "MB" => 1.0,
        "GiB" | "GB" => 1024.0,
        _ => return Err(malformed()),
    };

    Ok(value * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mem_value_gib_to_mib() {
        assert_eq!(parse_mem_value("2.00GiB").unwrap(), 2048.0);
    }

    #[test]
    fn test_parse_mem_value_mib_identity() {
        assert_eq!(parse_mem_value("512.00MiB").unwrap(), 512.0);
    }

    #[test]
    fn test_parse_mem_value_small_units() {
        assert_eq!(parse_mem_value("1024KiB").unwrap(), 1.0);
        let bytes = parse_mem_value("1048576B").unwrap();
        assert!((bytes - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_mem_value_rejects_unknown_unit() {
        let err = parse_mem_value("1.5TB").unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("1.5TB"));

        assert!(parse_mem_value("12.3").is_err());
        assert!(parse_mem_value("garbage").is_err());
    }

    #[test]
    fn test_parse_mem_usage_takes_used_fraction() {
        assert_eq!(parse_mem_usage("502.0MiB / 7.6GiB").unwrap(), 502.0);
        assert_eq!(parse_mem_usage("2.00GiB / 8GiB").unwrap(), 2048.0);
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("3.47%").unwrap(), 3.47);
        assert_eq!(parse_percent("0.00%").unwrap(), 0.0);
        assert!(parse_percent("n/a").is_err());
    }

    #[test]
    fn test_parse_stats_line() {
        let stats =
            parse_stats_line("bank-bank-1,12.5%,1.50GiB / 8GiB,42").unwrap();
        assert_eq!(stats.name, "bank-bank-1");
        assert_eq!(stats.cpu_percent, 12.5);
        assert_eq!(stats.memory_mb, 1536.0);
        assert_eq!(stats.pids, 42);
    }

    #[test]
    fn test_parse_stats_line_wrong_field_count() {
        let err = parse_stats_line("bank-bank-1,12.5%").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_describe_names_container() {
        let source = DockerSource::new("bank-bank-1", None, false);
        assert!(source.describe().contains("bank-bank-1"));
    }
}
