//! Target Launching
//!
//! Materializes an algorithm's launch configuration for one parameter
//! value and starts the target: a local subprocess, or a docker-compose
//! stack whose compose file is rewritten first. Also hosts the thin
//! wrappers around the other external programs the sweep invokes (data
//! generator, compose teardown).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use log::{debug, info, warn};
use once_cell::sync::Lazy;

use crate::config::{
    format_value, write_compose_file, AlgorithmSpec, BenchConfig, CommandSpec, LaunchSpec,
};
use crate::error::BenchError;

/// Lazily-resolved compose invocation.
///
/// Newer docker installations ship compose as a plugin (`docker compose`),
/// older ones as a standalone `docker-compose` binary. Probed once at
/// first use.
pub static COMPOSE_COMMAND: Lazy<Vec<String>> = Lazy::new(|| {
    let plugin = vec!["docker".to_string(), "compose".to_string()];

    if let Ok(output) = Command::new("docker").args(["compose", "version"]).output() {
        if output.status.success() {
            debug!("Using compose plugin: docker compose");
            return plugin;
        }
    }

    if let Ok(output) = Command::new("docker-compose").arg("version").output() {
        if output.status.success() {
            debug!("Using standalone docker-compose");
            return vec!["docker-compose".to_string()];
        }
    }

    warn!("No working compose command found - container launches will fail");
    plugin
});

/// How a started target is monitored and finished.
#[derive(Debug)]
pub enum TargetKind {
    /// Local subprocess, monitored by PID and reaped with `wait`
    Process,
    /// Compose stack, monitored by container name and torn down afterwards
    Compose { file: PathBuf },
}

/// A started benchmark target with its captured output stream.
pub struct LaunchedTarget {
    pub child: Child,
    pub kind: TargetKind,
}

/// Replaces the `{value}` placeholder with the formatted parameter value.
fn substitute(text: &str, value_str: &str) -> String {
    text.replace("{value}", value_str)
}

/// Materializes the launch plan for `(algorithm, value)` and starts the
/// target with stdout/stderr captured.
///
/// # Failure
///
/// A missing binary or a failing compose invocation surfaces as
/// [`BenchError::LaunchFailure`] - fatal to that run, not retried.
pub fn launch(
    algorithm: &AlgorithmSpec,
    value: f64,
    config: &BenchConfig,
) -> Result<LaunchedTarget, BenchError> {
    let value_str = format_value(value);

    match &algorithm.launch {
        LaunchSpec::Process { program, args, env } => {
            let args: Vec<String> =
                args.iter().map(|arg| substitute(arg, &value_str)).collect();

            info!("Starting process '{}' for '{}'", program, algorithm.id);
            debug!("  args: {:?}", args);

            let mut command = Command::new(program);
            command
                .args(&args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            for (name, val) in env {
                command.env(name, substitute(val, &value_str));
            }

            let child = command.spawn().map_err(|e| BenchError::LaunchFailure {
                target: program.clone(),
                reason: e.to_string(),
            })?;

            Ok(LaunchedTarget {
                child,
                kind: TargetKind::Process,
            })
        }

        LaunchSpec::Container {
            image,
            service,
            env,
            mem_limit,
            volumes,
            ..
        } => {
            let compose = config.compose.as_ref().ok_or_else(|| {
                BenchError::Config(format!(
                    "algorithm '{}' launches a container but no compose section is configured",
                    algorithm.id
                ))
            })?;

            let env: BTreeMap<String, String> = env
                .iter()
                .map(|(k, v)| (k.clone(), substitute(v, &value_str)))
                .collect();

            write_compose_file(
                &compose.template,
                &compose.output,
                service,
                image,
                &env,
                volumes,
                mem_limit.as_deref(),
            )?;

            info!(
                "Starting compose stack for '{}' (image '{}')",
                algorithm.id, image
            );

            let (program, prefix) = COMPOSE_COMMAND
                .split_first()
                .expect("compose command is never empty");

            let child = Command::new(program)
                .args(prefix)
                .arg("-f")
                .arg(&compose.output)
                .arg("up")
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| BenchError::LaunchFailure {
                    target: image.clone(),
                    reason: e.to_string(),
                })?;

            Ok(LaunchedTarget {
                child,
                kind: TargetKind::Compose {
                    file: compose.output.clone(),
                },
            })
        }
    }
}

/// Tears a compose stack down after a container run. Best-effort: a
/// failure is logged, not propagated.
pub fn compose_down(file: &Path) {
    let (program, prefix) = COMPOSE_COMMAND
        .split_first()
        .expect("compose command is never empty");

    match Command::new(program)
        .args(prefix)
        .arg("-f")
        .arg(file)
        .arg("down")
        .output()
    {
        Ok(output) if output.status.success() => {
            debug!("Compose stack from {} torn down", file.display());
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "compose down for {} exited with {:?}: {}",
                file.display(),
                output.status.code(),
                stderr.trim()
            );
        }
        Err(e) => warn!("Failed to run compose down for {}: {}", file.display(), e),
    }
}

/// Runs the configured data generator for one parameter value and waits
/// for it to finish.
pub fn run_data_generator(spec: &CommandSpec, value: f64) -> Result<(), BenchError> {
    let value_str = format_value(value);
    let args: Vec<String> = spec
        .args
        .iter()
        .map(|arg| substitute(arg, &value_str))
        .collect();

    info!("Generating input data ({} {:?})", spec.program, args);

    let output = Command::new(&spec.program)
        .args(&args)
        .output()
        .map_err(|e| BenchError::LaunchFailure {
            target: spec.program.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BenchError::LaunchFailure {
            target: spec.program.clone(),
            reason: format!(
                "data generator exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            ),
        });
    }

    info!("Data generated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::tests::minimal_config;
    use std::io::Read;

    fn process_algorithm(program: &str, args: &[&str]) -> AlgorithmSpec {
        AlgorithmSpec {
            id: "platform".to_string(),
            launch: LaunchSpec::Process {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                env: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_substitute_value_placeholder() {
        assert_eq!(substitute("-maxDepth={value}", "3"), "-maxDepth=3");
        assert_eq!(substitute("no placeholder", "3"), "no placeholder");
        assert_eq!(substitute("{value}-{value}", "7"), "7-7");
    }

    #[test]
    fn test_launch_process_substitutes_and_captures_stdout() {
        let config = minimal_config();
        let algorithm = process_algorithm("sh", &["-c", "echo value is {value}"]);

        let mut target = launch(&algorithm, 100000.0, &config).unwrap();
        assert!(matches!(target.kind, TargetKind::Process));

        let mut stdout = String::new();
        target
            .child
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut stdout)
            .unwrap();
        target.child.wait().unwrap();

        assert_eq!(stdout.trim(), "value is 100000");
    }

    #[test]
    fn test_launch_missing_binary_is_launch_failure() {
        let config = minimal_config();
        let algorithm = process_algorithm("/nonexistent/worker", &[]);

        match launch(&algorithm, 1.0, &config) {
            Err(BenchError::LaunchFailure { target, .. }) => {
                assert_eq!(target, "/nonexistent/worker");
            }
            other => panic!("expected LaunchFailure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_run_data_generator_success() {
        let spec = CommandSpec {
            program: "true".to_string(),
            args: vec![],
        };
        assert!(run_data_generator(&spec, 1.0).is_ok());
    }

    #[test]
    fn test_run_data_generator_failure() {
        let spec = CommandSpec {
            program: "false".to_string(),
            args: vec![],
        };
        match run_data_generator(&spec, 1.0) {
            Err(BenchError::LaunchFailure { .. }) => {}
            other => panic!("expected LaunchFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_compose_command_resolved() {
        assert!(!COMPOSE_COMMAND.is_empty());
    }
}
