//! Error Types
//!
//! Typed errors for the measurement pipeline. Errors local to one
//! sample or one run are contained by their callers; only launch and
//! configuration problems are fatal to a run.

use thiserror::Error;

/// Errors raised by the measurement pipeline.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The target process or container stack could not be started.
    /// Fatal to that run; the sweep records the run as not available
    /// and moves on.
    #[error("failed to launch '{target}': {reason}")]
    LaunchFailure { target: String, reason: String },

    /// The monitored identifier (PID or container name) no longer
    /// resolves. Ends that run's sampling; partial data is kept.
    #[error("monitored target '{0}' not found")]
    IdentifierNotFound(String),

    /// A stats/inspect tool invocation failed transiently. The poll
    /// loop logs this and keeps going.
    #[error("stats query failed: {0}")]
    StatsQuery(String),

    /// The stats tool produced text we cannot parse (typically an
    /// unexpected unit string). Aborts the poll iteration, not the run.
    #[error("malformed sample field '{field}': {text:?}")]
    MalformedSample { field: &'static str, text: String },

    /// Invalid benchmark configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl BenchError {
    /// True for errors the sampling loop survives (logged, iteration
    /// skipped) rather than terminating on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BenchError::StatsQuery(_) | BenchError::MalformedSample { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BenchError::StatsQuery("docker died".into()).is_transient());
        assert!(BenchError::MalformedSample {
            field: "memory",
            text: "??".into()
        }
        .is_transient());

        assert!(!BenchError::IdentifierNotFound("bank-bank-1".into()).is_transient());
        assert!(!BenchError::LaunchFailure {
            target: "app.jar".into(),
            reason: "no such file".into()
        }
        .is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = BenchError::MalformedSample {
            field: "memory",
            text: "1.5TB".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("memory"));
        assert!(msg.contains("1.5TB"));

        let err = BenchError::IdentifierNotFound("pid 4711".into());
        assert!(err.to_string().contains("pid 4711"));
    }
}
