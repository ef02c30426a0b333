use crate::engine::ProcessOutput;
use crucible_common::types::{ExecutionResult, TestSpec};
use thiserror::Error;

pub const TAG_COMPILATION_FAILED: &str = "Compilation failed";
pub const TAG_TIMEOUT: &str = "Timeout";
pub const TAG_RUNTIME_ERROR: &str = "Runtime Error";
pub const TAG_SYSTEM_ERROR: &str = "System error";

/// Every way a request can fail. None of these escape the executor: each is
/// folded into a well-formed `ExecutionResult` with `success: false`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("No code provided")]
    NoCodeProvided,

    #[error("Source code exceeds maximum size of {limit} bytes ({size} bytes given)")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("Compilation failed")]
    CompilationFailed { diagnostics: String },

    #[error("Execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Runtime error: {}", .output.describe_exit())]
    RuntimeError { output: Box<ProcessOutput> },

    #[error("System error: {0}")]
    SystemError(String),
}

impl RunError {
    /// Error tag attached to each failed test, if the kind maps tests at all
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            RunError::NoCodeProvided | RunError::SourceTooLarge { .. } => None,
            RunError::CompilationFailed { .. } => Some(TAG_COMPILATION_FAILED),
            RunError::Timeout { .. } => Some(TAG_TIMEOUT),
            RunError::RuntimeError { .. } => Some(TAG_RUNTIME_ERROR),
            RunError::SystemError(_) => Some(TAG_SYSTEM_ERROR),
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            RunError::NoCodeProvided => Outcome::NoCode,
            RunError::SourceTooLarge { .. } => Outcome::Rejected,
            RunError::CompilationFailed { .. } => Outcome::CompilationFailed,
            RunError::Timeout { .. } => Outcome::Timeout,
            RunError::RuntimeError { .. } => Outcome::RuntimeError,
            RunError::SystemError(_) => Outcome::SystemError,
        }
    }

    /// Convert into the caller-facing result for `specs`
    pub fn into_result(self, specs: &[TestSpec]) -> ExecutionResult {
        match self {
            RunError::NoCodeProvided | RunError::SourceTooLarge { .. } => {
                ExecutionResult::rejected(self.to_string())
            }
            RunError::CompilationFailed { diagnostics } => {
                ExecutionResult::all_failed(specs, vec![diagnostics], TAG_COMPILATION_FAILED)
            }
            RunError::Timeout { .. } => ExecutionResult::all_failed(
                specs,
                vec!["Execution Timed Out".to_string()],
                TAG_TIMEOUT,
            ),
            RunError::RuntimeError { output } => crate::evaluator::evaluate_crash(&output, specs),
            RunError::SystemError(message) => {
                ExecutionResult::all_failed(specs, vec![message], TAG_SYSTEM_ERROR)
            }
        }
    }
}

/// Coarse classification of a finished request, used for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    TestsFailed,
    NoCode,
    Rejected,
    CompilationFailed,
    Timeout,
    RuntimeError,
    SystemError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::TestsFailed => "tests_failed",
            Outcome::NoCode => "no_code",
            Outcome::Rejected => "rejected",
            Outcome::CompilationFailed => "compilation_failed",
            Outcome::Timeout => "timeout",
            Outcome::RuntimeError => "runtime_error",
            Outcome::SystemError => "system_error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<TestSpec> {
        vec![TestSpec::new("a", "true"), TestSpec::new("b", "false")]
    }

    #[test]
    fn test_no_code_rejects_without_tests() {
        let result = RunError::NoCodeProvided.into_result(&specs());
        assert!(!result.success);
        assert_eq!(result.logs, vec!["No code provided".to_string()]);
        assert!(result.tests.is_empty());
    }

    #[test]
    fn test_compilation_failed_maps_every_test() {
        let err = RunError::CompilationFailed {
            diagnostics: "error[E0425]: cannot find value `x`".to_string(),
        };
        let result = err.into_result(&specs());

        assert!(!result.success);
        assert_eq!(result.logs, vec!["error[E0425]: cannot find value `x`".to_string()]);
        assert_eq!(result.tests.len(), 2);
        assert!(result
            .tests
            .iter()
            .all(|t| !t.passed && t.error.as_deref() == Some("Compilation failed")));
    }

    #[test]
    fn test_timeout_and_system_tags() {
        let result = RunError::Timeout { timeout_ms: 2000 }.into_result(&specs());
        assert_eq!(result.logs, vec!["Execution Timed Out".to_string()]);
        assert!(result.tests.iter().all(|t| t.error.as_deref() == Some("Timeout")));

        let result = RunError::SystemError("disk full".into()).into_result(&specs());
        assert_eq!(result.logs, vec!["disk full".to_string()]);
        assert!(result.tests.iter().all(|t| t.error.as_deref() == Some("System error")));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RunError::Timeout { timeout_ms: 1 }.outcome().as_str(), "timeout");
        assert_eq!(
            RunError::SourceTooLarge { size: 2, limit: 1 }.outcome(),
            Outcome::Rejected
        );
        assert_eq!(RunError::SourceTooLarge { size: 2, limit: 1 }.tag(), None);
    }
}
