use serde::{Deserialize, Serialize};

/// One named boolean check against the submitted code.
///
/// `test` is a Rust expression (or a statement block ending in a `bool`)
/// that is embedded verbatim into the synthesized harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub description: String,
    pub test: String,
}

impl TestSpec {
    pub fn new(description: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            test: test.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, tests: Vec<TestSpec>) -> Self {
        Self {
            code: code.into(),
            tests,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub description: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    pub fn passed(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            passed: true,
            error: None,
        }
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            passed: false,
            error: None,
        }
    }

    /// Failed result carrying a shared error tag such as "Timeout"
    pub fn errored(description: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            passed: false,
            error: Some(tag.into()),
        }
    }
}

/// Caller-facing outcome of one execution request.
///
/// Field order matches the JSON response body: `success`, `logs`, `tests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub logs: Vec<String>,
    pub tests: Vec<TestResult>,
}

impl ExecutionResult {
    /// Result for a request rejected before any subprocess work
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            logs: vec![reason.into()],
            tests: Vec::new(),
        }
    }

    /// Every requested test mapped to a failure with the same error tag
    pub fn all_failed(specs: &[TestSpec], logs: Vec<String>, tag: &str) -> Self {
        Self {
            success: false,
            logs,
            tests: specs
                .iter()
                .map(|spec| TestResult::errored(spec.description.clone(), tag))
                .collect(),
        }
    }

    pub fn passed_count(&self) -> usize {
        self.tests.iter().filter(|t| t.passed).count()
    }
}
