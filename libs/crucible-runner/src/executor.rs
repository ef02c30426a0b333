/// Request Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Run one request through the pipeline and always hand back a well-formed
/// `ExecutionResult`.
///
/// **Pipeline:**
/// 1. Validate the request (no subprocess work for rejected requests)
/// 2. Acquire a workspace (released on every path, panics included)
/// 3. Synthesize the harness and write it to the workspace
/// 4. Compile, then execute under the configured timeout
/// 5. Evaluate the captured output
///
/// This module is the glue layer - it knows nothing about:
/// - How code is compiled or run (engine's job)
/// - How output lines are classified (evaluator's job)
use crate::engine::{ExitKind, Invoker, RustcInvoker};
use crate::error::{Outcome, RunError};
use crate::evaluator;
use crate::harness;
use crate::workspace::Workspace;
use crucible_common::config::RunnerConfig;
use crucible_common::types::{ExecutionRequest, ExecutionResult};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Result of one request plus its classification
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    pub result: ExecutionResult,
    pub elapsed: Duration,
}

pub struct Executor<I = RustcInvoker> {
    invoker: I,
    config: RunnerConfig,
}

impl Executor<RustcInvoker> {
    /// Executor backed by the local rustc named in `config`
    pub fn from_config(config: RunnerConfig) -> Self {
        let invoker = RustcInvoker::from_config(&config);
        Self::new(invoker, config)
    }
}

impl<I: Invoker> Executor<I> {
    pub fn new(invoker: I, config: RunnerConfig) -> Self {
        Self { invoker, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Execute a request. Never fails: every error becomes a result.
    #[instrument(skip(self, request), fields(tests = request.tests.len(), code_bytes = request.code.len()))]
    pub async fn run(&self, request: &ExecutionRequest) -> RunReport {
        let start = Instant::now();

        let pipeline = AssertUnwindSafe(self.run_pipeline(request)).catch_unwind();
        let outcome = match pipeline.await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Execution pipeline panicked");
                Err(RunError::SystemError(format!("Internal error: {}", message)))
            }
        };

        let (outcome, result) = match outcome {
            Ok(result) => {
                let outcome = if result.success {
                    Outcome::Success
                } else {
                    Outcome::TestsFailed
                };
                (outcome, result)
            }
            Err(e) => {
                match &e {
                    RunError::NoCodeProvided | RunError::SourceTooLarge { .. } => {
                        debug!(reason = %e, "Request rejected")
                    }
                    RunError::SystemError(message) => error!(error = %message, "System error"),
                    other => warn!(error = %other, "Execution failed"),
                }
                (e.outcome(), e.into_result(&request.tests))
            }
        };

        let elapsed = start.elapsed();
        info!(
            outcome = %outcome,
            passed = result.passed_count(),
            reported = result.tests.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Execution completed"
        );

        RunReport {
            outcome,
            result,
            elapsed,
        }
    }

    fn validate(&self, request: &ExecutionRequest) -> Result<(), RunError> {
        if request.code.trim().is_empty() {
            return Err(RunError::NoCodeProvided);
        }
        if request.code.len() > self.config.max_source_bytes {
            return Err(RunError::SourceTooLarge {
                size: request.code.len(),
                limit: self.config.max_source_bytes,
            });
        }
        Ok(())
    }

    async fn run_pipeline(&self, request: &ExecutionRequest) -> Result<ExecutionResult, RunError> {
        self.validate(request)?;

        // Dropped on every exit from this function, which deletes the directory
        let workspace = Workspace::acquire(&self.config.scratch_dir(), &self.config.workspace_prefix)
            .map_err(|e| RunError::SystemError(format!("Failed to create workspace: {}", e)))?;

        let harness = harness::synthesize(&request.code, &request.tests);
        debug!(
            calls_user_main = harness.calls_user_main,
            source_bytes = harness.source.len(),
            "Harness synthesized"
        );

        let source_path = workspace.source_path();
        let binary_path = workspace.binary_path();

        tokio::fs::write(&source_path, harness.source.as_bytes())
            .await
            .map_err(|e| RunError::SystemError(format!("Failed to write source file: {}", e)))?;

        self.invoker.compile(&source_path, &binary_path).await?;

        let output = self
            .invoker
            .execute(&binary_path, self.config.timeout())
            .await?;

        let result = match output.exit_kind() {
            ExitKind::Success => evaluator::evaluate(&output, &request.tests),
            // User code can exit with the reserved status too; only a complete
            // harness report with a failure makes it a test failure
            ExitKind::TestsFailed if evaluator::reports_failures(&output, &request.tests) => {
                evaluator::evaluate(&output, &request.tests)
            }
            ExitKind::TestsFailed | ExitKind::Crashed => {
                return Err(RunError::RuntimeError {
                    output: Box::new(output),
                })
            }
        };

        // Error returns above drop the guard, which removes the directory as well
        workspace.release();
        Ok(result)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
