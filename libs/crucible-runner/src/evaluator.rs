/// Output Evaluator - turns raw program output into an `ExecutionResult`
///
/// **Core Responsibility:**
/// Classify captured stdout lines into test outcomes and free-form logs, then
/// decide the overall verdict.
///
/// **Critical Properties:**
/// - Knows nothing about rustc or processes
/// - Pure function: (raw output, requested tests) → result
///
/// **Verdict Rules:**
/// - `success` = every recorded test passed AND one result per requested test
/// - The count check means dropped result lines register as failure, never
///   as vacuous success
/// - Captured stderr is kept as the last log entry and is never fatal on its own
/// - Without requested tests there is no harness, so every line is a log
use crate::engine::ProcessOutput;
use crate::error::TAG_RUNTIME_ERROR;
use crucible_common::protocol::{flatten_description, parse_result_line};
use crucible_common::types::{ExecutionResult, TestResult, TestSpec};

pub const TRUNCATED_NOTICE: &str = "[output truncated]";

/// Stdout split into protocol lines and everything else
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    pub logs: Vec<String>,
    pub tests: Vec<TestResult>,
}

/// Classify stdout line by line. Blank lines are dropped.
///
/// Result lines are only recognised when a harness printed them
/// (`harnessed`); a plain program's output is logs whatever it looks like.
pub fn parse_stdout(stdout: &str, harnessed: bool) -> ParsedOutput {
    let mut parsed = ParsedOutput::default();

    for line in stdout.lines() {
        let outcome = if harnessed { parse_result_line(line) } else { None };
        match outcome {
            Some((true, description)) => parsed.tests.push(TestResult::passed(description)),
            Some((false, description)) => parsed.tests.push(TestResult::failed(description)),
            None if !line.trim().is_empty() => parsed.logs.push(line.to_string()),
            None => {}
        }
    }

    parsed
}

fn parse_results(output: &ProcessOutput, specs: &[TestSpec]) -> ParsedOutput {
    let mut parsed = parse_stdout(&output.stdout, !specs.is_empty());
    restore_descriptions(&mut parsed.tests, specs);
    parsed
}

/// The harness prints descriptions on one line; give results at the same
/// position their original text back when it flattens to what was printed.
fn restore_descriptions(results: &mut [TestResult], specs: &[TestSpec]) {
    for (result, spec) in results.iter_mut().zip(specs) {
        if result.description != spec.description
            && result.description == flatten_description(&spec.description)
        {
            result.description = spec.description.clone();
        }
    }
}

/// Whether a reserved-code exit is backed by a complete harness report with
/// at least one failing test. Anything else exiting with that code crashed.
pub fn reports_failures(output: &ProcessOutput, specs: &[TestSpec]) -> bool {
    if specs.is_empty() {
        return false;
    }
    let parsed = parse_stdout(&output.stdout, true);
    parsed.tests.len() == specs.len() && parsed.tests.iter().any(|t| !t.passed)
}

/// Evaluate a run that exited normally (all passed, or the harness reported failures)
pub fn evaluate(output: &ProcessOutput, specs: &[TestSpec]) -> ExecutionResult {
    let parsed = parse_results(output, specs);
    let logs = finish_logs(parsed.logs, output, None);

    let all_passed = parsed.tests.iter().all(|t| t.passed);
    let correct_count = parsed.tests.len() == specs.len();

    ExecutionResult {
        success: all_passed && correct_count,
        logs,
        tests: parsed.tests,
    }
}

/// Evaluate a run that crashed part-way.
///
/// Outcomes printed before the crash are kept in order; every requested test
/// without a recorded outcome is reported failed with the runtime error tag.
pub fn evaluate_crash(output: &ProcessOutput, specs: &[TestSpec]) -> ExecutionResult {
    let parsed = parse_results(output, specs);
    let exit_line = format!("Runtime error: {}", output.describe_exit());
    let logs = finish_logs(parsed.logs, output, Some(exit_line));

    let mut tests = parsed.tests;
    let recorded = tests.len();
    tests.extend(
        specs
            .iter()
            .skip(recorded)
            .map(|spec| TestResult::errored(spec.description.clone(), TAG_RUNTIME_ERROR)),
    );

    ExecutionResult {
        success: false,
        logs,
        tests,
    }
}

fn finish_logs(mut logs: Vec<String>, output: &ProcessOutput, status_line: Option<String>) -> Vec<String> {
    if output.truncated {
        logs.push(TRUNCATED_NOTICE.to_string());
    }
    if let Some(line) = status_line {
        logs.push(line);
    }
    let stderr = output.stderr.trim_end();
    if !stderr.trim().is_empty() {
        logs.push(stderr.to_string());
    }
    logs
}
