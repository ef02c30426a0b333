/// Harness stdout protocol - defines only semantics, not runtime logic.
/// Ensures the harness synthesizer and the output parser never drift.
///
/// Each test writes exactly one line `<TOKEN>|<description>`; every other
/// stdout line is free-form program output.

pub const PASS_TOKEN: &str = "TEST_PASS";
pub const FAIL_TOKEN: &str = "TEST_FAIL";
pub const SEPARATOR: char = '|';

/// Exit status of a harness that ran every test and saw at least one fail.
/// Kept away from 1 (common in user code) and 101 (Rust panic).
pub const HARNESS_FAILURE_EXIT_CODE: i32 = 3;

/// Symbol the submitted source is bound to inside the harness
pub const USER_CODE_SYMBOL: &str = "USER_CODE";

/// Name a user-defined `main` is renamed to when a harness entry point is added
pub const INTERNAL_MAIN: &str = "_internal_main";

/// Line prefix for a test outcome, separator included
pub fn result_prefix(passed: bool) -> String {
    let token = if passed { PASS_TOKEN } else { FAIL_TOKEN };
    format!("{}{}", token, SEPARATOR)
}

/// Description as printed by the harness: CR/LF become spaces so one test
/// is always one line
pub fn flatten_description(description: &str) -> String {
    description.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

/// Split a stdout line into a test outcome, if it is one.
/// The description is everything after the first separator.
pub fn parse_result_line(line: &str) -> Option<(bool, &str)> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if let Some(rest) = line.strip_prefix(PASS_TOKEN) {
        return rest.strip_prefix(SEPARATOR).map(|desc| (true, desc));
    }
    if let Some(rest) = line.strip_prefix(FAIL_TOKEN) {
        return rest.strip_prefix(SEPARATOR).map(|desc| (false, desc));
    }
    None
}
