// Starter files written by `crucible-cli init`

use crucible_common::config::RunnerConfig;
use crucible_common::types::TestSpec;

/// Pretty JSON of the default runner configuration
pub fn default_config_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&RunnerConfig::default())
}

/// A small challenge to try `crucible-cli run` against
pub fn sample_code() -> &'static str {
    r#"fn add(a: i32, b: i32) -> i32 {
    a + b
}

fn main() {
    println!("2 + 3 = {}", add(2, 3));
}
"#
}

pub fn sample_tests() -> Vec<TestSpec> {
    vec![
        TestSpec::new("1 + 1 = 2", "add(1, 1) == 2"),
        TestSpec::new("handles negatives", "add(-4, 1) == -3"),
        TestSpec::new("uses a function", r#"USER_CODE.contains("fn add")"#),
    ]
}

pub fn sample_tests_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&sample_tests())
}
