// CLI commands for running snippets locally
use anyhow::{bail, Context, Result};
use crucible_common::config::{RunnerConfig, DEFAULT_CONFIG_PATH};
use crucible_common::types::{ExecutionRequest, TestSpec};
use crucible_runner::{harness, Executor};
use std::fs;
use std::path::Path;

use crate::generator;

fn read_code(code_path: &Path) -> Result<String> {
    fs::read_to_string(code_path)
        .with_context(|| format!("Failed to read source file: {}", code_path.display()))
}

/// Load a JSON array of `{ description, test }` objects
fn read_tests(tests_path: Option<&Path>) -> Result<Vec<TestSpec>> {
    let Some(path) = tests_path else {
        return Ok(Vec::new());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tests file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse tests file: {}", path.display()))
}

fn load_config(config_path: Option<&Path>) -> Result<RunnerConfig> {
    match config_path {
        Some(path) => RunnerConfig::load_or_default(path),
        None => RunnerConfig::load_default(),
    }
}

/// Compile and run a snippet; returns whether the run succeeded
pub async fn run_snippet(
    code_path: &Path,
    tests_path: Option<&Path>,
    timeout_ms: Option<u64>,
    config_path: Option<&Path>,
) -> Result<bool> {
    let code = read_code(code_path)?;
    let tests = read_tests(tests_path)?;

    let mut config = load_config(config_path)?;
    if let Some(ms) = timeout_ms {
        config.timeout_ms = ms;
    }

    let executor = Executor::from_config(config);
    let report = executor.run(&ExecutionRequest::new(code, tests)).await;

    println!("{}", serde_json::to_string_pretty(&report.result)?);
    eprintln!(
        "{} ({} of {} tests passed, {}ms)",
        report.outcome,
        report.result.passed_count(),
        report.result.tests.len(),
        report.elapsed.as_millis()
    );

    Ok(report.result.success)
}

/// Print the synthesized harness without compiling it
pub fn print_harness(code_path: &Path, tests_path: Option<&Path>) -> Result<()> {
    let code = read_code(code_path)?;
    let tests = read_tests(tests_path)?;

    let harness = harness::synthesize(&code, &tests);
    print!("{}", harness.source);
    Ok(())
}

/// Write a default config and a sample challenge under `path`
pub fn init_project(path: &Path) -> Result<()> {
    println!("Initializing Crucible runner at: {}", path.display());

    let config_path = path.join(DEFAULT_CONFIG_PATH);
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }

    let sample_dir = path.join("challenges").join("add");
    for dir in [config_path.parent().unwrap_or(path), sample_dir.as_path()] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    fs::write(&config_path, generator::default_config_json()?)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("  Created: {}", config_path.display());

    let code_path = sample_dir.join("main.rs");
    if !code_path.exists() {
        fs::write(&code_path, generator::sample_code())?;
        println!("  Created: {}", code_path.display());
    }

    let tests_path = sample_dir.join("tests.json");
    if !tests_path.exists() {
        fs::write(&tests_path, generator::sample_tests_json()?)?;
        println!("  Created: {}", tests_path.display());
    }

    println!();
    println!("Try it:");
    println!(
        "  crucible-cli run --code {} --tests {}",
        code_path.display(),
        tests_path.display()
    );

    Ok(())
}
