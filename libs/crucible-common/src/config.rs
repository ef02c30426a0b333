// Runner configuration shared by the API and the CLI
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config/runner.json";

/// Toolchain, limits and scratch location for execution requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub rustc: String,
    pub edition: String,
    pub opt_level: String,
    pub timeout_ms: u64,
    /// Unbounded when absent
    pub compile_timeout_ms: Option<u64>,
    /// OS temp dir when absent
    pub scratch_dir: Option<PathBuf>,
    pub workspace_prefix: String,
    pub max_source_bytes: usize,
    pub max_output_bytes: usize,
    pub max_concurrent_runs: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            rustc: "rustc".to_string(),
            edition: "2021".to_string(),
            opt_level: "0".to_string(),
            timeout_ms: 2000,
            compile_timeout_ms: None,
            scratch_dir: None,
            workspace_prefix: "rust-runner-".to_string(),
            max_source_bytes: 1024 * 1024,
            max_output_bytes: 1024 * 1024,
            max_concurrent_runs: 4,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Load from `path` if it exists, defaults otherwise, then apply env overrides
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            Self::load(config_path)?
        } else {
            info!(path = %config_path.display(), "Runner config not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load with default path (config/runner.json)
    pub fn load_default() -> Result<Self> {
        Self::load_or_default(Path::new(DEFAULT_CONFIG_PATH))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rustc) = var("CRUCIBLE_RUSTC") {
            self.rustc = rustc;
        }
        if let Some(edition) = var("CRUCIBLE_EDITION") {
            self.edition = edition;
        }
        if let Some(ms) = var("CRUCIBLE_TIMEOUT_MS") {
            self.timeout_ms = ms
                .parse()
                .with_context(|| format!("Invalid CRUCIBLE_TIMEOUT_MS: {}", ms))?;
        }
        if let Some(ms) = var("CRUCIBLE_COMPILE_TIMEOUT_MS") {
            let ms = ms
                .parse()
                .with_context(|| format!("Invalid CRUCIBLE_COMPILE_TIMEOUT_MS: {}", ms))?;
            self.compile_timeout_ms = Some(ms);
        }
        if let Some(dir) = var("CRUCIBLE_SCRATCH_DIR") {
            self.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(n) = var("CRUCIBLE_MAX_CONCURRENT_RUNS") {
            self.max_concurrent_runs = n
                .parse()
                .with_context(|| format!("Invalid CRUCIBLE_MAX_CONCURRENT_RUNS: {}", n))?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn compile_timeout(&self) -> Option<Duration> {
        self.compile_timeout_ms.map(Duration::from_millis)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
