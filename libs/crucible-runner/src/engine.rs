/// Execution Engine - Compiler/Runner Invoker
///
/// **Core Responsibility:**
/// Build the synthesized program with the native toolchain and run the
/// resulting binary under a wall-clock bound, capturing raw outputs.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to compile and run (local `rustc`, a fake in tests)
/// - Engine does NOT know the stdout protocol
/// - Engine does NOT decide pass/fail
/// - Engine returns raw outputs for the Evaluator to judge
///
/// **Classification:**
/// - Non-zero compiler exit: `CompilationFailed` with stderr verbatim
/// - Execution over the bound: process killed, `Timeout`
/// - Any other exit: `Ok(ProcessOutput)`, including non-zero exits, so partial
///   output printed before a crash is never lost
use crate::error::RunError;
use crucible_common::config::RunnerConfig;
use crucible_common::protocol::HARNESS_FAILURE_EXIT_CODE;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Raw result of running a binary to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    /// Some output exceeded the capture limit and was discarded
    pub truncated: bool,
    pub execution_time_ms: u64,
}

/// How a finished process ended, as far as the harness protocol is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Success,
    /// Exited with the reserved harness status. User code can exit with it
    /// too, so the output still has to confirm a harness report.
    TestsFailed,
    /// Panic, abort, signal, or a user `process::exit` with another code
    Crashed,
}

impl ProcessOutput {
    pub fn exit_kind(&self) -> ExitKind {
        match self.exit_code {
            Some(0) => ExitKind::Success,
            Some(HARNESS_FAILURE_EXIT_CODE) => ExitKind::TestsFailed,
            _ => ExitKind::Crashed,
        }
    }

    pub fn describe_exit(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("process exited with status {}", code),
            (None, Some(signal)) => format!("process terminated by signal {}", signal),
            (None, None) => "process terminated abnormally".to_string(),
        }
    }
}

/// Compile/execute capability injected into the executor.
///
/// Implementations hold no per-request state; the same value serves
/// concurrent requests.
pub trait Invoker: Send + Sync {
    /// Compile `source` into `binary`
    fn compile(
        &self,
        source: &Path,
        binary: &Path,
    ) -> impl Future<Output = Result<(), RunError>> + Send;

    /// Run `binary` to completion or until `timeout` elapses
    fn execute(
        &self,
        binary: &Path,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProcessOutput, RunError>> + Send;
}

/// Invoker backed by a local `rustc`
#[derive(Debug, Clone)]
pub struct RustcInvoker {
    rustc: PathBuf,
    edition: String,
    opt_level: String,
    compile_timeout: Option<Duration>,
    max_output_bytes: usize,
}

impl RustcInvoker {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            rustc: PathBuf::from(&config.rustc),
            edition: config.edition.clone(),
            opt_level: config.opt_level.clone(),
            compile_timeout: config.compile_timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    fn compile_command(&self, source: &Path, binary: &Path) -> Command {
        let mut cmd = Command::new(&self.rustc);
        cmd.arg(source)
            .arg("-o")
            .arg(binary)
            .arg("--edition")
            .arg(&self.edition)
            .arg("-C")
            .arg(format!("opt-level={}", self.opt_level))
            .arg("--color")
            .arg("never")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = source.parent() {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Invoker for RustcInvoker {
    async fn compile(&self, source: &Path, binary: &Path) -> Result<(), RunError> {
        let start_time = Instant::now();

        let child = self.compile_command(source, binary).spawn().map_err(|e| {
            RunError::SystemError(format!(
                "Failed to start compiler {}: {}",
                self.rustc.display(),
                e
            ))
        })?;

        // kill_on_drop stops rustc if the bound fires and the future is dropped
        let output = match self.compile_timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(
                        compile_timeout_ms = limit.as_millis() as u64,
                        "Compilation exceeded its bound"
                    );
                    return Err(RunError::CompilationFailed {
                        diagnostics: format!(
                            "Compilation exceeded {}ms and was stopped",
                            limit.as_millis()
                        ),
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| RunError::SystemError(format!("Failed to wait for compiler: {}", e)))?;

        let compilation_time_ms = start_time.elapsed().as_millis() as u64;

        if output.status.success() {
            info!(compilation_time_ms, "Compilation succeeded");
            return Ok(());
        }

        let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
        if diagnostics.trim().is_empty() {
            diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
        }
        if diagnostics.trim().is_empty() {
            diagnostics = format!("rustc exited with {}", output.status);
        }

        warn!(
            compilation_time_ms,
            error_preview = diagnostics.lines().next().unwrap_or(""),
            "Compilation failed"
        );

        Err(RunError::CompilationFailed { diagnostics })
    }

    async fn execute(&self, binary: &Path, timeout: Duration) -> Result<ProcessOutput, RunError> {
        let start_time = Instant::now();

        let mut cmd = Command::new(binary);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = binary.parent() {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RunError::SystemError(format!("Failed to start program: {}", e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunError::SystemError("Program stdout was not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunError::SystemError("Program stderr was not captured".to_string()))?;

        let limit = self.max_output_bytes;

        // HARD TIMEOUT: covers process exit and draining both pipes
        let execution = async {
            tokio::join!(
                child.wait(),
                read_capped(&mut stdout, limit),
                read_capped(&mut stderr, limit),
            )
        };

        let timeout_result = tokio::time::timeout(timeout, execution).await;

        let (status, out, err) = match timeout_result {
            Ok(results) => results,
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Execution timed out - killing process"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out process");
                }
                return Err(RunError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        let status =
            status.map_err(|e| RunError::SystemError(format!("Failed to wait for program: {}", e)))?;
        let (stdout, stdout_truncated) =
            out.map_err(|e| RunError::SystemError(format!("Failed to read program stdout: {}", e)))?;
        let (stderr, stderr_truncated) =
            err.map_err(|e| RunError::SystemError(format!("Failed to read program stderr: {}", e)))?;

        let output = ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
            signal: exit_signal(&status),
            truncated: stdout_truncated || stderr_truncated,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        };

        debug!(
            exit_code = ?output.exit_code,
            signal = ?output.signal,
            execution_time_ms = output.execution_time_ms,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            truncated = output.truncated,
            "Program finished"
        );

        Ok(output)
    }
}

/// Read at most `limit` bytes, then drain and drop the rest so the writer
/// never blocks on a full pipe.
async fn read_capped<R>(reader: &mut R, limit: usize) -> io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    (&mut *reader).take(limit as u64).read_to_end(&mut buf).await?;
    let discarded = tokio::io::copy(reader, &mut tokio::io::sink()).await?;
    Ok((buf, discarded > 0))
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_with_code(code: Option<i32>) -> ProcessOutput {
        ProcessOutput {
            exit_code: code,
            ..Default::default()
        }
    }

    #[test]
    fn test_exit_kind() {
        assert_eq!(output_with_code(Some(0)).exit_kind(), ExitKind::Success);
        assert_eq!(
            output_with_code(Some(HARNESS_FAILURE_EXIT_CODE)).exit_kind(),
            ExitKind::TestsFailed
        );
        assert_eq!(output_with_code(Some(101)).exit_kind(), ExitKind::Crashed);
        assert_eq!(output_with_code(Some(1)).exit_kind(), ExitKind::Crashed);
        assert_eq!(output_with_code(None).exit_kind(), ExitKind::Crashed);
    }

    #[test]
    fn test_describe_exit() {
        assert_eq!(
            output_with_code(Some(101)).describe_exit(),
            "process exited with status 101"
        );
        let killed = ProcessOutput {
            exit_code: None,
            signal: Some(9),
            ..Default::default()
        };
        assert_eq!(killed.describe_exit(), "process terminated by signal 9");
    }

    #[tokio::test]
    async fn test_read_capped_truncates_and_drains() {
        let data = vec![b'x'; 100];
        let mut reader: &[u8] = &data;
        let (buf, truncated) = read_capped(&mut reader, 10).await.unwrap();
        assert_eq!(buf.len(), 10);
        assert!(truncated);
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_read_capped_under_limit() {
        let mut reader: &[u8] = b"hello\n";
        let (buf, truncated) = read_capped(&mut reader, 1024).await.unwrap();
        assert_eq!(buf, b"hello\n");
        assert!(!truncated);
    }

    #[test]
    fn test_compile_command_uses_low_optimization() {
        let invoker = RustcInvoker::from_config(&RunnerConfig::default());
        let cmd = invoker.compile_command(Path::new("/ws/main.rs"), Path::new("/ws/main"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.as_std().get_program(), "rustc");
        assert_eq!(
            args,
            vec![
                "/ws/main.rs", "-o", "/ws/main", "--edition", "2021", "-C", "opt-level=0",
                "--color", "never"
            ]
        );
        assert_eq!(cmd.as_std().get_current_dir(), Some(Path::new("/ws")));
    }
}
