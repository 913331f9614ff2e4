//! External process runner.
//!
//! Runs one tool invocation to completion and turns a non-zero exit into a
//! distinguishable [`Error::Process`]; an unsuccessful run never comes back
//! as an empty success.

use std::path::Path;
use std::time::{Duration, Instant};

use process_utils::OutputStream;
use tracing::{debug, warn};

use crate::config::ToolConfig;
use crate::{Error, Result};

/// Captured result of a finished external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProcessResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Spawns external tools. Holds no per-call state, so one runner can serve
/// any number of concurrent jobs.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Run `tool` with its base arguments followed by `args`, inside `working_dir`.
    pub async fn run(
        &self,
        tool: &ToolConfig,
        args: &[String],
        working_dir: &Path,
    ) -> Result<ExternalProcessResult> {
        let program = program_name(&tool.program);
        let start = Instant::now();

        let mut cmd = process_utils::tokio_command(&tool.program);
        cmd.args(&tool.base_args).args(args).current_dir(working_dir);

        debug!(program = %program, args = ?args, dir = %working_dir.display(), "Spawning external process");

        let line_program = program.clone();
        let capture = process_utils::capture_output(&mut cmd, move |stream, line| match stream {
            OutputStream::Stdout => debug!(program = %line_program, "stdout: {}", line),
            OutputStream::Stderr if line.to_lowercase().contains("error") => {
                warn!(program = %line_program, "stderr: {}", line)
            }
            OutputStream::Stderr => debug!(program = %line_program, "stderr: {}", line),
        });

        let captured = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, capture).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(program = %program, timeout = ?limit, "External process timed out and was killed");
                    return Err(Error::Process {
                        program,
                        exit_code: None,
                        stderr: format!("killed after exceeding the {:?} process timeout", limit),
                    });
                }
            },
            None => capture.await,
        }
        .map_err(|e| Error::Process {
            program: program.clone(),
            exit_code: None,
            stderr: format!("failed to run {}: {}", tool.program, e),
        })?;

        let result = ExternalProcessResult {
            exit_code: captured.status.code(),
            stdout: captured.stdout,
            stderr: captured.stderr,
        };

        debug!(
            program = %program,
            exit_code = ?result.exit_code,
            elapsed = ?start.elapsed(),
            "External process exited"
        );

        if !captured.status.success() {
            return Err(Error::Process {
                program,
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

fn program_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> ToolConfig {
        ToolConfig::new("sh").with_base_args(["-c", script, "tool"])
    }

    #[tokio::test]
    async fn test_success_captures_output() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::default();

        let result = runner
            .run(&sh("echo \"$1\"; echo warn 1>&2"), &["hello".to_string()], dir.path())
            .await
            .unwrap();

        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "warn\n");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = TempDir::new().unwrap();
        ProcessRunner::default()
            .run(&sh("touch created.txt"), &[], dir.path())
            .await
            .unwrap();
        assert!(dir.path().join("created.txt").exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_process_error() {
        let dir = TempDir::new().unwrap();
        let err = ProcessRunner::default()
            .run(
                &sh("echo 'ERROR: Video unavailable' 1>&2; exit 1"),
                &[],
                dir.path(),
            )
            .await
            .unwrap_err();

        match err {
            Error::Process {
                program,
                exit_code,
                stderr,
            } => {
                assert_eq!(program, "sh");
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "ERROR: Video unavailable\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_process_error() {
        let dir = TempDir::new().unwrap();
        let err = ProcessRunner::default()
            .run(&ToolConfig::new("/nonexistent/yt-dlp"), &[], dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Process { exit_code: None, ref program, .. } if program == "yt-dlp"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(Some(Duration::from_millis(200)));
        let start = Instant::now();

        let err = runner
            .run(&sh("sleep 10"), &[], dir.path())
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(5));
        match err {
            Error::Process {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, None);
                assert!(stderr.contains("process timeout"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
