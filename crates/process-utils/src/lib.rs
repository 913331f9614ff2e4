//! Small process-related helpers shared across the workspace.
//!
//! Besides the Windows console-window suppression, this crate owns the
//! low-level output capture used by every external tool invocation:
//! both pipes are drained concurrently while the child runs so a chatty
//! process can never stall on a full OS pipe buffer.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
///
/// The child is killed when the returned command's `Child` is dropped, so
/// abandoning the awaiting future never leaves an orphaned process behind.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}

/// Which pipe a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Everything a finished child wrote, plus its exit status.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Spawn `command` with piped stdout/stderr and wait for it to exit.
///
/// Each line is handed to `on_line` as soon as it is read, then appended to
/// the accumulated buffer for its stream. Stdin is closed.
pub async fn capture_output<F>(
    command: &mut tokio::process::Command,
    on_line: F,
) -> std::io::Result<CapturedOutput>
where
    F: Fn(OutputStream, &str) + Clone + Send + Sync + 'static,
{
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn()?;

    let stdout = child
        .stdout
        .take()
        .map(|pipe| drain(pipe, OutputStream::Stdout, on_line.clone()));
    let stderr = child
        .stderr
        .take()
        .map(|pipe| drain(pipe, OutputStream::Stderr, on_line));

    let status = child.wait().await?;

    // The readers finish at EOF, which the child's exit guarantees unless a
    // grandchild inherited the pipe.
    let stdout = join_drain(stdout).await?;
    let stderr = join_drain(stderr).await?;

    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
    })
}

fn drain<R, F>(pipe: R, stream: OutputStream, on_line: F) -> JoinHandle<std::io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: Fn(OutputStream, &str) + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        let mut buffer = String::new();
        while let Some(line) = lines.next_line().await? {
            on_line(stream, &line);
            buffer.push_str(&line);
            buffer.push('\n');
        }
        Ok(buffer)
    })
}

async fn join_drain(
    handle: Option<JoinHandle<std::io::Result<String>>>,
) -> std::io::Result<String> {
    match handle {
        Some(handle) => handle.await.map_err(std::io::Error::other)?,
        None => Ok(String::new()),
    }
}
