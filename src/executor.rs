//! Shell command launcher.
//!
//! Runs one command line through the platform shell (`sh -c`, or `cmd /C`
//! on Windows) with stdin closed. Standard output is copied to the
//! caller's writer as it arrives and also buffered; standard error is only
//! buffered.
//!
//! A command that cannot be started reports exit code 1 with the launch
//! error as its stderr. A command killed by a signal also reports 1.

use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn failed(&self) -> bool {
        self.exit_code != 0
    }

    fn launch_failure(error: impl std::fmt::Display) -> Self {
        Self {
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: error.to_string(),
        }
    }
}

fn shell_command(command_line: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command_line]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command_line]);
        cmd
    }
}

/// Run `command_line`, streaming stdout to the process's own stdout.
pub async fn run_command(command_line: &str) -> CommandOutput {
    let mut out = tokio::io::stdout();
    run_command_with_output(command_line, &mut out).await
}

/// Run `command_line`, streaming stdout to `out`.
pub async fn run_command_with_output<W>(command_line: &str, out: &mut W) -> CommandOutput
where
    W: AsyncWrite + Unpin,
{
    let mut cmd = shell_command(command_line);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::debug!(command = command_line, error = %e, "failed to launch command");
            return CommandOutput::launch_failure(e);
        }
    };

    let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return CommandOutput::launch_failure("child process pipes unavailable");
    };

    // stderr drains concurrently so a chatty child cannot block on a full pipe.
    let stderr_handle = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let stdout_buf = tee(stdout, out).await;

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => return CommandOutput::launch_failure(e),
    };
    let stderr_buf = stderr_handle.await.unwrap_or_default();

    CommandOutput {
        exit_code: status.code().unwrap_or(LAUNCH_FAILURE_EXIT_CODE),
        stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
    }
}

/// Copy `reader` into `out` chunk by chunk, returning everything read.
async fn tee<R, W>(mut reader: R, out: &mut W) -> Vec<u8>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                captured.extend_from_slice(&chunk[..n]);
                // A closed terminal must not stop the capture.
                let _ = out.write_all(&chunk[..n]).await;
                let _ = out.flush().await;
            }
        }
    }
    captured
}
