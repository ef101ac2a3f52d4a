// src/exec/command.rs

//! Shell command work unit.

use std::path::PathBuf;
use std::process::Stdio;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::task::{Work, WorkContext, WorkError, WorkFuture, WorkOutput};

/// Runs a command line through the platform shell.
///
/// - exit status 0 succeeds with `{"exit_code": 0}`
/// - any other exit status is a retryable failure
/// - failing to spawn the shell is a permanent failure
/// - cancellation kills the child process
#[derive(Debug, Clone)]
pub struct ShellCommand {
    cmd: String,
    working_dir: Option<PathBuf>,
}

impl ShellCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    fn command(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn run(&self, ctx: WorkContext) -> Result<WorkOutput, WorkError> {
        info!(task = %ctx.task_id(), attempt = ctx.attempt(), cmd = %self.cmd, "starting process");

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| WorkError::permanent(format!("spawning '{}': {e}", self.cmd)))?;

        // Always consume both pipes so buffers don't fill; log at debug.
        if let Some(stdout) = child.stdout.take() {
            forward_lines(ctx.task_id().to_string(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(ctx.task_id().to_string(), "stderr", stderr);
        }

        tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| WorkError::retryable(format!("waiting for '{}': {e}", self.cmd)))?;
                let code = status.code().unwrap_or(-1);

                info!(task = %ctx.task_id(), exit_code = code, success = status.success(), "process exited");
                if status.success() {
                    Ok(json!({ "exit_code": code }))
                } else {
                    Err(WorkError::retryable(format!("'{}' exited with status {code}", self.cmd)))
                }
            }

            _ = ctx.cancelled() => {
                info!(task = %ctx.task_id(), "cancellation requested; killing process");
                if let Err(e) = child.kill().await {
                    warn!(task = %ctx.task_id(), error = %e, "failed to kill child process on cancellation");
                }
                Err(WorkError::cancelled())
            }
        }
    }
}

impl Work for ShellCommand {
    fn invoke(&self, ctx: WorkContext) -> WorkFuture<'_> {
        Box::pin(self.run(ctx))
    }
}

fn forward_lines<R>(task: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(task = %task, stream, "{}", line);
        }
    });
}
