//! Narrow process seam between the runner and the operating system.
//!
//! The runner only ever sees a [`SpawnedProcess`]: two byte readers and a handle
//! that can be awaited or killed. Production code spawns the real CLI through
//! [`TokioProcessSpawner`]; tests substitute a scripted fake.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use crate::BridgeError;

pub type ProcessReader = Box<dyn AsyncRead + Send + Unpin>;

/// One launch of the external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
}

/// Lifecycle control over a running process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Waits for exit. `None` means the process ended without an exit code.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;

    async fn kill(&mut self) -> std::io::Result<()>;
}

pub struct SpawnedProcess {
    pub stdout: ProcessReader,
    pub stderr: ProcessReader,
    pub handle: Box<dyn ProcessHandle>,
}

#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    async fn spawn(&self, invocation: &ProcessInvocation) -> Result<SpawnedProcess, BridgeError>;
}

/// Spawns the real executable with piped stdout/stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokioProcessSpawner {
    executable: String,
}

impl TokioProcessSpawner {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

#[async_trait]
impl ProcessSpawner for TokioProcessSpawner {
    async fn spawn(&self, invocation: &ProcessInvocation) -> Result<SpawnedProcess, BridgeError> {
        let mut command = Command::new(&self.executable);
        command.kill_on_drop(true);
        command.args(&invocation.args);
        if let Some(cwd) = invocation.working_directory.as_ref() {
            command.current_dir(cwd);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = spawn_with_text_file_busy_retry(&mut command, &self.executable).await?;
        let stdout = child.stdout.take().ok_or_else(|| BridgeError::Spawn {
            executable: self.executable.clone(),
            message: "stdout pipe unavailable".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| BridgeError::Spawn {
            executable: self.executable.clone(),
            message: "stderr pipe unavailable".to_string(),
        })?;
        tracing::debug!(
            executable = self.executable.as_str(),
            pid = child.id(),
            "claude cli spawned"
        );

        Ok(SpawnedProcess {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            handle: Box::new(TokioChildHandle { child }),
        })
    }
}

struct TokioChildHandle {
    child: Child,
}

#[async_trait]
impl ProcessHandle for TokioChildHandle {
    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

async fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    executable: &str,
) -> Result<Child, BridgeError> {
    const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;
    for attempt in 0..=MAX_TEXT_FILE_BUSY_RETRIES {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error) => {
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES
                {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    continue;
                }
                return Err(BridgeError::Spawn {
                    executable: executable.to_string(),
                    message: error.to_string(),
                });
            }
        }
    }

    Err(BridgeError::Spawn {
        executable: executable.to_string(),
        message: "unknown error".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn regression_spawn_reports_missing_executable() {
        let spawner = TokioProcessSpawner::new("/nonexistent/claude-bridge-missing-cli");
        let error = match spawner
            .spawn(&ProcessInvocation {
                args: vec!["-p".to_string(), "hi".to_string()],
                working_directory: None,
            })
            .await
        {
            Ok(_) => panic!("spawn of missing executable should fail"),
            Err(error) => error,
        };
        assert_eq!(error.reason_code(), "claude_cli_spawn_failed");
        assert!(error
            .to_string()
            .contains("/nonexistent/claude-bridge-missing-cli"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn integration_spawn_pipes_stdout_and_honors_working_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spawner = TokioProcessSpawner::new("pwd");
        let mut process = spawner
            .spawn(&ProcessInvocation {
                args: Vec::new(),
                working_directory: Some(dir.path().to_path_buf()),
            })
            .await
            .expect("spawn pwd");
        let mut stdout = String::new();
        process
            .stdout
            .read_to_string(&mut stdout)
            .await
            .expect("read stdout");
        let exit_code = process.handle.wait().await.expect("wait");
        assert_eq!(exit_code, Some(0));
        let reported = std::fs::canonicalize(stdout.trim()).expect("canonical stdout");
        let expected = std::fs::canonicalize(dir.path()).expect("canonical tempdir");
        assert_eq!(reported, expected);
    }
}
