//! Scripted stand-in for the external CLI process.
//!
//! A [`ScriptedSpawner`] hands out processes whose stdout replays a fixed list of
//! byte blocks, one block per read, so tests control exactly where chunk
//! boundaries fall. A script can also hang after its last block to exercise the
//! deadline and disconnect paths.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use crate::process::{
    ProcessHandle, ProcessInvocation, ProcessSpawner, SpawnedProcess,
};
use crate::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessScript {
    pub stdout_blocks: Vec<Vec<u8>>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub hang_after_output: bool,
    pub hang_stderr: bool,
}

impl ProcessScript {
    /// A process that prints `blocks` and exits cleanly.
    pub fn success<I, B>(blocks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Self {
            stdout_blocks: blocks.into_iter().map(Into::into).collect(),
            stderr: Vec::new(),
            exit_code: Some(0),
            hang_after_output: false,
            hang_stderr: false,
        }
    }

    /// Splits `stdout` into blocks of at most `block_size` bytes.
    pub fn chunked(stdout: &[u8], block_size: usize) -> Self {
        Self::success(stdout.chunks(block_size.max(1)).map(<[u8]>::to_vec))
    }

    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Keeps stderr open after its bytes, as when a detached child inherits it.
    pub fn with_hanging_stderr(mut self) -> Self {
        self.hang_stderr = true;
        self
    }

    /// Keeps stdout open and the process alive after the scripted blocks.
    pub fn hanging(mut self) -> Self {
        self.hang_after_output = true;
        self
    }
}

#[derive(Debug, Default)]
struct SpawnLog {
    launches: Mutex<Vec<ProcessInvocation>>,
    kills: AtomicUsize,
}

/// Spawner that replays the same script for every launch and records each one.
#[derive(Debug, Clone)]
pub struct ScriptedSpawner {
    script: ProcessScript,
    spawn_error: Option<String>,
    log: Arc<SpawnLog>,
}

impl ScriptedSpawner {
    pub fn new(script: ProcessScript) -> Self {
        Self {
            script,
            spawn_error: None,
            log: Arc::new(SpawnLog::default()),
        }
    }

    /// A spawner whose launches always fail as if the executable were missing.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::new(ProcessScript::success(Vec::<Vec<u8>>::new()))
        }
    }

    pub fn launches(&self) -> Vec<ProcessInvocation> {
        self.log
            .launches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn kill_count(&self) -> usize {
        self.log.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessSpawner for ScriptedSpawner {
    async fn spawn(&self, invocation: &ProcessInvocation) -> Result<SpawnedProcess, BridgeError> {
        self.log
            .launches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(invocation.clone());
        if let Some(message) = self.spawn_error.as_ref() {
            return Err(BridgeError::Spawn {
                executable: "scripted-claude".to_string(),
                message: message.clone(),
            });
        }

        let hang = self.script.hang_after_output;
        Ok(SpawnedProcess {
            stdout: Box::new(ScriptedReader::new(self.script.stdout_blocks.clone(), hang)),
            stderr: Box::new(ScriptedReader::new(
                vec![self.script.stderr.clone()],
                self.script.hang_stderr,
            )),
            handle: Box::new(ScriptedHandle {
                exit_code: self.script.exit_code,
                hang,
                log: Arc::clone(&self.log),
            }),
        })
    }
}

struct ScriptedReader {
    blocks: VecDeque<Vec<u8>>,
    hang_at_end: bool,
}

impl ScriptedReader {
    fn new(blocks: Vec<Vec<u8>>, hang_at_end: bool) -> Self {
        Self {
            blocks: blocks.into_iter().filter(|block| !block.is_empty()).collect(),
            hang_at_end,
        }
    }
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let Some(mut block) = self.blocks.pop_front() else {
            if self.hang_at_end {
                return Poll::Pending;
            }
            return Poll::Ready(Ok(()));
        };
        let take = block.len().min(buf.remaining());
        buf.put_slice(&block[..take]);
        if take < block.len() {
            block.drain(..take);
            self.blocks.push_front(block);
        }
        Poll::Ready(Ok(()))
    }
}

struct ScriptedHandle {
    exit_code: Option<i32>,
    hang: bool,
    log: Arc<SpawnLog>,
}

#[async_trait]
impl ProcessHandle for ScriptedHandle {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(self.exit_code)
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.log.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
