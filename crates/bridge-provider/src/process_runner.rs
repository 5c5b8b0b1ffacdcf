//! Deadline-bounded execution of the CLI process.
//!
//! [`ProcessRunner::run`] collects both output channels and the exit status,
//! racing the whole collection against the deadline. [`ProcessRunner::run_streaming`]
//! hands stdout to a pump task that decodes it incrementally and forwards chunks
//! through a bounded channel, so a slow consumer holds the process back instead
//! of letting output pile up in memory.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tokio_stream::wrappers::ReceiverStream;

use crate::process::{ProcessHandle, ProcessInvocation, ProcessSpawner, SpawnedProcess};
use crate::result_decoder::describe_exit;
use crate::stream_decoder::StreamDecoder;
use crate::{BridgeError, NormalizedChunk, ProcessResult};

const STREAM_CHANNEL_CAPACITY: usize = 16;
const READ_BLOCK_BYTES: usize = 8 * 1024;

pub type ChunkItem = Result<NormalizedChunk, BridgeError>;

/// Lazy, finite sequence of decoded chunks from one streaming invocation.
///
/// Dropping the stream before it ends terminates the underlying process.
#[derive(Debug)]
pub struct ChunkStream {
    inner: ReceiverStream<ChunkItem>,
}

impl ChunkStream {
    fn from_receiver(receiver: mpsc::Receiver<ChunkItem>) -> Self {
        Self {
            inner: ReceiverStream::new(receiver),
        }
    }
}

impl Stream for ChunkStream {
    type Item = ChunkItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[derive(Clone)]
pub struct ProcessRunner {
    spawner: Arc<dyn ProcessSpawner>,
}

impl ProcessRunner {
    pub fn new(spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self { spawner }
    }

    /// Runs one process to completion or until `deadline` elapses.
    ///
    /// On expiry the process is killed, partial output is discarded and the
    /// returned result has `timed_out` set.
    pub async fn run(
        &self,
        args: Vec<String>,
        working_directory: Option<PathBuf>,
        deadline: Duration,
    ) -> Result<ProcessResult, BridgeError> {
        let invocation = ProcessInvocation {
            args,
            working_directory,
        };
        let SpawnedProcess {
            mut stdout,
            mut stderr,
            mut handle,
        } = self.spawner.spawn(&invocation).await?;

        let outcome = tokio::select! {
            collected = collect_output(stdout.as_mut(), stderr.as_mut(), handle.as_mut()) => {
                Some(collected)
            }
            _ = tokio::time::sleep(deadline) => None,
        };

        match outcome {
            Some(Ok(result)) => Ok(result),
            Some(Err(error)) => {
                kill_process(handle.as_mut()).await;
                Err(BridgeError::Io(error))
            }
            None => {
                tracing::warn!(
                    deadline_ms = duration_millis(deadline),
                    "claude cli deadline expired"
                );
                kill_process(handle.as_mut()).await;
                Ok(ProcessResult::deadline_expired())
            }
        }
    }

    /// Starts one process and returns its decoded chunks as they arrive.
    ///
    /// A deadline expiry yields a single timeout error after any chunks already
    /// delivered. Stderr is only consulted once the process exits non-zero.
    pub async fn run_streaming(
        &self,
        args: Vec<String>,
        working_directory: Option<PathBuf>,
        deadline: Duration,
    ) -> Result<ChunkStream, BridgeError> {
        let invocation = ProcessInvocation {
            args,
            working_directory,
        };
        let process = self.spawner.spawn(&invocation).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(pump_stream(process, tx, deadline));
        Ok(ChunkStream::from_receiver(rx))
    }
}

async fn collect_output(
    stdout: &mut (dyn AsyncRead + Send + Unpin),
    stderr: &mut (dyn AsyncRead + Send + Unpin),
    handle: &mut dyn ProcessHandle,
) -> std::io::Result<ProcessResult> {
    let mut stdout_bytes = Vec::new();
    let mut stderr_bytes = Vec::new();
    let (stdout_read, stderr_read) = tokio::join!(
        stdout.read_to_end(&mut stdout_bytes),
        stderr.read_to_end(&mut stderr_bytes)
    );
    stdout_read?;
    stderr_read?;
    let exit_code = handle.wait().await?;
    Ok(ProcessResult {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        timed_out: false,
    })
}

enum PumpOutcome {
    Exited {
        exit_code: Option<i32>,
        terminal: NormalizedChunk,
    },
    Failed(BridgeError),
    TimedOut,
    ConsumerGone,
}

async fn pump_stream(process: SpawnedProcess, tx: mpsc::Sender<ChunkItem>, deadline: Duration) {
    let SpawnedProcess {
        mut stdout,
        stderr,
        mut handle,
    } = process;
    let stderr_bytes = Arc::new(Mutex::new(Vec::new()));
    let mut stderr_task = tokio::spawn(drain_stderr(stderr, Arc::clone(&stderr_bytes)));
    let timer = tokio::time::sleep(deadline);
    tokio::pin!(timer);

    let outcome = pump_chunks(stdout.as_mut(), handle.as_mut(), &tx, timer.as_mut()).await;
    match outcome {
        PumpOutcome::Exited {
            exit_code: Some(0),
            terminal,
        } => {
            stderr_task.abort();
            let _ = tx.send(Ok(terminal)).await;
        }
        PumpOutcome::Exited { exit_code, .. } => {
            // A grandchild holding stderr open must not stretch the deadline.
            tokio::select! {
                _ = &mut stderr_task => {}
                _ = &mut timer => {
                    tracing::debug!("claude cli stderr still open at deadline, reporting partial output");
                    stderr_task.abort();
                }
            }
            let stderr = captured_stderr(&stderr_bytes);
            let _ = tx.send(Err(describe_exit(exit_code, &stderr))).await;
        }
        PumpOutcome::Failed(error) => {
            kill_process(handle.as_mut()).await;
            stderr_task.abort();
            let _ = tx.send(Err(error)).await;
        }
        PumpOutcome::TimedOut => {
            tracing::warn!(
                deadline_ms = duration_millis(deadline),
                "claude cli stream deadline expired"
            );
            kill_process(handle.as_mut()).await;
            stderr_task.abort();
            let _ = tx
                .send(Err(BridgeError::Timeout {
                    timeout_ms: duration_millis(deadline),
                }))
                .await;
        }
        PumpOutcome::ConsumerGone => {
            tracing::debug!("stream consumer went away, terminating claude cli");
            kill_process(handle.as_mut()).await;
            stderr_task.abort();
        }
    }
}

async fn pump_chunks(
    stdout: &mut (dyn AsyncRead + Send + Unpin),
    handle: &mut dyn ProcessHandle,
    tx: &mpsc::Sender<ChunkItem>,
    mut timer: Pin<&mut Sleep>,
) -> PumpOutcome {
    let mut decoder = StreamDecoder::new();
    let mut decoded = Vec::new();
    let mut block = vec![0_u8; READ_BLOCK_BYTES];

    loop {
        let read = tokio::select! {
            read = stdout.read(&mut block) => read,
            _ = &mut timer => return PumpOutcome::TimedOut,
            _ = tx.closed() => return PumpOutcome::ConsumerGone,
        };
        let count = match read {
            Ok(0) => break,
            Ok(count) => count,
            Err(error) => return PumpOutcome::Failed(BridgeError::Io(error)),
        };
        let fed = decoder.feed(&block[..count], &mut decoded);
        if let Some(outcome) = forward_chunks(&mut decoded, tx, timer.as_mut()).await {
            return outcome;
        }
        if let Err(error) = fed {
            return PumpOutcome::Failed(error);
        }
    }

    let finished = decoder.finish(&mut decoded);
    if let Some(outcome) = forward_chunks(&mut decoded, tx, timer.as_mut()).await {
        return outcome;
    }
    if let Err(error) = finished {
        return PumpOutcome::Failed(error);
    }

    let exit_code = tokio::select! {
        status = handle.wait() => status,
        _ = &mut timer => return PumpOutcome::TimedOut,
        _ = tx.closed() => return PumpOutcome::ConsumerGone,
    };
    match exit_code {
        Ok(exit_code) => PumpOutcome::Exited {
            exit_code,
            terminal: decoder.terminal_chunk(),
        },
        Err(error) => PumpOutcome::Failed(BridgeError::Io(error)),
    }
}

async fn forward_chunks(
    decoded: &mut Vec<NormalizedChunk>,
    tx: &mpsc::Sender<ChunkItem>,
    mut timer: Pin<&mut Sleep>,
) -> Option<PumpOutcome> {
    for chunk in decoded.drain(..) {
        tokio::select! {
            sent = tx.send(Ok(chunk)) => {
                if sent.is_err() {
                    return Some(PumpOutcome::ConsumerGone);
                }
            }
            _ = &mut timer => return Some(PumpOutcome::TimedOut),
        }
    }
    None
}

async fn drain_stderr(mut reader: Box<dyn AsyncRead + Send + Unpin>, sink: Arc<Mutex<Vec<u8>>>) {
    let mut block = vec![0_u8; READ_BLOCK_BYTES];
    loop {
        match reader.read(&mut block).await {
            Ok(0) => break,
            Ok(count) => sink
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend_from_slice(&block[..count]),
            Err(error) => {
                tracing::debug!(error = %error, "failed to drain claude cli stderr");
                break;
            }
        }
    }
}

fn captured_stderr(sink: &Mutex<Vec<u8>>) -> String {
    let bytes = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn kill_process(handle: &mut dyn ProcessHandle) {
    if let Err(error) = handle.kill().await {
        tracing::debug!(error = %error, "failed to kill claude cli process");
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
