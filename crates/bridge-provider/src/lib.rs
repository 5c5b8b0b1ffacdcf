//! Claude CLI invocation for the bridge.
//!
//! Builds argument vectors, runs the CLI under a deadline, and decodes either
//! its single JSON reply or its newline-delimited event stream into
//! protocol-neutral chunks.

mod claude_cli_client;
mod cli_executable;
mod error;
mod invocation;
mod process;
mod process_runner;
mod result_decoder;
#[cfg(any(test, feature = "test-support"))]
mod scripted_process;
mod stream_decoder;
mod types;

pub use claude_cli_client::*;
pub use cli_executable::resolve_executable;
pub use error::*;
pub use invocation::*;
pub use process::*;
pub use process_runner::*;
pub use result_decoder::{decode_process_result, decode_reply};
#[cfg(any(test, feature = "test-support"))]
pub use scripted_process::*;
pub use stream_decoder::*;
pub use types::*;
