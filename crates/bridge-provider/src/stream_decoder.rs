//! Incremental decoder for `--output-format stream-json` output.
//!
//! Decoding happens on two levels. Raw blocks from the process are split into
//! newline-terminated lines, keeping any trailing partial line buffered until
//! its terminator arrives. Each complete line is then parsed and classified by
//! its `type` tag. Lines that are blank or not JSON are skipped, because the CLI
//! is allowed to interleave diagnostic output with structured events.

use serde_json::{Map, Value};

use crate::result_decoder::{
    extract_error_message, extract_usage, is_error_record, string_field, u64_field,
};
use crate::{BridgeError, NormalizedChunk, TokenUsage};

const RECORD_SYSTEM: &str = "system";
const SUBTYPE_INIT: &str = "init";
const RECORD_STREAM_EVENT: &str = "stream_event";
const EVENT_CONTENT_BLOCK_DELTA: &str = "content_block_delta";
const DELTA_TEXT: &str = "text_delta";
const RECORD_RESULT: &str = "result";

#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    session_id: Option<String>,
    usage: Option<TokenUsage>,
    duration_ms: Option<u64>,
    failed: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one block and decodes every line it completes.
    ///
    /// Chunks decoded before a failing line are left in `out`; once a failure
    /// is returned the decoder ignores all further input.
    pub fn feed(&mut self, block: &[u8], out: &mut Vec<NormalizedChunk>) -> Result<(), BridgeError> {
        if self.failed {
            return Ok(());
        }
        let mut pending = std::mem::take(&mut self.buffer);
        let mut search_from = pending.len();
        pending.extend_from_slice(block);

        let mut line_start = 0;
        while let Some(offset) = pending[search_from..].iter().position(|byte| *byte == b'\n') {
            let line_end = search_from + offset;
            let outcome = self.decode_line(&pending[line_start..line_end], out);
            line_start = line_end + 1;
            search_from = line_start;
            if let Err(error) = outcome {
                self.failed = true;
                return Err(error);
            }
        }

        pending.drain(..line_start);
        self.buffer = pending;
        Ok(())
    }

    /// Decodes a final line the process left unterminated at end of output.
    pub fn finish(&mut self, out: &mut Vec<NormalizedChunk>) -> Result<(), BridgeError> {
        if self.failed {
            return Ok(());
        }
        let remainder = std::mem::take(&mut self.buffer);
        if let Err(error) = self.decode_line(&remainder, out) {
            self.failed = true;
            return Err(error);
        }
        Ok(())
    }

    /// The single terminal chunk carrying the last observed session, usage and duration.
    pub fn terminal_chunk(&self) -> NormalizedChunk {
        NormalizedChunk::Done {
            session_id: self.session_id.clone(),
            usage: self.usage.clone(),
            duration_ms: self.duration_ms,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn decode_line(
        &mut self,
        line: &[u8],
        out: &mut Vec<NormalizedChunk>,
    ) -> Result<(), BridgeError> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(());
        }
        let record = match serde_json::from_slice::<Value>(line) {
            Ok(Value::Object(record)) => record,
            Ok(_) => return Ok(()),
            Err(error) => {
                tracing::debug!(
                    error = %error,
                    bytes = line.len(),
                    "skipping non-json claude stream line"
                );
                return Ok(());
            }
        };

        match record.get("type").and_then(Value::as_str) {
            Some(RECORD_SYSTEM) => {
                if record.get("subtype").and_then(Value::as_str) == Some(SUBTYPE_INIT) {
                    if let Some(session_id) = string_field(&record, "session_id") {
                        self.session_id = Some(session_id);
                    }
                }
            }
            Some(RECORD_STREAM_EVENT) => {
                if let Some(text) = text_delta(&record) {
                    out.push(NormalizedChunk::Text {
                        session_id: self.session_id.clone(),
                        text: text.to_string(),
                    });
                }
            }
            Some(RECORD_RESULT) => self.apply_result_record(&record, line)?,
            _ => {}
        }
        Ok(())
    }

    fn apply_result_record(
        &mut self,
        record: &Map<String, Value>,
        raw_line: &[u8],
    ) -> Result<(), BridgeError> {
        if let Some(session_id) = string_field(record, "session_id") {
            self.session_id = Some(session_id);
        }
        if is_error_record(record) {
            return Err(BridgeError::process_failed(
                extract_error_message(record),
                Some(String::from_utf8_lossy(raw_line).into_owned()),
            ));
        }
        self.usage = Some(extract_usage(record));
        self.duration_ms = u64_field(record, "duration_ms");
        Ok(())
    }
}

fn text_delta(record: &Map<String, Value>) -> Option<&str> {
    let event = record.get("event")?.as_object()?;
    if event.get("type").and_then(Value::as_str) != Some(EVENT_CONTENT_BLOCK_DELTA) {
        return None;
    }
    let delta = event.get("delta")?.as_object()?;
    if delta.get("type").and_then(Value::as_str) != Some(DELTA_TEXT) {
        return None;
    }
    delta
        .get("text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}
