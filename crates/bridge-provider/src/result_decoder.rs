//! Decoding of the single terminal JSON document emitted by `--output-format json`.

use serde_json::{Map, Value};

use crate::types::exit_label;
use crate::{AssistantReply, BridgeError, ProcessResult, TokenUsage};

const DEFAULT_ERROR_MESSAGE: &str = "claude cli reported an error";
const RESULT_RECORD_TYPE: &str = "result";

/// Turns a finished process execution into a reply, checking exit status first.
pub fn decode_process_result(
    result: ProcessResult,
    timeout_ms: u64,
) -> Result<AssistantReply, BridgeError> {
    if result.timed_out {
        return Err(BridgeError::Timeout { timeout_ms });
    }
    if !result.stderr.trim().is_empty() {
        tracing::debug!(stderr = result.stderr.as_str(), "claude cli stderr");
    }
    if result.exit_code != Some(0) {
        let summary = summarize_process_failure(&result.stderr, &result.stdout);
        let diagnostics = first_non_blank(&result.stderr, &result.stdout).map(str::to_string);
        return Err(BridgeError::process_failed(
            format!(
                "claude cli exited with status {}: {summary}",
                result.exit_label()
            ),
            diagnostics,
        ));
    }
    decode_reply(&result.stdout)
}

/// Parses captured stdout as one reply document.
pub fn decode_reply(stdout: &str) -> Result<AssistantReply, BridgeError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::decode("claude cli returned empty output", ""));
    }
    let value = serde_json::from_str::<Value>(trimmed).map_err(|error| {
        BridgeError::decode(format!("failed to parse claude cli output: {error}"), trimmed)
    })?;
    let Some(record) = select_result_record(&value) else {
        return Err(BridgeError::decode(
            "claude cli output did not contain a result record",
            trimmed,
        ));
    };

    if is_error_record(record) {
        return Err(BridgeError::process_failed(
            extract_error_message(record),
            Some(trimmed.to_string()),
        ));
    }

    Ok(AssistantReply {
        is_error: false,
        result: string_field(record, "result").unwrap_or_default(),
        session_id: string_field(record, "session_id").unwrap_or_default(),
        num_turns: u64_field(record, "num_turns")
            .and_then(|turns| u32::try_from(turns).ok())
            .unwrap_or(0),
        duration_ms: u64_field(record, "duration_ms").unwrap_or(0),
        usage: extract_usage(record),
    })
}

/// Older CLI builds print the whole event list as one JSON array.
fn select_result_record(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Array(entries) => entries
            .iter()
            .rev()
            .filter_map(Value::as_object)
            .find(|map| map.get("type").and_then(Value::as_str) == Some(RESULT_RECORD_TYPE)),
        _ => None,
    }
}

pub(crate) fn is_error_record(record: &Map<String, Value>) -> bool {
    record
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub(crate) fn extract_error_message(record: &Map<String, Value>) -> String {
    ["result", "error", "message"]
        .iter()
        .find_map(|key| {
            record
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|message| !message.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string())
}

pub(crate) fn extract_usage(record: &Map<String, Value>) -> TokenUsage {
    let usage = record.get("usage").and_then(Value::as_object);
    TokenUsage {
        input_tokens: usage
            .and_then(|usage| u64_field(usage, "input_tokens"))
            .unwrap_or(0),
        output_tokens: usage
            .and_then(|usage| u64_field(usage, "output_tokens"))
            .unwrap_or(0),
        cost_usd: record.get("total_cost_usd").and_then(Value::as_f64),
    }
}

pub(crate) fn string_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn u64_field(record: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = record.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|raw| *raw >= 0.0).map(|raw| raw as u64))
}

pub(crate) fn summarize_process_failure(stderr: &str, stdout: &str) -> String {
    first_non_blank(stderr, stdout)
        .map(truncate_for_log)
        .unwrap_or_else(|| "no error output".to_string())
}

fn first_non_blank<'a>(stderr: &'a str, stdout: &'a str) -> Option<&'a str> {
    [stderr.trim(), stdout.trim()]
        .into_iter()
        .find(|text| !text.is_empty())
}

fn truncate_for_log(text: &str) -> String {
    const MAX_CHARS: usize = 240;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_CHARS).collect::<String>() + "..."
}

pub(crate) fn describe_exit(exit_code: Option<i32>, stderr: &str) -> BridgeError {
    let diagnostics = Some(stderr.trim().to_string()).filter(|text| !text.is_empty());
    BridgeError::process_failed(
        format!(
            "claude cli exited with status {}: {}",
            exit_label(exit_code),
            summarize_process_failure(stderr, "")
        ),
        diagnostics,
    )
}
