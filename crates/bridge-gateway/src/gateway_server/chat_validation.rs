//! Validation of native `/v1/chat` request bodies.
use std::path::{Component, Path};

use super::*;

pub(super) const MAX_PROMPT_CHARS: usize = 100_000;
pub(super) const MAX_SYSTEM_PROMPT_CHARS: usize = 50_000;
const BLOCKED_WORKING_DIRECTORIES: [&str; 9] = [
    "/etc", "/root", "/var", "/usr", "/bin", "/sbin", "/boot", "/sys", "/proc",
];
const KNOWN_TOOLS: [&str; 11] = [
    "WebSearch",
    "WebFetch",
    "Read",
    "Write",
    "Edit",
    "Bash",
    "Glob",
    "Grep",
    "Task",
    "TodoWrite",
    "NotebookEdit",
];
const MCP_TOOL_PREFIX: &str = "mcp__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ValidatedChatRequest {
    pub(super) prompt: String,
    pub(super) session_id: Option<String>,
    pub(super) working_directory: Option<PathBuf>,
    pub(super) model: Option<String>,
    pub(super) system_prompt: Option<String>,
    pub(super) allowed_tools: Option<Vec<String>>,
}

pub(super) fn validate_native_chat_request(
    request: NativeChatRequest,
    service_working_directory: &Path,
) -> Result<ValidatedChatRequest, ApiError> {
    let prompt_chars = request.prompt.chars().count();
    if prompt_chars == 0 {
        return Err(ApiError::validation("prompt: Prompt is required"));
    }
    if prompt_chars > MAX_PROMPT_CHARS {
        return Err(ApiError::validation(format!(
            "prompt: must contain at most {MAX_PROMPT_CHARS} characters"
        )));
    }
    if let Some(system_prompt) = request.system_prompt.as_deref() {
        if system_prompt.chars().count() > MAX_SYSTEM_PROMPT_CHARS {
            return Err(ApiError::validation(format!(
                "systemPrompt: must contain at most {MAX_SYSTEM_PROMPT_CHARS} characters"
            )));
        }
    }
    let working_directory = request
        .working_directory
        .as_deref()
        .map(|raw| validate_working_directory(raw, service_working_directory))
        .transpose()?;
    if let Some(tools) = request.allowed_tools.as_deref() {
        validate_allowed_tools(tools)?;
    }

    Ok(ValidatedChatRequest {
        prompt: request.prompt,
        session_id: request.session_id,
        working_directory,
        model: request.model,
        system_prompt: request.system_prompt,
        allowed_tools: request.allowed_tools,
    })
}

fn validate_working_directory(raw: &str, base: &Path) -> Result<PathBuf, ApiError> {
    let resolved = resolve_lexically(raw, base);
    if !resolved.exists() {
        return Err(ApiError::validation(
            "workingDirectory: Working directory does not exist or is not accessible",
        ));
    }
    let blocked = BLOCKED_WORKING_DIRECTORIES
        .iter()
        .any(|blocked| resolved.starts_with(blocked));
    if blocked {
        return Err(ApiError::validation(
            "workingDirectory: Working directory is not allowed",
        ));
    }
    Ok(resolved)
}

/// Joins relative paths onto `base` and folds `.`/`..` without touching the filesystem.
pub(super) fn resolve_lexically(raw: &str, base: &Path) -> PathBuf {
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };
    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

fn validate_allowed_tools(tools: &[String]) -> Result<(), ApiError> {
    let all_known = tools
        .iter()
        .all(|tool| KNOWN_TOOLS.contains(&tool.as_str()) || tool.starts_with(MCP_TOOL_PREFIX));
    if all_known {
        return Ok(());
    }
    Err(ApiError::validation(format!(
        "allowedTools: Invalid tool name. Valid tools: {}",
        KNOWN_TOOLS.join(", ")
    )))
}
