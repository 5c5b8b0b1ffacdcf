//! Invocation, reply and chunk records exchanged between the bridge layers.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::BridgeError;

/// Parameters for one assistant process invocation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    prompt: String,
    resume_session_id: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    allowed_tools: Option<Vec<String>>,
    working_directory: Option<PathBuf>,
    stream: bool,
}

impl InvocationRequest {
    pub fn new(prompt: impl Into<String>) -> Result<Self, BridgeError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(BridgeError::InvalidRequest(
                "prompt must not be empty".to_string(),
            ));
        }
        Ok(Self {
            prompt,
            resume_session_id: None,
            model: None,
            system_prompt: None,
            allowed_tools: None,
            working_directory: None,
            stream: false,
        })
    }

    pub fn with_resume_session_id(mut self, session_id: Option<String>) -> Self {
        self.resume_session_id = non_blank(session_id);
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = non_blank(model);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|value| !value.is_empty());
        self
    }

    pub fn with_allowed_tools(mut self, allowed_tools: Option<Vec<String>>) -> Self {
        self.allowed_tools = allowed_tools;
        self
    }

    pub fn with_working_directory(mut self, working_directory: Option<PathBuf>) -> Self {
        self.working_directory = working_directory;
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn resume_session_id(&self) -> Option<&str> {
        self.resume_session_id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn allowed_tools(&self) -> Option<&[String]> {
        self.allowed_tools.as_deref()
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Token accounting reported by the assistant's terminal record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: Option<f64>,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Decoded non-streaming terminal reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub is_error: bool,
    pub result: String,
    pub session_id: String,
    pub num_turns: u32,
    pub duration_ms: u64,
    pub usage: TokenUsage,
}

impl AssistantReply {
    pub fn total_cost_usd(&self) -> f64 {
        self.usage.cost_usd.unwrap_or(0.0)
    }
}

/// Decoder output unit. `Done` is emitted exactly once and always last.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedChunk {
    Text {
        session_id: Option<String>,
        text: String,
    },
    Done {
        session_id: Option<String>,
        usage: Option<TokenUsage>,
        duration_ms: Option<u64>,
    },
}

impl NormalizedChunk {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Text { session_id, .. } | Self::Done { session_id, .. } => {
                session_id.as_deref()
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Captured outcome of one blocking process execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessResult {
    pub(crate) fn deadline_expired() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn exit_label(&self) -> String {
        exit_label(self.exit_code)
    }
}

pub(crate) fn exit_label(exit_code: Option<i32>) -> String {
    exit_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "signal".to_string())
}
