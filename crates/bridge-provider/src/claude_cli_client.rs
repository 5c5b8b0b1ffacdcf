use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::invocation::{build_cli_args, InvocationDefaults};
use crate::process::{ProcessSpawner, TokioProcessSpawner};
use crate::process_runner::{ChunkStream, ProcessRunner};
use crate::result_decoder::decode_process_result;
use crate::{AssistantReply, BridgeError, InvocationRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeCliConfig {
    pub executable: String,
    pub timeout_ms: u64,
    pub default_model: Option<String>,
    pub default_allowed_tools: Vec<String>,
}

impl ClaudeCliConfig {
    fn invocation_defaults(&self) -> InvocationDefaults {
        InvocationDefaults {
            model: self
                .default_model
                .as_ref()
                .map(|model| model.trim().to_string())
                .filter(|model| !model.is_empty()),
            allowed_tools: self.default_allowed_tools.clone(),
        }
    }
}

/// The assistant as seen by the HTTP layer: one blocking and one streaming call.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    async fn invoke(&self, request: &InvocationRequest) -> Result<AssistantReply, BridgeError>;

    async fn invoke_streaming(
        &self,
        request: &InvocationRequest,
    ) -> Result<ChunkStream, BridgeError>;
}

#[derive(Clone)]
pub struct ClaudeCliClient {
    config: ClaudeCliConfig,
    defaults: InvocationDefaults,
    runner: ProcessRunner,
}

impl ClaudeCliClient {
    pub fn new(config: ClaudeCliConfig) -> Result<Self, BridgeError> {
        let spawner = Arc::new(TokioProcessSpawner::new(config.executable.trim()));
        Self::with_spawner(config, spawner)
    }

    /// Builds a client that launches processes through `spawner` instead of the OS.
    pub fn with_spawner(
        config: ClaudeCliConfig,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Result<Self, BridgeError> {
        if config.executable.trim().is_empty() {
            return Err(BridgeError::InvalidRequest(
                "claude cli executable is empty".to_string(),
            ));
        }
        if config.timeout_ms == 0 {
            return Err(BridgeError::InvalidRequest(
                "claude cli timeout must be greater than 0ms".to_string(),
            ));
        }
        Ok(Self {
            defaults: config.invocation_defaults(),
            config,
            runner: ProcessRunner::new(spawner),
        })
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }
}

#[async_trait]
impl AssistantClient for ClaudeCliClient {
    async fn invoke(&self, request: &InvocationRequest) -> Result<AssistantReply, BridgeError> {
        if request.is_streaming() {
            return Err(BridgeError::InvalidRequest(
                "streaming requests must use invoke_streaming".to_string(),
            ));
        }
        let args = build_cli_args(request, &self.defaults);
        tracing::debug!(
            resume = request.resume_session_id().is_some(),
            prompt_chars = request.prompt().chars().count(),
            "invoking claude cli"
        );
        let result = self
            .runner
            .run(
                args,
                request.working_directory().map(|dir| dir.to_path_buf()),
                self.deadline(),
            )
            .await?;
        let reply = decode_process_result(result, self.config.timeout_ms)?;
        tracing::debug!(
            session_id = reply.session_id.as_str(),
            duration_ms = reply.duration_ms,
            input_tokens = reply.usage.input_tokens,
            output_tokens = reply.usage.output_tokens,
            "claude cli reply decoded"
        );
        Ok(reply)
    }

    async fn invoke_streaming(
        &self,
        request: &InvocationRequest,
    ) -> Result<ChunkStream, BridgeError> {
        if !request.is_streaming() {
            return Err(BridgeError::InvalidRequest(
                "non-streaming requests must use invoke".to_string(),
            ));
        }
        let args = build_cli_args(request, &self.defaults);
        tracing::debug!(
            resume = request.resume_session_id().is_some(),
            prompt_chars = request.prompt().chars().count(),
            "invoking claude cli stream"
        );
        self.runner
            .run_streaming(
                args,
                request.working_directory().map(|dir| dir.to_path_buf()),
                self.deadline(),
            )
            .await
    }
}
