//! Collapses a role-tagged message list into one CLI prompt.
use super::*;

const CONTINUATION_CUE: &str = "\n\nAssistant:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ComposedPrompt {
    pub(super) prompt: String,
    pub(super) system_prompt: Option<String>,
}

/// The last system message becomes the system prompt. A lone user message is
/// passed through verbatim; anything longer is rendered as a transcript that
/// ends by cueing the assistant's next turn.
pub(super) fn compose_prompt(messages: &[CompatMessage]) -> Result<ComposedPrompt, ApiError> {
    let mut system_prompt = None;
    let mut transcript = Vec::new();
    let mut user_turns = Vec::new();
    let mut assistant_turns = 0_usize;

    for message in messages {
        match message.role.as_str() {
            "system" => system_prompt = Some(message.text()),
            "user" => {
                let text = message.text();
                transcript.push(format!("User: {text}"));
                user_turns.push(text);
            }
            "assistant" => {
                assistant_turns += 1;
                transcript.push(format!("Assistant: {}", message.text()));
            }
            _ => {}
        }
    }

    if transcript.is_empty() {
        return Err(ApiError::validation(
            "messages must include at least one user or assistant message",
        ));
    }
    let prompt = match (user_turns.as_mut_slice(), assistant_turns) {
        ([single], 0) => std::mem::take(single),
        _ => transcript.join("\n\n") + CONTINUATION_CUE,
    };
    Ok(ComposedPrompt {
        prompt,
        system_prompt,
    })
}

/// Builds the CLI invocation for a compat chat request. The requested model
/// name is only echoed back, so the service default model always applies.
pub(super) fn compat_invocation(
    messages: &[CompatMessage],
    stream: bool,
) -> Result<InvocationRequest, ApiError> {
    let composed = compose_prompt(messages)?;
    Ok(InvocationRequest::new(composed.prompt)?
        .with_system_prompt(composed.system_prompt)
        .streaming(stream))
}
