//! Argument-vector construction for the claude CLI.

use crate::InvocationRequest;

pub const OUTPUT_FORMAT_JSON: &str = "json";
pub const OUTPUT_FORMAT_STREAM_JSON: &str = "stream-json";

/// Service-wide fallbacks applied when a request leaves a field unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationDefaults {
    pub model: Option<String>,
    pub allowed_tools: Vec<String>,
}

/// Maps a request onto the ordered CLI argument list. Pure and deterministic.
pub fn build_cli_args(request: &InvocationRequest, defaults: &InvocationDefaults) -> Vec<String> {
    let mut args = vec!["-p".to_string(), request.prompt().to_string()];
    args.push("--output-format".to_string());
    if request.is_streaming() {
        args.push(OUTPUT_FORMAT_STREAM_JSON.to_string());
        // stream-json in print mode is rejected by the CLI without --verbose.
        args.push("--verbose".to_string());
        args.push("--include-partial-messages".to_string());
    } else {
        args.push(OUTPUT_FORMAT_JSON.to_string());
    }

    if let Some(session_id) = request.resume_session_id() {
        args.push("--resume".to_string());
        args.push(session_id.to_string());
    }

    let model = request
        .model()
        .or(defaults.model.as_deref())
        .map(str::trim)
        .filter(|model| !model.is_empty());
    if let Some(model) = model {
        args.push("--model".to_string());
        args.push(model.to_string());
    }

    if let Some(system_prompt) = request.system_prompt() {
        args.push("--system-prompt".to_string());
        args.push(system_prompt.to_string());
    }

    let allowed_tools = request
        .allowed_tools()
        .unwrap_or(defaults.allowed_tools.as_slice());
    if !allowed_tools.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(allowed_tools.join(","));
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|index| args.get(index + 1))
            .map(String::as_str)
    }

    #[test]
    fn unit_build_cli_args_minimal_non_streaming_request() {
        let request = InvocationRequest::new("hello").expect("request");
        let args = build_cli_args(&request, &InvocationDefaults::default());
        assert_eq!(args, ["-p", "hello", "--output-format", "json"]);
    }

    #[test]
    fn unit_build_cli_args_streaming_selects_partial_messages() {
        let request = InvocationRequest::new("hello")
            .expect("request")
            .streaming(true);
        let args = build_cli_args(&request, &InvocationDefaults::default());
        assert_eq!(flag_value(&args, "--output-format"), Some("stream-json"));
        assert!(args.iter().any(|arg| arg == "--include-partial-messages"));
        assert!(args.iter().any(|arg| arg == "--verbose"));
    }

    #[test]
    fn unit_build_cli_args_request_values_override_defaults() {
        let defaults = InvocationDefaults {
            model: Some("sonnet".to_string()),
            allowed_tools: vec!["Read".to_string()],
        };
        let request = InvocationRequest::new("hello")
            .expect("request")
            .with_resume_session_id(Some("sess-9".to_string()))
            .with_model(Some("opus".to_string()))
            .with_system_prompt(Some("Be terse".to_string()))
            .with_allowed_tools(Some(vec!["WebSearch".to_string(), "Grep".to_string()]));
        let args = build_cli_args(&request, &defaults);
        assert_eq!(flag_value(&args, "--resume"), Some("sess-9"));
        assert_eq!(flag_value(&args, "--model"), Some("opus"));
        assert_eq!(flag_value(&args, "--system-prompt"), Some("Be terse"));
        assert_eq!(flag_value(&args, "--allowedTools"), Some("WebSearch,Grep"));
    }

    #[test]
    fn unit_build_cli_args_falls_back_to_service_defaults() {
        let defaults = InvocationDefaults {
            model: Some("sonnet".to_string()),
            allowed_tools: vec!["WebSearch".to_string(), "WebFetch".to_string()],
        };
        let request = InvocationRequest::new("hello").expect("request");
        let args = build_cli_args(&request, &defaults);
        assert_eq!(flag_value(&args, "--model"), Some("sonnet"));
        assert_eq!(flag_value(&args, "--allowedTools"), Some("WebSearch,WebFetch"));
        assert!(!args.iter().any(|arg| arg == "--resume"));
        assert!(!args.iter().any(|arg| arg == "--system-prompt"));
    }

    #[test]
    fn regression_build_cli_args_omits_empty_explicit_tool_list() {
        let defaults = InvocationDefaults {
            model: None,
            allowed_tools: vec!["WebSearch".to_string()],
        };
        let request = InvocationRequest::new("hello")
            .expect("request")
            .with_allowed_tools(Some(Vec::new()));
        let args = build_cli_args(&request, &defaults);
        assert!(!args.iter().any(|arg| arg == "--allowedTools"));
        assert!(!args.iter().any(|arg| arg == "--model"));
    }

    #[test]
    fn unit_build_cli_args_is_deterministic() {
        let request = InvocationRequest::new("same")
            .expect("request")
            .with_model(Some("haiku".to_string()));
        let defaults = InvocationDefaults::default();
        assert_eq!(
            build_cli_args(&request, &defaults),
            build_cli_args(&request, &defaults)
        );
    }

    proptest::proptest! {
        #[test]
        fn property_non_streaming_args_carry_prompt_and_json_format(prompt in "[a-zA-Z0-9 ]{0,40}[a-z]") {
            let request = InvocationRequest::new(prompt.clone()).expect("request");
            let args = build_cli_args(&request, &InvocationDefaults::default());
            proptest::prop_assert_eq!(flag_value(&args, "-p"), Some(prompt.as_str()));
            proptest::prop_assert_eq!(flag_value(&args, "--output-format"), Some("json"));
            proptest::prop_assert!(!args.iter().any(|arg| arg == "--include-partial-messages"));
            proptest::prop_assert!(!args.iter().any(|arg| arg == "stream-json"));
        }
    }
}
