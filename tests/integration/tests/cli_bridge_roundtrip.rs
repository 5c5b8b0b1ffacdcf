#![cfg(unix)]
//! End-to-end runs against a shell script standing in for the claude CLI.

use std::{
    fs,
    net::SocketAddr,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bridge_gateway::{build_gateway_router, GatewayServerConfig, DEFAULT_COMPAT_MODEL_NAME};
use bridge_provider::{ClaudeCliClient, ClaudeCliConfig};
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

const API_KEY: &str = "integration-key";

const STREAM_SCRIPT_BODY: &str = r#"
printf '%s\n' '{"type":"system","subtype":"init","session_id":"it-stream"}'
sleep 0.05
printf '%s\n' '{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Bonjour"}}}'
sleep 0.05
printf '%s\n' '{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" ✓"}}}'
printf '%s\n' '{"type":"result","subtype":"success","is_error":false,"duration_ms":25,"session_id":"it-stream","usage":{"input_tokens":11,"output_tokens":5}}'
"#;

struct BridgeHarness {
    _workspace: TempDir,
    root: PathBuf,
    addr: SocketAddr,
    server: tokio::task::JoinHandle<()>,
}

impl BridgeHarness {
    /// Starts a router whose claude executable is a script with `body`.
    async fn start(body: &str) -> Self {
        let workspace = tempfile::tempdir().expect("tempdir");
        let root = workspace.path().to_path_buf();
        let script = write_script(&root, "claude", body);
        let client = ClaudeCliClient::new(ClaudeCliConfig {
            executable: script.display().to_string(),
            timeout_ms: 5_000,
            default_model: None,
            default_allowed_tools: Vec::new(),
        })
        .expect("build claude cli client");
        let config = GatewayServerConfig {
            client: Arc::new(client),
            bind: "127.0.0.1:0".to_string(),
            api_keys: vec![API_KEY.to_string()],
            ollama_api_enabled: true,
            compat_model_name: DEFAULT_COMPAT_MODEL_NAME.to_string(),
            service_working_directory: root.clone(),
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral listener");
        let addr = listener.local_addr().expect("listener addr");
        let app = build_gateway_router(config);
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            _workspace: workspace,
            root,
            addr,
            server,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

impl Drop for BridgeHarness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    let mut permissions = fs::metadata(&path).expect("script metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("chmod script");
    path
}

fn sse_data_frames(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}

#[tokio::test]
async fn integration_native_chat_round_trips_through_real_process() {
    let harness = BridgeHarness::start(
        r#"
case "$*" in
  *"--output-format json"*"--resume sess-1"*) ;;
  *) echo "unexpected arguments: $*" >&2; exit 3 ;;
esac
printf '%s' '{"type":"result","subtype":"success","is_error":false,"num_turns":4,"result":"ran in '"$(pwd)"'","session_id":"sess-1","total_cost_usd":0.5,"usage":{"input_tokens":20,"output_tokens":9}}'
"#,
    )
    .await;
    fs::create_dir(harness.root.join("project")).expect("create project dir");
    let client = Client::new();

    let response = client
        .post(harness.url("/v1/chat"))
        .header("X-API-Key", API_KEY)
        .json(&json!({
            "prompt": "where are you?",
            "sessionId": "sess-1",
            "workingDirectory": "project"
        }))
        .send()
        .await
        .expect("send native chat");
    assert_eq!(response.status(), 200);
    let payload = response.json::<Value>().await.expect("chat payload");
    assert_eq!(payload["sessionId"], "sess-1");
    let expected_dir = fs::canonicalize(harness.root.join("project")).expect("canonical dir");
    assert_eq!(
        payload["result"],
        format!("ran in {}", expected_dir.display()).as_str()
    );
    assert_eq!(payload["usage"]["inputTokens"], 20);
    assert_eq!(payload["usage"]["totalCostUsd"], 0.5);

    let session = client
        .get(harness.url("/v1/sessions/sess-1"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .expect("get session")
        .json::<Value>()
        .await
        .expect("session payload");
    assert_eq!(session["session"]["messageCount"], 4);
}

#[tokio::test]
async fn integration_streamed_text_and_usage_match_across_adapters() {
    let harness = BridgeHarness::start(STREAM_SCRIPT_BODY).await;
    let client = Client::new();
    let body = json!({
        "model": "llama3.2",
        "messages": [{"role": "user", "content": "greet me"}],
        "stream": true
    });

    let ollama = client
        .post(harness.url("/api/chat"))
        .json(&body)
        .send()
        .await
        .expect("send ollama chat")
        .text()
        .await
        .expect("ollama body");
    let records = ollama
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("ndjson record"))
        .collect::<Vec<_>>();
    let ollama_text = records
        .iter()
        .filter(|record| record["done"] == false)
        .filter_map(|record| record["message"]["content"].as_str())
        .collect::<String>();
    let ollama_done = records.last().expect("final record");
    assert_eq!(ollama_text, "Bonjour ✓");
    assert_eq!(ollama_done["done"], true);
    assert_eq!(ollama_done["model"], "llama3.2");
    assert_eq!(ollama_done["total_duration"], 25_000_000_u64);

    let openai = client
        .post(harness.url("/v1/chat/completions"))
        .json(&body)
        .send()
        .await
        .expect("send openai chat")
        .text()
        .await
        .expect("openai body");
    let frames = sse_data_frames(&openai);
    assert_eq!(frames.last().map(String::as_str), Some("[DONE]"));
    let payloads = frames[..frames.len() - 1]
        .iter()
        .map(|frame| serde_json::from_str::<Value>(frame).expect("json frame"))
        .collect::<Vec<_>>();
    let openai_text = payloads
        .iter()
        .filter_map(|payload| payload["choices"][0]["delta"]["content"].as_str())
        .collect::<String>();
    let usage = &payloads.last().expect("usage frame")["usage"];

    assert_eq!(openai_text, ollama_text);
    assert_eq!(usage["prompt_tokens"], ollama_done["prompt_eval_count"]);
    assert_eq!(usage["completion_tokens"], ollama_done["eval_count"]);
    assert_eq!(usage["total_tokens"], 16);
}

#[tokio::test]
async fn integration_client_disconnect_terminates_cli_process() {
    let workspace = tempfile::tempdir().expect("marker dir");
    let marker = workspace.path().join("survived");
    let harness = BridgeHarness::start(&format!(
        r#"
printf '%s\n' '{{"type":"stream_event","event":{{"type":"content_block_delta","delta":{{"type":"text_delta","text":"partial"}}}}}}'
sleep 1
touch '{}'
"#,
        marker.display()
    ))
    .await;

    let mut response = Client::new()
        .post(harness.url("/api/chat"))
        .json(&json!({
            "messages": [{"role": "user", "content": "long task"}],
            "stream": true
        }))
        .send()
        .await
        .expect("send ollama stream");
    let first = response
        .chunk()
        .await
        .expect("read first chunk")
        .expect("first chunk present");
    let first = String::from_utf8_lossy(&first);
    assert!(first.contains("partial"), "unexpected first chunk {first}");
    drop(response);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(
        !marker.exists(),
        "claude cli kept running after the client disconnected"
    );
}

#[tokio::test]
async fn integration_missing_executable_surfaces_as_bad_gateway() {
    let harness = BridgeHarness::start("exit 0").await;
    fs::remove_file(harness.root.join("claude")).expect("remove script");

    let response = Client::new()
        .post(harness.url("/v1/chat"))
        .bearer_auth(API_KEY)
        .json(&json!({"prompt": "hello"}))
        .send()
        .await
        .expect("send native chat");
    assert_eq!(response.status(), 502);
    let payload = response.json::<Value>().await.expect("error payload");
    assert_eq!(payload["success"], false);
    assert_eq!(payload["code"], "CLAUDE_ERROR");
    assert!(payload["requestId"].is_string());
}
