use std::sync::Arc;

use agent_course::tools::{duckduckgo_toolkit, math_toolkit, DuckDuckGoConfig};
use agent_course::{
    Agent, AgentError, Embedder, EmbedderConfig, GroqClient, HuggingFaceEmbedder, LanguageModel,
    Message, ModelConfig, ToolDescription,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn groq(server: &MockServer) -> GroqClient {
    let cfg = ModelConfig {
        api_key: Some("test-key".into()),
        base_url: server.uri(),
        ..ModelConfig::default()
    }
    .with_max_tokens(500);
    GroqClient::from_config(&cfg).unwrap()
}

fn text_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": { "role": "assistant", "content": content }
        }]
    })
}

fn tool_completion(name: &str, arguments: &str) -> Value {
    json!({
        "id": "chatcmpl-2",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "finish_reason": "tool_calls",
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": { "name": name, "arguments": arguments }
                }]
            }
        }]
    })
}

#[tokio::test]
async fn groq_sends_model_and_max_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "max_tokens": 500,
            "messages": [{ "role": "user", "content": "Hello!" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_completion("Hi! How can I help?")))
        .expect(1)
        .mount(&server)
        .await;

    let completion = groq(&server)
        .complete_chat(&[Message::user("Hello!")], &[])
        .await
        .unwrap();

    assert_eq!(completion.content.as_deref(), Some("Hi! How can I help?"));
    assert!(completion.tool_calls.is_empty());
}

#[tokio::test]
async fn groq_parses_tool_calls_and_advertises_tools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "tool_choice": "auto",
            "tools": [{ "type": "function", "function": { "name": "calculator" } }]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(tool_completion("calculator", r#"{"expression":"15 * 23 + 7"}"#)),
        )
        .mount(&server)
        .await;

    let tools = [ToolDescription {
        name: "calculator".into(),
        description: "Evaluate mathematical expressions safely.".into(),
        parameters: Some(json!({
            "type": "object",
            "properties": { "expression": { "type": "string" } },
            "required": ["expression"]
        })),
    }];
    let completion = groq(&server)
        .complete_chat(&[Message::user("What's 15 * 23 + 7?")], &tools)
        .await
        .unwrap();

    assert!(completion.content.is_none());
    assert_eq!(completion.tool_calls.len(), 1);
    let call = &completion.tool_calls[0];
    assert_eq!(call.id.as_deref(), Some("call_abc"));
    assert_eq!(call.name, "calculator");
    assert_eq!(call.arguments, json!({ "expression": "15 * 23 + 7" }));
}

#[tokio::test]
async fn groq_reports_rate_limits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = groq(&server)
        .complete_chat(&[Message::user("Hello!")], &[])
        .await
        .unwrap_err();

    match err {
        AgentError::LanguageModel(message) => {
            assert!(message.contains("rate limit"));
            assert!(message.contains("slow down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn groq_reports_auth_failures_with_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = groq(&server)
        .complete_chat(&[Message::user("Hello!")], &[])
        .await
        .unwrap_err();

    let text = err.to_string();
    assert!(text.contains("401"));
    assert!(text.contains("invalid api key"));
}

#[test]
fn groq_requires_an_api_key() {
    let err = GroqClient::from_config(&ModelConfig::default()).err().unwrap();
    assert!(matches!(err, AgentError::Config(_)));
}

#[tokio::test]
async fn agent_runs_a_tool_round_trip_against_groq() {
    let server = MockServer::start().await;
    // Mocks are tried in mount order; the tool call answers the first request only.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(tool_completion("calculator", r#"{"expression":"15 * 23 + 7"}"#)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_completion("15 * 23 + 7 = 352")))
        .mount(&server)
        .await;

    let mut agent = Agent::new(Arc::new(groq(&server))).with_tools(math_toolkit());
    let output = agent.run("What's 15 * 23 + 7?").await.unwrap();

    assert_eq!(output.content, "15 * 23 + 7 = 352");
    assert_eq!(output.tool_calls.len(), 1);
    assert_eq!(output.tool_calls[0].name, "calculator");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let follow_up: Value = serde_json::from_slice(&requests[1].body).unwrap();
    let tool_message = follow_up["messages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|message| message["role"] == "tool")
        .unwrap();
    assert_eq!(tool_message["content"], "The result of '15 * 23 + 7' is: 352");
    assert_eq!(tool_message["tool_call_id"], "call_abc");
}

fn embedder(server: &MockServer, dimensions: usize) -> HuggingFaceEmbedder {
    let cfg = EmbedderConfig {
        dimensions,
        api_key: Some("hf-test".into()),
        base_url: server.uri(),
        ..EmbedderConfig::default()
    };
    HuggingFaceEmbedder::from_config(&cfg).unwrap()
}

const FEATURE_EXTRACTION_PATH: &str =
    "/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction";

#[tokio::test]
async fn huggingface_returns_sentence_embeddings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FEATURE_EXTRACTION_PATH))
        .and(header("authorization", "Bearer hf-test"))
        .and(body_partial_json(json!({ "inputs": "vacation days" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([0.1, 0.2, 0.3])))
        .expect(1)
        .mount(&server)
        .await;

    let vector = embedder(&server, 3).embed("vacation days").await.unwrap();
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn huggingface_mean_pools_token_embeddings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FEATURE_EXTRACTION_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([[[1.0, 0.0], [3.0, 2.0]]])),
        )
        .mount(&server)
        .await;

    let vector = embedder(&server, 2).embed("two tokens").await.unwrap();
    assert_eq!(vector, vec![2.0, 1.0]);
}

#[tokio::test]
async fn huggingface_rejects_wrong_dimensions_and_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FEATURE_EXTRACTION_PATH))
        .and(body_partial_json(json!({ "inputs": "short" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([0.5, 0.5])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(FEATURE_EXTRACTION_PATH))
        .and(body_partial_json(json!({ "inputs": "loading" })))
        .respond_with(ResponseTemplate::new(503).set_body_string("model is loading"))
        .mount(&server)
        .await;

    let embedder = embedder(&server, 384);
    let err = embedder.embed("short").await.unwrap_err();
    assert!(matches!(err, AgentError::Embedding(_)));
    assert!(err.to_string().contains("expected 384 dimensions"));

    let err = embedder.embed("loading").await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn duckduckgo_search_parses_the_html_endpoint() {
    let server = MockServer::start().await;
    let html = r##"
        <div class="result">
          <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">The <b>Rust</b> Programming Language</a>
          <a class="result__snippet" href="#">A language empowering everyone to build reliable and efficient software.</a>
        </div>
    "##;
    Mock::given(method("GET"))
        .and(path("/html/"))
        .and(query_param("q", "rust news"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .expect(1)
        .mount(&server)
        .await;

    let tools = duckduckgo_toolkit(DuckDuckGoConfig {
        endpoint: format!("{}/html/", server.uri()),
        ..DuckDuckGoConfig::default()
    });
    let output = tools
        .call("duckduckgo_news", json!({ "query": "rust" }))
        .await
        .unwrap();

    assert_eq!(output["query"], "rust");
    let results = output["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["title"], "The Rust Programming Language");
    assert_eq!(results[0]["href"], "https://www.rust-lang.org/");
    assert!(results[0]["body"]
        .as_str()
        .unwrap()
        .starts_with("A language empowering"));
}
