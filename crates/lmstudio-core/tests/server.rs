//! End-to-end tests against a mock LM Studio server

use lmstudio_core::{
    chat_registrations, embedding_registrations, Conversation, LmStudioClient,
    LmStudioEmbeddingModel, LmStudioError, LmStudioModel, ModelCatalog, ModelKind, Prompt,
    ToolCallExtraction, ToolDefinition, ToolResult, Usage,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(lines: &[&str]) -> ResponseTemplate {
    let body: String = lines.iter().map(|l| format!("{l}\n\n")).collect();
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn model(server: &MockServer) -> LmStudioModel {
    let client = LmStudioClient::new(server.uri()).unwrap();
    LmStudioModel::new(client, "lmstudio/qwen/qwen3-4b")
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_non_streaming_chat_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "qwen/qwen3-4b"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Paris"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let prompt = Prompt::new("Capital of France?").with_system("One word.");
    let completion = model(&server).prompt(&prompt, None).await.unwrap();

    assert_eq!(completion.text(), "Paris");
    assert_eq!(completion.response.usage, Some(Usage { input: 5, output: 1 }));
    assert_eq!(completion.tool_calls, ToolCallExtraction::Declined);

    let bodies = request_bodies(&server).await;
    assert!(bodies[0].get("stream").is_none());
}

#[tokio::test]
async fn test_streaming_chat_stops_at_finish_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse(&[
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            r#"data: {"choices":[{"delta":{"content":" never seen"}}]}"#,
            "data: [DONE]",
        ]))
        .mount(&server)
        .await;

    let mut deltas = Vec::new();
    let prompt = Prompt::new("Greet me").with_system("Be friendly.");
    let completion = model(&server)
        .execute(&prompt, None, true, |d| deltas.push(d.to_string()))
        .await
        .unwrap();

    assert_eq!(completion.full_text(), "Hello");
    assert_eq!(deltas, vec!["Hel", "lo"]);
    assert_eq!(completion.response.finish_reason.as_deref(), Some("stop"));
    assert!(completion.response.usage.is_none());
}

#[tokio::test]
async fn test_streaming_completion_with_noise_and_thinking() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(body_partial_json(json!({"prompt": "What is 19+23?", "stream": true})))
        .respond_with(sse(&[
            ": keep-alive",
            r#"data: {"choices":[{"text":"<think>carry "}]}"#,
            r#"data: {"choices":[{"text": BROKEN"#,
            r#"data: {"choices":[{"text":"the 1</think>"}]}"#,
            r#"data: {"choices":[{"text":"Result is 42","finish_reason":"stop"}],"usage":{"prompt_tokens":7,"completion_tokens":9}}"#,
            "data: [DONE]",
        ]))
        .mount(&server)
        .await;

    let completion = model(&server)
        .execute(&Prompt::new("What is 19+23?"), None, true, |_| {})
        .await
        .unwrap();

    assert_eq!(completion.full_text(), "<think>carry the 1</think>Result is 42");
    assert_eq!(completion.thinking.thinking, "carry the 1");
    assert_eq!(completion.text(), "Result is 42");
    assert_eq!(completion.response.usage, Some(Usage { input: 7, output: 9 }));
    assert_eq!(completion.tool_calls, ToolCallExtraction::NoToolCalls);
}

#[tokio::test]
async fn test_empty_stream_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(sse(&["data: [DONE]"]))
        .mount(&server)
        .await;

    let completion = model(&server)
        .execute(&Prompt::new("anything"), None, true, |_| {})
        .await
        .unwrap();

    assert_eq!(completion.full_text(), "");
    assert_eq!(completion.text(), "");
    assert!(completion.response.usage.is_none());
}

#[tokio::test]
async fn test_stream_cut_off_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(sse(&[r#"data: {"choices":[{"text":"Hel"}]}"#]))
        .mount(&server)
        .await;

    let mut deltas = Vec::new();
    let err = model(&server)
        .execute(&Prompt::new("Say hello"), None, true, |d| deltas.push(d.to_string()))
        .await
        .unwrap_err();

    assert!(err.is_connection());
    assert!(err.to_string().contains(&format!("{}/v1/completions", server.uri())));
    assert_eq!(deltas, vec!["Hel"]);
}

#[tokio::test]
async fn test_finish_reason_without_sentinel_completes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(sse(&[
            r#"data: {"choices":[{"text":"Hel"}]}"#,
            r#"data: {"choices":[{"text":"lo","finish_reason":"stop"}]}"#,
        ]))
        .mount(&server)
        .await;

    let completion = model(&server)
        .execute(&Prompt::new("Say hello"), None, true, |_| {})
        .await
        .unwrap();
    assert_eq!(completion.text(), "Hello");
}

#[tokio::test]
async fn test_schema_prompt_requests_structured_output() {
    let server = MockServer::start().await;
    let schema = json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "age": {"type": "integer"},
            "one_sentence_bio": {"type": "string"}
        },
        "required": ["name", "age", "one_sentence_bio"]
    });

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "response_format": {
                "type": "json_schema",
                "json_schema": {"strict": true, "schema": schema.clone()}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"content": "{\"name\":\"Biscuit\",\"age\":4,\"one_sentence_bio\":\"A very good dog.\"}"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let prompt = Prompt::new("Invent a good dog").with_schema(schema);
    let completion = model(&server).prompt(&prompt, None).await.unwrap();

    let dog: Value = serde_json::from_str(completion.text()).unwrap();
    assert_eq!(dog["name"], "Biscuit");
    assert!(dog["age"].is_i64());
    assert!(dog["one_sentence_bio"].is_string());
}

#[tokio::test]
async fn test_error_status_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let err = model(&server)
        .execute(&Prompt::new("hi"), None, true, |_| {})
        .await
        .unwrap_err();

    assert!(err.is_connection());
    let msg = err.to_string();
    assert!(msg.contains(&format!("{}/v1/completions", server.uri())));
    assert!(msg.contains("404"));
    assert!(msg.contains("model not loaded"));
}

#[tokio::test]
async fn test_document_without_text_is_malformed() {
    let server = MockServer::start().await;
    let doc = json!({"choices": [{"index": 0, "finish_reason": "stop"}]});
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc.clone()))
        .mount(&server)
        .await;

    let err = model(&server)
        .prompt(&Prompt::new("hi"), None)
        .await
        .unwrap_err();

    assert!(err.is_unexpected_output());
    let payload: Value = serde_json::from_str(err.diagnostic_payload().unwrap()).unwrap();
    assert_eq!(payload, doc);
}

#[tokio::test]
async fn test_tool_call_identifier_round_trip() {
    let server = MockServer::start().await;
    let call_id = "call_7Hq-ÄÖ/42";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": call_id,
                        "type": "function",
                        "function": {"name": "calculate", "arguments": "{\"expression\":\"47*23\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "47 * 23 = 1081"}, "finish_reason": "stop"}]
        })))
        .mount(&server)
        .await;

    let model = model(&server);
    let tools = vec![ToolDefinition::new(
        "calculate",
        "Perform mathematical calculations",
        json!({"type": "object", "properties": {"expression": {"type": "string"}}, "required": ["expression"]}),
    )];

    let first_prompt = Prompt::new("What's 47 multiplied by 23?").with_tools(tools.clone());
    let first = model.prompt(&first_prompt, None).await.unwrap();
    let calls = first.tool_calls.calls().to_vec();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, call_id);
    assert_eq!(calls[0].arguments["expression"], "47*23");

    let mut conversation = Conversation::new();
    conversation.push(first.to_exchange(&first_prompt));

    let results = vec![ToolResult::for_call(&calls[0], "1081")];
    let follow_up = Prompt::new("").with_tools(tools).with_tool_results(results);
    let second = model.prompt(&follow_up, Some(&conversation)).await.unwrap();
    assert_eq!(second.text(), "47 * 23 = 1081");

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    let messages = bodies[1]["messages"].as_array().unwrap();
    let assistant = messages.iter().find(|m| m["role"] == "assistant").unwrap();
    let tool = messages.iter().find(|m| m["role"] == "tool").unwrap();
    assert_eq!(assistant["tool_calls"][0]["id"].as_str().unwrap().as_bytes(), call_id.as_bytes());
    assert_eq!(tool["tool_call_id"].as_str().unwrap().as_bytes(), call_id.as_bytes());
    assert_eq!(tool["content"], "1081");
}

#[tokio::test]
async fn test_streamed_tool_call_with_bad_arguments_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_weather","arguments":"{\"location\": "}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
        ]))
        .mount(&server)
        .await;

    let prompt = Prompt::new("Weather in Tokyo?").with_tools(vec![ToolDefinition::new(
        "get_weather",
        "Get weather information for a location",
        json!({"type": "object"}),
    )]);
    let err = model(&server)
        .execute(&prompt, None, true, |_| {})
        .await
        .unwrap_err();

    match err {
        LmStudioError::MalformedToolCall { id, name, .. } => {
            assert_eq!(id, "call_1");
            assert_eq!(name, "get_weather");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_model_discovery_is_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"id": "qwen/qwen3-4b", "object": "model"},
                {"id": "llava-v1.5-7b", "object": "model"},
                {"id": "text-embedding-nomic-embed-text-v1.5", "object": "model"},
                {"object": "model"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = ModelCatalog::new(LmStudioClient::new(server.uri()).unwrap());

    let lists = futures::future::join_all((0..4).map(|_| catalog.models())).await;
    assert!(lists.iter().all(|l| matches!(l, Ok(models) if models.len() == 4)));

    let chat = chat_registrations(&catalog).await.unwrap();
    assert_eq!(chat.len(), 2);
    assert_eq!(chat[0].model_id, "lmstudio/qwen/qwen3-4b");
    assert_eq!(chat[0].aliases, vec!["qwen3-4b".to_string()]);
    assert_eq!(chat[1].model_id, "lmstudio/llava-v1.5-7b");
    assert!(chat[1].aliases.is_empty());
    assert!(chat.iter().all(|r| r.kind == ModelKind::Chat));

    let embedding = embedding_registrations(&catalog).await;
    assert_eq!(embedding.len(), 1);
    assert_eq!(embedding[0].raw_id, "text-embedding-nomic-embed-text-v1.5");
    assert_eq!(embedding[0].kind, ModelKind::Embedding);
}

#[tokio::test]
async fn test_embeddings_preserve_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({
            "model": "nomic-embed-text",
            "input": ["first", "second"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ]
        })))
        .mount(&server)
        .await;

    let client = LmStudioClient::new(server.uri()).unwrap();
    let embedder = LmStudioEmbeddingModel::new(client, "lmstudio/nomic-embed-text");
    let vectors = embedder
        .embed_batch(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn test_embedding_count_mismatch_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0]}]
        })))
        .mount(&server)
        .await;

    let client = LmStudioClient::new(server.uri()).unwrap();
    let embedder = LmStudioEmbeddingModel::new(client, "nomic-embed-text");
    let err = embedder
        .embed_batch(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(err.is_unexpected_output());
}
