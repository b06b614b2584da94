mod common;

use hibiki_llm::LLMProvider;
use hibiki_llm::error::LLMError;
use hibiki_llm::provider::openai_chat::OpenAiChatProvider;
use hibiki_llm::types::{
    ChatRequest, FinishReason, JsonSchema, Message, StreamChunk, ToolCall, ToolDefinition,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use common::{Reply, ScriptedTransport, drain, escape, split_into};

fn provider(transport: &std::sync::Arc<ScriptedTransport>) -> OpenAiChatProvider {
    OpenAiChatProvider::new(transport.dyn_transport(), "sk-test")
        .with_base_url("https://gateway.test/v1")
}

fn data(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

#[tokio::test]
async fn single_user_message_round_trip() {
    let transport = ScriptedTransport::new(vec![Reply::json(
        r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi there!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 8, "completion_tokens": 3, "total_tokens": 11}
        }"#,
    )]);
    let response = provider(&transport)
        .chat(
            ChatRequest::new("gpt-4o-mini", vec![Message::user("Hello")]),
            CancellationToken::new(),
        )
        .await
        .expect("chat succeeds");

    assert_eq!(response.content, "Hi there!");
    assert!(response.tool_calls.is_empty());
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.total_tokens, 11);

    let request = transport.last_request();
    assert_eq!(request.url, "https://gateway.test/v1/chat/completions");
    assert_eq!(request.headers["Authorization"], "Bearer sk-test");
    assert_eq!(request.headers["Content-Type"], "application/json");
    assert_eq!(
        transport.last_body(),
        json!({"model": "gpt-4o-mini", "messages": [{"role": "user", "content": "Hello"}]})
    );
}

#[tokio::test]
async fn structured_output_schema_is_made_strict() {
    let transport = ScriptedTransport::new(vec![Reply::json(
        r#"{"choices": [{"index": 0, "message": {"content": "{\"title\":\"Dune\",\"year\":1965}"}, "finish_reason": "stop"}]}"#,
    )]);
    let schema = json!({
        "type": "object",
        "properties": {"title": {"type": "string"}, "year": {"type": "integer"}},
        "required": ["title"]
    });
    let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("A book?")])
        .with_response_schema(JsonSchema::new("book", schema));
    let response = provider(&transport)
        .chat(request, CancellationToken::new())
        .await
        .expect("chat succeeds");

    #[derive(serde::Deserialize)]
    struct Book {
        title: String,
        year: u32,
    }
    let book: Book = response.parse().expect("parses");
    assert_eq!(book.title, "Dune");
    assert_eq!(book.year, 1965);

    let body = transport.last_body();
    assert_eq!(
        body["response_format"]["json_schema"]["schema"]["required"],
        json!(["title", "year"])
    );
}

#[tokio::test]
async fn error_envelope_becomes_api_error() {
    let transport = ScriptedTransport::new(vec![Reply::status(
        401,
        r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#,
    )]);
    let err = provider(&transport)
        .chat(
            ChatRequest::new("gpt-4o-mini", vec![Message::user("Hello")]),
            CancellationToken::new(),
        )
        .await
        .expect_err("401 fails");
    assert!(err.is_auth());
    match err {
        LLMError::Api {
            provider,
            status,
            error_type,
            code,
            message,
            ..
        } => {
            assert_eq!(provider, "openai");
            assert_eq!(status, 401);
            assert_eq!(error_type.as_deref(), Some("invalid_request_error"));
            assert_eq!(code.as_deref(), Some("invalid_api_key"));
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn streaming_hel_lo() {
    let transport = ScriptedTransport::new(vec![Reply::sse(&[
        &data(r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#),
        &data(r#"{"choices":[{"index":0,"delta":{"content":"lo"}}]}"#),
        &data("[DONE]"),
    ])]);
    let mut stream = provider(&transport)
        .stream_chat(
            ChatRequest::new("gpt-4o-mini", vec![Message::user("Say hello")]),
            CancellationToken::new(),
        )
        .await
        .expect("stream opens");

    let chunks = drain(&mut stream).await;
    assert_eq!(chunks, vec![StreamChunk::text("Hel"), StreamChunk::text("lo")]);
    assert!(stream.err().is_none());
    assert_eq!(stream.response().content, "Hello");

    let request = transport.last_request();
    assert_eq!(request.headers["Accept"], "text/event-stream");
    let body = transport.last_body();
    assert_eq!(body["stream"], json!(true));
    assert!(body.get("stream_options").is_none());
}

#[tokio::test]
async fn tool_arguments_reassemble_across_fragment_counts() {
    let arguments = r#"{"city":"Paris","units":"metric","days":[1,2,3]}"#;
    for parts in [1, 2, 5, arguments.len()] {
        let mut events = vec![data(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"forecast","arguments":""}}]}}]}"#,
        )];
        for fragment in split_into(arguments, parts) {
            events.push(data(&format!(
                r#"{{"choices":[{{"index":0,"delta":{{"tool_calls":[{{"index":0,"function":{{"arguments":"{}"}}}}]}}}}]}}"#,
                escape(&fragment)
            )));
        }
        events.push(data(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#));
        events.push(data("[DONE]"));
        let event_refs: Vec<&str> = events.iter().map(String::as_str).collect();

        let transport = ScriptedTransport::new(vec![Reply::sse(&event_refs)]);
        let stream = provider(&transport)
            .stream_chat(
                ChatRequest::new("gpt-4o-mini", vec![Message::user("Forecast?")]),
                CancellationToken::new(),
            )
            .await
            .expect("stream opens");
        let response = stream.collect().await.expect("stream completes");

        assert_eq!(response.tool_calls.len(), 1, "parts = {parts}");
        let call = &response.tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "forecast");
        assert_eq!(
            serde_json::from_str::<Value>(&call.arguments).expect("valid JSON"),
            serde_json::from_str::<Value>(arguments).expect("valid JSON"),
        );
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    }
}

#[tokio::test]
async fn eof_without_done_flushes_tool_calls() {
    let transport = ScriptedTransport::new(vec![Reply::sse(&[
        &data(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"lookup","arguments":"{\"q\":"}}]}}]}"#,
        ),
        &data(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]}}]}"#),
    ])]);
    let mut stream = provider(&transport)
        .stream_chat(
            ChatRequest::new("gpt-4o-mini", vec![Message::user("Search")]),
            CancellationToken::new(),
        )
        .await
        .expect("stream opens");
    let chunks = drain(&mut stream).await;
    assert_eq!(chunks.len(), 2);
    assert!(stream.err().is_none());
    assert_eq!(
        stream.response().tool_calls,
        vec![ToolCall::new("call_9", "lookup", r#"{"q":"rust"}"#)]
    );
    assert_eq!(stream.response().finish_reason, FinishReason::ToolCalls);
}

#[tokio::test]
async fn stream_usage_is_opt_in() {
    let transport = ScriptedTransport::new(vec![Reply::sse(&[
        &data(r#"{"choices":[{"index":0,"delta":{"content":"ok"},"finish_reason":"stop"}]}"#),
        &data(r#"{"choices":[],"usage":{"prompt_tokens":4,"completion_tokens":1}}"#),
        &data("[DONE]"),
    ])]);
    let provider = provider(&transport).with_stream_usage(true);
    let response = provider
        .stream_chat(
            ChatRequest::new("gpt-4o-mini", vec![Message::user("ok?")]),
            CancellationToken::new(),
        )
        .await
        .expect("stream opens")
        .collect()
        .await
        .expect("stream completes");
    assert_eq!(response.usage.total_tokens, 5);
    assert_eq!(
        transport.last_body()["stream_options"],
        json!({"include_usage": true})
    );
}

#[tokio::test]
async fn rejected_stream_request_reports_status() {
    let transport = ScriptedTransport::new(vec![Reply::Stream {
        status: 429,
        chunks: vec![r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#.to_string()],
    }]);
    let err = provider(&transport)
        .stream_chat(
            ChatRequest::new("gpt-4o-mini", vec![Message::user("Hello")]),
            CancellationToken::new(),
        )
        .await
        .err()
        .expect("stream rejected");
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn mid_stream_read_failure_keeps_earlier_chunks() {
    let transport = ScriptedTransport::new(vec![Reply::BrokenStream {
        chunks: vec![data(r#"{"choices":[{"index":0,"delta":{"content":"partial"}}]}"#)],
    }]);
    let mut stream = provider(&transport)
        .stream_chat(
            ChatRequest::new("gpt-4o-mini", vec![Message::user("Hello")]),
            CancellationToken::new(),
        )
        .await
        .expect("stream opens");
    assert!(stream.next().await);
    assert_eq!(stream.current(), Some(&StreamChunk::text("partial")));
    assert!(!stream.next().await);
    assert!(matches!(stream.err(), Some(LLMError::Transport { .. })));
    assert!(!stream.next().await);
    assert_eq!(stream.response().content, "partial");
}

#[tokio::test]
async fn tool_definitions_and_history_are_sent() {
    let transport = ScriptedTransport::new(vec![Reply::json(
        r#"{"choices":[{"index":0,"message":{"content":"It is sunny."},"finish_reason":"stop"}]}"#,
    )]);
    let call = ToolCall::new("call_1", "get_weather", r#"{"city":"Paris"}"#);
    let request = ChatRequest::new(
        "gpt-4o-mini",
        vec![
            Message::user("Weather in Paris?"),
            Message::assistant_with_tool_calls("", vec![call]),
            Message::tool("call_1", r#"{"sky":"clear"}"#),
        ],
    )
    .with_tools(vec![ToolDefinition {
        name: "get_weather".to_string(),
        description: "Weather lookup".to_string(),
        parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    }]);
    provider(&transport)
        .chat(request, CancellationToken::new())
        .await
        .expect("chat succeeds");
    let body = transport.last_body();
    assert_eq!(body["tools"][0]["function"]["name"], json!("get_weather"));
    assert_eq!(body["messages"][1]["content"], Value::Null);
    assert_eq!(body["messages"][2]["tool_call_id"], json!("call_1"));
}
