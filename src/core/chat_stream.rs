//! Streaming chat transport
//!
//! The HTTP transport consumes an SSE response on a spawned task and fans the
//! parsed deltas into an mpsc channel. The engine owns exactly one open
//! stream at a time, so the channel carries no stream id; a fresh channel is
//! created per request.

use async_trait::async_trait;
use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChatRequest, ChatResponse, SourceAnnotation};
use crate::utils::url::construct_api_url;

#[derive(Debug, Clone)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone)]
pub enum StreamMessage {
    Chunk(String),
    Sources(Vec<SourceAnnotation>),
    ToolCall(ToolCallDelta),
    Error(String),
    End,
}

/// Seam between the engine and the wire. The HTTP implementation talks to a
/// chat completions endpoint; tests substitute a scripted fake.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open one streaming request. The returned channel yields deltas until
    /// an `End` or `Error` message, after which the sender is dropped.
    async fn open(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamMessage>;
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Parse one SSE data payload into stream messages. Returns true when the
/// stream is finished.
fn handle_data_payload(payload: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send(StreamMessage::End);
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(choice) = response.choices.into_iter().next() {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        let _ = tx.send(StreamMessage::Chunk(content));
                    }
                }
                if let Some(tool_calls) = choice.delta.tool_calls {
                    for call in tool_calls {
                        let _ = tx.send(StreamMessage::ToolCall(ToolCallDelta {
                            index: call.index.unwrap_or(0),
                            id: call.id,
                            name: call.function.as_ref().and_then(|f| f.name.clone()),
                            arguments: call.function.and_then(|f| f.arguments),
                        }));
                    }
                }
                if let Some(sources) = choice.delta.sources {
                    if !sources.is_empty() {
                        let _ = tx.send(StreamMessage::Sources(sources));
                    }
                }
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }

            let _ = tx.send(StreamMessage::Error(format_api_error(payload)));
            let _ = tx.send(StreamMessage::End);
            true
        }
    }
}

fn process_sse_line(line: &str, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx))
        .unwrap_or(false)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

pub(crate) fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error: <empty>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return format!("API Error: {summary}");
            }
        }
        return format!("API Error: {trimmed}");
    }

    format!("API Error: {trimmed}")
}

pub struct HttpChatTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpChatTransport {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn open(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let chat_url = construct_api_url(&self.base_url, "chat/completions");
        let api_key = self.api_key.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = run_stream(client, chat_url, api_key, request, tx, cancel.clone()) => {}
                _ = cancel.cancelled() => {}
            }
        });

        rx
    }
}

async fn run_stream(
    client: reqwest::Client,
    chat_url: String,
    api_key: String,
    request: ChatRequest,
    tx: mpsc::UnboundedSender<StreamMessage>,
    cancel: CancellationToken,
) {
    let response = client
        .post(&chat_url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&request)
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send(StreamMessage::Error(format_api_error(&e.to_string())));
            let _ = tx.send(StreamMessage::End);
            return;
        }
    };

    if !response.status().is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let _ = tx.send(StreamMessage::Error(format_api_error(&error_text)));
        let _ = tx.send(StreamMessage::End);
        return;
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            return;
        }

        if let Ok(chunk_bytes) = chunk {
            buffer.extend_from_slice(&chunk_bytes);

            while let Some(newline_pos) = memchr(b'\n', &buffer) {
                let line_str = match std::str::from_utf8(&buffer[..newline_pos]) {
                    Ok(s) => s.trim(),
                    Err(e) => {
                        debug!(error = %e, "Invalid UTF-8 in stream");
                        buffer.drain(..=newline_pos);
                        continue;
                    }
                };

                let should_end = process_sse_line(line_str, &tx);
                buffer.drain(..=newline_pos);
                if should_end {
                    return;
                }
            }
        }
    }

    let _ = tx.send(StreamMessage::End);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::UnboundedSender<StreamMessage>,
        mpsc::UnboundedReceiver<StreamMessage>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn process_sse_line_handles_spacing_variants() {
        let (tx, mut rx) = channel();
        let variants = [
            (
                r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
                "Hello",
                "data: [DONE]",
            ),
            (
                r#"data:{"choices":[{"delta":{"content":"World"}}]}"#,
                "World",
                "data:[DONE]",
            ),
        ];

        for (chunk_line, expected_chunk, done_line) in variants {
            assert!(!process_sse_line(chunk_line, &tx));
            match rx.try_recv().expect("expected chunk message") {
                StreamMessage::Chunk(content) => assert_eq!(content, expected_chunk),
                other => panic!("expected chunk message, got {other:?}"),
            }

            assert!(process_sse_line(done_line, &tx));
            assert!(matches!(
                rx.try_recv().expect("expected end message"),
                StreamMessage::End
            ));
        }

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_response_fields_are_tolerated() {
        let (tx, mut rx) = channel();
        let line = r#"data: {"choices":[{"delta":{"content":"end"},"finish_reason":"stop"}]}"#;

        assert!(!process_sse_line(line, &tx));
        assert!(matches!(
            rx.try_recv().unwrap(),
            StreamMessage::Chunk(ref c) if c == "end"
        ));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let (tx, mut rx) = channel();
        assert!(!process_sse_line("", &tx));
        assert!(!process_sse_line(": keepalive", &tx));
        assert!(!process_sse_line("event: ping", &tx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn tool_call_deltas_are_forwarded() {
        let (tx, mut rx) = channel();
        let line = r#"data: {"choices":[{"delta":{"content":null,"tool_calls":[{"index":0,"id":"call-1","function":{"name":"fetch_article_details","arguments":"{\"artic"}}]}}]}"#;

        assert!(!process_sse_line(line, &tx));
        match rx.try_recv().expect("expected tool call delta") {
            StreamMessage::ToolCall(delta) => {
                assert_eq!(delta.index, 0);
                assert_eq!(delta.id.as_deref(), Some("call-1"));
                assert_eq!(delta.name.as_deref(), Some("fetch_article_details"));
                assert_eq!(delta.arguments.as_deref(), Some("{\"artic"));
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn source_annotations_are_forwarded() {
        let (tx, mut rx) = channel();
        let line = r#"data: {"choices":[{"delta":{"content":"cited","sources":[{"uri":"https://a.example","title":"A"}]}}]}"#;

        assert!(!process_sse_line(line, &tx));
        assert!(matches!(
            rx.try_recv().unwrap(),
            StreamMessage::Chunk(ref c) if c == "cited"
        ));
        match rx.try_recv().expect("expected sources") {
            StreamMessage::Sources(sources) => {
                assert_eq!(sources.len(), 1);
                assert_eq!(sources[0].uri, "https://a.example");
            }
            other => panic!("expected sources, got {other:?}"),
        }
    }

    #[test]
    fn error_payloads_end_the_stream() {
        let (tx, mut rx) = channel();
        let line = r#"data: {"error":{"message":"internal server error"}}"#;

        assert!(process_sse_line(line, &tx));
        match rx.try_recv().expect("expected error message") {
            StreamMessage::Error(text) => {
                assert_eq!(text, "API Error: internal server error");
            }
            other => panic!("expected error message, got {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), StreamMessage::End));
    }

    #[test]
    fn format_api_error_summarizes_json() {
        assert_eq!(
            format_api_error(r#"{"error":{"message":"model   overloaded"}}"#),
            "API Error: model overloaded"
        );
        assert_eq!(
            format_api_error(r#"{"error":"quota exceeded"}"#),
            "API Error: quota exceeded"
        );
        assert_eq!(format_api_error("api failure"), "API Error: api failure");
        assert_eq!(format_api_error("  "), "API Error: <empty>");
    }
}
