//! Streamable-HTTP MCP transport: POSTs a JSON-RPC request per call,
//! retrying retryable (5xx/429) failures with exponential backoff.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, TransportError};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, RequestIdGenerator};
use crate::mcp::transport::{backoff_delay, Transport};

/// Response bodies larger than this are rejected rather than buffered whole.
const MAX_BODY_BYTES: usize = 128 * 1024;
/// HTTP error bodies are truncated to this many characters in error messages.
const BODY_PREVIEW_CHARS: usize = 512;
const MAX_RETRIES: u32 = 3;

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    ids: RequestIdGenerator,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers,
            ids: RequestIdGenerator::new(),
        }
    }

    async fn post_once(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
        let mut builder = self.client.post(&self.url).json(request);
        for (k, v) in &self.headers {
            builder = builder.header(k, v);
        }
        let response = builder.send().await.map_err(|e| McpError::Transport(TransportError::Io(e.to_string())))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| McpError::Transport(TransportError::Io(e.to_string())))?;
        let body_text = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY_BYTES)]).to_string();

        if !status.is_success() {
            let preview: String = body_text.chars().take(BODY_PREVIEW_CHARS).collect();
            return Err(McpError::Transport(TransportError::HttpStatus {
                status: status.as_u16(),
                body_preview: preview,
            }));
        }

        let parsed: JsonRpcResponse = parse_jsonrpc_body(&body_text)?;
        parsed.into_result()
    }
}

/// Accepts a plain JSON body, or a Server-Sent-Events body whose first
/// `data:` line carries the JSON-RPC payload.
fn parse_jsonrpc_body(body: &str) -> Result<JsonRpcResponse, McpError> {
    let trimmed = body.trim_start();
    let json_text = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        trimmed
    } else {
        trimmed
            .lines()
            .find_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .ok_or_else(|| McpError::Transport(TransportError::Io("response body is neither JSON nor SSE".into())))?
    };
    serde_json::from_str(json_text).map_err(|e| McpError::Transport(TransportError::Io(format!("invalid JSON-RPC body: {e}"))))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: &str, params: Value, cancel: &CancellationToken) -> Result<Value, McpError> {
        let request = JsonRpcRequest::new(self.ids.next(), method, params);
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(McpError::Transport(TransportError::Cancelled));
            }
            match self.post_once(&request).await {
                Ok(value) => return Ok(value),
                Err(McpError::Transport(err)) if err.is_retryable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_body() {
        let r = parse_jsonrpc_body(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#).unwrap();
        assert_eq!(r.result.unwrap()["ok"], true);
    }

    #[test]
    fn parses_sse_wrapped_body() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[]}}\n\n";
        let r = parse_jsonrpc_body(body).unwrap();
        assert!(r.result.is_some());
    }

    #[tokio::test]
    async fn http_status_error_is_reported_as_retryable_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let body = "rate limited";
            let resp = format!("HTTP/1.1 429 Too Many Requests\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
            stream.write_all(resp.as_bytes()).await.unwrap();
        });
        let transport = HttpTransport::new(format!("http://{addr}"), vec![]);
        let err = transport.post_once(&JsonRpcRequest::tools_list(transport.ids.next())).await.unwrap_err();
        match err {
            McpError::Transport(t) => assert!(t.is_retryable()),
            other => panic!("expected transport error, got {other:?}"),
        }
        server.await.unwrap();
    }
}
