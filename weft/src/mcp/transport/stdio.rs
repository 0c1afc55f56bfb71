//! Stdio MCP transport: spawns the server as a child process, exchanges
//! line-delimited JSON-RPC over its stdin/stdout, drains stderr to
//! `tracing` in the background, and tracks process exit so an in-flight
//! `call` unblocks instead of hanging on a dead process.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, TransportError};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, RequestIdGenerator};
use crate::mcp::transport::Transport;

/// `Close` polls this interval while waiting for the child to exit on its own.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// `Close` waits this long for a graceful exit before killing the child.
const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(5);

pub struct StdioTransport {
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Arc<Mutex<Child>>,
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
    ids: RequestIdGenerator,
}

impl StdioTransport {
    pub fn spawn(command: &str, args: &[String], env: &[(String, String)]) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Close() is the only path that should terminate the child; a
            // drop-kill here would race with its stdin-close -> wait -> kill
            // sequence.
            .kill_on_drop(false);

        let mut child = cmd.spawn().map_err(|e| McpError::Transport(TransportError::Io(format!("spawning {command}: {e}"))))?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "weft::mcp::stdio_stderr", "{line}");
            }
        });

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let child = Arc::new(Mutex::new(child));
        let child_task = Arc::clone(&child);
        let exited_task = Arc::clone(&exited);
        let notify_task = Arc::clone(&exit_notify);
        tokio::spawn(async move {
            let _ = child_task.lock().await.wait().await;
            exited_task.store(true, Ordering::SeqCst);
            notify_task.notify_waiters();
        });

        Ok(Self {
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            child,
            exited,
            exit_notify,
            ids: RequestIdGenerator::new(),
        })
    }

    async fn write_line(&self, value: &impl serde::Serialize) -> Result<(), McpError> {
        let mut line = serde_json::to_string(value).map_err(|e| McpError::Transport(TransportError::Io(e.to_string())))?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        let Some(stdin) = stdin.as_mut() else {
            return Err(McpError::Transport(TransportError::ProcessExited));
        };
        stdin.write_all(line.as_bytes()).await.map_err(|e| McpError::Transport(TransportError::Io(e.to_string())))
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn call(&self, method: &str, params: Value, cancel: &CancellationToken) -> Result<Value, McpError> {
        if self.exited.load(Ordering::SeqCst) {
            return Err(McpError::Transport(TransportError::ProcessExited));
        }
        let request = JsonRpcRequest::new(self.ids.next(), method, params);
        self.write_line(&request).await?;

        let mut stdout = self.stdout.lock().await;
        loop {
            let mut buf = String::new();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(McpError::Transport(TransportError::Cancelled)),
                _ = self.exit_notify.notified() => return Err(McpError::Transport(TransportError::ProcessExited)),
                read = stdout.read_line(&mut buf) => {
                    let n = read.map_err(|e| McpError::Transport(TransportError::Io(e.to_string())))?;
                    if n == 0 {
                        return Err(McpError::Transport(TransportError::ProcessExited));
                    }
                    let trimmed = buf.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let parsed: Value = serde_json::from_str(trimmed)
                        .map_err(|e| McpError::Transport(TransportError::Io(format!("invalid JSON-RPC line: {e}"))))?;

                    if parsed.get("method").and_then(Value::as_str) == Some("roots/list") {
                        if let Some(id) = parsed.get("id").cloned() {
                            let reply = serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {"roots": []}});
                            drop(stdout);
                            self.write_line(&reply).await?;
                            stdout = self.stdout.lock().await;
                        }
                        continue;
                    }
                    if parsed.get("id").and_then(Value::as_u64) != Some(request.id) {
                        continue;
                    }
                    let response: JsonRpcResponse = serde_json::from_value(parsed)
                        .map_err(|e| McpError::Transport(TransportError::Io(e.to_string())))?;
                    return response.into_result();
                }
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let notification = serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.write_line(&notification).await
    }

    /// Closes stdin (so a well-behaved server sees EOF and exits on its
    /// own), waits up to 5s for the exit watcher to observe it, then kills
    /// the child if it's still alive.
    async fn close(&self) -> Result<(), McpError> {
        self.stdin.lock().await.take();

        let deadline = tokio::time::Instant::now() + CLOSE_GRACE_PERIOD;
        while !self.exited.load(Ordering::SeqCst) {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
        }

        if !self.exited.load(Ordering::SeqCst) {
            let mut child = self.child.lock().await;
            let _ = child.kill().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawning_a_nonexistent_command_returns_an_error() {
        let result = StdioTransport::spawn("_weft_nonexistent_command_xyz_", &[], &[]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn call_against_an_echo_loopback_server_round_trips() {
        // `cat` echoes stdin to stdout verbatim, which is enough to exercise
        // the framing/matching logic without a real MCP server on PATH.
        let transport = StdioTransport::spawn("cat", &[], &[]).unwrap();
        let cancel = CancellationToken::new();
        let result = transport.call("tools/list", Value::Null, &cancel).await;
        // `cat` echoes our own request back; it has no "result" field, so
        // this surfaces as a protocol error rather than a transport error —
        // which is enough to prove the request/response loop ran at all.
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn close_closes_stdin_and_waits_for_cat_to_exit_on_eof() {
        let transport = StdioTransport::spawn("cat", &[], &[]).unwrap();
        transport.close().await.unwrap();
        assert!(transport.exited.load(Ordering::SeqCst));
    }
}
