//! MCP transports: a spawned stdio subprocess using Content-Length
//! framed JSON-RPC (same framing as LSP), and two HTTP-based
//! transports (streamable HTTP, SSE) that both speak a single
//! request/response JSON-RPC exchange over `reqwest`.

use super::types::{JsonRpcRequest, JsonRpcResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

pub type TransportError = String;

/// A running stdio transport — owns the child process and message routing.
pub struct StdioTransport {
    writer_tx: mpsc::Sender<Vec<u8>>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
    child: Arc<Mutex<Option<Child>>>,
    alive: Arc<AtomicBool>,
    _reader_handle: tokio::task::JoinHandle<()>,
    _writer_handle: tokio::task::JoinHandle<()>,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, TransportError> {
        log::info!("[mcp] spawning: {} {}", command, args.join(" "));

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child =
            cmd.spawn().map_err(|e| format!("failed to spawn MCP server `{command}`: {e}"))?;

        let stdin = child.stdin.take().ok_or("failed to open stdin")?;
        let stdout = child.stdout.take().ok_or("failed to open stdout")?;
        let stderr = child.stderr.take().ok_or("failed to open stderr")?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(64);
        let _writer_handle = {
            let mut stdin = stdin;
            tokio::spawn(async move {
                while let Some(msg) = writer_rx.recv().await {
                    let frame = format!("Content-Length: {}\r\n\r\n", msg.len());
                    if stdin.write_all(frame.as_bytes()).await.is_err() {
                        break;
                    }
                    if stdin.write_all(&msg).await.is_err() {
                        break;
                    }
                    if stdin.flush().await.is_err() {
                        break;
                    }
                }
            })
        };

        let _reader_handle = {
            let pending = Arc::clone(&pending);
            let alive = Arc::clone(&alive);
            let mut reader = BufReader::new(stdout);
            tokio::spawn(async move {
                loop {
                    match read_framed_message(&mut reader).await {
                        Ok(Some(data)) => match serde_json::from_slice::<JsonRpcResponse>(&data) {
                            Ok(resp) => {
                                if let Some(id) = resp.id {
                                    if let Some(tx) = pending.lock().await.remove(&id) {
                                        let _ = tx.send(resp);
                                    }
                                }
                            }
                            Err(e) => log::warn!("[mcp] failed to parse response: {e}"),
                        },
                        Ok(None) => {
                            log::info!("[mcp] stdout closed (server exited)");
                            break;
                        }
                        Err(e) => {
                            log::error!("[mcp] read error: {e}");
                            break;
                        }
                    }
                }
                alive.store(false, Ordering::SeqCst);
            })
        };

        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            log::debug!("[mcp:stderr] {trimmed}");
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(StdioTransport {
            writer_tx,
            pending,
            child: Arc::new(Mutex::new(Some(child))),
            alive,
            _reader_handle,
            _writer_handle,
        })
    }

    pub async fn send_request(
        &self,
        request: JsonRpcRequest,
        timeout_secs: u64,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = request.id;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let body = serde_json::to_vec(&request).map_err(|e| e.to_string())?;
        self.writer_tx.send(body).await.map_err(|_| "transport writer closed".to_string())?;

        let resp = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), rx)
            .await
            .map_err(|_| format!("MCP request timed out after {timeout_secs}s (id={id})"))?
            .map_err(|_| "response channel dropped".to_string())?;
        Ok(resp)
    }

    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        let notif = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or(serde_json::json!({})),
        });
        let body = serde_json::to_vec(&notif).map_err(|e| e.to_string())?;
        self.writer_tx.send(body).await.map_err(|_| "transport writer closed".to_string())
    }

    pub async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

async fn read_framed_message<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<Option<Vec<u8>>, TransportError> {
    let mut content_length: Option<usize> = None;
    let mut header_line = String::new();

    loop {
        header_line.clear();
        let n = reader.read_line(&mut header_line).await.map_err(|e| e.to_string())?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = header_line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(val) = trimmed.strip_prefix("Content-Length:") {
            content_length = val.trim().parse::<usize>().ok();
        }
    }

    let len = content_length.ok_or("missing Content-Length header")?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| e.to_string())?;
    Ok(Some(body))
}

/// Streamable-HTTP transport (`type=http`): each JSON-RPC call is a
/// single POST to the server URL carrying the whole request body and
/// returning the whole response body, per the MCP streamable-HTTP
/// transport's non-streaming fallback mode.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
    bearer_token: Mutex<Option<String>>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers,
            bearer_token: Mutex::new(None),
        }
    }

    pub async fn set_bearer_token(&self, token: Option<String>) {
        *self.bearer_token.lock().await = token;
    }

    pub async fn send_request(
        &self,
        request: JsonRpcRequest,
        timeout_secs: u64,
    ) -> Result<JsonRpcResponse, TransportError> {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .json(&request);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(token) = self.bearer_token.lock().await.clone() {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| format!("MCP HTTP request failed: {e}"))?;
        if resp.status().as_u16() == 401 {
            return Err("OAuth login required".to_string());
        }
        if !resp.status().is_success() {
            return Err(format!("MCP HTTP request returned {}", resp.status()));
        }
        resp.json::<JsonRpcResponse>().await.map_err(|e| format!("invalid MCP response: {e}"))
    }

    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or(serde_json::json!({})),
        });
        let mut req = self.client.post(&self.url).json(&body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(token) = self.bearer_token.lock().await.clone() {
            req = req.bearer_auth(token);
        }
        req.send().await.map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        true
    }
}

/// SSE transport: identical request shape to [`HttpTransport`] — grip
/// treats the SSE endpoint as accepting the same JSON-RPC POST and
/// only differs in the `Accept` negotiation, matching the reference
/// MCP SDK's behavior of falling back to a single response event when
/// the server does not keep the stream open.
pub struct SseTransport {
    inner: HttpTransport,
}

impl SseTransport {
    pub fn new(url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self { inner: HttpTransport::new(url, headers) }
    }

    pub async fn set_bearer_token(&self, token: Option<String>) {
        self.inner.set_bearer_token(token).await;
    }

    pub async fn send_request(
        &self,
        request: JsonRpcRequest,
        timeout_secs: u64,
    ) -> Result<JsonRpcResponse, TransportError> {
        self.inner.send_request(request, timeout_secs).await
    }

    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        self.inner.send_notification(method, params).await
    }

    pub fn is_alive(&self) -> bool {
        true
    }
}

/// Transport-agnostic handle used by [`super::client::McpClient`].
pub enum McpTransportHandle {
    Stdio(StdioTransport),
    Http(HttpTransport),
    Sse(SseTransport),
}

impl McpTransportHandle {
    pub async fn send_request(
        &self,
        request: JsonRpcRequest,
        timeout_secs: u64,
    ) -> Result<JsonRpcResponse, TransportError> {
        match self {
            McpTransportHandle::Stdio(t) => t.send_request(request, timeout_secs).await,
            McpTransportHandle::Http(t) => t.send_request(request, timeout_secs).await,
            McpTransportHandle::Sse(t) => t.send_request(request, timeout_secs).await,
        }
    }

    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        match self {
            McpTransportHandle::Stdio(t) => t.send_notification(method, params).await,
            McpTransportHandle::Http(t) => t.send_notification(method, params).await,
            McpTransportHandle::Sse(t) => t.send_notification(method, params).await,
        }
    }

    pub async fn set_bearer_token(&self, token: Option<String>) {
        match self {
            McpTransportHandle::Stdio(_) => {}
            McpTransportHandle::Http(t) => t.set_bearer_token(token).await,
            McpTransportHandle::Sse(t) => t.set_bearer_token(token).await,
        }
    }

    pub async fn shutdown(&self) {
        if let McpTransportHandle::Stdio(t) = self {
            t.shutdown().await;
        }
    }

    pub fn is_alive(&self) -> bool {
        match self {
            McpTransportHandle::Stdio(t) => t.is_alive(),
            McpTransportHandle::Http(t) => t.is_alive(),
            McpTransportHandle::Sse(t) => t.is_alive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_framed_message_basic() {
        let data = b"Content-Length: 13\r\n\r\n{\"test\":true}";
        let mut reader = BufReader::new(&data[..]);
        let result = read_framed_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(result, b"{\"test\":true}");
    }

    #[tokio::test]
    async fn read_framed_message_eof() {
        let data = b"";
        let mut reader = BufReader::new(&data[..]);
        assert!(read_framed_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_framed_message_ignores_extra_headers() {
        let data = b"Content-Length: 2\r\nContent-Type: application/json\r\n\r\n{}";
        let mut reader = BufReader::new(&data[..]);
        let result = read_framed_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(result, b"{}");
    }
}
