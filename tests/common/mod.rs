//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use query_proxy::config::ProxyConfig;
use query_proxy::http::{HttpServer, ProxyQueryService};
use query_proxy::query::builtin::{default_compiler_mappings, default_dialect_mappings};
use query_proxy::query::{CompilerMappings, DialectMappings};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// What a mock backend does once it has read a request.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Write the raw response and close.
    Reply(String),
    /// Write the raw prefix, pause, then close without finishing the body.
    Truncate(String),
    /// Write the raw prefix and hold the connection open.
    Stall(String),
    /// Never answer.
    Silent,
}

/// A raw TCP backend on an ephemeral port.
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockBackend {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = requests.clone();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let behavior = behavior.clone();
                let captured = captured.clone();
                tokio::spawn(async move {
                    serve(socket, behavior, captured).await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(mut socket: TcpStream, behavior: Behavior, captured: Arc<Mutex<Vec<CapturedRequest>>>) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    captured.lock().unwrap().push(request);

    match behavior {
        Behavior::Reply(raw) => {
            let _ = socket.write_all(raw.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        Behavior::Truncate(raw) => {
            let _ = socket.write_all(raw.as_bytes()).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = socket.shutdown().await;
        }
        Behavior::Stall(raw) => {
            let _ = socket.write_all(raw.as_bytes()).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Behavior::Silent => {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

/// A complete 200 response.
pub fn ok_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

/// A complete JSON error response.
pub fn error_response(status_line: &str, body: &Value) -> String {
    let body = body.to_string();
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    )
}

/// A 200 head announcing `declared` bytes followed by `sent`.
pub fn partial_response(declared: usize, sent: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        declared, sent
    )
}

/// An address nothing listens on.
pub async fn refused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Proxy config pointed at `upstream` with one-second timeouts.
pub fn test_config(upstream: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.address = upstream.to_string();
    config.upstream.token = "test-token".into();
    config.timeouts.connect_secs = 1;
    config.timeouts.request_secs = 1;
    config.timeouts.idle_secs = 1;
    config
}

/// Start the proxy forwarding to `upstream` and return its base URL.
pub async fn start_proxy(upstream: &str) -> String {
    let server = HttpServer::new(
        test_config(upstream),
        default_compiler_mappings(),
        default_dialect_mappings(),
    )
    .unwrap();
    serve_proxy(server).await
}

/// Start the proxy with custom registries.
pub async fn start_proxy_with_mappings(
    upstream: &str,
    compilers: CompilerMappings,
    dialects: DialectMappings,
) -> String {
    let server = HttpServer::new(test_config(upstream), compilers, dialects).unwrap();
    serve_proxy(server).await
}

/// Start the proxy in front of a custom query service.
pub async fn start_proxy_with_service(service: Arc<dyn ProxyQueryService>) -> String {
    let server = HttpServer::with_service(
        test_config("http://127.0.0.1:1"),
        service,
        default_compiler_mappings(),
        default_dialect_mappings(),
    );
    serve_proxy(server).await
}

async fn serve_proxy(server: HttpServer) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener, std::future::pending::<()>()).await;
    });
    format!("http://{}", addr)
}

/// A valid inbound request body using the built-in variants.
pub fn query_body() -> Value {
    json!({
        "request": {
            "organization_id": "0000000000000001",
            "compiler_type": "flux",
            "compiler": { "query": "from(bucket: \"telegraf\") |> range(start: -1h)" }
        },
        "dialect_type": "csv",
        "dialect": { "header": true, "delimiter": ",", "annotations": ["datatype"] }
    })
}
