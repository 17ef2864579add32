//! Connection factory: build a live session from a server config.
//!
//! Stdio servers are spawned with a merged environment and their stderr
//! forwarded line-by-line to our own stderr, prefixed with the server
//! name, so interactive auth prompts stay visible. The first portion of
//! stderr is also buffered until the handshake resolves; a terminal
//! connect failure is annotated with it.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use rmcp::ServiceExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::task::JoinHandle;

use crate::config::{ServerConfig, Settings, Transport};
use crate::mcp::retry::{with_retry, RetryConfig};
use crate::mcp::session::{RmcpSession, Session, SessionFactory};

/// Open a session under the retry policy. Each attempt builds a fresh
/// transport; repeated calls with the same inputs produce independent
/// sessions.
pub async fn open_session(
    name: &str,
    config: &ServerConfig,
    retry: &RetryConfig,
    deadline: Instant,
) -> Result<Arc<dyn Session>> {
    with_retry(&format!("connect '{name}'"), retry, deadline, || {
        open_once(name, config)
    })
    .await
}

async fn open_once(name: &str, config: &ServerConfig) -> Result<Arc<dyn Session>> {
    match &config.transport {
        Transport::Stdio {
            command,
            args,
            env,
            cwd,
        } => open_stdio(name, command, args, env, cwd.as_deref()).await,
        Transport::Http {
            url,
            headers,
            timeout,
        } => open_http(name, url, headers, *timeout).await,
    }
}

async fn open_stdio(
    name: &str,
    command: &str,
    args: &[String],
    env: &std::collections::HashMap<String, String>,
    cwd: Option<&str>,
) -> Result<Arc<dyn Session>> {
    let mut cmd = Command::new(command);
    cmd.args(args);
    // Child inherits the process environment; config entries override it,
    // with ${VAR} references expanded from the current environment.
    for (key, value) in env {
        let expanded = shellexpand::env(value).unwrap_or_else(|_| value.clone().into());
        cmd.env(key, expanded.as_ref());
    }
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let (transport, stderr) = TokioChildProcess::builder(cmd)
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn MCP server '{name}' ({command})"))?;

    // The forwarder must attach before the handshake so auth banners and
    // interactive prompts surface while the server is still starting.
    let mut tail = StderrTail::attach(name, stderr);

    match ().serve(transport).await {
        Ok(service) => {
            tail.stop_capture();
            tracing::debug!("connected to MCP server '{name}'");
            // The session takes the forwarder so close() can reap it.
            let forwarder = tail.take_forwarder();
            Ok(Arc::new(RmcpSession::new(
                name.to_string(),
                service,
                forwarder,
            )))
        }
        Err(e) => {
            let captured = tail.captured();
            // The dropped transport kills the child; reap the forwarder
            // rather than leaving it to drain a dead pipe.
            tail.abort();
            let err = anyhow::Error::new(e);
            if captured.is_empty() {
                Err(err.context(format!("handshake with '{name}' failed")))
            } else {
                Err(err.context(format!(
                    "handshake with '{name}' failed; server stderr: {captured}"
                )))
            }
        }
    }
}

async fn open_http(
    name: &str,
    url: &str,
    headers: &std::collections::HashMap<String, String>,
    timeout_ms: Option<u64>,
) -> Result<Arc<dyn Session>> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (key, value) in headers {
        let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("invalid header name '{key}' for server '{name}'"))?;
        let header_value = reqwest::header::HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header '{key}' on server '{name}'"))?;
        header_map.insert(header_name, header_value);
    }

    let mut builder = reqwest::Client::builder().default_headers(header_map);
    if let Some(ms) = timeout_ms {
        builder = builder.timeout(Duration::from_millis(ms));
    }
    let client = builder
        .build()
        .with_context(|| format!("failed to build HTTP client for '{name}'"))?;

    let transport = StreamableHttpClientTransport::with_client(
        client,
        StreamableHttpClientTransportConfig::with_uri(url.to_string()),
    );

    let service = ()
        .serve(transport)
        .await
        .with_context(|| format!("handshake with '{name}' failed ({url})"))?;

    tracing::debug!("connected to MCP server '{name}' at {url}");
    Ok(Arc::new(RmcpSession::new(name.to_string(), service, None)))
}

/// The production session factory: env-derived retry policy around
/// [`open_session`].
pub struct McpSessionFactory {
    retry: RetryConfig,
}

impl McpSessionFactory {
    pub fn new(settings: &Settings) -> Self {
        Self {
            retry: RetryConfig::from_settings(settings),
        }
    }
}

#[async_trait]
impl SessionFactory for McpSessionFactory {
    async fn open(&self, name: &str, config: &ServerConfig) -> Result<Arc<dyn Session>> {
        let deadline = Instant::now() + self.retry.total_budget;
        open_session(name, config, &self.retry, deadline).await
    }
}

/// Streams a child's stderr to our stderr and keeps a bounded copy of the
/// early output for connect-error annotation. Owns the forwarder task's
/// handle so it can be handed to the session or aborted.
struct StderrTail {
    captured: Arc<StdMutex<String>>,
    capturing: Arc<AtomicBool>,
    forwarder: Option<JoinHandle<()>>,
}

impl StderrTail {
    const CAPTURE_LIMIT: usize = 4096;

    fn attach(name: &str, stderr: Option<ChildStderr>) -> Self {
        let captured = Arc::new(StdMutex::new(String::new()));
        let capturing = Arc::new(AtomicBool::new(true));

        let forwarder = stderr.map(|stderr| {
            let name = name.to_string();
            let captured = captured.clone();
            let capturing = capturing.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    eprintln!("[{name}] {line}");
                    if capturing.load(Ordering::Relaxed) {
                        let mut buf = captured.lock().unwrap_or_else(|e| e.into_inner());
                        if buf.len() < Self::CAPTURE_LIMIT {
                            if !buf.is_empty() {
                                buf.push('\n');
                            }
                            buf.push_str(&line);
                        }
                    }
                }
            })
        });

        Self {
            captured,
            capturing,
            forwarder,
        }
    }

    fn stop_capture(&self) {
        self.capturing.store(false, Ordering::Relaxed);
    }

    fn take_forwarder(&mut self) -> Option<JoinHandle<()>> {
        self.forwarder.take()
    }

    fn abort(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    fn captured(&self) -> String {
        self.captured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
