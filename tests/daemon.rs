//! End-to-end daemon tests over a real Unix socket.
//!
//! A mock session factory stands in for real MCP servers, so these
//! exercise the wire contract, the pool lifecycle, and session reuse
//! across independent client requests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::net::UnixStream;

use mcpx::config::ServerConfig;
use mcpx::daemon::http;
use mcpx::daemon::pool::ConnectionPool;
use mcpx::daemon::service::DaemonService;
use mcpx::daemon::DaemonClient;
use mcpx::mcp::session::{Session, SessionFactory};
use mcpx::mcp::types::{ToolInfo, ToolOutcome};

/// A session that remembers state across calls, standing in for a
/// stateful server like a browser.
struct StatefulSession {
    id: usize,
    visited: Mutex<Option<String>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Session for StatefulSession {
    fn instructions(&self) -> Option<String> {
        None
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(vec![ToolInfo {
            server: "browser".into(),
            name: "navigate".into(),
            description: Some("Navigate to a URL".into()),
            input_schema: None,
        }])
    }

    async fn call_tool(&self, tool: &str, args: Option<Value>) -> Result<ToolOutcome> {
        match tool {
            "navigate" => {
                let url = args
                    .as_ref()
                    .and_then(|a| a.get("url"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                *self.visited.lock().unwrap() = Some(url);
                Ok(ToolOutcome {
                    raw: json!({"content": [{"type": "text", "text": "ok"}], "isError": false}),
                    is_error: false,
                })
            }
            "text" => {
                let visited = self.visited.lock().unwrap().clone();
                Ok(ToolOutcome {
                    raw: json!({
                        "content": [{"type": "text", "text": visited.unwrap_or_default()}],
                        "isError": false,
                        "session": self.id,
                    }),
                    is_error: false,
                })
            }
            other => anyhow::bail!("tool not found: {other}"),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct MockFactory {
    opened: AtomicUsize,
    close_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn open(&self, _name: &str, _config: &ServerConfig) -> Result<Arc<dyn Session>> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        let closed = Arc::new(AtomicBool::new(false));
        self.close_flags.lock().unwrap().push(closed.clone());
        Ok(Arc::new(StatefulSession {
            id,
            visited: Mutex::new(None),
            closed,
        }))
    }
}

fn server_config(command: &str) -> ServerConfig {
    serde_json::from_str(&format!(r#"{{"command": "{command}"}}"#)).unwrap()
}

struct TestDaemon {
    client: DaemonClient,
    factory: Arc<MockFactory>,
    socket_path: std::path::PathBuf,
    handle: tokio::task::JoinHandle<Result<()>>,
    _dir: tempfile::TempDir,
}

async fn start_daemon() -> TestDaemon {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("daemon.sock");

    let factory = Arc::new(MockFactory::default());
    let pool = ConnectionPool::new(factory.clone(), Duration::from_secs(300));
    let service = DaemonService::new(pool, socket_path.clone());
    let handle = tokio::spawn(service.run());

    let client = DaemonClient::new(socket_path.clone());
    for _ in 0..50 {
        if client.is_running().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(client.is_running().await, "daemon never became ready");

    TestDaemon {
        client,
        factory,
        socket_path,
        handle,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_connect_has_list_disconnect() {
    let daemon = start_daemon().await;
    let config = server_config("browser-mcp");

    assert!(!daemon.client.has("browser").await.unwrap());

    let already = daemon
        .client
        .connect("browser", &config, "<inline>")
        .await
        .unwrap();
    assert!(!already);

    let already = daemon
        .client
        .connect("browser", &config, "<inline>")
        .await
        .unwrap();
    assert!(already);

    assert!(daemon.client.has("browser").await.unwrap());
    assert_eq!(daemon.client.list().await.unwrap(), vec!["browser"]);
    assert_eq!(daemon.factory.opened.load(Ordering::SeqCst), 1);

    let detailed = daemon.client.list_detailed().await.unwrap();
    assert_eq!(detailed[0].name, "browser");
    assert_eq!(detailed[0].transport, "stdio");
    assert_eq!(detailed[0].config_source, "<inline>");

    assert!(daemon.client.disconnect("browser").await.unwrap());
    assert!(!daemon.client.disconnect("browser").await.unwrap());
    assert!(!daemon.client.has("browser").await.unwrap());

    daemon.client.shutdown().await.unwrap();
    let _ = daemon.handle.await;
}

#[tokio::test]
async fn test_call_reuses_stateful_session() {
    let daemon = start_daemon().await;
    let config = server_config("browser-mcp");

    // First call connects implicitly and sets state.
    daemon
        .client
        .call(
            "browser",
            Some(&config),
            "<inline>",
            "navigate",
            Some(json!({"url": "https://example.com"})),
        )
        .await
        .unwrap();

    // Second call must observe the state set by the first.
    let outcome = daemon
        .client
        .call("browser", Some(&config), "<inline>", "text", None)
        .await
        .unwrap();

    let text = outcome.raw["content"][0]["text"].as_str().unwrap();
    assert_eq!(text, "https://example.com");
    assert_eq!(daemon.factory.opened.load(Ordering::SeqCst), 1);

    daemon.client.shutdown().await.unwrap();
    let _ = daemon.handle.await;
}

#[tokio::test]
async fn test_config_change_triggers_reconnect() {
    let daemon = start_daemon().await;

    daemon
        .client
        .connect("browser", &server_config("browser-v1"), "<inline>")
        .await
        .unwrap();
    let old_closed = daemon.factory.close_flags.lock().unwrap()[0].clone();

    // Different config hash: the old session must be closed and a fresh
    // one opened before the reply.
    let already = daemon
        .client
        .connect("browser", &server_config("browser-v2"), "<inline>")
        .await
        .unwrap();

    assert!(!already);
    assert!(old_closed.load(Ordering::SeqCst));
    assert_eq!(daemon.factory.opened.load(Ordering::SeqCst), 2);
    assert_eq!(daemon.client.list().await.unwrap().len(), 1);

    daemon.client.shutdown().await.unwrap();
    let _ = daemon.handle.await;
}

#[tokio::test]
async fn test_call_unknown_tool_surfaces_error() {
    let daemon = start_daemon().await;
    let config = server_config("browser-mcp");

    let err = daemon
        .client
        .call("browser", Some(&config), "<inline>", "bogus", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    daemon.client.shutdown().await.unwrap();
    let _ = daemon.handle.await;
}

#[tokio::test]
async fn test_shutdown_releases_and_unlinks_socket() {
    let daemon = start_daemon().await;

    daemon
        .client
        .connect("a", &server_config("a-mcp"), "<inline>")
        .await
        .unwrap();
    daemon
        .client
        .connect("b", &server_config("b-mcp"), "<inline>")
        .await
        .unwrap();

    let released = daemon.client.shutdown().await.unwrap();
    assert_eq!(released, vec!["a".to_string(), "b".to_string()]);

    let result = tokio::time::timeout(Duration::from_secs(2), daemon.handle).await;
    assert!(result.is_ok(), "daemon did not exit after shutdown");
    assert!(!daemon.socket_path.exists(), "socket file not unlinked");

    for flag in daemon.factory.close_flags.lock().unwrap().iter() {
        assert!(flag.load(Ordering::SeqCst));
    }
}

async fn raw_request(socket_path: &std::path::Path, body: &[u8]) -> (u16, Vec<u8>) {
    let mut stream = UnixStream::connect(socket_path).await.unwrap();
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    http::write_request(&mut write_half, body).await.unwrap();
    http::read_response(&mut reader).await.unwrap()
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let daemon = start_daemon().await;

    let (status, body) = raw_request(&daemon.socket_path, b"this is not json").await;
    assert_eq!(status, 400);
    let response: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(response["error"], "invalid JSON");

    daemon.client.shutdown().await.unwrap();
    let _ = daemon.handle.await;
}

#[tokio::test]
async fn test_unknown_method_and_missing_params_are_bad_requests() {
    let daemon = start_daemon().await;

    let (status, body) = raw_request(&daemon.socket_path, br#"{"method": "bogus"}"#).await;
    assert_eq!(status, 400);
    let response: Value = serde_json::from_slice(&body).unwrap();
    assert!(response["error"]
        .as_str()
        .unwrap()
        .contains("unknown method"));

    let (status, body) = raw_request(&daemon.socket_path, br#"{"method": "has"}"#).await;
    assert_eq!(status, 400);
    let response: Value = serde_json::from_slice(&body).unwrap();
    assert!(response["error"]
        .as_str()
        .unwrap()
        .contains("missing required param: server"));

    daemon.client.shutdown().await.unwrap();
    let _ = daemon.handle.await;
}
