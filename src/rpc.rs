//! Newline-delimited JSON-RPC 2.0 surface over stdio or TCP.
//!
//! Methods: `initialize {rootPath, languageId, useCache?, loadDependencies?}`,
//! `query {query, format?}`, `status`, `shutdown`. Notifications
//! (`file/didChange {path}`, `file/didDelete {path}`) are never answered.
//! Message handling is synchronous; tokio only drives the transport.

use anyhow::Result;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::bindings::BindingRegistry;
use crate::cancel::CancellationToken;
use crate::engine::{Engine, EngineConfig};
use crate::watcher::UpdateEvent;

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const SERVER_ERROR: i64 = -32000;

/// Shared server state: the engine appears after `initialize`.
pub struct RpcServer {
    engine: Mutex<Option<Arc<Engine>>>,
    bindings: BindingRegistry,
}

impl RpcServer {
    pub fn new() -> Arc<Self> {
        Arc::new(RpcServer {
            engine: Mutex::new(None),
            bindings: BindingRegistry::with_defaults(),
        })
    }

    /// Handle one newline-delimited message. Returns the serialized
    /// response (None for notifications) and whether to shut down.
    pub fn handle_line(&self, line: &str) -> (Option<String>, bool) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return (None, false);
        }

        let message: Value = match serde_json::from_str(trimmed) {
            Ok(message) => message,
            Err(err) => {
                let response = error_response(Value::Null, PARSE_ERROR, &err.to_string(), None);
                return (Some(response.to_string()), false);
            }
        };

        let id = message.get("id").cloned();
        let method = message.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        // Notifications are processed but never answered.
        let is_notification = id.is_none();
        let (result, shutdown) = self.dispatch(method, &params);

        if is_notification {
            return (None, shutdown);
        }
        let id = id.unwrap_or(Value::Null);
        let response = match result {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err((code, message, data)) => error_response(id, code, &message, data),
        };
        (Some(response.to_string()), shutdown)
    }

    #[allow(clippy::type_complexity)]
    fn dispatch(
        &self,
        method: &str,
        params: &Value,
    ) -> (Result<Value, (i64, String, Option<Value>)>, bool) {
        match method {
            "initialize" => (self.handle_initialize(params), false),
            "query" => (self.handle_query(params), false),
            "status" => (self.handle_status(), false),
            "shutdown" => (Ok(Value::Null), true),
            "file/didChange" => {
                self.handle_file_event(params, false);
                (Ok(Value::Null), false)
            }
            "file/didDelete" => {
                self.handle_file_event(params, true);
                (Ok(Value::Null), false)
            }
            other => (
                Err((METHOD_NOT_FOUND, format!("unknown method: {other}"), None)),
                false,
            ),
        }
    }

    fn handle_initialize(&self, params: &Value) -> Result<Value, (i64, String, Option<Value>)> {
        let root = params
            .get("rootPath")
            .and_then(|v| v.as_str())
            .ok_or((INVALID_PARAMS, "rootPath required".to_string(), None))?;
        let language = params
            .get("languageId")
            .and_then(|v| v.as_str())
            .unwrap_or("dart");
        let use_cache = params
            .get("useCache")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let load_dependencies = params
            .get("loadDependencies")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let mut config = EngineConfig::new(PathBuf::from(root), language);
        config.use_cache = use_cache;
        config.load_dependencies = load_dependencies;
        let producer = self.bindings.get(language);

        match Engine::open(config, producer) {
            Ok(engine) => {
                let status = engine.status();
                *self.engine.lock().unwrap() = Some(Arc::new(engine));
                Ok(json!({
                    "capabilities": {"query": true, "watch": true, "docs": true},
                    "status": status,
                }))
            }
            Err(err) => Err((SERVER_ERROR, err.to_string(), None)),
        }
    }

    fn handle_query(&self, params: &Value) -> Result<Value, (i64, String, Option<Value>)> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or((INVALID_PARAMS, "query required".to_string(), None))?;

        let engine = self
            .engine
            .lock()
            .unwrap()
            .clone()
            .ok_or((SERVER_ERROR, "not initialized".to_string(), None))?;

        let result = engine.query(query, &CancellationToken::new());
        let format = params
            .get("format")
            .and_then(|v| v.as_str())
            .unwrap_or("json");
        if format == "text" {
            Ok(json!({"text": result.to_text()}))
        } else {
            Ok(result.to_json())
        }
    }

    fn handle_status(&self) -> Result<Value, (i64, String, Option<Value>)> {
        match self.engine.lock().unwrap().as_ref() {
            Some(engine) => Ok(serde_json::to_value(engine.status())
                .map_err(|e| (SERVER_ERROR, e.to_string(), None))?),
            None => Ok(json!({"initialized": false})),
        }
    }

    fn handle_file_event(&self, params: &Value, removed: bool) {
        let Some(engine) = self.engine.lock().unwrap().clone() else {
            return;
        };
        let Some(path) = params.get("path").and_then(|v| v.as_str()) else {
            return;
        };
        let mut absolute = PathBuf::from(path);
        if absolute.is_relative() {
            absolute = engine.config().project_root.join(absolute);
        }
        let event = if removed {
            UpdateEvent::FileRemoved(absolute)
        } else {
            UpdateEvent::FileUpdated(absolute)
        };
        if let UpdateEvent::IndexError { path, message } = engine.apply_event(&event) {
            eprintln!("WARNING: reindex failed for {}: {message}", path.display());
        }
    }
}

fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({"code": code, "message": message});
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({"jsonrpc": "2.0", "id": id, "error": error})
}

/// Serve over stdio until `shutdown` or EOF.
pub async fn serve_stdio(server: Arc<RpcServer>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let (response, shutdown) = server.handle_line(&line);
        if let Some(response) = response {
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        if shutdown {
            break;
        }
    }
    Ok(())
}

/// Serve over TCP; one task per connection, shared engine state.
pub async fn serve_tcp(server: Arc<RpcServer>, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    eprintln!("sextant rpc listening on 127.0.0.1:{port}");

    loop {
        let (socket, _) = listener.accept().await?;
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let (response, shutdown) = server.handle_line(&line);
                if let Some(response) = response {
                    if write_half.write_all(response.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = write_half.write_all(b"\n").await;
                }
                if shutdown {
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialize(server: &RpcServer, root: &std::path::Path) -> Value {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"rootPath": root.display().to_string(), "languageId": "dart"},
        });
        let (response, shutdown) = server.handle_line(&request.to_string());
        assert!(!shutdown);
        serde_json::from_str(&response.unwrap()).unwrap()
    }

    #[test]
    fn test_initialize_and_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = RpcServer::new();

        let response = initialize(&server, dir.path());
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["capabilities"]["query"], true);

        let (status, _) = server.handle_line(
            &json!({"jsonrpc": "2.0", "id": 2, "method": "status"}).to_string(),
        );
        let status: Value = serde_json::from_str(&status.unwrap()).unwrap();
        assert_eq!(status["result"]["language"], "dart");
    }

    #[test]
    fn test_query_before_initialize_errors() {
        let server = RpcServer::new();
        let (response, _) = server.handle_line(
            &json!({"jsonrpc": "2.0", "id": 1, "method": "query", "params": {"query": "stats"}})
                .to_string(),
        );
        let response: Value = serde_json::from_str(&response.unwrap()).unwrap();
        assert_eq!(response["error"]["code"], SERVER_ERROR);
    }

    #[test]
    fn test_query_returns_typed_result() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = RpcServer::new();
        initialize(&server, dir.path());

        let (response, _) = server.handle_line(
            &json!({"jsonrpc": "2.0", "id": 3, "method": "query", "params": {"query": "stats"}})
                .to_string(),
        );
        let response: Value = serde_json::from_str(&response.unwrap()).unwrap();
        assert_eq!(response["result"]["type"], "stats");
    }

    #[test]
    fn test_unknown_method() {
        let server = RpcServer::new();
        let (response, _) = server.handle_line(
            &json!({"jsonrpc": "2.0", "id": 4, "method": "nope"}).to_string(),
        );
        let response: Value = serde_json::from_str(&response.unwrap()).unwrap();
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn test_parse_error() {
        let server = RpcServer::new();
        let (response, _) = server.handle_line("{ not json");
        let response: Value = serde_json::from_str(&response.unwrap()).unwrap();
        assert_eq!(response["error"]["code"], PARSE_ERROR);
    }

    #[test]
    fn test_notifications_are_never_answered() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = RpcServer::new();
        initialize(&server, dir.path());

        let (response, shutdown) = server.handle_line(
            &json!({"jsonrpc": "2.0", "method": "file/didChange", "params": {"path": "lib/a.dart"}})
                .to_string(),
        );
        assert!(response.is_none());
        assert!(!shutdown);
    }

    #[test]
    fn test_shutdown() {
        let server = RpcServer::new();
        let (response, shutdown) = server.handle_line(
            &json!({"jsonrpc": "2.0", "id": 9, "method": "shutdown"}).to_string(),
        );
        assert!(shutdown);
        let response: Value = serde_json::from_str(&response.unwrap()).unwrap();
        assert_eq!(response["result"], Value::Null);
    }
}
