//! MCP (Model Context Protocol) JSON-RPC dispatcher.
//!
//! Transport-independent: [`McpServer::handle_message`] takes one JSON-RPC
//! message plus the cluster registry active for the caller (process-wide in
//! stdio mode, per session in HTTP mode) and returns the response, or `None`
//! for notifications.
//!
//! ## Supported methods
//!
//! | Method              | Description                                  |
//! |---------------------|----------------------------------------------|
//! | `initialize`        | Handshake; may register clusters             |
//! | `tools/list`        | List tool definitions                        |
//! | `tools/call`        | Execute a tool and return its result         |
//! | `ping`              | Liveness check                               |
//!
//! Notifications (`notifications/initialized`, `notifications/cancelled`) are
//! acknowledged silently.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clusters::ClusterRegistry;
use crate::config::{self, json_kind};
use crate::rpc::{self, Request, Response};
use crate::tools::{Arguments, RegistryError, ToolContext, ToolRegistry};

pub const SERVER_NAME: &str = "ontap-mcp-server";
pub const SERVER_TITLE: &str = "NetApp ONTAP MCP Server";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: &str = "2025-06-18";
pub const INSTRUCTIONS: &str = "NetApp ONTAP MCP Server - Provides tools for managing ONTAP storage clusters including volumes, CIFS shares, NFS exports, snapshots, and QoS policies.";

/// The JSON-RPC dispatcher shared by both transports.
pub struct McpServer {
    tools: Arc<ToolRegistry>,
}

impl McpServer {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Parse and dispatch one raw message.
    pub async fn handle_message(
        &self,
        message: impl AsRef<[u8]>,
        clusters: &Arc<ClusterRegistry>,
        cancel: &CancellationToken,
    ) -> Option<Response> {
        match Request::parse_bytes(message.as_ref()) {
            Ok(request) => self.handle(request, clusters, cancel).await,
            Err(response) => {
                debug!("Rejected message: {:?}", response.error);
                Some(response)
            }
        }
    }

    /// Dispatch a parsed request. Returns `None` for notifications.
    pub async fn handle(
        &self,
        request: Request,
        clusters: &Arc<ClusterRegistry>,
        cancel: &CancellationToken,
    ) -> Option<Response> {
        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "Notification");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params, clusters).await,
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params, clusters, cancel).await,
            "ping" => Response::success(id, json!({ "status": "ok" })),
            other => Response::error(
                id,
                rpc::METHOD_NOT_FOUND,
                "Method not found",
                Some(Value::String(format!("unknown method: {other}"))),
            ),
        };
        Some(response)
    }

    async fn handle_initialize(
        &self,
        id: Value,
        params: Option<Value>,
        clusters: &Arc<ClusterRegistry>,
    ) -> Response {
        let params = params.unwrap_or(Value::Null);
        if !(params.is_object() || params.is_null()) {
            return invalid_params(id, format!("params must be an object, got {}", json_kind(&params)));
        }

        let client = &params["clientInfo"];
        info!(
            client = client["name"].as_str().unwrap_or("unknown"),
            client_version = client["version"].as_str().unwrap_or("unknown"),
            protocol = params["protocolVersion"].as_str().unwrap_or("unspecified"),
            "MCP initialize"
        );

        if let Some(options) = params.get("initializationOptions").filter(|o| o.is_object()) {
            for cluster in config::clusters_from_init_options(options) {
                let name = cluster.name.clone();
                if let Err(e) = clusters.add(cluster).await {
                    warn!(cluster = %name, "Skipping cluster from initializationOptions: {e}");
                }
            }
        }

        Response::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "title": SERVER_TITLE,
                    "version": SERVER_VERSION,
                },
                "instructions": INSTRUCTIONS,
            }),
        )
    }

    fn handle_tools_list(&self, id: Value) -> Response {
        let tools: Vec<Value> = self.tools.list().iter().map(|t| t.to_listing()).collect();
        Response::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(
        &self,
        id: Value,
        params: Option<Value>,
        clusters: &Arc<ClusterRegistry>,
        cancel: &CancellationToken,
    ) -> Response {
        let Some(Value::Object(mut params)) = params else {
            return invalid_params(id, "tools/call requires an object with a tool name".to_string());
        };
        let name = match params.remove("name") {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => return invalid_params(id, "missing tool name".to_string()),
        };
        let args = match Arguments::from_value(params.remove("arguments")) {
            Ok(args) => args,
            Err(e) => return invalid_params(id, e),
        };

        let ctx = ToolContext {
            clusters: Arc::clone(clusters),
            cancel: cancel.clone(),
        };

        let call = AssertUnwindSafe(self.tools.execute(&name, ctx, args)).catch_unwind();
        match call.await {
            Ok(Ok(result)) => match serde_json::to_value(&result) {
                Ok(value) => Response::success(id, value),
                Err(e) => Response::error(
                    id,
                    rpc::INTERNAL_ERROR,
                    "Internal error",
                    Some(Value::String(e.to_string())),
                ),
            },
            Ok(Err(RegistryError::UnknownTool(name))) => Response::error(
                id,
                rpc::METHOD_NOT_FOUND,
                format!("Tool not found: {name}"),
                None,
            ),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                error!(tool = %name, "Tool handler panicked: {detail}");
                Response::error(
                    id,
                    rpc::INTERNAL_ERROR,
                    "Internal error",
                    Some(Value::String(format!("tool {name} failed unexpectedly"))),
                )
            }
        }
    }
}

fn invalid_params(id: Value, detail: String) -> Response {
    Response::error(id, rpc::INVALID_PARAMS, "Invalid params", Some(Value::String(detail)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{default_registry, CallToolResult, ToolError};

    fn server() -> McpServer {
        let tools = default_registry();
        tools.register("explode", "panics", json!({"type": "object"}), |_, _| async {
            if true {
                panic!("kaboom");
            }
            Ok::<_, ToolError>(CallToolResult::text("unreachable"))
        });
        tools.register("fails", "tool-level failure", json!({"type": "object"}), |_, _| async {
            Err(ToolError::Failed("backend said no".into()))
        });
        McpServer::new(Arc::new(tools))
    }

    async fn call(server: &McpServer, clusters: &Arc<ClusterRegistry>, msg: Value) -> Option<Response> {
        server
            .handle_message(&msg.to_string(), clusters, &CancellationToken::new())
            .await
    }

    fn registry() -> Arc<ClusterRegistry> {
        Arc::new(ClusterRegistry::new())
    }

    #[tokio::test]
    async fn initialize_advertises_tools_capability() {
        let s = server();
        let resp = call(
            &s,
            &registry(),
            json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{},"clientInfo":{"name":"t","version":"0"}}}),
        )
        .await
        .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["instructions"].as_str().unwrap().contains("ONTAP"));
    }

    #[tokio::test]
    async fn initialize_registers_clusters_in_callers_registry() {
        let s = server();
        let mine = registry();
        let other = registry();
        call(
            &s,
            &mine,
            json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{
                "initializationOptions": {"clusters": {
                    "c1": {"cluster_ip":"10.0.0.1","username":"u","password":"p"},
                    "broken": {"cluster_ip":"10.0.0.2"}
                }}
            }}),
        )
        .await
        .unwrap();
        assert_eq!(mine.names().await, vec!["c1".to_string()]);
        assert!(other.is_empty().await);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let s = server();
        let resp = call(&s, &registry(), json!({"jsonrpc":"2.0","method":"notifications/initialized"})).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn unknown_method_and_tool_are_method_not_found() {
        let s = server();
        let r = registry();
        let resp = call(&s, &r, json!({"jsonrpc":"2.0","id":1,"method":"resources/list"})).await.unwrap();
        assert_eq!(resp.error.unwrap().code, rpc::METHOD_NOT_FOUND);

        let resp = call(
            &s,
            &r,
            json!({"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"no_such_tool"}}),
        )
        .await
        .unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, rpc::METHOD_NOT_FOUND);
        assert!(err.message.contains("no_such_tool"));
    }

    #[tokio::test]
    async fn malformed_call_params_are_invalid_params() {
        let s = server();
        let r = registry();
        for params in [json!(null), json!([1]), json!({}), json!({"name": "add_cluster", "arguments": "x"})] {
            let resp = call(&s, &r, json!({"jsonrpc":"2.0","id":3,"method":"tools/call","params":params}))
                .await
                .unwrap();
            assert_eq!(resp.error.unwrap().code, rpc::INVALID_PARAMS, "{params}");
        }
    }

    #[tokio::test]
    async fn tool_failure_is_a_successful_envelope() {
        let s = server();
        let resp = call(
            &s,
            &registry(),
            json!({"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"fails","arguments":{}}}),
        )
        .await
        .unwrap();
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "Error: backend said no");
    }

    #[tokio::test]
    async fn panicking_handler_is_internal_error() {
        let s = server();
        let r = registry();
        let resp = call(&s, &r, json!({"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"explode"}}))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, rpc::INTERNAL_ERROR);

        // Server keeps working afterwards.
        let resp = call(&s, &r, json!({"jsonrpc":"2.0","id":6,"method":"ping"})).await.unwrap();
        assert_eq!(resp.result.unwrap()["status"], "ok");
    }

    #[tokio::test]
    async fn tools_list_matches_registry() {
        let s = server();
        let resp = call(&s, &registry(), json!({"jsonrpc":"2.0","id":7,"method":"tools/list"})).await.unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), s.tools().len());
        for t in &tools {
            assert!(t["name"].is_string());
            assert!(t["inputSchema"].is_object());
            assert!(s.tools().contains(t["name"].as_str().unwrap()));
        }
    }

    #[tokio::test]
    async fn parse_error_is_reported() {
        let s = server();
        let resp = s
            .handle_message("{oops", &registry(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.unwrap().code, rpc::PARSE_ERROR);
    }
}
