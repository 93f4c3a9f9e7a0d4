//! MCP tool catalog and execution.
//!
//! Each tool is a name, a description, a JSON input schema and an async
//! handler. Handlers are registered once at start-up into [`ToolRegistry`] by
//! [`register_all`] and invoked by name through [`ToolRegistry::execute`].
//!
//! ## Tool categories
//!
//! - [`cluster`]: registry management and cluster-wide listings
//! - [`volume`]: volume lifecycle, resize, autosize
//! - [`snapshot`]: volume snapshots, snapshot policies and schedules
//! - [`qos`]: QoS policy groups
//! - [`cifs`]: SMB shares
//! - [`nfs`]: export policies and rules
//!
//! ## Errors
//!
//! Handlers return `Result<CallToolResult, ToolError>`. An `Err` becomes an
//! `isError` result carrying `"Error: <message>"`; it is never a JSON-RPC error.
//! Only an unknown tool name is reported out of band ([`RegistryError`]).

pub mod args;
pub mod cifs;
pub mod cluster;
pub mod nfs;
pub mod qos;
pub mod snapshot;
pub mod volume;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::ClientError;
use crate::clusters::ClusterRegistry;

pub use args::Arguments;

/// One content item of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            data: None,
            mime_type: None,
        }
    }
}

/// Result of a tool invocation, in MCP wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Plain text success.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    /// Pretty-printed JSON success.
    pub fn json(value: &Value) -> Self {
        Self::text(serde_json::to_string_pretty(value).unwrap_or_default())
    }

    /// Hybrid list result: `{"summary": ..., "data": [...]}` in one text item.
    pub fn hybrid(summary: impl Into<String>, data: impl Serialize) -> Self {
        let data = serde_json::to_value(data).unwrap_or(Value::Null);
        Self::json(&json!({ "summary": summary.into(), "data": data }))
    }

    /// Tool-level failure.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            content: vec![Content::text(format!("Error: {message}"))],
            is_error: true,
        }
    }

    /// Text of the first content item, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|c| c.text.as_deref())
    }
}

/// Failures a handler reports as an `isError` result.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),
    #[error("{context}: {source}")]
    Client {
        context: String,
        #[source]
        source: ClientError,
    },
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// `map_err` adapter that tags a client error with the failing operation.
    pub fn client(context: impl Into<String>) -> impl FnOnce(ClientError) -> ToolError {
        let context = context.into();
        move |source| ToolError::Client { context, source }
    }
}

/// Dispatcher-visible registry failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool not found: {0}")]
    UnknownTool(String),
}

/// Per-call context handed to every handler.
#[derive(Clone)]
pub struct ToolContext {
    /// Registry active for this call: process-wide (stdio) or per session (HTTP).
    pub clusters: Arc<ClusterRegistry>,
    /// Cancelled when the caller goes away or the call must stop.
    pub cancel: CancellationToken,
}

type HandlerFuture = BoxFuture<'static, Result<CallToolResult, ToolError>>;
type Handler = Arc<dyn Fn(ToolContext, Arguments) -> HandlerFuture + Send + Sync>;

/// A registered tool.
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    handler: Handler,
}

impl ToolDefinition {
    /// `{name, description, inputSchema}` as listed by `tools/list`.
    pub fn to_listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// Name → tool catalog.
///
/// Populated once at start-up, then only read. The lock is never held across
/// an `.await`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<ToolDefinition>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name replaces the earlier one.
    pub fn register<F, Fut>(&self, name: &str, description: &str, input_schema: Value, handler: F)
    where
        F: Fn(ToolContext, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult, ToolError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ctx, args| handler(ctx, args).boxed());
        let def = ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
            handler,
        };
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(def));
    }

    /// All tools, sorted by name.
    pub fn list(&self) -> Vec<Arc<ToolDefinition>> {
        let mut tools: Vec<_> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run a tool. Handler failures come back as `isError` results; only an
    /// unknown name is an `Err`.
    pub async fn execute(
        &self,
        name: &str,
        ctx: ToolContext,
        args: Arguments,
    ) -> Result<CallToolResult, RegistryError> {
        let tool = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))?;
        debug!(tool = name, "Executing tool");
        match (tool.handler)(ctx, args).await {
            Ok(result) => Ok(result),
            Err(e) => {
                debug!(tool = name, "Tool failed: {e}");
                Ok(CallToolResult::error(e))
            }
        }
    }
}

/// Register the full ONTAP tool catalog.
pub fn register_all(registry: &ToolRegistry) {
    cluster::register(registry);
    volume::register(registry);
    snapshot::register(registry);
    qos::register(registry);
    cifs::register(registry);
    nfs::register(registry);
}

/// Build a registry holding the full catalog.
pub fn default_registry() -> ToolRegistry {
    let registry = ToolRegistry::new();
    register_all(&registry);
    registry
}
