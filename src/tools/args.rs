//! Typed access to free-form tool arguments.
//!
//! Tool arguments arrive as an arbitrary JSON object. Every extraction goes
//! through an [`Arguments`] accessor that checks presence and kind and fails
//! with [`ToolError::InvalidParameter`] naming the field. Absent and `null`
//! values are treated alike; for strings, empty also counts as absent.
//!
//! [`resolve_client`] implements cluster selection for every ONTAP-facing tool:
//!
//! 1. `cluster_name` → the named entry of the active registry
//! 2. `cluster_ip` + `username` + `password` → an ephemeral client for this call only
//! 3. exactly one registered cluster → that cluster
//! 4. otherwise → `InvalidParameter`

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::{ToolContext, ToolError};
use crate::client::ClusterClient;
use crate::config::{json_kind, ClusterConfig};

/// A tool call's `arguments` object.
#[derive(Debug, Clone, Default)]
pub struct Arguments(Map<String, Value>);

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl Arguments {
    /// Accept an object, or `null`/absent as no arguments. Anything else is rejected.
    pub fn from_value(value: Option<Value>) -> Result<Self, String> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Object(map)) => Ok(Self(map)),
            Some(other) => Err(format!(
                "arguments must be an object, got {}",
                json_kind(&other)
            )),
        }
    }

    fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    fn wrong_kind(key: &str, expected: &str, got: &Value) -> ToolError {
        ToolError::InvalidParameter(format!(
            "parameter {key} must be {expected}, got {}",
            json_kind(got)
        ))
    }

    fn missing(key: &str) -> ToolError {
        ToolError::InvalidParameter(format!("missing required parameter: {key}"))
    }

    /// Optional string. Empty strings are treated as absent.
    pub fn str(&self, key: &str) -> Result<Option<&str>, ToolError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(Self::wrong_kind(key, "a string", other)),
        }
    }

    /// Required non-empty string.
    pub fn required_str(&self, key: &str) -> Result<&str, ToolError> {
        self.str(key)?.ok_or_else(|| Self::missing(key))
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, ToolError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(Self::wrong_kind(key, "a boolean", other)),
        }
    }

    /// Optional integer. Integral floats (`5.0`) are accepted.
    pub fn i64(&self, key: &str) -> Result<Option<i64>, ToolError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| {
                    ToolError::InvalidParameter(format!("parameter {key} must be an integer"))
                }),
            Some(other) => Err(Self::wrong_kind(key, "a number", other)),
        }
    }

    pub fn required_i64(&self, key: &str) -> Result<i64, ToolError> {
        self.i64(key)?.ok_or_else(|| Self::missing(key))
    }

    /// Optional non-negative integer.
    pub fn u64(&self, key: &str) -> Result<Option<u64>, ToolError> {
        match self.i64(key)? {
            None => Ok(None),
            Some(n) => u64::try_from(n).map(Some).map_err(|_| {
                ToolError::InvalidParameter(format!("parameter {key} must not be negative"))
            }),
        }
    }

    pub fn f64(&self, key: &str) -> Result<Option<f64>, ToolError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(other) => Err(Self::wrong_kind(key, "a number", other)),
        }
    }

    /// Optional list of strings. A single string is accepted as a one-item list.
    pub fn string_list(&self, key: &str) -> Result<Option<Vec<String>>, ToolError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(Self::wrong_kind(&format!("{key}[{i}]"), "a string", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(Self::wrong_kind(key, "a string array", other)),
        }
    }

    /// Optional list of integers. A single number is accepted as a one-item list.
    pub fn int_list(&self, key: &str) -> Result<Option<Vec<i64>>, ToolError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(|n| Some(vec![n]))
                .ok_or_else(|| ToolError::InvalidParameter(format!("parameter {key} must be an integer"))),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_i64()
                        .ok_or_else(|| Self::wrong_kind(&format!("{key}[{i}]"), "an integer", item))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(Self::wrong_kind(key, "an integer array", other)),
        }
    }

    pub fn object(&self, key: &str) -> Result<Option<&Map<String, Value>>, ToolError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(Self::wrong_kind(key, "an object", other)),
        }
    }

    /// Optional list of objects, cloned out of the arguments.
    pub fn object_list(&self, key: &str) -> Result<Option<Vec<Map<String, Value>>>, ToolError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => Ok(map.clone()),
                    other => Err(Self::wrong_kind(&format!("{key}[{i}]"), "an object", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(Self::wrong_kind(key, "an array", other)),
        }
    }

    /// Optional size in bytes, given as a number of bytes or a string like `"100GB"`.
    pub fn size(&self, key: &str) -> Result<Option<i64>, ToolError> {
        match self.raw(key) {
            None => Ok(None),
            Some(Value::String(s)) => parse_size(s)
                .map(Some)
                .map_err(|e| ToolError::InvalidParameter(format!("parameter {key}: {e}"))),
            Some(Value::Number(_)) => self.i64(key),
            Some(other) => Err(Self::wrong_kind(key, "a size string or number", other)),
        }
    }
}

/// Parse `"104857600"`, `"100MB"`, `"1.5T"`, `"512m"` into bytes (binary units).
pub fn parse_size(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("size string is empty".to_string());
    }
    if let Ok(bytes) = raw.parse::<i64>() {
        return Ok(bytes);
    }

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (num, unit) = raw.split_at(split);
    let num: f64 = num
        .parse()
        .map_err(|_| format!("invalid size format '{raw}'. Use '100MB', '2GB', '1TB', or raw bytes"))?;
    let multiplier: f64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "K" | "KB" => 1024.0,
        "M" | "MB" => 1024.0 * 1024.0,
        "G" | "GB" => 1024.0 * 1024.0 * 1024.0,
        "T" | "TB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        other => {
            return Err(format!(
                "invalid size unit '{other}'. Supported: KB, MB, GB, TB (or K, M, G, T), or raw bytes"
            ))
        }
    };
    Ok((num * multiplier) as i64)
}

/// Render bytes with binary units, e.g. `1.50 GB`.
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// How a call's client was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Registry,
    Direct,
    SoleCluster,
}

/// Client chosen for one tool call.
pub struct Resolved {
    pub client: Arc<ClusterClient>,
    /// Cluster name, or the address for direct mode.
    pub label: String,
    pub selection: Selection,
}

/// Pick the ONTAP client for a tool call.
pub async fn resolve_client(ctx: &ToolContext, args: &Arguments) -> Result<Resolved, ToolError> {
    if let Some(name) = args.str("cluster_name")? {
        let client = ctx
            .clusters
            .client(name)
            .await
            .ok_or_else(|| ToolError::ClusterNotFound(name.to_string()))?;
        return Ok(Resolved {
            client,
            label: name.to_string(),
            selection: Selection::Registry,
        });
    }

    let ip = args.str("cluster_ip")?;
    let username = args.str("username")?;
    let password = args.str("password")?;
    if let (Some(ip), Some(username), Some(password)) = (ip, username, password) {
        let config = ClusterConfig {
            name: ip.to_string(),
            cluster_ip: ip.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            description: None,
            verify_ssl: args.bool("verify_ssl")?.unwrap_or(false),
        };
        let client = ClusterClient::new(&config).map_err(ToolError::client("Failed to create client"))?;
        debug!(cluster_ip = ip, "Using direct-mode client for this call");
        return Ok(Resolved {
            client: Arc::new(client),
            label: ip.to_string(),
            selection: Selection::Direct,
        });
    }

    if let Some((name, client)) = ctx.clusters.sole().await {
        return Ok(Resolved {
            client,
            label: name,
            selection: Selection::SoleCluster,
        });
    }

    Err(ToolError::InvalidParameter(
        "must provide cluster_name or cluster_ip+username+password".to_string(),
    ))
}

/// Input schema with the cluster selector properties merged in.
///
/// `properties` and `required` describe the tool's own parameters.
pub fn schema(properties: Value, required: &[&str]) -> Value {
    let mut props = match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    props.insert(
        "cluster_name".into(),
        json!({"type": "string", "description": "Registered cluster name. Omit when only one cluster is registered."}),
    );
    props.insert(
        "cluster_ip".into(),
        json!({"type": "string", "description": "Cluster management address (direct mode, with username and password)."}),
    );
    props.insert(
        "username".into(),
        json!({"type": "string", "description": "ONTAP username (direct mode)."}),
    );
    props.insert(
        "password".into(),
        json!({"type": "string", "description": "ONTAP password (direct mode)."}),
    );
    json!({
        "type": "object",
        "properties": props,
        "required": required,
    })
}
