//! Configuration loading for ontap-mcp.
//!
//! Three independent sources feed the process:
//!
//! 1. **CLI flags** ([`Cli`]): transport mode, log level, optional settings file
//! 2. **`ONTAP_CLUSTERS`**: JSON cluster list, either an array of configs or an
//!    object keyed by cluster name
//! 3. **Settings file** ([`Config`]): TOML, via `--config <path>` or
//!    `ontap-mcp.toml` in CWD, falling back to compiled defaults. Session timeouts
//!    can be overridden by `MCP_SESSION_INACTIVITY_TIMEOUT` and
//!    `MCP_SESSION_MAX_LIFETIME`.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! session_idle_timeout_secs = 1800
//! session_max_lifetime_secs = 86400
//! shutdown_drain_secs = 5
//!
//! [logging]
//! level = "info"
//! ```
//!
//! The same cluster payload shapes are accepted at runtime from an MCP client's
//! `initializationOptions` (see [`clusters_from_init_options`]), where bad entries
//! are skipped with a warning instead of failing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Environment variable holding the start-up cluster list.
pub const CLUSTERS_ENV: &str = "ONTAP_CLUSTERS";

/// Port used when `--http` is given without a value.
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// CLI arguments parsed by `clap`.
#[derive(Parser, Debug)]
#[command(
    name = "ontap-mcp",
    about = "MCP server for NetApp ONTAP clusters",
    disable_version_flag = true
)]
pub struct Cli {
    /// Print name and version, then exit
    #[arg(long)]
    pub version: bool,

    /// Serve streamable HTTP on this port instead of stdio (bare flag: 3000)
    #[arg(
        long,
        value_name = "PORT",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "3000"
    )]
    pub http: Option<u16>,

    /// Test the connection to every configured cluster and exit
    #[arg(long)]
    pub test_connection: bool,

    /// Log level
    #[arg(long, value_parser = ["debug", "info", "warn", "error"])]
    pub log_level: Option<String>,

    /// Path to TOML settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bind address for HTTP mode
    #[arg(long)]
    pub host: Option<String>,
}

/// Connection settings for one ONTAP cluster.
///
/// Every field defaults when absent so that validation can name the entry and
/// the missing field instead of surfacing a serde error.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster_ip: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub verify_ssl: bool,
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("name", &self.name)
            .field("cluster_ip", &self.cluster_ip)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("description", &self.description)
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

impl ClusterConfig {
    /// Returns the first required field that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.name.is_empty() {
            Some("name")
        } else if self.cluster_ip.is_empty() {
            Some("cluster_ip")
        } else if self.username.is_empty() {
            Some("username")
        } else if self.password.is_empty() {
            Some("password")
        } else {
            None
        }
    }
}

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {source_name} JSON (must be an array or object): {reason}")]
    InvalidJson { source_name: String, reason: String },
    #[error("cluster {entry}: {reason}")]
    InvalidEntry { entry: String, reason: String },
    #[error("cluster {entry}: {field} is required")]
    MissingField { entry: String, field: &'static str },
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Load and validate clusters from the `ONTAP_CLUSTERS` environment variable.
///
/// Unset or blank → no clusters. Any invalid entry is fatal.
pub fn load_clusters_from_env() -> Result<Vec<ClusterConfig>, ConfigError> {
    match std::env::var(CLUSTERS_ENV) {
        Ok(raw) => parse_clusters(&raw),
        Err(_) => Ok(Vec::new()),
    }
}

/// Parse and validate a cluster list in array or object form.
pub fn parse_clusters(raw: &str) -> Result<Vec<ClusterConfig>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| ConfigError::InvalidJson {
        source_name: CLUSTERS_ENV.to_string(),
        reason: e.to_string(),
    })?;

    let entries = cluster_entries(value, CLUSTERS_ENV)?;
    let mut clusters = Vec::with_capacity(entries.len());
    for (label, entry) in entries {
        let cluster = entry?;
        if let Some(field) = cluster.missing_field() {
            return Err(ConfigError::MissingField {
                entry: label,
                field,
            });
        }
        clusters.push(cluster);
    }
    Ok(clusters)
}

/// Extract clusters from an MCP `initializationOptions` object.
///
/// Looks under `clusters` first, then `ONTAP_CLUSTERS`. The payload may be a JSON
/// string, an array of configs, or an object keyed by name. Entries that fail to
/// parse or lack a required field are skipped with a warning.
pub fn clusters_from_init_options(options: &Value) -> Vec<ClusterConfig> {
    let Some(payload) = options
        .get("clusters")
        .or_else(|| options.get(CLUSTERS_ENV))
    else {
        return Vec::new();
    };

    let payload = match payload {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(e) => {
                warn!("Ignoring clusters in initializationOptions: invalid JSON string: {e}");
                return Vec::new();
            }
        },
        other => other.clone(),
    };

    let entries = match cluster_entries(payload, "initializationOptions.clusters") {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Ignoring clusters in initializationOptions: {e}");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(label, entry)| match entry {
            Ok(cluster) => match cluster.missing_field() {
                None => Some(cluster),
                Some(field) => {
                    warn!("Skipping cluster {label} from initializationOptions: {field} is required");
                    None
                }
            },
            Err(e) => {
                warn!("Skipping cluster from initializationOptions: {e}");
                None
            }
        })
        .collect()
}

type ClusterEntry = (String, Result<ClusterConfig, ConfigError>);

/// Split an array- or object-form payload into labelled, individually parsed entries.
///
/// Array entries are labelled by their `name` (or index when the name is
/// missing); object entries take their key as the cluster name.
fn cluster_entries(value: Value, source_name: &str) -> Result<Vec<ClusterEntry>, ConfigError> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let label = match item.get("name").and_then(Value::as_str) {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => i.to_string(),
                };
                let parsed = parse_entry(item, &label);
                (label, parsed)
            })
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, item)| {
                let parsed = parse_entry(item, &name).map(|mut cluster| {
                    cluster.name = name.clone();
                    cluster
                });
                (name, parsed)
            })
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(ConfigError::InvalidJson {
            source_name: source_name.to_string(),
            reason: format!("expected array or object, got {}", json_kind(&other)),
        }),
    }
}

fn parse_entry(item: Value, label: &str) -> Result<ClusterConfig, ConfigError> {
    if !item.is_object() {
        return Err(ConfigError::InvalidEntry {
            entry: label.to_string(),
            reason: format!("entry must be an object, got {}", json_kind(&item)),
        });
    }
    serde_json::from_value(item).map_err(|e| ConfigError::InvalidEntry {
        entry: label.to_string(),
        reason: e.to_string(),
    })
}

/// Human-readable name of a JSON value's kind, used in error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Top-level settings, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP transport and session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for HTTP mode (default `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Sessions idle for longer than this are dropped (default 30 min).
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,
    /// Sessions older than this are dropped regardless of activity (default 24 h).
    #[serde(default = "default_session_max_lifetime_secs")]
    pub session_max_lifetime_secs: u64,
    /// Grace period for in-flight requests on shutdown (default 5 s).
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `--log-level` and `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_session_idle_timeout_secs() -> u64 {
    30 * 60
}
fn default_session_max_lifetime_secs() -> u64 {
    24 * 60 * 60
}
fn default_shutdown_drain_secs() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            session_max_lifetime_secs: default_session_max_lifetime_secs(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.session_max_lifetime_secs)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}

impl Config {
    /// Load settings with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `ontap-mcp.toml` in the
    /// current directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new("ontap-mcp.toml").exists() => {
                Self::from_file(Path::new("ontap-mcp.toml"))?
            }
            None => Config::default(),
        };

        if let Some(d) = env_duration("MCP_SESSION_INACTIVITY_TIMEOUT") {
            config.server.session_idle_timeout_secs = d.as_secs().max(1);
        }
        if let Some(d) = env_duration("MCP_SESSION_MAX_LIFETIME") {
            config.server.session_max_lifetime_secs = d.as_secs().max(1);
        }
        if let Ok(host) = std::env::var("ONTAP_MCP_HOST") {
            if !host.is_empty() {
                config.server.host = host;
            }
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

fn env_duration(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    let parsed = parse_duration(&raw);
    if parsed.is_none() {
        warn!("Ignoring {key}={raw}: expected milliseconds or a value like 30s, 15m, 24h");
    }
    parsed
}

/// Parse a duration: a bare integer is milliseconds, otherwise one of the
/// suffixes `ms`, `s`, `m`, `h`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<u64>() {
        return Some(Duration::from_millis(ms));
    }
    let split = raw.find(|c: char| !c.is_ascii_digit())?;
    let (num, unit) = raw.split_at(split);
    let n: u64 = num.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "s" => Some(Duration::from_secs(n)),
        "m" => n.checked_mul(60).map(Duration::from_secs),
        "h" => n.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sorted(mut clusters: Vec<ClusterConfig>) -> Vec<ClusterConfig> {
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        clusters
    }

    #[test]
    fn array_and_object_forms_agree() {
        let array = r#"[
            {"name":"c1","cluster_ip":"10.0.0.1","username":"admin","password":"p1"},
            {"name":"c2","cluster_ip":"10.0.0.2","username":"admin","password":"p2","description":"lab","verify_ssl":true}
        ]"#;
        let object = r#"{
            "c2": {"cluster_ip":"10.0.0.2","username":"admin","password":"p2","description":"lab","verify_ssl":true},
            "c1": {"cluster_ip":"10.0.0.1","username":"admin","password":"p1"}
        }"#;
        let a = sorted(parse_clusters(array).unwrap());
        let b = sorted(parse_clusters(object).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert!(a[1].verify_ssl);
    }

    #[test]
    fn empty_value_yields_no_clusters() {
        assert!(parse_clusters("").unwrap().is_empty());
        assert!(parse_clusters("   ").unwrap().is_empty());
        assert!(parse_clusters("[]").unwrap().is_empty());
        assert!(parse_clusters("{}").unwrap().is_empty());
    }

    #[test]
    fn missing_field_names_the_entry() {
        let err = parse_clusters(r#"[{"name":"c1","cluster_ip":"10.0.0.1","username":"admin"}]"#)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("c1"), "{msg}");
        assert!(msg.contains("password"), "{msg}");

        let err = parse_clusters(r#"[{"cluster_ip":"10.0.0.1","username":"a","password":"b"}]"#)
            .unwrap_err();
        assert!(err.to_string().contains("cluster 0: name is required"));

        let err = parse_clusters(r#"{"lab":{"username":"a","password":"b"}}"#).unwrap_err();
        assert!(err.to_string().contains("lab"));
        assert!(err.to_string().contains("cluster_ip"));
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(
            parse_clusters("not json"),
            Err(ConfigError::InvalidJson { .. })
        ));
        assert!(matches!(
            parse_clusters("42"),
            Err(ConfigError::InvalidJson { .. })
        ));
    }

    #[test]
    fn wrongly_typed_field_is_an_entry_error() {
        let err = parse_clusters(
            r#"[{"name":"c1","cluster_ip":"x","username":"u","password":"p","verify_ssl":"yes"}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { .. }));
    }

    #[test]
    fn init_options_accept_all_three_shapes() {
        let entry = json!({"name":"c1","cluster_ip":"10.0.0.1","username":"u","password":"p"});

        let from_array = clusters_from_init_options(&json!({ "clusters": [entry.clone()] }));
        let from_string =
            clusters_from_init_options(&json!({ "ONTAP_CLUSTERS": json!([entry]).to_string() }));
        let from_object = clusters_from_init_options(&json!({
            "clusters": { "c1": {"cluster_ip":"10.0.0.1","username":"u","password":"p"} }
        }));

        assert_eq!(from_array, from_string);
        assert_eq!(from_array, from_object);
        assert_eq!(from_array[0].name, "c1");
    }

    #[test]
    fn init_options_skip_incomplete_entries() {
        let clusters = clusters_from_init_options(&json!({
            "clusters": [
                {"name":"good","cluster_ip":"10.0.0.1","username":"u","password":"p"},
                {"name":"bad","cluster_ip":"10.0.0.2"},
                "garbage"
            ]
        }));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].name, "good");
    }

    #[test]
    fn init_options_without_clusters_are_ignored() {
        assert!(clusters_from_init_options(&json!({})).is_empty());
        assert!(clusters_from_init_options(&json!({"clusters": "{not json"})).is_empty());
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = ClusterConfig {
            name: "c1".into(),
            cluster_ip: "10.0.0.1".into(),
            username: "admin".into(),
            password: "hunter2".into(),
            ..Default::default()
        };
        let out = format!("{cfg:?}");
        assert!(!out.contains("hunter2"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn bare_http_flag_defaults_to_3000() {
        let cli = Cli::try_parse_from(["ontap-mcp", "--http"]).unwrap();
        assert_eq!(cli.http, Some(DEFAULT_HTTP_PORT));

        let cli = Cli::try_parse_from(["ontap-mcp", "--http=8080"]).unwrap();
        assert_eq!(cli.http, Some(8080));

        let cli = Cli::try_parse_from(["ontap-mcp"]).unwrap();
        assert_eq!(cli.http, None);
    }

    #[test]
    fn log_level_is_restricted() {
        assert!(Cli::try_parse_from(["ontap-mcp", "--log-level=debug"]).is_ok());
        assert!(Cli::try_parse_from(["ontap-mcp", "--log-level=chatty"]).is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("1500"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86400)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration(&format!("{}m", u64::MAX)), None);
        assert_eq!(parse_duration(&format!("{}h", u64::MAX / 1000)), None);
    }

    #[test]
    fn settings_defaults_and_toml() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(cfg.server.max_lifetime(), Duration::from_secs(86400));
        assert_eq!(cfg.logging.level, "info");

        let cfg: Config = toml::from_str(
            "[server]\nsession_idle_timeout_secs = 60\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();
        assert_eq!(cfg.server.idle_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.server.shutdown_drain(), Duration::from_secs(5));
        assert_eq!(cfg.logging.level, "debug");
    }
}
