//! HTTP client for the ONTAP REST API.
//!
//! [`ClusterClient`] wraps `reqwest::Client` with the cluster's base URL and
//! Basic credentials. It exposes verb-level helpers (`get`, `post`, `patch`,
//! `delete`) that return decoded JSON; the typed endpoint methods live in
//! [`crate::api`].
//!
//! ## Cancellation
//!
//! Every call takes a [`CancellationToken`]. A token that is already cancelled
//! never issues a request, and cancelling mid-flight drops the request future
//! and yields [`ClientError::Cancelled`].
//!
//! ## Error handling
//!
//! Non-2xx responses are classified by status. ONTAP error bodies look like
//! `{"error":{"message":"...","code":"..."}}`; the message is extracted when
//! present, otherwise the raw body is kept.

use std::time::Duration;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClusterConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 10;

/// REST client bound to one ONTAP cluster.
pub struct ClusterClient {
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Base URL for a cluster address.
///
/// A bare host or IP becomes `https://<host>/api`. An address that already
/// carries a scheme is used as-is with `/api` appended.
pub fn base_url_for(cluster_ip: &str) -> String {
    let trimmed = cluster_ip.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        format!("{trimmed}/api")
    } else {
        format!("https://{trimmed}/api")
    }
}

impl ClusterClient {
    /// Build a client for the given cluster.
    ///
    /// `verify_ssl = false` accepts self-signed certificates, which is the
    /// common case for ONTAP management LIFs.
    pub fn new(config: &ClusterConfig) -> Result<Self, ClientError> {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", config.username, config.password));
        let mut auth = HeaderValue::from_str(&format!("Basic {credentials}"))
            .map_err(|e| ClientError::Setup(format!("invalid credentials header: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()
            .map_err(|e| ClientError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url_for(&config.cluster_ip),
        })
    }

    /// The cluster's REST base URL, ending in `/api`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET` and decode into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let value = self.send(cancel, Method::GET, path, query, None).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::InvalidResponse(format!("GET {path}: {e}")))
    }

    /// `POST` a JSON body. Returns the decoded response, or `Null` for an empty body.
    pub async fn post(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &Value,
    ) -> Result<Value, ClientError> {
        self.send(cancel, Method::POST, path, &[], Some(body)).await
    }

    /// `PATCH` a JSON body.
    pub async fn patch(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &Value,
    ) -> Result<Value, ClientError> {
        self.send(cancel, Method::PATCH, path, &[], Some(body)).await
    }

    /// `DELETE` a resource.
    pub async fn delete(&self, cancel: &CancellationToken, path: &str) -> Result<Value, ClientError> {
        self.send(cancel, Method::DELETE, path, &[], None).await
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let mut url = reqwest::Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ClientError::Setup(format!("invalid URL for {path}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        debug!(%method, %url, "ONTAP request");
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let exchange = async {
            let resp = req.send().await.map_err(ClientError::from_transport)?;
            Self::handle_response(resp).await
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ClientError::Cancelled),
            result = exchange => result,
        }
    }

    /// Classify the status and decode the body.
    async fn handle_response(resp: reqwest::Response) -> Result<Value, ClientError> {
        let status = resp.status();
        let body = resp.text().await.map_err(ClientError::from_transport)?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body)
                .map_err(|e| ClientError::InvalidResponse(format!("invalid JSON from cluster: {e}")));
        }

        let message = api_message(&body);
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized {
                status: status.as_u16(),
                message,
            },
            StatusCode::NOT_FOUND => ClientError::NotFound { message },
            _ => ClientError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }
}

/// Pull `error.message` (and `error.code`) out of an ONTAP error body.
fn api_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let error = &value["error"];
    match (error["message"].as_str(), error["code"].as_str()) {
        (Some(msg), Some(code)) => format!("{msg} (code {code})"),
        (Some(msg), None) => msg.to_string(),
        _ => body.trim().to_string(),
    }
}

/// Errors from ONTAP REST calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Unauthorized (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("Not found (HTTP 404): {message}")]
    NotFound { message: String },
    #[error("ONTAP API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Request cancelled")]
    Cancelled,
    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl ClientError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(err.to_string())
        } else {
            ClientError::ConnectionFailed(err.to_string())
        }
    }

    /// Returns `true` if the error is an HTTP 404 Not Found response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_adds_scheme_and_api_suffix() {
        assert_eq!(base_url_for("10.0.0.1"), "https://10.0.0.1/api");
        assert_eq!(base_url_for("cluster.lab.local/"), "https://cluster.lab.local/api");
        assert_eq!(
            base_url_for("http://127.0.0.1:8080"),
            "http://127.0.0.1:8080/api"
        );
    }

    #[test]
    fn api_message_prefers_ontap_error_field() {
        assert_eq!(
            api_message(r#"{"error":{"message":"entry doesn't exist","code":"4"}}"#),
            "entry doesn't exist (code 4)"
        );
        assert_eq!(api_message(r#"{"error":{"message":"nope"}}"#), "nope");
        assert_eq!(api_message("plain text\n"), "plain text");
    }

    #[test]
    fn error_display_names_the_status() {
        let err = ClientError::Unauthorized {
            status: 401,
            message: "bad credentials".into(),
        };
        assert_eq!(err.to_string(), "Unauthorized (HTTP 401): bad credentials");
        assert!(ClientError::NotFound {
            message: String::new()
        }
        .is_not_found());
    }

    #[tokio::test]
    async fn cancelled_token_never_sends() {
        let client = ClusterClient::new(&ClusterConfig {
            name: "c1".into(),
            // Unroutable; a real send would hang or fail differently.
            cluster_ip: "http://10.255.255.1:9".into(),
            username: "u".into(),
            password: "p".into(),
            ..Default::default()
        })
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .get::<Value>(&cancel, "/cluster", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }
}
