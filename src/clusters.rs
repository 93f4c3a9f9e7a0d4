//! Named cluster registry.
//!
//! [`ClusterRegistry`] maps cluster names to their config and a shared
//! [`ClusterClient`]. Stdio mode owns one process-wide registry; HTTP mode owns
//! one per session. All access goes through a single `RwLock`, so a write is
//! visible to every read that follows it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::ClusterInfo;
use crate::client::{ClientError, ClusterClient};
use crate::config::ClusterConfig;

struct Entry {
    config: ClusterConfig,
    client: Arc<ClusterClient>,
}

/// Concurrent name → client map.
#[derive(Default)]
pub struct ClusterRegistry {
    inner: RwLock<HashMap<String, Entry>>,
}

/// Outcome of a cluster-info call against one cluster.
pub struct ConnectionCheck {
    pub name: String,
    pub outcome: Result<ClusterInfo, ClientError>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from validated configs.
    pub async fn from_configs(configs: Vec<ClusterConfig>) -> Result<Self, ClientError> {
        let registry = Self::new();
        for config in configs {
            registry.add(config).await?;
        }
        Ok(registry)
    }

    /// Register a cluster, replacing any existing entry with the same name.
    ///
    /// Returns `true` if an entry was replaced.
    pub async fn add(&self, config: ClusterConfig) -> Result<bool, ClientError> {
        let client = Arc::new(ClusterClient::new(&config)?);
        let name = config.name.clone();
        let replaced = self
            .inner
            .write()
            .await
            .insert(name.clone(), Entry { config, client })
            .is_some();
        if replaced {
            warn!(cluster = %name, "Cluster registration replaced an existing entry");
        } else {
            info!(cluster = %name, "Cluster registered");
        }
        Ok(replaced)
    }

    /// Client for a registered cluster.
    pub async fn client(&self, name: &str) -> Option<Arc<ClusterClient>> {
        self.inner
            .read()
            .await
            .get(name)
            .map(|e| Arc::clone(&e.client))
    }

    /// The only registered cluster, if exactly one exists.
    pub async fn sole(&self) -> Option<(String, Arc<ClusterClient>)> {
        let inner = self.inner.read().await;
        if inner.len() != 1 {
            return None;
        }
        inner
            .iter()
            .next()
            .map(|(name, e)| (name.clone(), Arc::clone(&e.client)))
    }

    /// Snapshot of registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of registered configs, sorted by name.
    pub async fn configs(&self) -> Vec<ClusterConfig> {
        let mut configs: Vec<ClusterConfig> = self
            .inner
            .read()
            .await
            .values()
            .map(|e| e.config.clone())
            .collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Call the cluster-info endpoint on every registered cluster, in name order.
    pub async fn check_all(&self, cancel: &CancellationToken) -> Vec<ConnectionCheck> {
        let clients: Vec<(String, Arc<ClusterClient>)> = {
            let inner = self.inner.read().await;
            let mut clients: Vec<_> = inner
                .iter()
                .map(|(name, e)| (name.clone(), Arc::clone(&e.client)))
                .collect();
            clients.sort_by(|a, b| a.0.cmp(&b.0));
            clients
        };

        let mut results = Vec::with_capacity(clients.len());
        for (name, client) in clients {
            let outcome = client.cluster_info(cancel).await;
            results.push(ConnectionCheck { name, outcome });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str, ip: &str) -> ClusterConfig {
        ClusterConfig {
            name: name.into(),
            cluster_ip: ip.into(),
            username: "admin".into(),
            password: "secret".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_then_lookup() {
        let reg = ClusterRegistry::new();
        assert!(reg.is_empty().await);
        assert!(!reg.add(cluster("c1", "10.0.0.1")).await.unwrap());
        let client = reg.client("c1").await.unwrap();
        assert_eq!(client.base_url(), "https://10.0.0.1/api");
        assert!(reg.client("c2").await.is_none());
    }

    #[tokio::test]
    async fn add_overwrites_on_name_collision() {
        let reg = ClusterRegistry::new();
        reg.add(cluster("c1", "10.0.0.1")).await.unwrap();
        assert!(reg.add(cluster("c1", "10.0.0.9")).await.unwrap());
        assert_eq!(reg.len().await, 1);
        assert_eq!(
            reg.client("c1").await.unwrap().base_url(),
            "https://10.0.0.9/api"
        );
        assert_eq!(reg.configs().await[0].cluster_ip, "10.0.0.9");
    }

    #[tokio::test]
    async fn every_listed_name_resolves() {
        let reg = ClusterRegistry::from_configs(vec![
            cluster("b", "10.0.0.2"),
            cluster("a", "10.0.0.1"),
        ])
        .await
        .unwrap();
        let names = reg.names().await;
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        for name in names {
            assert!(reg.client(&name).await.is_some());
        }
    }

    #[tokio::test]
    async fn sole_requires_exactly_one() {
        let reg = ClusterRegistry::new();
        assert!(reg.sole().await.is_none());
        reg.add(cluster("only", "10.0.0.1")).await.unwrap();
        assert_eq!(reg.sole().await.unwrap().0, "only");
        reg.add(cluster("other", "10.0.0.2")).await.unwrap();
        assert!(reg.sole().await.is_none());
    }
}
