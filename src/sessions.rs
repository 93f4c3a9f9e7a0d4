//! Per-client session store for the HTTP transport.
//!
//! Every HTTP client session owns its own [`ClusterRegistry`], so clusters
//! added under one session are never visible to another. Sessions expire on
//! two clocks:
//!
//! - **idle**: no request for longer than the idle timeout
//! - **lifetime**: created longer ago than the maximum lifetime, regardless of activity
//!
//! Expiry is enforced twice: lazily in [`SessionStore::get_or_create`] (a stale
//! session is replaced, never revived) and periodically by the sweeper task.
//!
//! ## Concurrency
//!
//! The session map is behind one `RwLock`. Lookups that bump `last_activity`
//! and the cleanup routines take the write lock; the health snapshot takes the
//! read lock. Nothing is awaited while the lock is held.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clusters::ClusterRegistry;

/// Buffered events per session stream before slow subscribers lag.
const EVENT_CHANNEL_CAPACITY: usize = 64;

struct SessionEntry {
    clusters: Arc<ClusterRegistry>,
    events: broadcast::Sender<Value>,
    created_at: Instant,
    last_activity: Instant,
}

impl SessionEntry {
    fn new(now: Instant) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            clusters: Arc::new(ClusterRegistry::new()),
            events,
            created_at: now,
            last_activity: now,
        }
    }

    fn handle(&self, id: &str, created: bool) -> SessionHandle {
        SessionHandle {
            id: id.to_string(),
            clusters: Arc::clone(&self.clusters),
            events: self.events.clone(),
            created,
        }
    }
}

/// A session as seen by one request.
pub struct SessionHandle {
    pub id: String,
    pub clusters: Arc<ClusterRegistry>,
    pub events: broadcast::Sender<Value>,
    /// `true` if this lookup created the session.
    pub created: bool,
}

/// Store of HTTP sessions keyed by session id.
///
/// Cloneable; all clones share the same map.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    idle_timeout: Duration,
    max_lifetime: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, max_lifetime: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
            max_lifetime,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// Return the live session for `id`, bumping its activity, or create a new
    /// one with an empty registry. An expired entry is replaced.
    pub async fn get_or_create(&self, id: &str) -> SessionHandle {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        if let Some(entry) = sessions.get_mut(id) {
            if !self.is_expired(entry, now) {
                entry.last_activity = now;
                return entry.handle(id, false);
            }
            info!(session = %id, "Session expired, starting a new one");
        } else {
            debug!(session = %id, "Creating session");
        }

        let entry = SessionEntry::new(now);
        let handle = entry.handle(id, true);
        sessions.insert(id.to_string(), entry);
        handle
    }

    /// Look up a live session without creating one. Bumps activity.
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        if self.is_expired(entry, now) {
            return None;
        }
        entry.last_activity = now;
        Some(entry.handle(id, false))
    }

    /// Drop a session. Returns `true` if it existed.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session = %id, "Session closed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove sessions idle for longer than the idle timeout. Returns their ids.
    pub async fn cleanup_idle(&self) -> Vec<String> {
        let now = Instant::now();
        let idle = self.idle_timeout;
        self.remove_where(|entry| now.duration_since(entry.last_activity) > idle)
            .await
    }

    /// Remove sessions older than the maximum lifetime. Returns their ids.
    pub async fn cleanup_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let max = self.max_lifetime;
        self.remove_where(|entry| now.duration_since(entry.created_at) > max)
            .await
    }

    /// Run both cleanup routines. Returns how many sessions were removed.
    pub async fn sweep(&self) -> usize {
        let idle = self.cleanup_idle().await;
        let expired = self.cleanup_expired().await;
        for id in &idle {
            info!(session = %id, "Session removed after idle timeout");
        }
        for id in &expired {
            info!(session = %id, "Session removed after maximum lifetime");
        }
        idle.len() + expired.len()
    }

    /// Sweeper period: a third of the shorter timeout, clamped to [1 s, 60 s].
    pub fn sweep_interval(&self) -> Duration {
        (self.idle_timeout.min(self.max_lifetime) / 3)
            .clamp(Duration::from_secs(1), Duration::from_secs(60))
    }

    /// Spawn the periodic sweeper. It stops when `cancel` fires.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        let period = store.sweep_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = store.sweep().await;
                        if removed > 0 {
                            debug!(removed, "Session sweep complete");
                        }
                    }
                }
            }
        })
    }

    /// Active session counts bucketed by age.
    pub async fn age_distribution(&self) -> BTreeMap<&'static str, usize> {
        let now = Instant::now();
        let mut buckets: BTreeMap<&'static str, usize> = [
            "< 5min", "5-30min", "30-60min", "1-24hr", "> 24hr",
        ]
        .into_iter()
        .map(|b| (b, 0))
        .collect();

        for entry in self.sessions.read().await.values() {
            let age = now.duration_since(entry.created_at).as_secs();
            let bucket = match age {
                a if a < 5 * 60 => "< 5min",
                a if a < 30 * 60 => "5-30min",
                a if a < 60 * 60 => "30-60min",
                a if a < 24 * 60 * 60 => "1-24hr",
                _ => "> 24hr",
            };
            *buckets.entry(bucket).or_default() += 1;
        }
        buckets
    }

    fn is_expired(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.duration_since(entry.last_activity) > self.idle_timeout
            || now.duration_since(entry.created_at) > self.max_lifetime
    }

    async fn remove_where(&self, pred: impl Fn(&SessionEntry) -> bool) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let doomed: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| pred(entry))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            sessions.remove(id);
        }
        doomed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    fn cluster(name: &str) -> ClusterConfig {
        ClusterConfig {
            name: name.into(),
            cluster_ip: "10.0.0.1".into(),
            username: "u".into(),
            password: "p".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn get_or_create_reuses_live_session() {
        let store = store();
        let first = store.get_or_create("a").await;
        assert!(first.created);
        first.clusters.add(cluster("c1")).await.unwrap();

        let again = store.get_or_create("a").await;
        assert!(!again.created);
        assert!(Arc::ptr_eq(&first.clusters, &again.clusters));
        assert_eq!(again.clusters.names().await, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn sessions_do_not_share_registries() {
        let store = store();
        let a = store.get_or_create("a").await;
        let b = store.get_or_create("b").await;
        a.clusters.add(cluster("c1")).await.unwrap();
        assert!(b.clusters.is_empty().await);
        assert!(!Arc::ptr_eq(&a.clusters, &b.clusters));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_cleanup_removes_exactly_stale_sessions() {
        let store = store();
        store.get_or_create("old").await;
        tokio::time::advance(Duration::from_secs(40)).await;
        store.get_or_create("fresh").await;
        tokio::time::advance(Duration::from_secs(30)).await;

        // old: idle 70s > 60s; fresh: idle 30s
        let removed = store.cleanup_idle().await;
        assert_eq!(removed, vec!["old".to_string()]);
        assert!(store.get("fresh").await.is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_boundary_is_exclusive() {
        let store = store();
        store.get_or_create("s").await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(store.cleanup_idle().await.is_empty());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.cleanup_idle().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lifetime_cleanup_ignores_activity() {
        let store = store();
        store.get_or_create("busy").await;
        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(55)).await;
            assert!(store.get("busy").await.is_some());
        }
        tokio::time::advance(Duration::from_secs(55)).await;
        // 605s old, idle for 55s
        assert!(store.cleanup_idle().await.is_empty());
        assert_eq!(store.cleanup_expired().await, vec!["busy".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_session_is_replaced_not_revived() {
        let store = store();
        let old = store.get_or_create("s").await;
        old.clusters.add(cluster("c1")).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let new = store.get_or_create("s").await;
        assert!(new.created);
        assert!(new.clusters.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_of_one_session_leaves_others() {
        let store = store();
        let a = store.get_or_create("a").await;
        tokio::time::advance(Duration::from_secs(50)).await;
        let b = store.get_or_create("b").await;
        b.clusters.add(cluster("c2")).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(store.sweep().await, 1);
        drop(a);
        let b2 = store.get("b").await.unwrap();
        assert_eq!(b2.clusters.names().await, vec!["c2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_its_interval() {
        let store = SessionStore::new(Duration::from_secs(3), Duration::from_secs(600));
        assert_eq!(store.sweep_interval(), Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let task = store.spawn_sweeper(cancel.clone());

        store.get_or_create("s").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(store.is_empty().await);

        cancel.cancel();
        task.await.unwrap();
    }

    #[test]
    fn sweep_interval_is_clamped() {
        let long = SessionStore::new(Duration::from_secs(1800), Duration::from_secs(86400));
        assert_eq!(long.sweep_interval(), Duration::from_secs(60));
        let short = SessionStore::new(Duration::from_millis(300), Duration::from_secs(10));
        assert_eq!(short.sweep_interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn remove_and_distribution() {
        let store = store();
        store.get_or_create("a").await;
        store.get_or_create("b").await;
        let dist = store.age_distribution().await;
        assert_eq!(dist["< 5min"], 2);
        assert_eq!(dist["> 24hr"], 0);
        assert!(store.remove("a").await);
        assert!(!store.remove("a").await);
        assert_eq!(store.len().await, 1);
    }
}
