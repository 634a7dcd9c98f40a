//! Reverse proxies to the Kubernetes API of managed clusters.
//!
//! Proxies are cached per cluster UID and expire after a fixed time. The
//! check-then-create path takes no lock across the build, so two concurrent
//! misses may both build a proxy; the last insert wins and the other copy
//! is dropped when its caller is done with it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use http::Request;
use kube::Client;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ProxyConfig;
use crate::controller::error::Result;

/// Forwards requests to one cluster's API server
#[derive(Clone)]
pub struct KubeApiProxy {
    cluster_uid: String,
    client: Client,
}

impl KubeApiProxy {
    /// Build from a raw kubeconfig, using its current context
    pub async fn from_kubeconfig(cluster_uid: impl Into<String>, kubeconfig: &[u8]) -> Result<Self> {
        let client = crate::kubernetes::client_from_kubeconfig(kubeconfig).await?;
        Ok(Self {
            cluster_uid: cluster_uid.into(),
            client,
        })
    }

    pub fn cluster_uid(&self) -> &str {
        &self.cluster_uid
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request to the API server and return the response body
    pub async fn forward(&self, request: Request<Vec<u8>>) -> Result<String> {
        trace!(
            cluster_uid = %self.cluster_uid,
            method = %request.method(),
            uri = %request.uri(),
            "Proxying request"
        );
        Ok(self.client.request_text(request).await?)
    }
}

struct Entry<T> {
    value: Arc<T>,
    expires_at: Instant,
}

/// Expiring cache of proxies keyed by cluster UID
pub struct ProxyCache<T = KubeApiProxy> {
    entries: RwLock<HashMap<String, Entry<T>>>,
    ttl: Duration,
    gc_interval: Duration,
}

impl<T: Send + Sync + 'static> ProxyCache<T> {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: config.entry_ttl,
            gc_interval: config.gc_interval,
        }
    }

    /// Unexpired entry for a cluster
    pub fn get(&self, cluster_uid: &str) -> Option<Arc<T>> {
        let entries = self.entries.read().ok()?;
        entries
            .get(cluster_uid)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, cluster_uid: &str, value: T) -> Arc<T> {
        let value = Arc::new(value);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                cluster_uid.to_string(),
                Entry {
                    value: value.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        value
    }

    /// Cached entry, or a new one built by `build` on a miss
    pub async fn get_or_create<F, Fut>(&self, cluster_uid: &str, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get(cluster_uid) {
            return Ok(value);
        }
        debug!(cluster_uid, "Building API proxy");
        let value = build().await?;
        Ok(self.insert(cluster_uid, value))
    }

    pub fn remove(&self, cluster_uid: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(cluster_uid);
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically purge expired entries until the task is aborted
    pub fn spawn_gc(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let interval = self.gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "Expired API proxies removed");
                }
            }
        })
    }
}
