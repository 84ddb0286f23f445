//! In-process instance counters.
//!
//! Counters are atomics inside per-provider buckets; the bucket map is only
//! write-locked the first time a provider reports.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::sink::MetricsSink;

/// Per-provider counters.
#[derive(Default)]
struct ProviderBucket {
    started: AtomicU64,
    stopped: AtomicU64,
}

/// Point-in-time counts for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCounts {
    pub provider: String,
    pub started: u64,
    pub stopped: u64,
}

/// Counts instance starts and stops per provider.
#[derive(Clone, Default)]
pub struct InstanceCounters {
    buckets: Arc<RwLock<HashMap<String, Arc<ProviderBucket>>>>,
}

impl InstanceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    async fn bucket(&self, provider: &str) -> Arc<ProviderBucket> {
        if let Some(bucket) = self.buckets.read().await.get(provider) {
            return bucket.clone();
        }
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(provider.to_string())
            .or_insert_with(|| {
                debug!(%provider, "tracking instance counts");
                Arc::new(ProviderBucket::default())
            })
            .clone()
    }

    /// Counts for every provider that has reported, sorted by provider name.
    pub async fn snapshot(&self) -> Vec<ProviderCounts> {
        let buckets = self.buckets.read().await;
        let mut counts: Vec<ProviderCounts> = buckets
            .iter()
            .map(|(provider, b)| ProviderCounts {
                provider: provider.clone(),
                started: b.started.load(Ordering::Relaxed),
                stopped: b.stopped.load(Ordering::Relaxed),
            })
            .collect();
        counts.sort_by(|a, b| a.provider.cmp(&b.provider));
        counts
    }

    /// Counts for a single provider (zero if it never reported).
    pub async fn counts(&self, provider: &str) -> ProviderCounts {
        let buckets = self.buckets.read().await;
        let (started, stopped) = buckets
            .get(provider)
            .map(|b| {
                (
                    b.started.load(Ordering::Relaxed),
                    b.stopped.load(Ordering::Relaxed),
                )
            })
            .unwrap_or((0, 0));
        ProviderCounts {
            provider: provider.to_string(),
            started,
            stopped,
        }
    }
}

#[async_trait]
impl MetricsSink for InstanceCounters {
    async fn instance_started(&self, provider: &str) {
        self.bucket(provider)
            .await
            .started
            .fetch_add(1, Ordering::Relaxed);
    }

    async fn instance_stopped(&self, provider: &str) {
        self.bucket(provider)
            .await
            .stopped
            .fetch_add(1, Ordering::Relaxed);
    }
}
