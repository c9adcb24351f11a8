//! Last-cycle network cache
//!
//! Passed explicitly to whoever needs it. Holds one snapshot keyed by its cycle
//! timestamp; storing a new cycle replaces the old one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::network::NetworkSnapshot;

#[derive(Default)]
pub struct NetworkCache {
    slot: RwLock<Option<Arc<NetworkSnapshot>>>,
}

impl NetworkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached cycle with `snapshot`
    pub async fn store(&self, snapshot: NetworkSnapshot) -> Arc<NetworkSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.slot.write().await = Some(snapshot.clone());
        snapshot
    }

    pub async fn latest(&self) -> Option<Arc<NetworkSnapshot>> {
        self.slot.read().await.clone()
    }

    /// The cached cycle, only if it is younger than `max_age`
    pub async fn fresh(&self, max_age: Duration) -> Option<Arc<NetworkSnapshot>> {
        let slot = self.slot.read().await;
        let snapshot = slot.as_ref()?;
        let age = Utc::now().signed_duration_since(snapshot.cycle_at);
        match age.to_std() {
            Ok(age) if age > max_age => None,
            _ => Some(snapshot.clone()),
        }
    }

    pub async fn cycle_at(&self) -> Option<DateTime<Utc>> {
        self.slot.read().await.as_ref().map(|s| s.cycle_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    fn snapshot_at(cycle_at: DateTime<Utc>) -> NetworkSnapshot {
        NetworkSnapshot::assemble(cycle_at, Vec::new(), Vec::new(), &NetworkConfig::default())
    }

    #[tokio::test]
    async fn test_store_replaces_previous_cycle() {
        let cache = NetworkCache::new();
        assert!(cache.latest().await.is_none());

        let first = Utc::now() - chrono::Duration::seconds(30);
        let second = Utc::now();
        cache.store(snapshot_at(first)).await;
        cache.store(snapshot_at(second)).await;

        assert_eq!(cache.cycle_at().await, Some(second));
    }

    #[tokio::test]
    async fn test_fresh_respects_max_age() {
        let cache = NetworkCache::new();
        cache
            .store(snapshot_at(Utc::now() - chrono::Duration::seconds(120)))
            .await;

        assert!(cache.fresh(Duration::from_secs(60)).await.is_none());
        assert!(cache.fresh(Duration::from_secs(600)).await.is_some());
        assert!(cache.latest().await.is_some());
    }

    #[tokio::test]
    async fn test_fresh_on_empty_cache() {
        let cache = NetworkCache::new();
        assert!(cache.fresh(Duration::from_secs(600)).await.is_none());
        assert!(cache.cycle_at().await.is_none());
    }
}
