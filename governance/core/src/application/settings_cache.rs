// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Read-through settings cache
//!
//! A single async mutex guards the whole check-then-refill sequence, so a
//! burst of callers after expiry waits on one load instead of racing to
//! refill. [`CachedSettings::invalidate`] is the only way to drop a value
//! before its TTL runs out.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::error::GovernanceError;
use crate::domain::settings::{GovernanceSettings, SettingsSource};

struct Slot {
    loaded_at: Instant,
    settings: GovernanceSettings,
}

pub struct CachedSettings {
    source: Arc<dyn SettingsSource>,
    ttl: Duration,
    slot: Mutex<Option<Slot>>,
}

impl CachedSettings {
    pub fn new(source: Arc<dyn SettingsSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Result<GovernanceSettings, GovernanceError> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.settings.clone());
            }
        }

        debug!("Refreshing governance settings");
        let settings = self.source.load().await?;
        *slot = Some(Slot {
            loaded_at: Instant::now(),
            settings: settings.clone(),
        });
        Ok(settings)
    }

    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl SettingsSource for CountingSource {
        async fn load(&self) -> Result<GovernanceSettings, GovernanceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(GovernanceSettings {
                disposition_batch_size: 7,
                ..GovernanceSettings::default()
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_coalesce_into_one_load() {
        let source = Arc::new(CountingSource { loads: AtomicUsize::new(0) });
        let cache = Arc::new(CachedSettings::new(source.clone(), Duration::from_secs(60)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get().await.unwrap() }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().disposition_batch_size, 7);
        }
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let source = Arc::new(CountingSource { loads: AtomicUsize::new(0) });
        let cache = CachedSettings::new(source.clone(), Duration::from_secs(60));

        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        cache.get().await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_reloads_every_time() {
        let source = Arc::new(CountingSource { loads: AtomicUsize::new(0) });
        let cache = CachedSettings::new(source.clone(), Duration::ZERO);

        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
