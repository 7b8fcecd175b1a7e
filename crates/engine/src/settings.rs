// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered settings resolution: in-memory cache → RDB overrides → process
//! environment → built-in defaults.

use gaffer_core::{settings, Tunables, SECRET_KEYS};
use gaffer_store::RunStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// How long a fetched override map is served before re-reading the store.
const CACHE_TTL: Duration = Duration::from_secs(30);

struct Cached {
    overrides: HashMap<String, String>,
    fetched_at: Instant,
}

pub struct SettingsResolver {
    store: Arc<dyn RunStore>,
    cache: Mutex<Option<Cached>>,
}

impl SettingsResolver {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store, cache: Mutex::new(None) }
    }

    /// Drop the cache; the next lookup re-reads the store. Wired to the
    /// settings-reload signal.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    async fn overrides(&self) -> HashMap<String, String> {
        if let Some(cached) = self.cache.lock().as_ref() {
            if cached.fetched_at.elapsed() < CACHE_TTL {
                return cached.overrides.clone();
            }
        }
        match self.store.settings().await {
            Ok(overrides) => {
                *self.cache.lock() =
                    Some(Cached { overrides: overrides.clone(), fetched_at: Instant::now() });
                overrides
            }
            Err(e) => {
                // Serve the stale cache if there is one; defaults otherwise.
                warn!(error = %e, "settings fetch failed");
                self.cache.lock().as_ref().map(|c| c.overrides.clone()).unwrap_or_default()
            }
        }
    }

    /// Resolve one key through the layers. Secret-flagged keys are not
    /// served here; privileged callers use [`secret`](Self::secret).
    pub async fn lookup(&self, key: &str) -> Option<String> {
        if SECRET_KEYS.contains(&key) {
            return None;
        }
        self.lookup_any(key).await
    }

    /// Resolve a secret-flagged key (privileged engine internals only).
    pub async fn secret(&self, key: &str) -> Option<String> {
        self.lookup_any(key).await
    }

    async fn lookup_any(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides().await.get(key) {
            return Some(value.clone());
        }
        std::env::var(settings::env_var_for(key)).ok().filter(|v| !v.is_empty())
    }

    /// Typed snapshot of all tunables.
    pub async fn tunables(&self) -> Tunables {
        let overrides = self.overrides().await;
        Tunables::from_lookup(|key| {
            overrides
                .get(key)
                .cloned()
                .or_else(|| std::env::var(settings::env_var_for(key)).ok().filter(|v| !v.is_empty()))
        })
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
