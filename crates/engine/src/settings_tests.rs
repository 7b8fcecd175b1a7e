// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::settings::keys;
use gaffer_store::{MemoryStore, RunStore};
use serial_test::serial;

fn resolver_over(store: &MemoryStore) -> SettingsResolver {
    SettingsResolver::new(Arc::new(store.clone()))
}

#[tokio::test]
async fn defaults_serve_when_store_is_empty() {
    let store = MemoryStore::new();
    let resolver = resolver_over(&store);
    let tunables = resolver.tunables().await;
    assert_eq!(tunables, gaffer_core::Tunables::default());
}

#[tokio::test]
async fn store_overrides_win_over_defaults() {
    let store = MemoryStore::new();
    store.put_setting(keys::LEADER_TICK_SECONDS, "9").await.unwrap();
    let resolver = resolver_over(&store);
    assert_eq!(resolver.tunables().await.leader_tick_seconds, 9);
    assert_eq!(resolver.lookup(keys::LEADER_TICK_SECONDS).await.as_deref(), Some("9"));
}

#[tokio::test]
async fn cache_serves_until_invalidated() {
    let store = MemoryStore::new();
    let resolver = resolver_over(&store);
    assert_eq!(resolver.tunables().await.leader_tick_seconds, 2);

    store.put_setting(keys::LEADER_TICK_SECONDS, "9").await.unwrap();
    // Cached map still answers.
    assert_eq!(resolver.tunables().await.leader_tick_seconds, 2);

    resolver.invalidate();
    assert_eq!(resolver.tunables().await.leader_tick_seconds, 9);
}

#[tokio::test]
#[serial]
async fn environment_fills_gaps_behind_store_overrides() {
    let store = MemoryStore::new();
    let resolver = resolver_over(&store);
    std::env::set_var("GAFFER_MAX_JOBS_PER_WORKER", "11");
    assert_eq!(resolver.tunables().await.max_jobs_per_worker, 11);

    // A store override beats the environment.
    store.put_setting(keys::MAX_JOBS_PER_WORKER, "3").await.unwrap();
    resolver.invalidate();
    assert_eq!(resolver.tunables().await.max_jobs_per_worker, 3);
    std::env::remove_var("GAFFER_MAX_JOBS_PER_WORKER");
}

#[tokio::test]
async fn secret_keys_are_hidden_from_plain_lookup() {
    let store = MemoryStore::new();
    store.put_setting(keys::AUTH_TOKEN, "hunter2").await.unwrap();
    let resolver = resolver_over(&store);
    assert_eq!(resolver.lookup(keys::AUTH_TOKEN).await, None);
    assert_eq!(resolver.secret(keys::AUTH_TOKEN).await.as_deref(), Some("hunter2"));
}
