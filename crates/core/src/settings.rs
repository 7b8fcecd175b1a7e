// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recognized settings keys, built-in defaults, and the typed snapshot the
//! engine reads. Where values come from (RDB overrides, environment) is the
//! resolver's business; this module only knows names and defaults.

/// Key names as stored in the settings map.
pub mod keys {
    pub const LEADER_TICK_SECONDS: &str = "leader_tick_seconds";
    pub const ASSIGN_AHEAD_SECONDS: &str = "assign_ahead_seconds";
    pub const HEARTBEAT_INTERVAL_SECONDS: &str = "heartbeat_interval_seconds";
    pub const HEARTBEAT_TTL_SECONDS: &str = "heartbeat_ttl_seconds";
    pub const WORKER_DETACH_GRACE_SECONDS: &str = "worker_detach_grace_seconds";
    pub const LEADER_STALE_SECONDS: &str = "leader_stale_seconds";
    pub const SUBLEADER_CHECK_SECONDS: &str = "subleader_check_seconds";
    pub const REASSIGN_AFTER_SECONDS: &str = "reassign_after_seconds";
    pub const MAX_JOBS_PER_WORKER: &str = "max_jobs_per_worker";
    pub const CONTINUATION_RETRY_COUNT: &str = "continuation_retry_count";
    pub const CONTINUATION_RETRY_INTERVAL_SECONDS: &str = "continuation_retry_interval_seconds";
    pub const SKIP_LATE_RUNS_AFTER_SECONDS: &str = "skip_late_runs_after_seconds";
    pub const LOG_RETENTION_DAYS_DB: &str = "log_retention_days_db";
    pub const AUTH_TOKEN: &str = "auth_token";
}

/// Secret-flagged keys: never returned to non-privileged readers.
pub const SECRET_KEYS: &[&str] = &[keys::AUTH_TOKEN];

/// Typed snapshot of the engine's tunables, resolved from a string lookup
/// with built-in defaults filling the gaps. Unparseable values fall back to
/// the default rather than failing the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunables {
    pub leader_tick_seconds: u64,
    pub assign_ahead_seconds: i64,
    pub heartbeat_interval_seconds: u64,
    pub heartbeat_ttl_seconds: i64,
    pub worker_detach_grace_seconds: i64,
    pub leader_stale_seconds: i64,
    pub subleader_check_seconds: u64,
    pub reassign_after_seconds: i64,
    pub max_jobs_per_worker: u32,
    pub continuation_retry_count: u32,
    pub continuation_retry_interval_seconds: f64,
    pub skip_late_runs_after_seconds: i64,
    pub log_retention_days_db: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            leader_tick_seconds: 2,
            assign_ahead_seconds: 30,
            heartbeat_interval_seconds: 5,
            heartbeat_ttl_seconds: 15,
            worker_detach_grace_seconds: 10,
            leader_stale_seconds: 10,
            subleader_check_seconds: 5,
            reassign_after_seconds: 60,
            max_jobs_per_worker: 4,
            continuation_retry_count: 5,
            continuation_retry_interval_seconds: 2.0,
            skip_late_runs_after_seconds: 300,
            log_retention_days_db: 14,
        }
    }
}

impl Tunables {
    /// Build a snapshot from a key lookup (resolver layers already merged).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            leader_tick_seconds: parse_or(&get, keys::LEADER_TICK_SECONDS, defaults.leader_tick_seconds),
            assign_ahead_seconds: parse_or(&get, keys::ASSIGN_AHEAD_SECONDS, defaults.assign_ahead_seconds),
            heartbeat_interval_seconds: parse_or(
                &get,
                keys::HEARTBEAT_INTERVAL_SECONDS,
                defaults.heartbeat_interval_seconds,
            ),
            heartbeat_ttl_seconds: parse_or(&get, keys::HEARTBEAT_TTL_SECONDS, defaults.heartbeat_ttl_seconds),
            worker_detach_grace_seconds: parse_or(
                &get,
                keys::WORKER_DETACH_GRACE_SECONDS,
                defaults.worker_detach_grace_seconds,
            ),
            leader_stale_seconds: parse_or(&get, keys::LEADER_STALE_SECONDS, defaults.leader_stale_seconds),
            subleader_check_seconds: parse_or(
                &get,
                keys::SUBLEADER_CHECK_SECONDS,
                defaults.subleader_check_seconds,
            ),
            reassign_after_seconds: parse_or(&get, keys::REASSIGN_AFTER_SECONDS, defaults.reassign_after_seconds),
            max_jobs_per_worker: parse_or(&get, keys::MAX_JOBS_PER_WORKER, defaults.max_jobs_per_worker),
            continuation_retry_count: parse_or(
                &get,
                keys::CONTINUATION_RETRY_COUNT,
                defaults.continuation_retry_count,
            ),
            continuation_retry_interval_seconds: parse_or(
                &get,
                keys::CONTINUATION_RETRY_INTERVAL_SECONDS,
                defaults.continuation_retry_interval_seconds,
            ),
            skip_late_runs_after_seconds: parse_or(
                &get,
                keys::SKIP_LATE_RUNS_AFTER_SECONDS,
                defaults.skip_late_runs_after_seconds,
            ),
            log_retention_days_db: parse_or(&get, keys::LOG_RETENTION_DAYS_DB, defaults.log_retention_days_db),
        }
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Environment variable name carrying an override for a settings key.
pub fn env_var_for(key: &str) -> String {
    format!("GAFFER_{}", key.to_ascii_uppercase())
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
