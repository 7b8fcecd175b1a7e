// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed coordination store.
//!
//! Leases are plain keys set with `SET NX PX`; renew and release go through
//! Lua compare-holder scripts so a lease can only be extended or dropped by
//! its owner. Directory entries are hashes with a TTL.

use crate::error::CoordError;
use crate::keys;
use crate::store::CoordStore;
use async_trait::async_trait;
use gaffer_core::{NodeId, Role, RunId, WorkerEntry, WorkerId};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

const RENEW_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

pub struct RedisCoord {
    conn: ConnectionManager,
    op_timeout: Duration,
    renew: redis::Script,
    release: redis::Script,
}

impl RedisCoord {
    /// Connect to the coordination store. Every operation is bounded by
    /// `op_timeout`; exceeding it surfaces as [`CoordError::Timeout`].
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, CoordError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            op_timeout,
            renew: redis::Script::new(RENEW_SCRIPT),
            release: redis::Script::new(RELEASE_SCRIPT),
        })
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, CoordError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CoordError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl CoordStore for RedisCoord {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, CoordError> {
        let mut conn = self.conn.clone();
        let set: Option<String> = self
            .bounded(
                redis::cmd("SET")
                    .arg(key)
                    .arg(holder)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl.as_millis() as u64)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(set.is_some())
    }

    async fn renew(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, CoordError> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .bounded(
                self.renew
                    .key(key)
                    .arg(holder)
                    .arg(ttl.as_millis() as u64)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(extended == 1)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<(), CoordError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .bounded(self.release.key(key).arg(holder).invoke_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CoordError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.incr(key, 1)).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CoordError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.set(key, value)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.get(key)).await
    }

    async fn set_flag(&self, key: &str) -> Result<(), CoordError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.set(key, "1")).await
    }

    async fn get_flag(&self, key: &str) -> Result<bool, CoordError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(value.as_deref() == Some("1"))
    }

    async fn clear_flag(&self, key: &str) -> Result<(), CoordError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.del(key)).await
    }

    async fn write_entry(&self, entry: &WorkerEntry, ttl: Duration) -> Result<(), CoordError> {
        let key = keys::worker_entry(&entry.worker_id);
        let fields = entry_fields(entry);
        let mut conn = self.conn.clone();
        let () = self.bounded(conn.hset_multiple(&key, &fields)).await?;
        let () = self.bounded(conn.pexpire(&key, ttl.as_millis() as i64)).await?;
        Ok(())
    }

    async fn drop_entry(&self, worker_id: &WorkerId) -> Result<(), CoordError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.del(keys::worker_entry(worker_id))).await
    }

    async fn scan_workers(&self) -> Result<Vec<WorkerEntry>, CoordError> {
        let mut conn = self.conn.clone();
        // Directory keys are worker:w{n}; the id counter (worker:id_seq)
        // does not match this pattern.
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>("worker:w*").await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let mut conn = self.conn.clone();
            let fields: HashMap<String, String> = self.bounded(conn.hgetall(&key)).await?;
            if fields.is_empty() {
                // Expired between SCAN and HGETALL
                continue;
            }
            entries.push(parse_entry(&key, &fields)?);
        }
        Ok(entries)
    }
}

fn entry_fields(entry: &WorkerEntry) -> Vec<(&'static str, String)> {
    vec![
        ("worker_id", entry.worker_id.to_string()),
        ("node_id", entry.node_id.to_string()),
        ("host", entry.host.clone()),
        ("port", entry.port.to_string()),
        ("role", entry.role.to_string()),
        ("last_heartbeat_ms", entry.last_heartbeat_ms.to_string()),
        ("load", entry.load.to_string()),
        (
            "current_run_id",
            entry.current_run_id.as_ref().map(|r| r.to_string()).unwrap_or_default(),
        ),
        ("detached", if entry.detached { "1" } else { "0" }.to_string()),
        ("draining", if entry.draining { "1" } else { "0" }.to_string()),
    ]
}

fn parse_entry(key: &str, fields: &HashMap<String, String>) -> Result<WorkerEntry, CoordError> {
    let field = |name: &str| -> Result<&str, CoordError> {
        fields.get(name).map(String::as_str).ok_or_else(|| CoordError::BadEntry {
            key: key.to_string(),
            reason: format!("missing field {name}"),
        })
    };
    let bad = |name: &str| CoordError::BadEntry {
        key: key.to_string(),
        reason: format!("unparseable field {name}"),
    };

    let role = Role::parse_str(field("role")?).ok_or_else(|| bad("role"))?;
    let current_run_id = match field("current_run_id")? {
        "" => None,
        id => Some(RunId::from_string(id)),
    };

    Ok(WorkerEntry {
        worker_id: WorkerId::new(field("worker_id")?),
        node_id: NodeId::new(field("node_id")?),
        host: field("host")?.to_string(),
        port: field("port")?.parse().map_err(|_| bad("port"))?,
        role,
        last_heartbeat_ms: field("last_heartbeat_ms")?.parse().map_err(|_| bad("last_heartbeat_ms"))?,
        load: field("load")?.parse().map_err(|_| bad("load"))?,
        current_run_id,
        detached: field("detached")? == "1",
        draining: field("draining")? == "1",
    })
}
