// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PostgreSQL run store.
//!
//! Uses the runtime query API throughout; the conditional update is built
//! as a single UPDATE whose WHERE clause enumerates the guard columns.

use crate::error::StoreError;
use crate::store::RunStore;
use crate::types::{AuditEntry, NewRun, RunGuard, RunPatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gaffer_core::{
    ConcurrencyPolicy, ContinuationState, DefinitionId, EventId, JobDefinition, JobKind, JobRun,
    RunId, RunState, TriggerEvent, WorkerId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use std::collections::HashMap;

/// Schema, applied idempotently at daemon startup.
///
/// The `(job_definition_id, scheduled_for)` uniqueness of time runs is
/// carried by the `time:{def}:{slot}` idempotency key's unique constraint.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS job_definitions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    enabled BOOLEAN NOT NULL,
    kind TEXT NOT NULL,
    command TEXT NOT NULL,
    default_args JSONB NOT NULL DEFAULT '{}'::jsonb,
    schedule JSONB,
    timeout_seconds INTEGER NOT NULL,
    max_retries INTEGER NOT NULL,
    retry_backoff_seconds INTEGER NOT NULL,
    concurrency TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS job_runs (
    id TEXT PRIMARY KEY,
    definition_id TEXT NOT NULL REFERENCES job_definitions (id),
    attempt INTEGER NOT NULL DEFAULT 1,
    scheduled_for TIMESTAMPTZ NOT NULL,
    state TEXT NOT NULL,
    assigned_worker_id TEXT,
    assigned_at TIMESTAMPTZ,
    started_at TIMESTAMPTZ,
    finished_at TIMESTAMPTZ,
    exit_code INTEGER,
    error_summary TEXT,
    log_ref TEXT,
    leader_epoch BIGINT,
    version BIGINT NOT NULL DEFAULT 1,
    idempotency_key TEXT NOT NULL UNIQUE,
    continuation_state TEXT NOT NULL DEFAULT 'none',
    continuation_check_started_at TIMESTAMPTZ,
    continuation_check_deadline_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_state_scheduled ON job_runs (state, scheduled_for);
CREATE INDEX IF NOT EXISTS idx_runs_worker_state ON job_runs (assigned_worker_id, state);
CREATE INDEX IF NOT EXISTS idx_runs_created ON job_runs (created_at);

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    payload JSONB NOT NULL DEFAULT 'null'::jsonb,
    dedupe_key TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    processed_at TIMESTAMPTZ
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_events_dedupe
    ON events (dedupe_key) WHERE dedupe_key IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_events_pending ON events (processed_at, created_at);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit (
    id BIGSERIAL PRIMARY KEY,
    at TIMESTAMPTZ NOT NULL,
    kind TEXT NOT NULL,
    subject TEXT NOT NULL,
    detail TEXT NOT NULL
);
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(PgPool::connect(url).await?))
    }

    /// Apply the schema. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RunStore for PgStore {
    async fn create_run_if_absent(&self, new: NewRun) -> Result<JobRun, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO job_runs (id, definition_id, scheduled_for, state, idempotency_key, created_at)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(new.id.as_str())
        .bind(new.definition_id.as_str())
        .bind(new.scheduled_for)
        .bind(&new.idempotency_key)
        .bind(new.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return run_from_row(&row);
        }

        // Conflict: hand back the existing row for this key.
        let existing = sqlx::query("SELECT * FROM job_runs WHERE idempotency_key = $1")
            .bind(&new.idempotency_key)
            .fetch_one(&self.pool)
            .await?;
        run_from_row(&existing)
    }

    async fn update_run(
        &self,
        id: &RunId,
        guard: &RunGuard,
        patch: &RunPatch,
    ) -> Result<u64, StoreError> {
        if let Some(to) = patch.state {
            if !guard.expected_state.can_transition(to) {
                return Err(StoreError::IllegalTransition { from: guard.expected_state, to });
            }
        }

        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("UPDATE job_runs SET version = version + 1");
        if let Some(state) = patch.state {
            qb.push(", state = ").push_bind(state.to_string());
        }
        if let Some(worker) = &patch.assigned_worker_id {
            qb.push(", assigned_worker_id = ")
                .push_bind(worker.as_ref().map(|w| w.as_str().to_string()));
        }
        if let Some(at) = patch.assigned_at {
            qb.push(", assigned_at = ").push_bind(at);
        }
        if let Some(at) = patch.started_at {
            qb.push(", started_at = ").push_bind(at);
        }
        if let Some(at) = patch.finished_at {
            qb.push(", finished_at = ").push_bind(at);
        }
        if let Some(code) = patch.exit_code {
            qb.push(", exit_code = ").push_bind(code);
        }
        if let Some(summary) = &patch.error_summary {
            qb.push(", error_summary = ").push_bind(summary.clone());
        }
        if let Some(log_ref) = &patch.log_ref {
            qb.push(", log_ref = ").push_bind(log_ref.clone());
        }
        if let Some(epoch) = patch.leader_epoch {
            qb.push(", leader_epoch = ").push_bind(epoch);
        }
        if let Some(attempt) = patch.attempt {
            qb.push(", attempt = ").push_bind(attempt);
        }
        if let Some(continuation) = patch.continuation_state {
            qb.push(", continuation_state = ").push_bind(continuation.to_string());
        }
        if let Some(at) = &patch.continuation_check_started_at {
            qb.push(", continuation_check_started_at = ").push_bind(*at);
        }
        if let Some(at) = &patch.continuation_check_deadline_at {
            qb.push(", continuation_check_deadline_at = ").push_bind(*at);
        }

        qb.push(" WHERE id = ").push_bind(id.as_str().to_string());
        qb.push(" AND state = ").push_bind(guard.expected_state.to_string());
        qb.push(" AND version = ").push_bind(guard.expected_version);
        if let Some(worker) = &guard.expected_worker {
            qb.push(" AND assigned_worker_id = ").push_bind(worker.as_str().to_string());
        }
        if let Some(epoch) = guard.expected_epoch {
            qb.push(" AND leader_epoch = ").push_bind(epoch);
        }

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<JobRun>, StoreError> {
        let row = sqlx::query("SELECT * FROM job_runs WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| run_from_row(&r)).transpose()
    }

    async fn runs_in_state(
        &self,
        state: RunState,
        due_before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<JobRun>, StoreError> {
        let rows = match due_before {
            Some(due) => {
                sqlx::query(
                    r#"
                    SELECT * FROM job_runs
                    WHERE state = $1 AND scheduled_for <= $2
                    ORDER BY scheduled_for ASC
                    LIMIT $3
                    "#,
                )
                .bind(state.to_string())
                .bind(due)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM job_runs WHERE state = $1 ORDER BY scheduled_for ASC LIMIT $2",
                )
                .bind(state.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(run_from_row).collect()
    }

    async fn active_runs_for(
        &self,
        definition_id: &DefinitionId,
    ) -> Result<Vec<JobRun>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM job_runs
            WHERE definition_id = $1
              AND state IN ('pending', 'assigned', 'running', 'orphaned')
            "#,
        )
        .bind(definition_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_from_row).collect()
    }

    async fn latest_time_slot(
        &self,
        definition_id: &DefinitionId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT MAX(scheduled_for) AS latest FROM job_runs
            WHERE definition_id = $1 AND idempotency_key LIKE 'time:%'
            "#,
        )
        .bind(definition_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("latest").map_err(|e| StoreError::BadRow(e.to_string()))?)
    }

    async fn list_definitions(&self) -> Result<Vec<JobDefinition>, StoreError> {
        let rows = sqlx::query("SELECT * FROM job_definitions ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(definition_from_row).collect()
    }

    async fn upsert_definition(&self, definition: &JobDefinition) -> Result<(), StoreError> {
        let schedule = definition.schedule.as_ref().map(serde_json::to_value).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO job_definitions
                (id, name, enabled, kind, command, default_args, schedule,
                 timeout_seconds, max_retries, retry_backoff_seconds, concurrency)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                enabled = EXCLUDED.enabled,
                kind = EXCLUDED.kind,
                command = EXCLUDED.command,
                default_args = EXCLUDED.default_args,
                schedule = EXCLUDED.schedule,
                timeout_seconds = EXCLUDED.timeout_seconds,
                max_retries = EXCLUDED.max_retries,
                retry_backoff_seconds = EXCLUDED.retry_backoff_seconds,
                concurrency = EXCLUDED.concurrency
            "#,
        )
        .bind(definition.id.as_str())
        .bind(&definition.name)
        .bind(definition.enabled)
        .bind(definition.kind.to_string())
        .bind(&definition.command)
        .bind(serde_json::Value::Object(definition.default_args.clone()))
        .bind(schedule)
        .bind(definition.timeout_seconds as i32)
        .bind(definition.max_retries as i32)
        .bind(definition.retry_backoff_seconds as i32)
        .bind(definition.concurrency.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_event(&self, event: &TriggerEvent) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (id, event_type, payload, dedupe_key, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(event.id.as_str())
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(&event.dedupe_key)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn pending_events(&self, limit: i64) -> Result<Vec<TriggerEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM events
            WHERE processed_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn mark_event_processed(
        &self,
        id: &EventId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE events SET processed_at = $2 WHERE id = $1 AND processed_at IS NULL")
            .bind(id.as_str())
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn settings(&self) -> Result<HashMap<String, String>, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM settings").fetch_all(&self.pool).await?;
        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("key").map_err(|e| StoreError::BadRow(e.to_string()))?;
            let value: String =
                row.try_get("value").map_err(|e| StoreError::BadRow(e.to_string()))?;
            map.insert(key, value);
        }
        Ok(map)
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO audit (at, kind, subject, detail) VALUES ($1, $2, $3, $4)")
            .bind(entry.at)
            .bind(entry.kind.to_string())
            .bind(&entry.subject)
            .bind(&entry.detail)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn get<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| StoreError::BadRow(format!("{column}: {e}")))
}

/// Parse a canonical text column (the `text_enum!` form) or report the
/// malformed row.
fn parse_text<T>(
    column: &str,
    value: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, StoreError> {
    parse(value).ok_or_else(|| StoreError::BadRow(format!("unknown {column} {value:?}")))
}

fn run_from_row(row: &PgRow) -> Result<JobRun, StoreError> {
    let state = parse_text("state", &get::<String>(row, "state")?, RunState::parse_str)?;
    let continuation = parse_text(
        "continuation_state",
        &get::<String>(row, "continuation_state")?,
        ContinuationState::parse_str,
    )?;
    Ok(JobRun {
        id: RunId::from_string(get::<String>(row, "id")?),
        definition_id: DefinitionId::from_string(get::<String>(row, "definition_id")?),
        attempt: get(row, "attempt")?,
        scheduled_for: get(row, "scheduled_for")?,
        state,
        assigned_worker_id: get::<Option<String>>(row, "assigned_worker_id")?.map(WorkerId::new),
        assigned_at: get(row, "assigned_at")?,
        started_at: get(row, "started_at")?,
        finished_at: get(row, "finished_at")?,
        exit_code: get(row, "exit_code")?,
        error_summary: get(row, "error_summary")?,
        log_ref: get(row, "log_ref")?,
        leader_epoch: get(row, "leader_epoch")?,
        version: get(row, "version")?,
        idempotency_key: get(row, "idempotency_key")?,
        continuation_state: continuation,
        continuation_check_started_at: get(row, "continuation_check_started_at")?,
        continuation_check_deadline_at: get(row, "continuation_check_deadline_at")?,
        created_at: get(row, "created_at")?,
    })
}

fn definition_from_row(row: &PgRow) -> Result<JobDefinition, StoreError> {
    let kind = parse_text("kind", &get::<String>(row, "kind")?, JobKind::parse_str)?;
    let concurrency = parse_text(
        "concurrency",
        &get::<String>(row, "concurrency")?,
        ConcurrencyPolicy::parse_str,
    )?;
    // Unrecognized grammar maps to None; the engine treats such a time
    // definition as disabled and records the audit entry.
    let schedule = get::<Option<serde_json::Value>>(row, "schedule")?
        .and_then(|v| serde_json::from_value(v).ok());
    let default_args = match get::<serde_json::Value>(row, "default_args")? {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    Ok(JobDefinition {
        id: DefinitionId::from_string(get::<String>(row, "id")?),
        name: get(row, "name")?,
        enabled: get(row, "enabled")?,
        kind,
        command: get(row, "command")?,
        default_args,
        schedule,
        timeout_seconds: get::<i32>(row, "timeout_seconds")? as u32,
        max_retries: get::<i32>(row, "max_retries")? as u32,
        retry_backoff_seconds: get::<i32>(row, "retry_backoff_seconds")? as u32,
        concurrency,
    })
}

fn event_from_row(row: &PgRow) -> Result<TriggerEvent, StoreError> {
    Ok(TriggerEvent {
        id: EventId::from_string(get::<String>(row, "id")?),
        event_type: get(row, "event_type")?,
        payload: get(row, "payload")?,
        dedupe_key: get(row, "dedupe_key")?,
        created_at: get(row, "created_at")?,
        processed_at: get(row, "processed_at")?,
    })
}
