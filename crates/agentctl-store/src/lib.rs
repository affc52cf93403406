//! Typed append-only record operations over the persisted log.
//!
//! Messages, notables, background tasks, sessions, and key-value state are
//! all stored in a single SQLite file. `rusqlite` is synchronous, so every
//! operation is dispatched to a blocking thread via `spawn_blocking`; the
//! connection itself lives behind a `Mutex` so callers across tasks see a
//! consistent view without torn writes.

use std::sync::{Arc, Mutex};

use agentctl_core::types::{BackgroundTask, Message, Notable, Session, Source, TaskStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Unavailable(format!("blocking task panicked: {e}"))
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    content TEXT NOT NULL,
    tool_name TEXT,
    tool_input TEXT,
    timestamp TEXT NOT NULL,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);

CREATE TABLE IF NOT EXISTS notables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL,
    content TEXT NOT NULL,
    reason TEXT,
    timestamp TEXT NOT NULL,
    message_id INTEGER
);
CREATE INDEX IF NOT EXISTS idx_notables_timestamp ON notables(timestamp);

CREATE TABLE IF NOT EXISTS background_tasks (
    id TEXT PRIMARY KEY,
    tool_name TEXT NOT NULL,
    input TEXT NOT NULL,
    status TEXT NOT NULL,
    result TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON background_tasks(status);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    handoff_summary TEXT,
    ended_at TEXT
);

CREATE TABLE IF NOT EXISTS kv_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Typed facade over the persisted log. Cheap to clone; all state lives
/// behind the shared connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if absent) the SQLite file at `path` and ensure schema.
    pub async fn open(path: &str) -> Result<Self> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = std::path::Path::new(&path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
            let conn = Connection::open(&path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, for tests.
    #[cfg(any(test, feature = "test-util"))]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("store mutex poisoned".into()))?;
            f(&guard)
        })
        .await?
    }

    // -- Messages --------------------------------------------------------

    pub async fn append_message(
        &self,
        source: Source,
        content: String,
        tool_name: Option<String>,
        tool_input: Option<String>,
        metadata: Option<Value>,
    ) -> Result<Message> {
        self.with_conn(move |conn| {
            let now = Utc::now();
            let metadata_json = metadata.as_ref().map(|m| m.to_string());
            conn.execute(
                "INSERT INTO messages (source, content, tool_name, tool_input, timestamp, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    source.to_string(),
                    content,
                    tool_name,
                    tool_input,
                    now.to_rfc3339(),
                    metadata_json
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Message {
                id,
                source,
                content,
                tool_name,
                tool_input,
                timestamp: now,
                metadata,
            })
        })
        .await
    }

    pub async fn list_messages(&self) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, source, content, tool_name, tool_input, timestamp, metadata
                 FROM messages ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([], row_to_message)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    // -- Notables ----------------------------------------------------------

    pub async fn append_notable(
        &self,
        label: String,
        content: String,
        reason: Option<String>,
        message_id: Option<i64>,
    ) -> Result<Notable> {
        self.with_conn(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO notables (label, content, reason, timestamp, message_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![label, content, reason, now.to_rfc3339(), message_id],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Notable {
                id,
                label,
                content,
                reason,
                timestamp: now,
                message_id,
            })
        })
        .await
    }

    pub async fn list_notables(&self) -> Result<Vec<Notable>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, label, content, reason, timestamp, message_id
                 FROM notables ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map([], row_to_notable)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    // -- Background tasks ----------------------------------------------

    pub async fn create_task(&self, tool_name: String, input: Value) -> Result<String> {
        self.with_conn(move |conn| {
            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO background_tasks (id, tool_name, input, status, created_at)
                 VALUES (?1, ?2, ?3, 'running', ?4)",
                params![id, tool_name, input.to_string(), now.to_rfc3339()],
            )?;
            Ok(id)
        })
        .await
    }

    /// No-op if the task is already terminal (idempotent, per spec §3/§8).
    pub async fn complete_task(&self, id: String, result: String) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE background_tasks SET status = 'completed', result = ?2, completed_at = ?3
                 WHERE id = ?1 AND status = 'running'",
                params![id, result, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn fail_task(&self, id: String, error: String) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE background_tasks SET status = 'failed', error = ?2, completed_at = ?3
                 WHERE id = ?1 AND status = 'running'",
                params![id, error, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_task(&self, id: String) -> Result<Option<BackgroundTask>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, tool_name, input, status, result, error, created_at, completed_at
                 FROM background_tasks WHERE id = ?1",
                params![id],
                row_to_task,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    /// List background tasks, most recently created first. `status_filter`
    /// narrows to a single status; `None` returns every task regardless of
    /// status.
    pub async fn list_background_tasks(&self, status_filter: Option<TaskStatus>) -> Result<Vec<BackgroundTask>> {
        self.with_conn(move |conn| {
            let rows = match status_filter {
                Some(status) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, tool_name, input, status, result, error, created_at, completed_at
                         FROM background_tasks WHERE status = ?1 ORDER BY created_at DESC",
                    )?;
                    stmt.query_map(params![status_label(status)], row_to_task)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, tool_name, input, status, result, error, created_at, completed_at
                         FROM background_tasks ORDER BY created_at DESC",
                    )?;
                    stmt.query_map([], row_to_task)?.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(rows)
        })
        .await
    }

    // -- KV state ----------------------------------------------------------

    pub async fn get_state(&self, key: String, default: Value) -> Result<Value> {
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv_state WHERE key = ?1",
                    params![key],
                    |row: &Row| row.get(0),
                )
                .optional()?;
            Ok(match raw {
                Some(raw) => serde_json::from_str(&raw).unwrap_or(default),
                None => default,
            })
        })
        .await
    }

    pub async fn set_state(&self, key: String, value: Value) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    // -- Sessions ------------------------------------------------------

    pub async fn start_session(&self, handoff_summary: Option<String>) -> Result<Session> {
        self.with_conn(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO sessions (started_at, handoff_summary) VALUES (?1, ?2)",
                params![now.to_rfc3339(), handoff_summary],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Session {
                id,
                started_at: now,
                handoff_summary,
                ended_at: None,
            })
        })
        .await
    }

    /// Sets `ended_at` on the one open session, if any. No-op otherwise.
    pub async fn end_current_session(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET ended_at = ?1 WHERE ended_at IS NULL",
                params![Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn current_session(&self) -> Result<Option<Session>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, started_at, handoff_summary, ended_at FROM sessions
                 WHERE ended_at IS NULL ORDER BY id DESC LIMIT 1",
                [],
                row_to_session,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let source_raw: String = row.get(1)?;
    let ts_raw: String = row.get(5)?;
    let metadata_raw: Option<String> = row.get(6)?;
    Ok(Message {
        id: row.get(0)?,
        source: source_raw.parse().unwrap_or(Source::System),
        content: row.get(2)?,
        tool_name: row.get(3)?,
        tool_input: row.get(4)?,
        timestamp: parse_ts(&ts_raw),
        metadata: metadata_raw.and_then(|m| serde_json::from_str(&m).ok()),
    })
}

fn row_to_notable(row: &Row) -> rusqlite::Result<Notable> {
    let ts_raw: String = row.get(4)?;
    Ok(Notable {
        id: row.get(0)?,
        label: row.get(1)?,
        content: row.get(2)?,
        reason: row.get(3)?,
        timestamp: parse_ts(&ts_raw),
        message_id: row.get(5)?,
    })
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn row_to_task(row: &Row) -> rusqlite::Result<BackgroundTask> {
    let input_raw: String = row.get(2)?;
    let status_raw: String = row.get(3)?;
    let created_raw: String = row.get(6)?;
    let completed_raw: Option<String> = row.get(7)?;
    Ok(BackgroundTask {
        id: row.get(0)?,
        tool_name: row.get(1)?,
        input: serde_json::from_str(&input_raw).unwrap_or(Value::Null),
        status: match status_raw.as_str() {
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Running,
        },
        result: row.get(4)?,
        error: row.get(5)?,
        created_at: parse_ts(&created_raw),
        completed_at: completed_raw.map(|s| parse_ts(&s)),
    })
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let started_raw: String = row.get(1)?;
    let ended_raw: Option<String> = row.get(3)?;
    Ok(Session {
        id: row.get(0)?,
        started_at: parse_ts(&started_raw),
        handoff_summary: row.get(2)?,
        ended_at: ended_raw.map(|s| parse_ts(&s)),
    })
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_and_list_is_id_ordered() {
        let store = Store::open_in_memory().unwrap();
        store
            .append_message(Source::User, "hi".into(), None, None, None)
            .await
            .unwrap();
        store
            .append_message(Source::Assistant, "hello".into(), None, None, None)
            .await
            .unwrap();
        let msgs = store.list_messages().await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].id < msgs[1].id);
        assert_eq!(msgs[0].content, "hi");
    }

    #[tokio::test]
    async fn task_completion_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .create_task("sleep".into(), serde_json::json!({}))
            .await
            .unwrap();
        store.complete_task(id.clone(), "done".into()).await.unwrap();
        // A second completion attempt must not clobber the first result.
        store.complete_task(id.clone(), "done-again".into()).await.unwrap();
        let task = store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn list_background_tasks_filters_by_status() {
        let store = Store::open_in_memory().unwrap();
        let running_id = store.create_task("sleep".into(), serde_json::json!({})).await.unwrap();
        let done_id = store.create_task("web_fetch".into(), serde_json::json!({})).await.unwrap();
        store.complete_task(done_id.clone(), "ok".into()).await.unwrap();

        let all = store.list_background_tasks(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let running = store.list_background_tasks(Some(TaskStatus::Running)).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, running_id);

        let completed = store.list_background_tasks(Some(TaskStatus::Completed)).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done_id);
    }

    #[tokio::test]
    async fn at_most_one_open_session() {
        let store = Store::open_in_memory().unwrap();
        store.start_session(None).await.unwrap();
        assert!(store.current_session().await.unwrap().is_some());
        store.end_current_session().await.unwrap();
        assert!(store.current_session().await.unwrap().is_none());
        store.start_session(Some("handoff".into())).await.unwrap();
        let session = store.current_session().await.unwrap().unwrap();
        assert_eq!(session.handoff_summary.as_deref(), Some("handoff"));
    }

    #[tokio::test]
    async fn kv_state_upserts() {
        let store = Store::open_in_memory().unwrap();
        let default = Value::from("conversational");
        assert_eq!(
            store
                .get_state("mode".into(), default.clone())
                .await
                .unwrap(),
            default
        );
        store
            .set_state("mode".into(), Value::from("autonomous"))
            .await
            .unwrap();
        assert_eq!(
            store.get_state("mode".into(), default).await.unwrap(),
            Value::from("autonomous")
        );
    }
}
