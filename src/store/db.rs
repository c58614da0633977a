use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::codec::{decode_state, encode_state};
use super::models::*;
use crate::errors::StoreError;
use crate::phase::{InteractionMode, WorkflowPhase};
use crate::state::PipelineState;

type Result<T> = std::result::Result<T, StoreError>;

const SESSION_COLUMNS: &str = "session_id, description, mode, current_phase, status, error_message, created_at, updated_at";
const CHECKPOINT_COLUMNS: &str =
    "id, session_id, step, phase, input_summary, output_summary, created_at";

/// SQLite-backed session and checkpoint store.
///
/// The connection sits behind a `Mutex`, so one store may be shared across
/// threads driving different sessions. A state overwrite and its checkpoint
/// can be committed in a single transaction with `commit_checkpoint`.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        debug!(path = %path.display(), "Opened session store");
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                description TEXT NOT NULL DEFAULT '',
                mode TEXT NOT NULL,
                current_phase TEXT NOT NULL,
                status TEXT NOT NULL,
                state TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
                step TEXT NOT NULL,
                phase TEXT NOT NULL,
                input_summary TEXT NOT NULL DEFAULT '{}',
                output_summary TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
            CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);
            CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id);
            ",
        )?;
        Ok(())
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub fn create_session(&self, description: &str, mode: InteractionMode) -> Result<Session> {
        let session_id = Uuid::new_v4().to_string();
        let now = timestamp(Utc::now());
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (session_id, description, mode, current_phase, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                session_id,
                description,
                mode.as_str(),
                WorkflowPhase::Init.as_str(),
                SessionStatus::Running.as_str(),
                now
            ],
        )?;
        fetch_session(&conn, &session_id)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        let conn = self.lock()?;
        fetch_session(&conn, session_id)
    }

    /// Most recently updated first.
    pub fn list_sessions(&self, status: Option<SessionStatus>, limit: usize) -> Result<Vec<Session>> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {} FROM sessions
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY updated_at DESC, rowid DESC
             LIMIT ?2",
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![status.map(|s| s.as_str()), limit], SessionRow::from_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    /// Delete a session and, through the foreign key cascade, its checkpoints.
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            params![session_id],
        )?;
        if deleted == 0 {
            return Err(not_found(session_id));
        }
        Ok(())
    }

    pub fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE sessions SET status = ?1, error_message = ?2, updated_at = ?3 WHERE session_id = ?4",
            params![status.as_str(), error_message, timestamp(Utc::now()), session_id],
        )?;
        if updated == 0 {
            return Err(not_found(session_id));
        }
        Ok(())
    }

    // ── State ─────────────────────────────────────────────────────────

    /// Overwrite the state blob together with the denormalized phase,
    /// status and error columns.
    pub fn save_state(&self, session_id: &str, state: &PipelineState) -> Result<()> {
        let conn = self.lock()?;
        write_state(&conn, session_id, state)
    }

    pub fn load_state(&self, session_id: &str) -> Result<PipelineState> {
        let conn = self.lock()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT state FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            None => Err(not_found(session_id)),
            Some(None) => Err(StoreError::StateMissing {
                session_id: session_id.to_string(),
            }),
            Some(Some(raw)) => decode_state(&raw),
        }
    }

    // ── Checkpoints ───────────────────────────────────────────────────

    pub fn create_checkpoint(
        &self,
        session_id: &str,
        step: StepLabel,
        phase: WorkflowPhase,
        input_summary: &Value,
        output_summary: &Value,
    ) -> Result<Checkpoint> {
        let conn = self.lock()?;
        insert_checkpoint(&conn, session_id, step, phase, input_summary, output_summary)
    }

    /// Save `state` and append its checkpoint in one transaction.
    pub fn commit_checkpoint(
        &self,
        session_id: &str,
        state: &PipelineState,
        step: StepLabel,
        input_summary: &Value,
        output_summary: &Value,
    ) -> Result<Checkpoint> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        write_state(&tx, session_id, state)?;
        let checkpoint = insert_checkpoint(
            &tx,
            session_id,
            step,
            state.phase,
            input_summary,
            output_summary,
        )?;
        tx.commit()?;
        Ok(checkpoint)
    }

    /// Checkpoints in insertion order.
    pub fn list_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        let conn = self.lock()?;
        ensure_session(&conn, session_id)?;
        let sql = format!(
            "SELECT {} FROM checkpoints WHERE session_id = ?1 ORDER BY id",
            CHECKPOINT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id], CheckpointRow::from_row)?;
        let mut checkpoints = Vec::new();
        for row in rows {
            checkpoints.push(row?.into_checkpoint()?);
        }
        Ok(checkpoints)
    }

    pub fn get_last_checkpoint(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let conn = self.lock()?;
        ensure_session(&conn, session_id)?;
        let sql = format!(
            "SELECT {} FROM checkpoints WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
            CHECKPOINT_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![session_id], CheckpointRow::from_row)
            .optional()?;
        row.map(CheckpointRow::into_checkpoint).transpose()
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| invalid(column, e))
}

fn invalid(column: &str, message: impl ToString) -> StoreError {
    StoreError::InvalidColumn {
        column: column.to_string(),
        message: message.to_string(),
    }
}

fn not_found(session_id: &str) -> StoreError {
    StoreError::SessionNotFound {
        session_id: session_id.to_string(),
    }
}

fn ensure_session(conn: &Connection, session_id: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sessions WHERE session_id = ?1)",
        params![session_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(not_found(session_id))
    }
}

fn fetch_session(conn: &Connection, session_id: &str) -> Result<Session> {
    let sql = format!("SELECT {} FROM sessions WHERE session_id = ?1", SESSION_COLUMNS);
    conn.query_row(&sql, params![session_id], SessionRow::from_row)
        .optional()?
        .ok_or_else(|| not_found(session_id))?
        .into_session()
}

fn write_state(conn: &Connection, session_id: &str, state: &PipelineState) -> Result<()> {
    let blob = encode_state(state)?;
    let updated = conn.execute(
        "UPDATE sessions
         SET state = ?1, current_phase = ?2, status = ?3, error_message = ?4, updated_at = ?5
         WHERE session_id = ?6",
        params![
            blob,
            state.phase.as_str(),
            SessionStatus::from_state(state).as_str(),
            state.error,
            timestamp(Utc::now()),
            session_id
        ],
    )?;
    if updated == 0 {
        return Err(not_found(session_id));
    }
    Ok(())
}

fn insert_checkpoint(
    conn: &Connection,
    session_id: &str,
    step: StepLabel,
    phase: WorkflowPhase,
    input_summary: &Value,
    output_summary: &Value,
) -> Result<Checkpoint> {
    ensure_session(conn, session_id)?;
    conn.execute(
        "INSERT INTO checkpoints (session_id, step, phase, input_summary, output_summary, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session_id,
            step.as_str(),
            phase.as_str(),
            serde_json::to_string(input_summary)?,
            serde_json::to_string(output_summary)?,
            timestamp(Utc::now())
        ],
    )?;
    let id = conn.last_insert_rowid();
    let sql = format!("SELECT {} FROM checkpoints WHERE id = ?1", CHECKPOINT_COLUMNS);
    conn.query_row(&sql, params![id], CheckpointRow::from_row)?
        .into_checkpoint()
}

/// Intermediate row struct for sessions.
struct SessionRow {
    session_id: String,
    description: String,
    mode: String,
    current_phase: String,
    status: String,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            description: row.get(1)?,
            mode: row.get(2)?,
            current_phase: row.get(3)?,
            status: row.get(4)?,
            error_message: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_session(self) -> Result<Session> {
        Ok(Session {
            mode: InteractionMode::from_str(&self.mode).map_err(|e| invalid("mode", e))?,
            current_phase: WorkflowPhase::from_str(&self.current_phase)
                .map_err(|e| invalid("current_phase", e))?,
            status: SessionStatus::from_str(&self.status).map_err(|e| invalid("status", e))?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            session_id: self.session_id,
            description: self.description,
            error_message: self.error_message,
        })
    }
}

/// Intermediate row struct for checkpoints.
struct CheckpointRow {
    id: i64,
    session_id: String,
    step: String,
    phase: String,
    input_summary: String,
    output_summary: String,
    created_at: String,
}

impl CheckpointRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            step: row.get(2)?,
            phase: row.get(3)?,
            input_summary: row.get(4)?,
            output_summary: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint> {
        Ok(Checkpoint {
            id: self.id,
            step: StepLabel::from_str(&self.step).map_err(|e| invalid("step", e))?,
            phase: WorkflowPhase::from_str(&self.phase).map_err(|e| invalid("phase", e))?,
            input_summary: serde_json::from_str(&self.input_summary)?,
            output_summary: serde_json::from_str(&self.output_summary)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            session_id: self.session_id,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
