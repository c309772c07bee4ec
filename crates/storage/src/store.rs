//! SQLite event store implementation.

use crate::{Error, Event, EventKind, Result, SessionId};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use std::path::Path;

/// Summary row for one logged session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: usize,
}

/// SQLite-backed event store.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, seq);
            "#,
        )?;
        Ok(())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (id, session_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.session_id.to_string(),
                event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Load all events for a session in append order.
    pub fn load_session(&self, session_id: SessionId) -> Result<Vec<Event>> {
        self.load_events(session_id, None)
    }

    /// Load events for a session, optionally restricted to one kind name.
    pub fn load_events(&self, session_id: SessionId, kind: Option<&str>) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, timestamp, data FROM events
             WHERE session_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![session_id.to_string(), kind], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, session_id, timestamp, data) = row?;
            events.push(decode_event(id, &session_id, &timestamp, &data)?);
        }
        Ok(events)
    }

    /// List logged sessions, most recently started first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id,
                    MIN(timestamp),
                    MAX(CASE WHEN kind = 'session_end' THEN timestamp END),
                    SUM(CASE WHEN kind = 'message' THEN 1 ELSE 0 END)
             FROM events
             GROUP BY session_id
             ORDER BY MIN(seq) DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, started, ended, messages) = row?;
            let corrupt = |reason: String| Error::Corrupt {
                id: id.clone(),
                reason,
            };
            sessions.push(SessionSummary {
                id: id.parse().map_err(|e| corrupt(format!("session id: {e}")))?,
                started_at: parse_timestamp(&started).map_err(&corrupt)?,
                ended_at: ended
                    .as_deref()
                    .map(parse_timestamp)
                    .transpose()
                    .map_err(&corrupt)?,
                message_count: usize::try_from(messages).unwrap_or_default(),
            });
        }
        Ok(sessions)
    }
}

fn decode_event(id: String, session_id: &str, timestamp: &str, data: &str) -> Result<Event> {
    let corrupt = |reason: String| Error::Corrupt {
        id: id.clone(),
        reason,
    };
    let kind: EventKind = serde_json::from_str(data)?;
    Ok(Event {
        id: id.parse().map_err(|e| corrupt(format!("event id: {e}")))?,
        session_id: session_id
            .parse()
            .map_err(|e| corrupt(format!("session id: {e}")))?,
        timestamp: parse_timestamp(timestamp).map_err(&corrupt)?,
        kind,
    })
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| format!("timestamp {raw:?}: {e}"))
}
