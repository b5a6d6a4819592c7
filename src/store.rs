//! SQLite record store
//!
//! Holds everything that is not a vector: uploaded documents, the
//! question/answer log, API users with their tokens, and speech sessions.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::types::{DocumentRecord, InteractionLog, TtsSession, TtsState, User};

pub struct RecordStore {
    conn: Connection,
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl RecordStore {
    /// Create or open the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database {}", path.as_ref().display()))?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )
        .context("Failed to set pragmas")?;

        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                file_path TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                processed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS interaction_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                sources TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_interaction_logs_user ON interaction_logs(user_id);

            CREATE TABLE IF NOT EXISTS tts_sessions (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                voice_id TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
            )
            .context("Failed to run migrations")?;

        tracing::debug!("Record store migrations complete");
        Ok(())
    }

    // ==================== Documents ====================

    pub fn insert_document(&self, doc: &DocumentRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO documents (id, file_name, file_path, uploaded_at, chunk_count, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    doc.id,
                    doc.file_name,
                    doc.file_path,
                    doc.uploaded_at,
                    doc.chunk_count as i64,
                    doc.processed_at,
                ],
            )
            .context("Failed to insert document")?;
        Ok(())
    }

    pub fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        self.conn
            .query_row(
                "SELECT id, file_name, file_path, uploaded_at, chunk_count, processed_at
                 FROM documents WHERE id = ?1",
                params![id],
                row_to_document,
            )
            .optional()
            .context("Failed to get document")
    }

    /// Newest first
    pub fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, file_name, file_path, uploaded_at, chunk_count, processed_at
                 FROM documents ORDER BY uploaded_at DESC, rowid DESC",
            )
            .context("Failed to prepare query")?;

        let docs = stmt
            .query_map([], row_to_document)
            .context("Failed to list documents")?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    /// Record that the document is in the knowledge base
    pub fn mark_processed(&self, id: &str, chunk_count: u32) -> Result<()> {
        self.conn
            .execute(
                "UPDATE documents SET chunk_count = ?2, processed_at = ?3 WHERE id = ?1",
                params![id, chunk_count as i64, now_iso()],
            )
            .context("Failed to mark document processed")?;
        Ok(())
    }

    /// Returns false when no such document existed
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .context("Failed to delete document")?;
        Ok(deleted > 0)
    }

    pub fn count_documents(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .context("Failed to count documents")?;
        Ok(count as usize)
    }

    // ==================== Interaction log ====================

    pub fn log_interaction(
        &self,
        user_id: Option<i64>,
        question: &str,
        answer: &str,
        sources: &[String],
    ) -> Result<i64> {
        let sources_json = serde_json::to_string(sources)?;
        self.conn
            .execute(
                "INSERT INTO interaction_logs (user_id, question, answer, sources, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, question, answer, sources_json, now_iso()],
            )
            .context("Failed to log interaction")?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest first; `None` lists every user's interactions
    pub fn list_interactions(&self, user_id: Option<i64>, limit: usize) -> Result<Vec<InteractionLog>> {
        let limit = limit as i64;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, question, answer, sources, created_at
                 FROM interaction_logs
                 WHERE (?1 IS NULL OR user_id = ?1)
                 ORDER BY id DESC LIMIT ?2",
            )
            .context("Failed to prepare query")?;

        let logs = stmt
            .query_map(params![user_id, limit], row_to_interaction)
            .context("Failed to list interactions")?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    // ==================== Users ====================

    /// Create a user, or return the existing one with that name
    pub fn create_user(&self, username: &str) -> Result<User> {
        if let Some(existing) = self.user_by_name(username)? {
            return Ok(existing);
        }

        self.conn
            .execute(
                "INSERT INTO users (username, token, created_at) VALUES (?1, ?2, ?3)",
                params![username, new_token(), now_iso()],
            )
            .context("Failed to create user")?;

        self.user_by_name(username)?
            .context("User vanished after insert")
    }

    pub fn user_by_name(&self, username: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, username, token, created_at FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()
            .context("Failed to look up user")
    }

    pub fn user_for_token(&self, token: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, username, token, created_at FROM users WHERE token = ?1",
                params![token],
                row_to_user,
            )
            .optional()
            .context("Failed to look up token")
    }

    /// Issue a fresh token, invalidating the old one
    pub fn rotate_token(&self, username: &str) -> Result<Option<User>> {
        let updated = self
            .conn
            .execute(
                "UPDATE users SET token = ?2 WHERE username = ?1",
                params![username, new_token()],
            )
            .context("Failed to rotate token")?;

        if updated == 0 {
            return Ok(None);
        }
        self.user_by_name(username)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, token, created_at FROM users ORDER BY id")
            .context("Failed to prepare query")?;
        let users = stmt
            .query_map([], row_to_user)
            .context("Failed to list users")?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    // ==================== Speech sessions ====================

    pub fn create_tts_session(&self, session: &TtsSession) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO tts_sessions (id, user_id, text, position, voice_id, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.id,
                    session.user_id,
                    session.text,
                    session.position as i64,
                    session.voice_id,
                    session.state.to_string(),
                    session.created_at,
                    session.updated_at,
                ],
            )
            .context("Failed to create speech session")?;
        Ok(())
    }

    /// Sessions are only visible to the user that started them
    pub fn get_tts_session(&self, id: &str, user_id: i64) -> Result<Option<TtsSession>> {
        self.conn
            .query_row(
                "SELECT id, user_id, text, position, voice_id, state, created_at, updated_at
                 FROM tts_sessions WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                row_to_tts_session,
            )
            .optional()
            .context("Failed to get speech session")
    }

    pub fn update_tts_position(&self, id: &str, position: usize, state: TtsState) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tts_sessions SET position = ?2, state = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, position as i64, state.to_string(), now_iso()],
            )
            .context("Failed to update speech session")?;
        Ok(())
    }

    pub fn delete_tts_session(&self, id: &str, user_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM tts_sessions WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .context("Failed to delete speech session")?;
        Ok(deleted > 0)
    }

    // ==================== Reset ====================

    /// Remove documents, logs and sessions; users and tokens survive
    pub fn clear_all(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "DELETE FROM documents; DELETE FROM interaction_logs; DELETE FROM tts_sessions;",
            )
            .context("Failed to clear records")?;
        Ok(())
    }
}

// ==================== Row mapping ====================

fn row_to_document(row: &Row) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        file_path: row.get(2)?,
        uploaded_at: row.get(3)?,
        chunk_count: row.get::<_, i64>(4)? as u32,
        processed_at: row.get(5)?,
    })
}

fn row_to_interaction(row: &Row) -> rusqlite::Result<InteractionLog> {
    let sources: String = row.get(4)?;
    Ok(InteractionLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        sources: serde_json::from_str(&sources).unwrap_or_default(),
        created_at: row.get(5)?,
    })
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        token: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_tts_session(row: &Row) -> rusqlite::Result<TtsSession> {
    let state: String = row.get(5)?;
    Ok(TtsSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        text: row.get(2)?,
        position: row.get::<_, i64>(3)? as usize,
        voice_id: row.get(4)?,
        state: state.parse().unwrap_or(TtsState::Paused),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
