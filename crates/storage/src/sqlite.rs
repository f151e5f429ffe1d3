//! SQLite-backed message store.
//!
//! Messages are stored as serde JSON payloads keyed by id, so the
//! schema survives additions to [`Message`] without migrations.
//! Attachments live in their own table and are fetched lazily.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use shared::message::{FileAttachment, Message};
use shared::store::{MessageStore, StoreError};

fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.into())
}

pub struct SqliteMessageStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteMessageStore {
    /// Open (or create) the thread database under `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("threads.db");

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        Self::init_schema(&conn)?;
        debug!("Opened thread database at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Open the database in the platform data directory.
    pub fn open_default() -> Result<Self> {
        let data_dir = directories::ProjectDirs::from("com.local", "Threadline", "Threadline")
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./threadline"));
        Self::new(&data_dir)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                payload TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS attachments (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                media_type TEXT NOT NULL,
                data TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attachments_message ON attachments(message_id)",
            [],
        )?;

        Ok(())
    }

    /// Insert or replace one message in a thread.
    pub fn insert_message(&self, thread_id: &str, message: &Message) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (id, thread_id, payload) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                thread_id = excluded.thread_id,
                payload = excluded.payload",
            params![message.id, thread_id, payload],
        )?;
        Ok(())
    }

    pub fn insert_attachment(&self, attachment: &FileAttachment) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO attachments (id, message_id, file_name, media_type, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                message_id = excluded.message_id,
                file_name = excluded.file_name,
                media_type = excluded.media_type,
                data = excluded.data",
            params![
                attachment.id,
                attachment.message_id,
                attachment.file_name,
                attachment.media_type,
                attachment.data
            ],
        )?;
        Ok(())
    }

    /// Load a whole thread in insertion order.
    pub fn load_thread(&self, thread_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT payload FROM messages WHERE thread_id = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![thread_id], |row| row.get::<_, String>(0))?;

        let mut messages = Vec::new();
        for payload in rows {
            messages.push(serde_json::from_str(&payload?)?);
        }
        Ok(messages)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn fetch_message(&self, message_id: &str) -> Result<Message, StoreError> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM messages WHERE id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let payload = payload.ok_or_else(|| StoreError::NotFound {
            message_id: message_id.to_string(),
        })?;

        serde_json::from_str(&payload).map_err(|e| StoreError::Corrupt {
            message_id: message_id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn update_message_content(
        &self,
        message_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut message = self.fetch_message(message_id)?;
        message.content = content.to_string();
        message.sync_text_part();

        let payload = serde_json::to_string(&message)
            .map_err(|e| StoreError::Backend(e.into()))?;

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE messages SET payload = ?1 WHERE id = ?2",
            params![payload, message_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_message_content(&self, message_id: &str) -> Result<String, StoreError> {
        Ok(self.fetch_message(message_id)?.content)
    }

    async fn get_file_attachments_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Vec<FileAttachment>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, message_id, file_name, media_type, data
                 FROM attachments WHERE message_id = ?1 ORDER BY rowid",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![message_id], |row| {
                Ok(FileAttachment {
                    id: row.get(0)?,
                    message_id: row.get(1)?,
                    file_name: row.get(2)?,
                    media_type: row.get(3)?,
                    data: row.get(4)?,
                })
            })
            .map_err(db_err)?;

        let mut attachments = Vec::new();
        for row in rows {
            attachments.push(row.map_err(db_err)?);
        }
        Ok(attachments)
    }
}
