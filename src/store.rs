// src/store.rs

use rusqlite::{Connection, Result as SqliteResult, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

pub struct SessionStore {
    conn: Connection,
}

#[derive(Debug)]
pub struct StoredMessage {
    pub id: Option<i64>,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    /// Structured declaration JSON attached to an assistant turn, if any.
    pub parsed_form: Option<String>,
}

#[derive(Debug)]
pub struct StoredDocument {
    pub id: Option<i64>,
    pub conversation_id: String,
    pub filename: String,
    pub data: Vec<u8>,
    pub is_processed: bool,
    /// Classification after extraction: "text", "scanned", "error", or "unknown"
    pub content_type: Option<String>,
    /// Extracted plain text (populated only when content_type == "text")
    pub extracted_text: Option<String>,
}

impl SessionStore {
    /// Create a new session store with SQLite backend
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                parsed_form TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                data BLOB NOT NULL,
                is_processed INTEGER NOT NULL DEFAULT 0,
                content_type TEXT NOT NULL DEFAULT 'unknown',
                extracted_text TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_conversation ON documents(conversation_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_is_processed ON documents(is_processed)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Generate a conversation id from a seed message, timestamp, and user.
    pub fn generate_conversation_id(seed: &str, timestamp: &str, user: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(timestamp.as_bytes());
        hasher.update(user.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Create the conversation row if it doesn't exist yet.
    pub fn ensure_conversation(&self, id: &str) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO conversations (id) VALUES (?1)",
            params![id],
        )?;
        Ok(())
    }

    /// Append a chat message to a conversation.
    pub fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        parsed_form: Option<&str>,
    ) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO messages (conversation_id, role, content, parsed_form)
             VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, role, content, parsed_form],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(conversation = %conversation_id, role = role, message_id = id, "Message stored");
        Ok(id)
    }

    /// Full message history of a conversation, oldest first.
    pub fn get_history(&self, conversation_id: &str) -> SqliteResult<Vec<StoredMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, role, content, parsed_form
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(StoredMessage {
                id: Some(row.get(0)?),
                conversation_id: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                parsed_form: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    /// Insert an uploaded document (raw bytes, unclassified).
    pub fn insert_document(&self, doc: &StoredDocument) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO documents
                (conversation_id, filename, data, is_processed, content_type, extracted_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doc.conversation_id,
                doc.filename,
                doc.data,
                doc.is_processed,
                doc.content_type,
                doc.extracted_text,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(document_id = id, filename = %doc.filename, "Document stored");
        Ok(id)
    }

    /// Update a document with extraction results and mark it processed.
    pub fn set_document_extraction(
        &self,
        document_id: i64,
        content_type: &str,
        extracted_text: Option<&str>,
    ) -> SqliteResult<()> {
        self.conn.execute(
            "UPDATE documents
             SET content_type = ?1, extracted_text = ?2, is_processed = 1
             WHERE id = ?3",
            params![content_type, extracted_text, document_id],
        )?;
        info!(
            document_id = document_id,
            content_type = content_type,
            "Document classified and marked processed"
        );
        Ok(())
    }

    /// Get all documents awaiting extraction (for batch processing)
    pub fn get_unprocessed_documents(&self) -> SqliteResult<Vec<StoredDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, filename, data, is_processed, content_type, extracted_text
             FROM documents
             WHERE is_processed = 0
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| Self::row_to_document(row))?;
        rows.collect()
    }

    /// Get documents by content_type (e.g. "text", "scanned", "error")
    pub fn get_documents_by_content_type(
        &self,
        content_type: &str,
    ) -> SqliteResult<Vec<StoredDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, filename, data, is_processed, content_type, extracted_text
             FROM documents
             WHERE content_type = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![content_type], |row| Self::row_to_document(row))?;
        rows.collect()
    }

    /// Get a single document by its primary key ID.
    pub fn get_document_by_id(&self, id: i64) -> SqliteResult<Option<StoredDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, filename, data, is_processed, content_type, extracted_text
             FROM documents
             WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_document(row)?)),
            None => Ok(None),
        }
    }

    /// Get all documents uploaded to a conversation.
    pub fn get_documents_for_conversation(
        &self,
        conversation_id: &str,
    ) -> SqliteResult<Vec<StoredDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, filename, data, is_processed, content_type, extracted_text
             FROM documents
             WHERE conversation_id = ?1
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| Self::row_to_document(row))?;
        rows.collect()
    }

    /// Helper: map the 7-column document projection to `StoredDocument`.
    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredDocument> {
        Ok(StoredDocument {
            id: Some(row.get(0)?),
            conversation_id: row.get(1)?,
            filename: row.get(2)?,
            data: row.get(3)?,
            is_processed: row.get(4)?,
            content_type: row.get(5)?,
            extracted_text: row.get(6)?,
        })
    }

    /// Counts for statistics logging: (conversations, messages, documents,
    /// processed documents).
    pub fn get_counts(&self) -> SqliteResult<(usize, usize, usize, usize)> {
        let conversations: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        let messages: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        let documents: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let processed_documents: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE is_processed = 1",
            [],
            |row| row.get(0),
        )?;
        Ok((conversations, messages, documents, processed_documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_conversation_id_generation() {
        let id1 = SessionStore::generate_conversation_id("hello", "2026-01-01", "cli");
        let id2 = SessionStore::generate_conversation_id("hello", "2026-01-01", "cli");
        let id3 = SessionStore::generate_conversation_id("other", "2026-01-01", "cli");

        assert_eq!(id1, id2); // Same inputs = same hash
        assert_ne!(id1, id3); // Different inputs = different hash
    }

    #[test]
    fn test_message_history_round_trip() {
        let (_dir, store) = temp_store();
        store.ensure_conversation("conv1").unwrap();
        store
            .append_message("conv1", "user", "fill my import form", None)
            .unwrap();
        store
            .append_message("conv1", "assistant", "done", Some(r#"{"header":{}}"#))
            .unwrap();

        let history = store.get_history("conv1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].parsed_form.as_deref(), Some(r#"{"header":{}}"#));
    }

    #[test]
    fn test_document_classification_flow() {
        let (_dir, store) = temp_store();
        store.ensure_conversation("conv1").unwrap();
        let id = store
            .insert_document(&StoredDocument {
                id: None,
                conversation_id: "conv1".to_string(),
                filename: "invoice.pdf".to_string(),
                data: vec![1, 2, 3],
                is_processed: false,
                content_type: Some("unknown".to_string()),
                extracted_text: None,
            })
            .unwrap();

        assert_eq!(store.get_unprocessed_documents().unwrap().len(), 1);

        store
            .set_document_extraction(id, "text", Some("Invoice No: 42"))
            .unwrap();

        assert!(store.get_unprocessed_documents().unwrap().is_empty());
        let texts = store.get_documents_by_content_type("text").unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].extracted_text.as_deref(), Some("Invoice No: 42"));

        let (convs, msgs, docs, processed) = store.get_counts().unwrap();
        assert_eq!((convs, msgs, docs, processed), (1, 0, 1, 1));
    }
}
