//! Definition lookup backends.
//!
//! A source maps a word (plus optional language override) to a raw HTML
//! definition fragment. The SQLite backend serves indexed dictionary
//! dumps; the in-memory backend backs tests.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use tracing::info;

/// Strings a query box produces that must never hit the backend.
const RESERVED_QUERIES: &[&str] = &[".", "#", "?", "/"];

/// Trims the input and rejects empty strings and the reserved
/// punctuation-only queries.
pub fn validate_query(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() || RESERVED_QUERIES.contains(&trimmed) {
        None
    } else {
        Some(trimmed)
    }
}

#[derive(Debug)]
pub enum SourceError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    Format(serde_json::Error),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Database(err) => write!(f, "database error: {err}"),
            SourceError::Io(err) => write!(f, "io error: {err}"),
            SourceError::Format(err) => write!(f, "entry format error: {err}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<rusqlite::Error> for SourceError {
    fn from(err: rusqlite::Error) -> Self {
        SourceError::Database(err)
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Format(err)
    }
}

/// Word to definition-fragment lookup.
pub trait DefinitionSource: Send + Sync {
    /// Returns the raw HTML definition, or `None` on a miss. `lang` is an
    /// explicit override; `None` means the default language.
    fn lookup(&self, word: &str, lang: Option<&str>) -> Result<Option<String>, SourceError>;

    /// Picks a random indexed word for the lucky endpoint.
    fn random_word(&self) -> Result<Option<String>, SourceError>;
}

/// One dictionary entry in an index input file.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    pub word: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    pub definition: String,
}

fn default_lang() -> String {
    "en".to_string()
}

/// SQLite-backed source over an `entries` table.
pub struct SqliteSource {
    conn: Mutex<Connection>,
    default_lang: String,
}

impl SqliteSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, SourceError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, SourceError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                 id INTEGER PRIMARY KEY,
                 lang TEXT NOT NULL,
                 word TEXT NOT NULL,
                 definition TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_entries_lang_word ON entries (lang, word);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_lang: default_lang(),
        })
    }

    /// Inserts entries in one transaction, returning the count written.
    pub fn index_entries(&self, entries: &[Entry]) -> Result<usize, SourceError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO entries (lang, word, definition) VALUES (?1, ?2, ?3)")?;
            for entry in entries {
                stmt.execute(params![entry.lang, entry.word, entry.definition])?;
            }
        }
        tx.commit()?;
        info!(count = entries.len(), "indexed dictionary entries");
        Ok(entries.len())
    }
}

impl DefinitionSource for SqliteSource {
    fn lookup(&self, word: &str, lang: Option<&str>) -> Result<Option<String>, SourceError> {
        let lang = lang.unwrap_or(&self.default_lang);
        let conn = self.conn.lock();
        let definition = conn
            .query_row(
                "SELECT definition FROM entries WHERE lang = ?1 AND word = ?2 LIMIT 1",
                params![lang, word],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(definition)
    }

    fn random_word(&self) -> Result<Option<String>, SourceError> {
        let conn = self.conn.lock();
        let word = conn
            .query_row(
                "SELECT word FROM entries ORDER BY RANDOM() LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(word)
    }
}

/// In-memory source keyed by (lang, word), with a lookup counter so tests
/// can assert which inputs reached the backend.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: Mutex<HashMap<(String, String), String>>,
    lookups: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, word: &str, lang: &str, definition: &str) {
        self.entries
            .lock()
            .insert((lang.to_string(), word.to_string()), definition.to_string());
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl DefinitionSource for MemorySource {
    fn lookup(&self, word: &str, lang: Option<&str>) -> Result<Option<String>, SourceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let lang = lang.unwrap_or("en");
        Ok(self
            .entries
            .lock()
            .get(&(lang.to_string(), word.to_string()))
            .cloned())
    }

    fn random_word(&self) -> Result<Option<String>, SourceError> {
        Ok(self.entries.lock().keys().next().map(|(_, word)| word.clone()))
    }
}
