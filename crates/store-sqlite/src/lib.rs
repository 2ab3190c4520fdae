use std::path::{Path, PathBuf};
use std::time::Duration;

use core_model::ArchiveRecord;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("opening sqlite db {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("creating parent dir for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("record key must not be empty")]
    InvalidKey,
    #[error("record {key} is missing {field}")]
    Incomplete { key: String, field: &'static str },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable key to record store backing the cache.
///
/// Each caller opens its own handle on the shared file; WAL mode keeps
/// readers from blocking each other or waiting on a committing writer.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spacelog")
            .join("spacelog.db")
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        debug!(path = %path.display(), "opened store");
        Ok(Self { conn })
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS space_logs (
              key TEXT PRIMARY KEY,
              title TEXT NOT NULL,
              source_description TEXT NOT NULL,
              generated_brief TEXT NOT NULL,
              media_url TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Exact-match lookup; `Ok(None)` on a miss.
    pub fn lookup(&self, key: &str) -> Result<Option<ArchiveRecord>> {
        if key.trim().is_empty() {
            return Err(StorageError::InvalidKey);
        }
        self.conn
            .query_row(
                "SELECT key, title, source_description, generated_brief, media_url FROM space_logs WHERE key = ?1",
                params![key],
                row_to_record,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Inserts the record or replaces every column of the row sharing its key.
    /// The write is committed when this returns.
    pub fn store(&self, record: &ArchiveRecord) -> Result<()> {
        validate(record)?;
        self.conn.execute(
            r#"INSERT INTO space_logs (key, title, source_description, generated_brief, media_url)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(key) DO UPDATE SET
              title=excluded.title,
              source_description=excluded.source_description,
              generated_brief=excluded.generated_brief,
              media_url=excluded.media_url"#,
            params![
                record.key,
                record.title,
                record.source_description,
                record.generated_brief,
                record.media_url
            ],
        )?;
        debug!(key = %record.key, "stored record");
        Ok(())
    }

    pub fn list_records(&self) -> Result<Vec<ArchiveRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, title, source_description, generated_brief, media_url FROM space_logs ORDER BY key DESC",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM space_logs", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn integrity_check(&self) -> Result<String> {
        self.conn
            .query_row("PRAGMA integrity_check;", [], |r| r.get(0))
            .map_err(Into::into)
    }
}

fn validate(record: &ArchiveRecord) -> Result<()> {
    if record.key.trim().is_empty() {
        return Err(StorageError::InvalidKey);
    }
    if record.media_url.trim().is_empty() {
        return Err(StorageError::Incomplete {
            key: record.key.clone(),
            field: "media_url",
        });
    }
    Ok(())
}

fn row_to_record(r: &rusqlite::Row<'_>) -> rusqlite::Result<ArchiveRecord> {
    Ok(ArchiveRecord {
        key: r.get(0)?,
        title: r.get(1)?,
        source_description: r.get(2)?,
        generated_brief: r.get(3)?,
        media_url: r.get(4)?,
    })
}
