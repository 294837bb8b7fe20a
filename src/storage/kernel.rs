//! Storage kernel (spec §4.A)
//!
//! Owns the single SQLite file backing a project's memory substrate:
//! connection setup, WAL journaling, foreign-key enforcement, and schema
//! migration. Every other component reaches the database only through a
//! `Storage` handle.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{AlexandriaError, Result};
use crate::storage::migrations;

/// Owns the database connections for one project.
///
/// Mirrors the reader/writer split used throughout this codebase's storage
/// layer: a single writer connection serialises mutations (spec §5:
/// single-process, single-writer), while reads can run against a separate
/// connection to the same file without contending on the writer's lock.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

impl Storage {
    /// Open (creating if necessary) the database at `path`, applying
    /// pending migrations on the writer connection.
    pub fn open(path: impl AsRef<Path>, create_if_missing: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !create_if_missing && !path.exists() {
            return Err(AlexandriaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database does not exist: {}", path.display()),
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;

        let current_version = migrations::get_current_version(&writer_conn)?;
        if current_version > migrations::max_known_version() {
            return Err(AlexandriaError::SchemaIncompatible(format!(
                "database schema version {current_version} is newer than the {} this build understands",
                migrations::max_known_version()
            )));
        }

        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path,
        })
    }

    /// Open an in-memory database, useful for tests.
    ///
    /// Plain `:memory:` connections are private per-connection, so reader
    /// and writer would see different empty databases. Use a named,
    /// shared-cache URI instead so both connections address the same
    /// in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        use rusqlite::OpenFlags;

        let name = format!("alexandria-{}", crate::ids::new_id());
        let uri = format!("file:{name}?mode=memory&cache=shared");
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;

        let writer_conn = Connection::open_with_flags(&uri, flags)?;
        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open_with_flags(&uri, flags)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path: PathBuf::from(uri),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(())
    }

    /// Path to the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside a write transaction, committing on success and rolling
    /// back on error.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .writer
            .lock()
            .map_err(|_| AlexandriaError::Io(poison_io_error("writer")))?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Run `f` against a read-only connection. Callers must not mutate
    /// state through it; use [`Storage::in_transaction`] for writes.
    pub fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .reader
            .lock()
            .map_err(|_| AlexandriaError::Io(poison_io_error("reader")))?;
        f(&conn)
    }

    /// Run `f` against the writer connection without opening an explicit
    /// transaction (used for single-statement operations where SQLite's
    /// implicit transaction is sufficient).
    pub fn with_writer<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .writer
            .lock()
            .map_err(|_| AlexandriaError::Io(poison_io_error("writer")))?;
        f(&conn)
    }
}

fn poison_io_error(which: &str) -> std::io::Error {
    std::io::Error::other(format!("{which} connection lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_migrates_schema() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_reader(|conn| {
                let version: u32 = conn
                    .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
                        r.get(0)
                    })
                    .unwrap();
                assert_eq!(version, migrations::max_known_version());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn open_missing_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.db");
        let result = Storage::open(&path, false);
        assert!(result.is_err());
    }

    #[test]
    fn open_creates_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alexandria.db");
        let storage = Storage::open(&path, true).unwrap();
        assert!(storage.path().exists());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let storage = Storage::open_in_memory().unwrap();
        let result: Result<()> = storage.in_transaction(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, started_at) VALUES ('s1', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Err(AlexandriaError::InvalidContent("boom".into()))
        });
        assert!(result.is_err());

        storage
            .with_reader(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0)).unwrap();
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }
}
