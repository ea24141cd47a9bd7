//! The owning database context shared by every store.
//!
//! One [`Database`] wraps one SQLite file (or an in-memory database for
//! tests). It is constructed once, wrapped in an `Arc`, and injected into
//! each store — explicit process-scoped state instead of a module-level
//! singleton. All writes are serialized by the internal mutex; WAL mode
//! lets readers proceed concurrently on the SQLite side.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once};

use rusqlite::Connection;

use crate::error::{Result, RetrievalError};
use crate::schema::{apply_schema, read_schema_version};

/// Database filename within a hindsight root directory.
pub const DB_FILENAME: &str = "hindsight.db";

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec as an auto-extension for every connection opened
/// afterwards. Must run before `Connection::open`; the `Once` keeps the
/// unsafe registration to a single call per process.
pub(crate) fn ensure_sqlite_vec_loaded() {
    VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *const std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int,
        >(sqlite_vec::sqlite3_vec_init as *const ())));
    });
}

/// Process-scoped SQLite context.
pub struct Database {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open (or create) the database file at `path` and apply the schema.
    ///
    /// Parent directories are created as needed.
    pub fn open(path: &Path) -> Result<Self> {
        ensure_sqlite_vec_loaded();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RetrievalError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Open at the conventional `{root_dir}/hindsight.db` location.
    pub fn open_in_dir(root_dir: &Path) -> Result<Self> {
        Self::open(&root_dir.join(DB_FILENAME))
    }

    /// In-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        ensure_sqlite_vec_loaded();
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the stored schema version.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.conn()?;
        Ok(read_schema_version(&conn)?)
    }

    /// Delete every row from every hindsight table in one transaction.
    ///
    /// The reset hook for test isolation; the schema itself stays in place.
    pub fn wipe(&self) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM graph_edges; DELETE FROM graph_nodes; DELETE FROM episodes;",
        )?;
        // The vector tables only exist once VectorIndex::initialize ran.
        let have_vec: i64 = tx.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'vec_entries'",
            [],
            |row| row.get(0),
        )?;
        if have_vec > 0 {
            tx.execute_batch("DELETE FROM vec_knowledge; DELETE FROM vec_entries;")?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Acquire the connection mutex.
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RetrievalError::Lock(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
