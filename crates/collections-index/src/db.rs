//! Lazy-open SQL connection with schema bootstrap and FTS-capability probe
//! (§4.D, §6).
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so the gateway owns it
//! behind a plain `std::sync::Mutex` and every statement runs inside
//! `tokio::task::spawn_blocking` — the same "async-safe SQLite via
//! spawn_blocking" shape used for blocking-I/O-over-an-async-pool elsewhere
//! in this corpus.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::Result;

/// Where the backing SQLite file lives.
#[derive(Debug, Clone)]
pub enum DbLocation {
    /// A real file on disk; parent directories are created on first use.
    Path(PathBuf),
    /// A private in-process database, gone when the connection closes.
    Memory,
    /// A private on-disk database with no name, gone when the connection
    /// closes — SQLite's empty-filename convention.
    Temporary,
}

const PRIMARY_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS package_collections(
    key   TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL);
"#;

const FTS_PACKAGES_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS fts_packages USING fts4(
    collection_id_blob_base64, id, version, name, repository_url,
    summary, keywords, products, targets,
    notindexed=collection_id_blob_base64, tokenize=unicode61);
"#;

const FTS_TARGETS_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS fts_targets USING fts4(
    collection_id_blob_base64, package_repository_url, name,
    notindexed=collection_id_blob_base64, tokenize=unicode61);
"#;

/// Opens the connection for `location`, creating parent directories for a
/// `Path` location if they don't exist yet.
fn open_raw(location: &DbLocation) -> rusqlite::Result<Connection> {
    match location {
        DbLocation::Path(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        rusqlite::Error::SqliteFailure(
                            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                            Some(format!("failed to create parent directory: {e}")),
                        )
                    })?;
                }
            }
            Connection::open(path)
        }
        DbLocation::Memory => Connection::open_in_memory(),
        DbLocation::Temporary => Connection::open(""),
    }
}

/// Creates the primary table unconditionally, then attempts both FTS4
/// virtual tables. Returns whether FTS creation succeeded — if not, the
/// process-wide (per-instance) flag this feeds demotes the store to
/// fallback-scan mode. No fallback to older FTS versions is attempted.
fn bootstrap(conn: &Connection) -> rusqlite::Result<bool> {
    conn.execute_batch(PRIMARY_TABLE_SQL)?;

    let fts_ready = conn.execute_batch(FTS_PACKAGES_SQL).is_ok()
        && conn.execute_batch(FTS_TARGETS_SQL).is_ok();

    conn.pragma_update(None, "journal_mode", "WAL")?;

    Ok(fts_ready)
}

/// Does the backing file still exist? Only meaningful for `Path` locations —
/// `Memory`/`Temporary` locations are never considered "disappeared".
fn still_present(location: &DbLocation) -> bool {
    match location {
        DbLocation::Path(path) => path.exists(),
        DbLocation::Memory | DbLocation::Temporary => true,
    }
}

/// Owns the (possibly absent) SQL connection and the FTS-capability flag.
/// Opening is lazy: the connection is created on first use, not at
/// construction.
pub struct Gateway {
    location: DbLocation,
    conn: Arc<Mutex<Option<Connection>>>,
    use_search_indices: Arc<AtomicBool>,
    force_fts_off: bool,
}

impl Gateway {
    pub fn new(location: DbLocation) -> Self {
        Self::new_with_fts_forcing(location, false)
    }

    /// Test seam for §8 scenario 4 ("fallback packages hit with substring:
    /// with FTS disabled..."): forces `use_search_indices` to `false` after
    /// bootstrap regardless of whether FTS4 creation actually succeeded, so
    /// the fallback-scan path can be exercised deterministically even though
    /// the bundled SQLite build always supports FTS4.
    pub fn new_with_search_indices_forced_off(location: DbLocation) -> Self {
        Self::new_with_fts_forcing(location, true)
    }

    fn new_with_fts_forcing(location: DbLocation, force_fts_off: bool) -> Self {
        Self {
            location,
            conn: Arc::new(Mutex::new(None)),
            use_search_indices: Arc::new(AtomicBool::new(false)),
            force_fts_off,
        }
    }

    pub fn use_search_indices(&self) -> bool {
        self.use_search_indices.load(Ordering::SeqCst)
    }

    pub fn is_path(&self, path: &Path) -> bool {
        matches!(&self.location, DbLocation::Path(p) if p == path)
    }

    /// True if a connection is currently held.
    pub async fn is_open(&self) -> bool {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || conn.lock().expect("db lock poisoned").is_some())
            .await
            .unwrap_or(false)
    }

    /// Ensures a connection exists, (re)opening it if absent, or if the
    /// backing file has disappeared out-of-band (Path locations only).
    pub async fn ensure_open(&self) -> Result<()> {
        let conn = self.conn.clone();
        let use_search_indices = self.use_search_indices.clone();
        let location = self.location.clone();
        let force_fts_off = self.force_fts_off;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = conn.lock().expect("db lock poisoned");

            let needs_reopen = match guard.as_ref() {
                None => true,
                Some(_) => !still_present(&location),
            };

            if needs_reopen {
                *guard = None;
                let new_conn = open_raw(&location)?;
                let fts_ready = bootstrap(&new_conn)? && !force_fts_off;
                use_search_indices.store(fts_ready, Ordering::SeqCst);
                *guard = Some(new_conn);
            }

            Ok(())
        })
        .await?
    }

    /// Runs `f` against the open connection on a blocking worker thread.
    /// Callers must have called [`Gateway::ensure_open`] first.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("db lock poisoned");
            let conn_ref = guard.as_ref().expect("ensure_open must precede use");
            f(conn_ref)
        })
        .await?
    }

    /// Runs `f` inside a single transaction against the open connection.
    pub async fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().expect("db lock poisoned");
            let conn_mut = guard.as_mut().expect("ensure_open must precede use");
            let tx = conn_mut.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await?
    }

    /// Attempts to close the held connection once. Leaves `None` in place on
    /// success; on failure, puts the connection back so a retry can reuse it.
    pub async fn try_close_once(&self) -> Result<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = conn.lock().expect("db lock poisoned");
            if let Some(held) = guard.take() {
                if let Err((returned, err)) = held.close() {
                    *guard = Some(returned);
                    return Err(err.into());
                }
            }
            Ok(())
        })
        .await?
    }
}
