// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Database connection management.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use crate::checkpoint::{CheckpointBacklog, CheckpointCoordinator};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::schema;

/// Pragmas for every connection to a live project file. Automatic
/// checkpoints stay off; the checkpoint thread owns that job.
pub(crate) const SAFE_PRAGMAS: &str = r#"
PRAGMA <schema>.locking_mode = NORMAL;
PRAGMA <schema>.synchronous = NORMAL;
PRAGMA <schema>.journal_mode = WAL;
PRAGMA wal_autocheckpoint = 0;
"#;

/// Pragmas for a bulk-copy destination, which is deleted on any failure.
pub(crate) const FAST_PRAGMAS: &str = r#"
PRAGMA <schema>.synchronous = OFF;
PRAGMA <schema>.journal_mode = OFF;
"#;

/// Apply a pragma profile to `schema`.
pub(crate) fn configure(conn: &Connection, schema: &str, pragmas: &str) -> Result<()> {
    conn.execute_batch(&pragmas.replace("<schema>", schema))?;
    Ok(())
}

pub(crate) fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::InvalidPath(path.to_owned()))
}

/// Database open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// The file must already exist
    Existing,
    /// Create the file if it doesn't exist
    Create,
}

/// One open project file.
///
/// Owns the SQLite handle and the checkpoint thread serving it. The handle
/// is `!Sync`; all traffic comes from the owning thread.
pub struct DbConnection {
    // Dropped before `conn`, which joins the checkpoint thread first.
    coordinator: CheckpointCoordinator,
    pub(crate) conn: Connection,
    path: PathBuf,
    poisoned: Cell<bool>,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("path", &self.path)
            .field("poisoned", &self.poisoned.get())
            .finish_non_exhaustive()
    }
}

impl DbConnection {
    /// Open a project file.
    ///
    /// The connection is put into safe mode before the schema is verified.
    /// A fresh file receives the schema; an older revision is upgraded. If
    /// verification fails the handle is closed before the error is returned.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let flags = match mode {
            OpenMode::Existing => {
                if !path.exists() {
                    return Err(Error::DatabaseNotFound(path.to_owned()));
                }
                OpenFlags::SQLITE_OPEN_READ_WRITE
            }
            OpenMode::Create => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };
        // URI support is needed to attach other files read-only.
        let flags = flags | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let open_err = |source| Error::DatabaseOpen {
            path: path.to_owned(),
            source,
        };
        let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;
        conn.execute_batch(&SAFE_PRAGMAS.replace("<schema>", "main"))
            .map_err(open_err)?;
        schema::verify(&conn, path)?;

        let coordinator = CheckpointCoordinator::start(path, config)?;
        conn.commit_hook(Some(coordinator.commit_hook())).map_err(open_err)?;

        debug!("Opened project file {} ({:?})", path.display(), mode);
        Ok(Self {
            coordinator,
            conn,
            path: path.to_owned(),
            poisoned: Cell::new(false),
        })
    }

    /// Close the file, waiting for checkpoint work to finish.
    pub fn close(self) -> Result<()> {
        self.close_with(|_| {})
    }

    /// Close the file. `on_wait` is polled while the checkpoint thread still
    /// has work, so a caller can show progress instead of blocking silently.
    pub fn close_with(self, on_wait: impl FnMut(CheckpointBacklog)) -> Result<()> {
        let Self {
            mut coordinator,
            conn,
            path,
            ..
        } = self;

        // no new work may be queued once the wait starts
        if let Err(e) = conn.commit_hook(None::<fn() -> bool>) {
            warn!("Failed to remove commit hook of {}: {e}", path.display());
        }
        coordinator.shutdown(on_wait);
        drop(coordinator);

        conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
        debug!("Closed project file {}", path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get raw connection (for advanced usage).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint work not yet done.
    pub fn checkpoint_backlog(&self) -> CheckpointBacklog {
        self.coordinator.backlog()
    }

    /// Whether a transaction or savepoint is open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    pub(crate) fn poison(&self) {
        self.poisoned.set(true);
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.get()
    }

    /// Fail when ATTACH/DETACH would be illegal.
    pub(crate) fn ensure_no_transaction(&self, operation: &str) -> Result<()> {
        if self.in_transaction() {
            return Err(Error::integrity(format!(
                "{operation} cannot run inside an open transaction"
            )));
        }
        Ok(())
    }

    /// Attach another database file as `schema`. It is detached again when
    /// the guard drops.
    pub(crate) fn attach(&self, target: &str, schema: &'static str) -> Result<Attached<'_>> {
        self.conn
            .execute(&format!("ATTACH DATABASE ?1 AS {schema}"), [target])?;
        debug!("Attached {target} as {schema}");
        Ok(Attached {
            conn: &self.conn,
            schema,
            detached: false,
        })
    }
}

/// A database attached to a project connection.
pub(crate) struct Attached<'a> {
    conn: &'a Connection,
    schema: &'static str,
    detached: bool,
}

impl Attached<'_> {
    pub(crate) fn detach(mut self) -> Result<()> {
        self.detached = true;
        self.conn
            .execute_batch(&format!("DETACH DATABASE {}", self.schema))?;
        Ok(())
    }
}

impl Drop for Attached<'_> {
    fn drop(&mut self) {
        if !self.detached
            && let Err(e) = self
                .conn
                .execute_batch(&format!("DETACH DATABASE {}", self.schema))
        {
            warn!("Failed to detach {}: {e}", self.schema);
        }
    }
}

/// The current connection of a project plus, while switching files, the
/// previous one held aside.
///
/// [`ConnectionSlot::swap`] is the one transition that parks the current
/// connection; it always ends with exactly one active connection, either the
/// new one or the original.
#[derive(Debug, Default)]
pub struct ConnectionSlot {
    current: Option<DbConnection>,
    parked: Option<DbConnection>,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Result<&DbConnection> {
        self.current.as_ref().ok_or(Error::NotOpen)
    }

    /// Path of the active file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.current.as_ref().map(DbConnection::path)
    }

    pub fn has_parked(&self) -> bool {
        self.parked.is_some()
    }

    /// Open `path` as the current connection. Fails if one is active.
    pub fn open(&mut self, path: &Path, mode: OpenMode, config: &StoreConfig) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::integrity("a project file is already open"));
        }
        self.current = Some(DbConnection::open(path, mode, config)?);
        Ok(())
    }

    /// Adopt an already open connection, e.g. one produced by a copy.
    pub fn use_existing(&mut self, conn: DbConnection) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::integrity("a project file is already open"));
        }
        self.current = Some(conn);
        Ok(())
    }

    /// Take the current connection out of the slot.
    pub fn take(&mut self) -> Option<DbConnection> {
        self.current.take()
    }

    /// Park the current connection.
    pub fn set_aside(&mut self) -> Result<()> {
        if self.parked.is_some() {
            return Err(Error::integrity("a connection is already set aside"));
        }
        self.parked = Some(self.current.take().ok_or(Error::NotOpen)?);
        Ok(())
    }

    /// Close the parked connection.
    pub fn discard(&mut self) -> Result<()> {
        match self.parked.take() {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }

    /// Close the current connection and reinstate the parked one.
    pub fn restore(&mut self) -> Result<()> {
        let parked = self
            .parked
            .take()
            .ok_or_else(|| Error::integrity("no connection was set aside"))?;
        let closed = match self.current.take() {
            Some(conn) => conn.close(),
            None => Ok(()),
        };
        self.current = Some(parked);
        closed
    }

    /// Close the current connection.
    pub fn close(&mut self, on_wait: impl FnMut(CheckpointBacklog)) -> Result<()> {
        match self.current.take() {
            Some(conn) => conn.close_with(on_wait),
            None => Ok(()),
        }
    }

    /// Switch files reversibly.
    ///
    /// The current connection is set aside and `step` must install a new
    /// one. If it succeeds the parked connection is closed; otherwise the new
    /// connection (if any) is closed and the original reinstated untouched.
    pub fn swap<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.set_aside()?;

        let result = step(self).and_then(|value| match self.current {
            Some(_) => Ok(value),
            None => Err(Error::integrity("no connection installed while switching files")),
        });

        match result {
            Ok(value) => {
                if let Err(e) = self.discard() {
                    warn!("Failed to close previous project file: {e}");
                }
                Ok(value)
            }
            Err(e) => {
                if let Err(restore_err) = self.restore() {
                    warn!("Failed to close abandoned project file: {restore_err}");
                }
                Err(e)
            }
        }
    }
}
