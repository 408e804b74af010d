// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Background write-ahead-log checkpointing.
//!
//! The engine's automatic checkpointing is disabled on every project
//! connection. Instead a commit hook on the owner's connection bumps a
//! pending counter and wakes a dedicated thread, which runs passive
//! checkpoints from its own connection so interactive writes never wait on
//! them.
//!
//! The commit hook fires before the committing transaction's frames reach
//! the log, so every hook-driven checkpoint is followed by one more pass
//! after the retry delay. That pass also picks up frames a passive
//! checkpoint had to leave behind.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, error, warn};

use crate::config::StoreConfig;
use crate::connection::{SAFE_PRAGMAS, configure};
use crate::error::Result;

/// Checkpoint work outstanding, reported while a close waits for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointBacklog {
    /// Commits (or leftover frames) not yet checkpointed
    pub pending: u64,
    /// Whether a checkpoint is running right now
    pub active: bool,
}

impl CheckpointBacklog {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && !self.active
    }
}

#[derive(Debug, Default)]
struct State {
    pending: u64,
    /// Work parked until the retry delay elapses
    deferred: u64,
    active: bool,
    stop: bool,
}

impl State {
    fn backlog(&self) -> CheckpointBacklog {
        CheckpointBacklog {
            pending: self.pending + self.deferred,
            active: self.active,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    signal: Condvar,
}

impl Shared {
    // Counters stay consistent across a panic.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the checkpoint thread of one project connection.
pub(crate) struct CheckpointCoordinator {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    poll: Duration,
}

impl CheckpointCoordinator {
    /// Spawn the checkpoint thread for the database at `path`.
    pub(crate) fn start(path: &Path, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared::default());
        let worker = Worker {
            shared: Arc::clone(&shared),
            path: path.to_owned(),
            retry: config.checkpoint_retry(),
        };
        let thread = std::thread::Builder::new()
            .name("cadenza-checkpoint".to_string())
            .spawn(move || worker.run())
            .map_err(|e| crate::error::Error::io("Failed to spawn checkpoint thread", e))?;

        debug!("Started checkpoint thread for {}", path.display());
        Ok(Self {
            shared,
            thread: Some(thread),
            poll: config.close_poll(),
        })
    }

    /// The closure to install as the connection's commit hook.
    ///
    /// It only touches the shared counter, so it is cheap and never does I/O.
    pub(crate) fn commit_hook(&self) -> impl FnMut() -> bool + Send + 'static {
        let shared = Arc::clone(&self.shared);
        move || {
            shared.lock().pending += 1;
            shared.signal.notify_all();
            // false lets the commit proceed
            false
        }
    }

    pub(crate) fn backlog(&self) -> CheckpointBacklog {
        self.shared.lock().backlog()
    }

    /// Wait for outstanding checkpoint work, then stop and join the thread.
    ///
    /// `on_wait` is called every poll interval while work remains, outside
    /// the lock. The commit hook must already be uninstalled.
    pub(crate) fn shutdown(&mut self, mut on_wait: impl FnMut(CheckpointBacklog)) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        let mut state = self.shared.lock();
        while !state.backlog().is_idle() && !thread.is_finished() {
            let backlog = state.backlog();
            drop(state);
            on_wait(backlog);
            state = self.shared.lock();
            state = self
                .shared
                .signal
                .wait_timeout(state, self.poll)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.stop = true;
        drop(state);
        self.shared.signal.notify_all();

        if thread.join().is_err() {
            error!("Checkpoint thread panicked");
        }
        debug!("Stopped checkpoint thread");
    }
}

impl Drop for CheckpointCoordinator {
    fn drop(&mut self) {
        self.shutdown(|_| {});
    }
}

struct Worker {
    shared: Arc<Shared>,
    path: PathBuf,
    retry: Duration,
}

impl Worker {
    fn open(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        configure(&conn, "main", SAFE_PRAGMAS)?;
        Ok(conn)
    }

    fn run(self) {
        let conn = match self.open() {
            Ok(conn) => Some(conn),
            Err(e) => {
                // Keep draining so a close never waits on work nobody will do.
                warn!(
                    "Checkpoint connection to {} failed, checkpoints disabled: {e}",
                    self.path.display()
                );
                None
            }
        };

        let mut state = self.shared.lock();
        let mut follow_up = false;
        loop {
            state = self
                .shared
                .signal
                .wait_while(state, |s| s.pending == 0 && !s.stop)
                .unwrap_or_else(PoisonError::into_inner);
            if state.stop {
                break;
            }

            state.pending = 0;
            state.active = true;
            drop(state);

            let remaining = conn.as_ref().map_or(0, |conn| self.checkpoint(conn));

            state = self.shared.lock();
            state.active = false;
            self.shared.signal.notify_all();

            if conn.is_some() && (remaining > 0 || !follow_up) && state.pending == 0 {
                state.deferred = remaining.max(1);
                state = self
                    .shared
                    .signal
                    .wait_timeout_while(state, self.retry, |s| !s.stop && s.pending == 0)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                // a fresh commit during the delay is handled as hook work
                follow_up = state.pending == 0;
                let deferred = std::mem::take(&mut state.deferred);
                state.pending += deferred;
            } else {
                follow_up = false;
            }
        }
    }

    /// Run one passive checkpoint and return the frames it could not flush.
    fn checkpoint(&self, conn: &Connection) -> u64 {
        let result = conn.query_row("PRAGMA main.wal_checkpoint(PASSIVE)", [], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        });
        match result {
            Ok((_busy, log, checkpointed)) => {
                let remaining = (log - checkpointed).max(0) as u64;
                debug!("Checkpointed {checkpointed} of {log} WAL frames");
                remaining
            }
            Err(e) => {
                warn!("Passive checkpoint of {} failed: {e}", self.path.display());
                0
            }
        }
    }
}
