// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Whole-file copies: save as, save a copy, and compaction.
//!
//! Every copy goes through [`DbConnection::copy_to`], which attaches the
//! destination to the current connection and moves rows with SQL inside one
//! transaction. A destination is deleted on any failure, and the source file
//! is never modified.

use std::collections::{BTreeSet, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use cadenza_doc::SerializedDoc;
use rusqlite::params;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::connection::{ConnectionSlot, DbConnection, FAST_PRAGMAS, OpenMode, configure, path_str};
use crate::document::{DocSlot, upsert_sql};
use crate::error::{Error, IoContext, Result};
use crate::progress::{Progress, ProgressResult};
use crate::schema;
use crate::types::{BlockId, StorageTotals};

const OUTBOUND: &str = "outbound";

/// `path` with `suffix` appended to its file name.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove a database file and its journal side files. Missing files are fine.
pub(crate) fn remove_db_files(path: &Path) -> Result<()> {
    let mut first_err = None;
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let file = with_suffix(path, suffix);
        match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {e}", file.display());
                first_err.get_or_insert(Error::io(
                    format!("Failed to remove '{}'", file.display()),
                    e,
                ));
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Deletes a partially written file unless disarmed.
struct PartialFile<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Removing incomplete copy {}", self.path.display());
            if let Err(e) = remove_db_files(self.path) {
                debug!("Incomplete copy {} was not fully removed: {e}", self.path.display());
            }
        }
    }
}

/// How much of a file's block storage the live document still uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockUsage {
    /// Everything stored
    pub totals: StorageTotals,
    /// Live blocks that are actually stored
    pub live_blocks: u64,
    /// Bytes occupied by those live blocks
    pub live_bytes: u64,
}

impl BlockUsage {
    /// Whether the file stores blocks the document no longer references.
    pub fn had_unused(&self) -> bool {
        self.totals.blocks > self.live_blocks
    }

    /// Percentage of stored bytes that are live, if anything is stored.
    pub fn used_percent(&self) -> Option<u64> {
        (self.totals.bytes > 0).then(|| self.live_bytes * 100 / self.totals.bytes)
    }

    /// Whether compaction is worth it: something is stored and the live
    /// share does not exceed `threshold_percent`.
    pub fn should_vacuum(&self, threshold_percent: u8) -> bool {
        self.used_percent()
            .is_some_and(|used| used <= u64::from(threshold_percent))
    }
}

impl DbConnection {
    /// Measure how much stored block data `live` accounts for.
    pub fn block_usage(&self, live: &HashSet<BlockId>) -> Result<BlockUsage> {
        let totals = self.storage_totals()?;
        let mut usage = BlockUsage {
            totals,
            ..Default::default()
        };
        for &id in live {
            if let Some(size) = self.block_space_usage(id)? {
                usage.live_blocks += 1;
                usage.live_bytes += size;
            }
        }
        Ok(usage)
    }

    /// Copy this project into a new file at `dest` and open it.
    ///
    /// The tags table is copied verbatim. With `live` set, only those blocks
    /// are copied (pruning); otherwise every block is. `doc` becomes the
    /// project document of the copy. Block ids and the id sequence carry
    /// over unchanged. `progress` is polled before each block; cancelling
    /// fails with [`Error::Cancelled`].
    ///
    /// The destination must not exist. It is removed again on any failure.
    pub fn copy_to(
        &self,
        dest: &Path,
        doc: &SerializedDoc,
        live: Option<&HashSet<BlockId>>,
        config: &StoreConfig,
        progress: &mut dyn Progress,
    ) -> Result<DbConnection> {
        self.ensure_no_transaction("copy")?;
        if dest.exists() {
            return Err(Error::DestinationExists(dest.to_owned()));
        }
        let target = path_str(dest)?;

        let ids: Vec<BlockId> = match live {
            Some(live) => live.iter().copied().collect::<BTreeSet<_>>().into_iter().collect(),
            None => self.block_ids()?,
        };

        // declared first so the detach below runs before the file is removed
        let partial = PartialFile::new(dest);
        let outbound = self.attach(target, OUTBOUND)?;
        configure(&self.conn, OUTBOUND, FAST_PRAGMAS)?;
        schema::install(&self.conn, OUTBOUND)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("INSERT INTO outbound.tags SELECT * FROM main.tags", [])?;
        {
            let mut copy = tx.prepare(
                "INSERT INTO outbound.sampleblocks SELECT * FROM main.sampleblocks WHERE blockid = ?1",
            )?;
            let total = ids.len() as u64;
            for (done, id) in ids.iter().enumerate() {
                if progress.update(done as u64, total) == ProgressResult::Cancel {
                    return Err(Error::Cancelled);
                }
                if copy.execute(params![id])? == 0 {
                    warn!("Live block {id} is not stored in {}", self.path().display());
                }
            }
            progress.update(total, total);
        }
        tx.execute_batch(
            r#"
            DELETE FROM outbound.sqlite_sequence WHERE name = 'sampleblocks';
            INSERT INTO outbound.sqlite_sequence (name, seq)
                SELECT name, seq FROM main.sqlite_sequence WHERE name = 'sampleblocks';
            "#,
        )?;
        tx.execute(
            &upsert_sql(OUTBOUND, DocSlot::Project),
            params![doc.dict, doc.body],
        )?;
        tx.commit()?;
        outbound.detach()?;

        let copy = DbConnection::open(dest, OpenMode::Existing, config)?;
        partial.keep();
        debug!(
            "Copied {} blocks from {} to {}",
            ids.len(),
            self.path().display(),
            dest.display()
        );
        Ok(copy)
    }

    /// Write `doc` as the project document and drop the autosave, atomically.
    pub(crate) fn save_in_place(&self, doc: &SerializedDoc) -> Result<()> {
        self.transaction_start("save_in_place")?;
        let written = self
            .write_doc(DocSlot::Project, doc)
            .and_then(|()| self.delete_autosave());
        match written {
            Ok(()) => self.transaction_commit("save_in_place"),
            Err(e) => {
                if let Err(rollback) = self.transaction_rollback("save_in_place") {
                    warn!("Rollback of in-place save failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}

/// Make `dest` the active file, keeping every block.
///
/// The current file is never modified. The original connection stays parked
/// until the copy has been confirmed usable; on failure it is reinstated and
/// the copy removed.
pub(crate) fn save_as(
    slot: &mut ConnectionSlot,
    dest: &Path,
    doc: &SerializedDoc,
    config: &StoreConfig,
    progress: &mut dyn Progress,
) -> Result<()> {
    let copy = slot.current()?.copy_to(dest, doc, None, config, progress)?;
    adopt_copy(slot, copy, dest)?;
    info!("Saved project as {}", dest.display());
    Ok(())
}

/// Switch the slot to the fresh copy at `dest` once it has a project
/// document. Otherwise the original is reinstated and the copy removed.
fn adopt_copy(slot: &mut ConnectionSlot, copy: DbConnection, dest: &Path) -> Result<()> {
    let switched = slot.swap(|slot| {
        slot.use_existing(copy)?;
        if !slot.current()?.has_doc(DocSlot::Project)? {
            return Err(Error::integrity(format!(
                "copy at '{}' has no project document",
                dest.display()
            )));
        }
        Ok(())
    });
    if let Err(e) = switched {
        if let Err(cleanup) = remove_db_files(dest) {
            debug!("Abandoned copy {} was not fully removed: {cleanup}", dest.display());
        }
        return Err(e);
    }
    Ok(())
}

/// Write a pruned copy to `dest` without switching to it.
pub(crate) fn save_copy(
    conn: &DbConnection,
    dest: &Path,
    doc: &SerializedDoc,
    live: &HashSet<BlockId>,
    config: &StoreConfig,
    progress: &mut dyn Progress,
) -> Result<()> {
    let copy = conn.copy_to(dest, doc, Some(live), config, progress)?;
    copy.close()?;
    info!("Saved a copy to {}", dest.display());
    Ok(())
}

/// Rewrite the active file keeping only `live` blocks.
///
/// The file is renamed aside, a pruned copy is written under the original
/// name from it, and only then is the renamed file deleted. Any failure puts
/// the renamed file back and reopens it.
pub(crate) fn vacuum(
    slot: &mut ConnectionSlot,
    doc: &SerializedDoc,
    live: &HashSet<BlockId>,
    config: &StoreConfig,
    progress: &mut dyn Progress,
) -> Result<()> {
    let conn = slot.current()?;
    conn.ensure_no_transaction("vacuum")?;
    let original = conn.path().to_owned();
    let aside = with_suffix(&original, "_vacuum");
    if aside.exists() {
        return Err(Error::DestinationExists(aside));
    }

    if let Err(e) = slot.close(|_| {}) {
        reopen(slot, &original, config);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&original, &aside)
        .io_context(|| format!("Failed to rename '{}' for compaction", original.display()))
    {
        reopen(slot, &original, config);
        return Err(e);
    }

    let compacted = DbConnection::open(&aside, OpenMode::Existing, config).and_then(|source| {
        let copied = source.copy_to(&original, doc, Some(live), config, progress);
        if let Err(e) = source.close() {
            warn!("Failed to close {}: {e}", aside.display());
        }
        copied
    });

    match compacted {
        Ok(copy) => {
            slot.use_existing(copy)?;
            if let Err(e) = remove_db_files(&aside) {
                warn!("Compacted {}, but the old file remains: {e}", original.display());
            }
            info!("Compacted {} to {} blocks", original.display(), live.len());
            Ok(())
        }
        Err(e) => {
            match std::fs::rename(&aside, &original) {
                Ok(()) => reopen(slot, &original, config),
                Err(rename) => error!(
                    "Failed to restore '{}' from '{}': {rename}",
                    original.display(),
                    aside.display()
                ),
            }
            Err(e)
        }
    }
}

fn reopen(slot: &mut ConnectionSlot, path: &Path, config: &StoreConfig) {
    if let Err(e) = slot.open(path, OpenMode::Existing, config) {
        error!("Failed to reopen {}: {e}", path.display());
    }
}
