// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! The storage engine of one open project.

use std::path::{Path, PathBuf};

use cadenza_doc::{Document, decode};
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointBacklog;
use crate::config::StoreConfig;
use crate::connection::{ConnectionSlot, DbConnection, OpenMode};
use crate::document::DocSlot;
use crate::error::{Error, IoContext, Result};
use crate::import::ImportedProject;
use crate::model::ProjectModel;
use crate::progress::Progress;
use crate::snapshot::{self, remove_db_files};
use crate::transaction::AutoCommitTransaction;

/// Storage for one open project, owned by the project session.
///
/// Wraps the active connection and tracks the session state the save and
/// shutdown paths depend on.
#[derive(Debug)]
pub struct ProjectStore {
    config: StoreConfig,
    slot: ConnectionSlot,
    modified: bool,
    recovered: bool,
    temporary: bool,
    vacuumed: bool,
    had_unused: bool,
}

struct Loaded {
    document: Document,
    from_autosave: bool,
    orphans: usize,
    temporary: bool,
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

impl ProjectStore {
    /// A store with no file open.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            slot: ConnectionSlot::new(),
            modified: false,
            recovered: false,
            temporary: false,
            vacuumed: false,
            had_unused: false,
        }
    }

    /// Open (or create) a project file without loading its document.
    ///
    /// A file that has never been saved to counts as temporary.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, config: StoreConfig) -> Result<Self> {
        let mut store = Self::new(config);
        store.slot.open(path.as_ref(), mode, &store.config)?;
        store.temporary = !store.connection()?.has_doc(DocSlot::Project)?;
        Ok(store)
    }

    /// Start a new, never-saved project in a uniquely named file under the
    /// configured temporary directory.
    pub fn create_temporary(config: StoreConfig) -> Result<Self> {
        let dir = &config.temp_dir;
        std::fs::create_dir_all(dir)
            .io_context(|| format!("Failed to create temporary directory '{}'", dir.display()))?;
        let (_file, path) = tempfile::Builder::new()
            .prefix("project-")
            .suffix(".cdz")
            .tempfile_in(dir)
            .io_context(|| format!("Failed to create temporary project in '{}'", dir.display()))?
            .keep()
            .map_err(|e| Error::io("Failed to keep temporary project file", e.error))?;

        let mut store = Self::new(config);
        if let Err(e) = store.slot.open(&path, OpenMode::Existing, &store.config) {
            let _ = remove_db_files(&path);
            return Err(e);
        }
        store.temporary = true;
        debug!("Created temporary project {}", path.display());
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.slot.is_open()
    }

    /// The active connection.
    pub fn connection(&self) -> Result<&DbConnection> {
        self.slot.current()
    }

    /// Path of the active file.
    pub fn path(&self) -> Option<&Path> {
        self.slot.path()
    }

    /// Unsaved changes exist (an autosave was written since the last save).
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// The session came from an autosave or lost orphaned blocks.
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    /// The project has never been saved to a file of its own.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// The last [`ProjectStore::vacuum`] rewrote the file.
    pub fn was_vacuumed(&self) -> bool {
        self.vacuumed
    }

    /// The last vacuum check found blocks the document no longer uses.
    pub fn had_unused(&self) -> bool {
        self.had_unused
    }

    /// Whether deleting blocks one by one at shutdown can be skipped.
    ///
    /// Only a permanent project that was not compacted but still holds
    /// unused blocks needs those deletions.
    pub fn should_bypass(&self) -> bool {
        self.temporary || self.vacuumed || !self.had_unused
    }

    fn in_temp_dir(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        match (
            std::fs::canonicalize(parent),
            std::fs::canonicalize(&self.config.temp_dir),
        ) {
            (Ok(parent), Ok(temp)) => parent == temp,
            _ => false,
        }
    }

    /// Switch to the project at `path` and return its document.
    ///
    /// The autosave document wins over the project document when both exist.
    /// Blocks the loaded document does not reference are deleted. If anything
    /// fails the previously open file stays active.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        let config = &self.config;
        let step = |slot: &mut ConnectionSlot| -> Result<Loaded> {
            slot.open(path, OpenMode::Existing, config)?;
            let conn = slot.current()?;
            let (stored, from_autosave) = match conn.read_doc(DocSlot::Autosave)? {
                Some(doc) => (doc, true),
                None => (
                    conn.read_doc(DocSlot::Project)?
                        .ok_or(Error::NoProjectDocument)?,
                    false,
                ),
            };
            let document = decode(&stored)?;
            let orphans = conn.delete_orphans(&document.live_block_ids())?;
            let temporary = !conn.has_doc(DocSlot::Project)?;
            Ok(Loaded {
                document,
                from_autosave,
                orphans,
                temporary,
            })
        };

        let loaded = if self.slot.is_open() {
            self.slot.swap(step)?
        } else {
            step(&mut self.slot).inspect_err(|_| {
                if let Err(e) = self.slot.close(|_| {}) {
                    warn!("Failed to close {} after failed load: {e}", path.display());
                }
            })?
        };

        self.modified = loaded.from_autosave;
        self.recovered = loaded.from_autosave || loaded.orphans > 0;
        self.temporary = loaded.temporary;
        self.vacuumed = false;
        self.had_unused = false;
        info!(
            "Loaded {}{}",
            path.display(),
            if loaded.from_autosave {
                " from autosave"
            } else {
                ""
            }
        );
        Ok(loaded.document)
    }

    /// Close the active file, waiting for checkpoints to drain.
    pub fn close(&mut self) -> Result<()> {
        self.close_with(|_| {})
    }

    /// Close the active file. `on_wait` is polled while checkpoint work is
    /// still outstanding. A temporary project's file is deleted.
    pub fn close_with(&mut self, on_wait: impl FnMut(CheckpointBacklog)) -> Result<()> {
        let path = self.slot.path().map(Path::to_path_buf);
        self.slot.close(on_wait)?;

        if let Some(path) = path
            && self.temporary
            && self.in_temp_dir(&path)
        {
            debug!("Removing temporary project {}", path.display());
            remove_db_files(&path)?;
        }
        self.modified = false;
        self.recovered = false;
        self.temporary = false;
        self.vacuumed = false;
        self.had_unused = false;
        Ok(())
    }

    /// Store the current state in the autosave slot.
    pub fn auto_save(&mut self, model: &dyn ProjectModel) -> Result<()> {
        let doc = model.serialize()?;
        self.connection()?.write_doc(DocSlot::Autosave, &doc)?;
        self.modified = true;
        Ok(())
    }

    /// Drop the autosave document.
    pub fn auto_save_delete(&mut self) -> Result<()> {
        self.connection()?.delete_autosave()?;
        self.modified = false;
        Ok(())
    }

    /// Save the project to `path`.
    ///
    /// Saving to the open file rewrites the project document in place and
    /// drops the autosave. Saving elsewhere copies every block (undo history
    /// may still need them) and switches to the copy. The original stays
    /// active and untouched if that fails; a temporary original is deleted
    /// once the switch succeeds.
    pub fn save(
        &mut self,
        path: impl AsRef<Path>,
        model: &dyn ProjectModel,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let path = path.as_ref();
        let doc = model.serialize()?;
        let current: PathBuf = self.slot.path().ok_or(Error::NotOpen)?.to_owned();

        if same_file(&current, path) {
            self.connection()?.save_in_place(&doc)?;
            debug!("Saved {} in place", path.display());
        } else {
            snapshot::save_as(&mut self.slot, path, &doc, &self.config, progress)?;
            if self.temporary && self.in_temp_dir(&current) {
                if let Err(e) = remove_db_files(&current) {
                    warn!("Failed to remove temporary project: {e}");
                }
            }
        }

        self.modified = false;
        self.recovered = false;
        self.temporary = false;
        Ok(())
    }

    /// Write a compacted copy of the project to `path`, staying on the open
    /// file.
    pub fn save_copy(
        &self,
        path: impl AsRef<Path>,
        model: &dyn ProjectModel,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let doc = model.serialize()?;
        snapshot::save_copy(
            self.connection()?,
            path.as_ref(),
            &doc,
            &model.live_block_ids(),
            &self.config,
            progress,
        )
    }

    /// Whether compaction would reclaim enough space. Also records whether
    /// any unused blocks exist (see [`ProjectStore::had_unused`]).
    pub fn should_vacuum(&mut self, model: &dyn ProjectModel) -> Result<bool> {
        let usage = self.connection()?.block_usage(&model.live_block_ids())?;
        self.had_unused = usage.had_unused();
        let should = usage.should_vacuum(self.config.vacuum_threshold_percent);
        debug!(
            "Live blocks use {:?}% of stored bytes, vacuum: {should}",
            usage.used_percent()
        );
        Ok(should)
    }

    /// Compact the file down to the blocks `model` references.
    ///
    /// Skipped for temporary projects and when [`ProjectStore::should_vacuum`]
    /// says it is not worth it. When it runs, the model is written as the
    /// project document of the compacted file, so it also counts as a save.
    /// Returns whether the file was rewritten.
    pub fn vacuum(&mut self, model: &dyn ProjectModel, progress: &mut dyn Progress) -> Result<bool> {
        self.vacuumed = false;
        if self.temporary {
            debug!("Not compacting a temporary project");
            return Ok(false);
        }
        if !self.should_vacuum(model)? {
            return Ok(false);
        }

        let doc = model.serialize()?;
        snapshot::vacuum(
            &mut self.slot,
            &doc,
            &model.live_block_ids(),
            &self.config,
            progress,
        )?;
        self.vacuumed = true;
        self.modified = false;
        Ok(true)
    }

    /// Copy the project at `source` into this file. See
    /// [`DbConnection::import`].
    ///
    /// The imported blocks are unreferenced until the returned document is
    /// merged into the model and saved or autosaved.
    pub fn import(
        &mut self,
        source: impl AsRef<Path>,
        progress: &mut dyn Progress,
    ) -> Result<ImportedProject> {
        self.connection()?.import(source.as_ref(), progress)
    }

    /// Delete stored blocks `model` does not reference. Marks the session
    /// recovered when anything was deleted.
    pub fn check_for_orphans(&mut self, model: &dyn ProjectModel) -> Result<usize> {
        let deleted = self
            .connection()?
            .delete_orphans(&model.live_block_ids())?;
        if deleted > 0 {
            self.recovered = true;
        }
        Ok(deleted)
    }

    /// Open a savepoint that commits when dropped.
    pub fn transaction(&self, name: &str) -> Result<AutoCommitTransaction<'_>> {
        AutoCommitTransaction::new(self.connection()?, name)
    }
}

impl Drop for ProjectStore {
    fn drop(&mut self) {
        if self.slot.is_open()
            && let Err(e) = self.close()
        {
            warn!("Failed to close project: {e}");
        }
    }
}
