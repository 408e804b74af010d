// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use cadenza_doc::{Document, decode};
use cadenza_store_db::{
    BlockId, DbConnection, DocSlot, OpenMode, ProgressResult, ProjectModel, ProjectStore,
    StoreConfig,
};
use log::{debug, info};

use crate::error::{CliError, Result};

fn progress(label: &'static str) -> impl FnMut(u64, u64) -> ProgressResult {
    move |done, total| {
        debug!("{label}: {done}/{total} blocks");
        ProgressResult::Continue
    }
}

fn stored_document(conn: &DbConnection, slot: DocSlot) -> Result<Option<Document>> {
    match conn.read_doc(slot)? {
        Some(doc) => Ok(Some(decode(&doc)?)),
        None => Ok(None),
    }
}

/// Blocks referenced by either document slot.
fn referenced_blocks(conn: &DbConnection) -> Result<HashSet<BlockId>> {
    let mut live = HashSet::new();
    for slot in [DocSlot::Project, DocSlot::Autosave] {
        if let Some(doc) = stored_document(conn, slot)? {
            live.extend(doc.live_block_ids());
        }
    }
    Ok(live)
}

/// The last saved document. Files with pending autosave data are refused,
/// since rewriting them would lose those changes.
fn saved_document(conn: &DbConnection) -> Result<Document> {
    if conn.has_doc(DocSlot::Autosave)? {
        return Err(CliError::Unsaved(conn.path().to_owned()));
    }
    stored_document(conn, DocSlot::Project)?
        .ok_or(CliError::Store(cadenza_store_db::Error::NoProjectDocument))
}

/// Summary of a project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub blocks: u64,
    pub bytes: u64,
    pub live_blocks: u64,
    pub live_bytes: u64,
    pub orphans: usize,
    pub has_project: bool,
    pub has_autosave: bool,
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        writeln!(f, "saved document: {}", yes_no(self.has_project))?;
        writeln!(f, "autosave:       {}", yes_no(self.has_autosave))?;
        writeln!(f, "blocks:         {} ({} bytes)", self.blocks, self.bytes)?;
        writeln!(
            f,
            "live blocks:    {} ({} bytes)",
            self.live_blocks, self.live_bytes
        )?;
        write!(f, "orphans:        {}", self.orphans)
    }
}

pub fn info(path: &Path, config: &StoreConfig) -> Result<Info> {
    let conn = DbConnection::open(path, OpenMode::Existing, config)?;
    let live = referenced_blocks(&conn)?;
    let usage = conn.block_usage(&live)?;
    let info = Info {
        blocks: usage.totals.blocks,
        bytes: usage.totals.bytes,
        live_blocks: usage.live_blocks,
        live_bytes: usage.live_bytes,
        orphans: conn.find_orphans(&live)?.len(),
        has_project: conn.has_doc(DocSlot::Project)?,
        has_autosave: conn.has_doc(DocSlot::Autosave)?,
    };
    conn.close()?;
    Ok(info)
}

/// Blocks neither document references, deleted when `delete` is set.
pub fn orphans(path: &Path, delete: bool, config: &StoreConfig) -> Result<BTreeSet<BlockId>> {
    let conn = DbConnection::open(path, OpenMode::Existing, config)?;
    let live = referenced_blocks(&conn)?;
    let orphans = conn.find_orphans(&live)?;
    if delete && !orphans.is_empty() {
        conn.delete_orphans(&live)?;
    }
    conn.close()?;
    Ok(orphans)
}

/// Compact the file if enough of it is unused. Returns whether it was
/// rewritten.
pub fn compact(path: &Path, config: &StoreConfig) -> Result<bool> {
    let mut store = ProjectStore::open(path, OpenMode::Existing, config.clone())?;
    let doc = saved_document(store.connection()?)?;
    let compacted = store.vacuum(&doc, &mut progress("compact"))?;
    store.close()?;
    Ok(compacted)
}

/// Write a pruned copy of the last save of `src` to `dest`.
pub fn copy(src: &Path, dest: &Path, config: &StoreConfig) -> Result<()> {
    let mut store = ProjectStore::open(src, OpenMode::Existing, config.clone())?;
    let doc = saved_document(store.connection()?)?;
    store.save_copy(dest, &doc, &mut progress("copy"))?;
    store.close()?;
    Ok(())
}

/// Append the top-level elements of `src`'s project to `dest` and save it.
/// Returns the number of blocks imported.
pub fn import(dest: &Path, src: &Path, config: &StoreConfig) -> Result<usize> {
    let mut store = ProjectStore::open(dest, OpenMode::Existing, config.clone())?;
    let mut doc = saved_document(store.connection()?)?;
    let imported = store.import(src, &mut progress("import"))?;
    let count = imported.block_map.len();

    doc.root.children.extend(imported.document.root.children);
    store.save(dest, &doc, &mut progress("save"))?;
    store.close()?;
    info!("Merged {} into {}", src.display(), dest.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use cadenza_doc::{BLOCK_ID_ATTR, Element};
    use cadenza_store_db::{BlockSummary, NoProgress, SampleFormat};
    use tempfile::TempDir;

    use super::*;

    fn config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            temp_dir: dir.path().join("tmp"),
            checkpoint_retry_ms: 10,
            close_poll_ms: 5,
            ..StoreConfig::default()
        }
    }

    fn track(ids: &[BlockId]) -> Element {
        ids.iter().fold(Element::new("wavetrack"), |track, id| {
            track.with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, id.0))
        })
    }

    /// A saved project with `count` blocks of which the first `live` are
    /// referenced.
    fn saved(dir: &TempDir, name: &str, count: usize, live: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut store = ProjectStore::open(&path, OpenMode::Create, config(dir)).unwrap();
        let conn = store.connection().unwrap();
        let samples = vec![0.25f32; 512];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let ids: Vec<_> = (0..count)
            .map(|_| {
                conn.append_block(
                    SampleFormat::Float,
                    &bytes,
                    &BlockSummary::from_samples(&samples),
                )
                .unwrap()
            })
            .collect();
        let doc = Document::new(Element::new("project").with_child(track(&ids[..live])));
        store.save(&path, &doc, &mut NoProgress).unwrap();
        store.close().unwrap();
        path
    }

    #[test]
    fn test_info_and_orphans() {
        let dir = TempDir::new().unwrap();
        let path = saved(&dir, "a.cdz", 5, 3);

        let report = info(&path, &config(&dir)).unwrap();
        assert_eq!(report.blocks, 5);
        assert_eq!(report.live_blocks, 3);
        assert_eq!(report.orphans, 2);
        assert!(report.has_project);
        assert!(!report.has_autosave);
        assert!(report.to_string().contains("orphans:        2"));

        let listed = orphans(&path, false, &config(&dir)).unwrap();
        assert_eq!(listed, BTreeSet::from([BlockId(4), BlockId(5)]));
        assert_eq!(orphans(&path, true, &config(&dir)).unwrap(), listed);
        assert!(orphans(&path, false, &config(&dir)).unwrap().is_empty());
    }

    #[test]
    fn test_compact_refuses_autosaved_changes() {
        let dir = TempDir::new().unwrap();
        let path = saved(&dir, "a.cdz", 4, 1);
        let mut store = ProjectStore::open(&path, OpenMode::Existing, config(&dir)).unwrap();
        store
            .auto_save(&Document::new(Element::new("project")))
            .unwrap();
        store.close().unwrap();

        let err = compact(&path, &config(&dir)).unwrap_err();
        assert!(matches!(err, CliError::Unsaved(_)), "{err}");
    }

    #[test]
    fn test_compact_then_copy() {
        let dir = TempDir::new().unwrap();
        let path = saved(&dir, "a.cdz", 10, 2);

        assert!(compact(&path, &config(&dir)).unwrap());
        assert_eq!(info(&path, &config(&dir)).unwrap().blocks, 2);

        let dest = dir.path().join("b.cdz");
        copy(&path, &dest, &config(&dir)).unwrap();
        let copied = info(&dest, &config(&dir)).unwrap();
        assert_eq!(copied.blocks, 2);
        assert_eq!(copied.orphans, 0);
    }

    #[test]
    fn test_import_merges_tracks() {
        let dir = TempDir::new().unwrap();
        let dest = saved(&dir, "dest.cdz", 2, 2);
        let src = saved(&dir, "src.cdz", 3, 3);

        assert_eq!(import(&dest, &src, &config(&dir)).unwrap(), 3);

        let report = info(&dest, &config(&dir)).unwrap();
        assert_eq!(report.blocks, 5);
        assert_eq!(report.live_blocks, 5);
        assert_eq!(report.orphans, 0);
    }
}
