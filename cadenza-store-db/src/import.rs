// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Importing another project file into the open one.
//!
//! Block ids of two files are unrelated, so every imported block receives a
//! fresh id from the destination's sequence and the imported document is
//! rewritten to match.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use cadenza_doc::{Document, SerializedDoc, decode};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::connection::{DbConnection, path_str};
use crate::error::{Error, Result};
use crate::progress::{Progress, ProgressResult};
use crate::schema;
use crate::types::BlockId;

const INBOUND: &str = "inbound";

/// Result of a successful import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedProject {
    /// The source document with every block reference rewritten
    pub document: Document,
    /// Source block id to the id assigned in this file
    pub block_map: BTreeMap<BlockId, BlockId>,
}

/// SQLite URI opening `path` read-only without taking locks.
fn read_only_uri(path: &Path) -> Result<String> {
    let mut uri = String::from("file:");
    for c in path_str(path)?.chars() {
        match c {
            '%' => uri.push_str("%25"),
            '?' => uri.push_str("%3f"),
            '#' => uri.push_str("%23"),
            c => uri.push(c),
        }
    }
    uri.push_str("?immutable=1&mode=ro");
    Ok(uri)
}

/// Deletes the blocks copied so far unless the import completes.
struct Backout<'a> {
    conn: &'a DbConnection,
    copied: Vec<BlockId>,
}

impl Backout<'_> {
    fn complete(mut self) {
        self.copied.clear();
    }
}

impl Drop for Backout<'_> {
    fn drop(&mut self) {
        if self.copied.is_empty() {
            return;
        }
        debug!("Backing out {} imported blocks", self.copied.len());
        if let Err(e) = self.conn.delete_blocks(&self.copied) {
            warn!("Failed to remove partially imported blocks: {e}");
        }
    }
}

impl DbConnection {
    fn read_inbound_doc(&self, table: &str) -> Result<Option<SerializedDoc>> {
        let doc = self
            .conn
            .query_row(
                &format!("SELECT dict, doc FROM {INBOUND}.{table} WHERE id = 1"),
                [],
                |row| {
                    Ok(SerializedDoc {
                        dict: row.get::<_, Option<Vec<u8>>>(0)?.unwrap_or_default(),
                        body: row.get::<_, Option<Vec<u8>>>(1)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(doc)
    }

    /// Import the project stored at `source`.
    ///
    /// The source is attached read-only and must be one of our files. Its
    /// document (the project slot, or the autosave slot if that is all it
    /// has) is decoded, every referenced block is copied once under a new
    /// id, and the tags are copied. The returned document points at the new
    /// ids; the open project's own documents are not touched.
    ///
    /// On failure or cancellation every block copied so far is deleted.
    pub fn import(&self, source: &Path, progress: &mut dyn Progress) -> Result<ImportedProject> {
        self.ensure_no_transaction("import")?;
        if !source.exists() {
            return Err(Error::DatabaseNotFound(source.to_owned()));
        }

        let inbound = self.attach(&read_only_uri(source)?, INBOUND)?;
        schema::check_application_id(&self.conn, INBOUND, source)?;

        let stored = match self.read_inbound_doc("project")? {
            Some(doc) => doc,
            None => self
                .read_inbound_doc("autosave")?
                .ok_or(Error::NoProjectDocument)?,
        };
        let mut document = decode(&stored)?;

        // duplicate references share one copy
        let mut seen = HashSet::new();
        let unique: Vec<BlockId> = document
            .block_ids()
            .into_iter()
            .map(BlockId)
            .filter(|id| seen.insert(*id))
            .collect();

        let mut block_map = BTreeMap::new();

        let mut backout = Backout {
            conn: self,
            copied: Vec::with_capacity(unique.len()),
        };
        {
            let mut copy = self.conn.prepare(
                r#"
                INSERT INTO main.sampleblocks (sampleformat, summin, summax, sumrms,
                                               summary256, summary64k, samples)
                SELECT sampleformat, summin, summax, sumrms, summary256, summary64k, samples
                FROM inbound.sampleblocks
                WHERE blockid = ?1
                "#,
            )?;
            let total = unique.len() as u64;
            for (done, &old) in unique.iter().enumerate() {
                if progress.update(done as u64, total) == ProgressResult::Cancel {
                    return Err(Error::Cancelled);
                }
                if copy.execute(params![old])? == 0 {
                    return Err(Error::MissingBlock(old));
                }
                let new = BlockId(self.conn.last_insert_rowid());
                backout.copied.push(new);
                block_map.insert(old, new);
            }
            progress.update(total, total);
        }

        document.visit_block_refs_mut(|id| {
            let old = BlockId(*id);
            let new = block_map.get(&old).ok_or(Error::MissingBlock(old))?;
            *id = new.0;
            Ok::<_, Error>(())
        })?;

        self.conn
            .execute("INSERT INTO main.tags SELECT * FROM inbound.tags", [])?;
        inbound.detach()?;
        backout.complete();

        info!(
            "Imported {} blocks from {}",
            block_map.len(),
            source.display()
        );
        Ok(ImportedProject {
            document,
            block_map,
        })
    }
}
