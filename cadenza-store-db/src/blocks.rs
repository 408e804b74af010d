// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Sample block storage and orphan collection.
//!
//! Blocks are write-once: a row is inserted, read any number of times, and
//! eventually deleted. Nothing updates a block in place.

use std::collections::{BTreeSet, HashSet};

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::connection::DbConnection;
use crate::error::Result;
use crate::summary::BlockSummary;
use crate::types::{BlockId, SampleBlock, SampleFormat, StorageTotals};

const INSET: &str = "inset";

/// `inset(blockid)` registered on a connection for one statement, testing
/// membership in a live set. Unregistered on drop.
struct LiveSetFunction<'a> {
    conn: &'a Connection,
}

impl<'a> LiveSetFunction<'a> {
    fn register(conn: &'a Connection, live: &HashSet<BlockId>) -> Result<Self> {
        let ids: HashSet<i64> = live.iter().map(|id| id.0).collect();
        conn.create_scalar_function(
            INSET,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            move |ctx| {
                let id: i64 = ctx.get(0)?;
                Ok(ids.contains(&id))
            },
        )?;
        Ok(Self { conn })
    }
}

impl Drop for LiveSetFunction<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.remove_function(INSET, 1) {
            warn!("Failed to unregister {INSET}(): {e}");
        }
    }
}

impl DbConnection {
    /// Store a new block and return its id.
    pub fn append_block(
        &self,
        format: SampleFormat,
        samples: &[u8],
        summary: &BlockSummary,
    ) -> Result<BlockId> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            INSERT INTO sampleblocks (sampleformat, summin, summax, sumrms,
                                      summary256, summary64k, samples)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )?;
        stmt.execute(params![
            format,
            f64::from(summary.min),
            f64::from(summary.max),
            f64::from(summary.rms),
            summary.summary_256,
            summary.summary_64k,
            samples,
        ])?;
        Ok(BlockId(self.conn.last_insert_rowid()))
    }

    /// Read a block by id.
    ///
    /// Returns `None` if no such block is stored.
    pub fn block(&self, id: BlockId) -> Result<Option<SampleBlock>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT blockid, sampleformat, summin, summax, sumrms,
                   summary256, summary64k, samples
            FROM sampleblocks
            WHERE blockid = ?1
            "#,
        )?;
        let block = stmt
            .query_row(params![id], |row| {
                Ok(SampleBlock {
                    id: row.get(0)?,
                    format: row.get(1)?,
                    summary: BlockSummary {
                        min: row.get::<_, f64>(2)? as f32,
                        max: row.get::<_, f64>(3)? as f32,
                        rms: row.get::<_, f64>(4)? as f32,
                        summary_256: row.get::<_, Option<Vec<u8>>>(5)?.unwrap_or_default(),
                        summary_64k: row.get::<_, Option<Vec<u8>>>(6)?.unwrap_or_default(),
                    },
                    samples: row.get::<_, Option<Vec<u8>>>(7)?.unwrap_or_default(),
                })
            })
            .optional()?;
        Ok(block)
    }

    /// All stored block ids in ascending order.
    pub fn block_ids(&self) -> Result<Vec<BlockId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT blockid FROM sampleblocks ORDER BY blockid")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(ids)
    }

    pub fn block_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sampleblocks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Bytes a block occupies (payload plus summaries), if it exists.
    pub fn block_space_usage(&self, id: BlockId) -> Result<Option<u64>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT COALESCE(length(summary256), 0)
                 + COALESCE(length(summary64k), 0)
                 + COALESCE(length(samples), 0)
            FROM sampleblocks
            WHERE blockid = ?1
            "#,
        )?;
        let size: Option<i64> = stmt.query_row(params![id], |row| row.get(0)).optional()?;
        Ok(size.map(|s| s as u64))
    }

    /// Number of blocks and the bytes they occupy.
    pub fn storage_totals(&self) -> Result<StorageTotals> {
        let (blocks, bytes): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(length(summary256)), 0)
                 + COALESCE(SUM(length(summary64k)), 0)
                 + COALESCE(SUM(length(samples)), 0)
            FROM sampleblocks
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(StorageTotals {
            blocks: blocks as u64,
            bytes: bytes as u64,
        })
    }

    /// Delete one block. Returns whether it existed.
    pub fn delete_block(&self, id: BlockId) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM sampleblocks WHERE blockid = ?1")?;
        Ok(stmt.execute(params![id])? > 0)
    }

    /// Delete several blocks atomically. Returns how many existed.
    pub fn delete_blocks(&self, ids: &[BlockId]) -> Result<usize> {
        self.transaction_start("delete_blocks")?;
        let deleted = ids.iter().try_fold(0, |n, &id| {
            self.delete_block(id).map(|found| n + usize::from(found))
        });
        match deleted {
            Ok(n) => {
                self.transaction_commit("delete_blocks")?;
                debug!("Deleted {n} sample blocks");
                Ok(n)
            }
            Err(e) => {
                if let Err(rollback) = self.transaction_rollback("delete_blocks") {
                    warn!("Rollback after failed block deletion failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    /// Stored blocks whose ids are not in `live`.
    ///
    /// One pass over the block table; membership is tested inside the engine.
    pub fn find_orphans(&self, live: &HashSet<BlockId>) -> Result<BTreeSet<BlockId>> {
        let _inset = LiveSetFunction::register(&self.conn, live)?;
        let mut stmt = self
            .conn
            .prepare("SELECT blockid FROM sampleblocks WHERE NOT inset(blockid)")?;
        let orphans = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(orphans)
    }

    /// Delete every stored block whose id is not in `live`, in one statement.
    /// Returns the number of rows removed.
    pub fn delete_orphans(&self, live: &HashSet<BlockId>) -> Result<usize> {
        let _inset = LiveSetFunction::register(&self.conn, live)?;
        let deleted = self
            .conn
            .execute("DELETE FROM sampleblocks WHERE NOT inset(blockid)", [])?;
        if deleted > 0 {
            info!(
                "Deleted {deleted} orphaned sample blocks from {}",
                self.path().display()
            );
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::StoreConfig;
    use crate::connection::OpenMode;

    fn open(dir: &TempDir) -> DbConnection {
        DbConnection::open(
            dir.path().join("blocks.cdz"),
            OpenMode::Create,
            &StoreConfig::default(),
        )
        .unwrap()
    }

    fn append(conn: &DbConnection, samples: &[f32]) -> BlockId {
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        conn.append_block(
            SampleFormat::Float,
            &payload,
            &BlockSummary::from_samples(samples),
        )
        .unwrap()
    }

    #[test]
    fn test_block_roundtrip() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let samples = [0.25f32, -0.75, 0.5];
        let id = append(&conn, &samples);

        let block = conn.block(id).unwrap().unwrap();
        assert_eq!(block.id, id);
        assert_eq!(block.format, SampleFormat::Float);
        assert_eq!(block.summary, BlockSummary::from_samples(&samples));
        assert_eq!(block.samples.len(), 12);
        assert_eq!(conn.block_space_usage(id).unwrap(), Some(block.space_usage()));
        assert!(conn.block(BlockId(id.0 + 1)).unwrap().is_none());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let a = append(&conn, &[0.1]);
        let b = append(&conn, &[0.2]);
        assert!(conn.delete_block(b).unwrap());
        assert!(!conn.delete_block(b).unwrap());

        let c = append(&conn, &[0.3]);
        assert!(c > b, "{c} must be above deleted {b}");
        assert_eq!(conn.block_ids().unwrap(), vec![a, c]);
    }

    #[test]
    fn test_orphans() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let ids: Vec<_> = (0..5).map(|i| append(&conn, &[i as f32])).collect();
        let live: HashSet<_> = [ids[1], ids[3]].into_iter().collect();

        let orphans = conn.find_orphans(&live).unwrap();
        assert_eq!(orphans, BTreeSet::from([ids[0], ids[2], ids[4]]));

        assert_eq!(conn.delete_orphans(&live).unwrap(), 3);
        assert!(conn.find_orphans(&live).unwrap().is_empty());
        assert_eq!(conn.block_count().unwrap(), 2);

        // the function is gone once the scan finishes
        assert!(
            conn.connection()
                .query_row("SELECT inset(1)", [], |row| row.get::<_, bool>(0))
                .is_err()
        );
    }

    #[test]
    fn test_storage_totals() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        assert_eq!(conn.storage_totals().unwrap(), StorageTotals::default());

        let a = append(&conn, &[0.0; 300]);
        let b = append(&conn, &[0.0; 10]);
        let expected = conn.block_space_usage(a).unwrap().unwrap()
            + conn.block_space_usage(b).unwrap().unwrap();
        assert_eq!(
            conn.storage_totals().unwrap(),
            StorageTotals {
                blocks: 2,
                bytes: expected
            }
        );

        assert_eq!(conn.delete_blocks(&[a, b, BlockId(999)]).unwrap(), 2);
        assert_eq!(conn.block_count().unwrap(), 0);
    }
}
