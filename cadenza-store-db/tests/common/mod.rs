// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Shared fixtures for the storage engine tests.

#![allow(dead_code)]

use std::path::Path;

use cadenza_doc::{BLOCK_ID_ATTR, Document, Element, SerializedDoc};
use cadenza_store_db::{
    BlockId, BlockSummary, DbConnection, DocSlot, Error, ProjectModel, Result, SampleBlock,
    SampleFormat, StoreConfig,
};
use tempfile::TempDir;

/// Config with temporary projects kept inside `dir` and a short retry delay.
pub fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        temp_dir: dir.path().join("tmp"),
        checkpoint_retry_ms: 10,
        close_poll_ms: 5,
        ..StoreConfig::default()
    }
}

/// A project whose single track references `ids` in order.
pub fn project(ids: &[BlockId]) -> Document {
    let sequence = ids.iter().fold(Element::new("sequence"), |seq, id| {
        seq.with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, id.0))
    });
    Document::new(
        Element::new("project").with_child(
            Element::new("wavetrack")
                .with_attr("name", "Track 1")
                .with_child(Element::new("waveclip").with_child(sequence)),
        ),
    )
}

/// Store a float block with `frames` samples derived from `seed`.
pub fn append(conn: &DbConnection, seed: u32, frames: usize) -> BlockId {
    let samples: Vec<f32> = (0..frames)
        .map(|i| ((seed as usize * 31 + i) % 200) as f32 / 100.0 - 1.0)
        .collect();
    let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    conn.append_block(
        SampleFormat::Float,
        &payload,
        &BlockSummary::from_samples(&samples),
    )
    .unwrap()
}

pub fn append_many(conn: &DbConnection, count: u32, frames: usize) -> Vec<BlockId> {
    (0..count).map(|seed| append(conn, seed, frames)).collect()
}

pub fn blocks(conn: &DbConnection) -> Vec<SampleBlock> {
    conn.block_ids()
        .unwrap()
        .into_iter()
        .map(|id| conn.block(id).unwrap().unwrap())
        .collect()
}

/// Everything a project file holds, for before/after comparisons.
#[derive(Debug, PartialEq)]
pub struct Contents {
    pub project: Option<SerializedDoc>,
    pub autosave: Option<SerializedDoc>,
    pub blocks: Vec<SampleBlock>,
    pub tags: Vec<(String, Vec<u8>)>,
}

pub fn contents(conn: &DbConnection) -> Contents {
    let mut stmt = conn
        .connection()
        .prepare("SELECT name, value FROM tags ORDER BY rowid")
        .unwrap();
    let tags = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    Contents {
        project: conn.read_doc(DocSlot::Project).unwrap(),
        autosave: conn.read_doc(DocSlot::Autosave).unwrap(),
        blocks: blocks(conn),
        tags,
    }
}

pub fn add_tag(conn: &DbConnection, name: &str, value: &[u8]) {
    conn.connection()
        .execute(
            "INSERT INTO tags (name, value) VALUES (?1, ?2)",
            rusqlite::params![name, value],
        )
        .unwrap();
}

/// A model whose serialization always fails.
pub struct BrokenModel(pub Vec<BlockId>);

impl ProjectModel for BrokenModel {
    fn block_refs(&self) -> Vec<BlockId> {
        self.0.clone()
    }

    fn serialize(&self) -> Result<SerializedDoc> {
        Err(Error::Integrity("model cannot be serialized".into()))
    }
}

/// Files in `dir` (not recursive), sorted.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
