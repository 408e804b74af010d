// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Crash-safe single-file storage for Cadenza projects.
//!
//! A project file is an SQLite database holding two document slots (the last
//! save and an autosave) and a table of immutable sample blocks referenced by
//! those documents.
//!
//! **Architecture**: [`ProjectStore`] is owned by the project session and
//! composes everything else. Underneath, a [`DbConnection`] owns one SQLite
//! handle plus a background thread that checkpoints its write-ahead log.
//!
//! # Key Features
//!
//! - Schema stamping, verification and upgrade on every open
//! - Write-ahead-log checkpoints off the owner's thread
//! - Nestable savepoints with commit-on-drop scopes
//! - Orphan block collection via an in-engine membership test
//! - Atomic save-as, save-a-copy and compaction through attached databases
//! - Import of another project with block id remapping
//!
//! # Example
//!
//! ```no_run
//! use cadenza_doc::{Document, Element};
//! use cadenza_store_db::{NoProgress, OpenMode, ProjectStore, StoreConfig};
//!
//! let mut store = ProjectStore::open("song.cdz", OpenMode::Create, StoreConfig::default())?;
//! let doc = Document::new(Element::new("project"));
//! store.save("song.cdz", &doc, &mut NoProgress)?;
//! store.close()?;
//! # Ok::<(), cadenza_store_db::Error>(())
//! ```

mod blocks;
mod checkpoint;
mod config;
mod connection;
mod document;
mod error;
mod import;
mod model;
mod progress;
mod project;
mod schema;
mod snapshot;
mod summary;
mod transaction;
mod types;

pub use checkpoint::CheckpointBacklog;
pub use config::StoreConfig;
pub use connection::{ConnectionSlot, DbConnection, OpenMode};
pub use document::DocSlot;
pub use error::{Error, Result};
pub use import::ImportedProject;
pub use model::ProjectModel;
pub use progress::{NoProgress, Progress, ProgressResult};
pub use project::ProjectStore;
pub use schema::{APPLICATION_ID, SCHEMA_VERSION};
pub use snapshot::BlockUsage;
pub use summary::BlockSummary;
pub use transaction::AutoCommitTransaction;
pub use types::*;
