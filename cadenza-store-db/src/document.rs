// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! The two document slots of a project file.

use cadenza_doc::SerializedDoc;
use rusqlite::{OptionalExtension, params};

use crate::connection::DbConnection;
use crate::error::Result;

/// Row id of the single document in each slot table.
const DOC_ROW: i64 = 1;

/// Which document slot to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocSlot {
    /// The last explicit save
    Project,
    /// Unsaved changes written periodically
    Autosave,
}

impl DocSlot {
    pub(crate) const fn table(self) -> &'static str {
        match self {
            DocSlot::Project => "project",
            DocSlot::Autosave => "autosave",
        }
    }
}

pub(crate) fn upsert_sql(schema: &str, slot: DocSlot) -> String {
    format!(
        "INSERT INTO {schema}.{table} (id, dict, doc) VALUES ({DOC_ROW}, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET dict = excluded.dict, doc = excluded.doc",
        table = slot.table()
    )
}

impl DbConnection {
    /// Replace the document in `slot`.
    pub fn write_doc(&self, slot: DocSlot, doc: &SerializedDoc) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&upsert_sql("main", slot))?;
        stmt.execute(params![doc.dict, doc.body])?;
        Ok(())
    }

    /// Read the document in `slot`.
    ///
    /// Returns `None` if the slot was never written (or was deleted).
    pub fn read_doc(&self, slot: DocSlot) -> Result<Option<SerializedDoc>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT dict, doc FROM main.{} WHERE id = {DOC_ROW}",
            slot.table()
        ))?;
        let doc = stmt
            .query_row([], |row| {
                Ok(SerializedDoc {
                    dict: row.get::<_, Option<Vec<u8>>>(0)?.unwrap_or_default(),
                    body: row.get::<_, Option<Vec<u8>>>(1)?.unwrap_or_default(),
                })
            })
            .optional()?;
        Ok(doc)
    }

    pub fn has_doc(&self, slot: DocSlot) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM main.{}", slot.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Drop the autosave document.
    pub fn delete_autosave(&self) -> Result<()> {
        self.conn.execute("DELETE FROM main.autosave", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;
    use crate::config::StoreConfig;
    use crate::connection::OpenMode;

    fn open(dir: &TempDir) -> DbConnection {
        DbConnection::open(
            dir.path().join("doc.cdz"),
            OpenMode::Create,
            &StoreConfig::default(),
        )
        .unwrap()
    }

    #[rstest]
    #[case::project(DocSlot::Project)]
    #[case::autosave(DocSlot::Autosave)]
    fn test_slot_upsert(#[case] slot: DocSlot) {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        assert_eq!(conn.read_doc(slot).unwrap(), None);

        let first = SerializedDoc::new(vec![1, 2], vec![3]);
        let second = SerializedDoc::new(vec![9], vec![8, 7, 6]);
        conn.write_doc(slot, &first).unwrap();
        conn.write_doc(slot, &second).unwrap();

        assert_eq!(conn.read_doc(slot).unwrap(), Some(second));
        assert!(conn.has_doc(slot).unwrap());
    }

    #[test]
    fn test_delete_autosave_leaves_project() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let doc = SerializedDoc::new(vec![1], vec![2]);
        conn.write_doc(DocSlot::Project, &doc).unwrap();
        conn.write_doc(DocSlot::Autosave, &doc).unwrap();

        conn.delete_autosave().unwrap();
        assert_eq!(conn.read_doc(DocSlot::Autosave).unwrap(), None);
        assert_eq!(conn.read_doc(DocSlot::Project).unwrap(), Some(doc));
    }
}
