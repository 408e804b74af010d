// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Named, nestable savepoints.

use tracing::{debug, error};

use crate::connection::DbConnection;
use crate::error::{Error, Result};

/// Savepoint names are spliced into SQL, so only identifiers are accepted.
fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(Error::integrity(format!(
            "invalid savepoint name '{name}'"
        )));
    }
    Ok(())
}

impl DbConnection {
    /// Open savepoint `name`.
    pub fn transaction_start(&self, name: &str) -> Result<()> {
        if self.is_poisoned() {
            return Err(Error::Poisoned);
        }
        validate_name(name)?;
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        debug!("Started savepoint {name}");
        Ok(())
    }

    /// Release savepoint `name`, keeping its changes.
    pub fn transaction_commit(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.conn.execute_batch(&format!("RELEASE {name}"))?;
        debug!("Released savepoint {name}");
        Ok(())
    }

    /// Undo everything since savepoint `name` and close it.
    pub fn transaction_rollback(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.conn
            .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))?;
        debug!("Rolled back savepoint {name}");
        Ok(())
    }
}

/// A savepoint that commits when dropped unresolved.
///
/// A failed commit at drop has nowhere to report to, so it is logged and the
/// connection is poisoned: every later [`DbConnection::transaction_start`]
/// fails with [`Error::Poisoned`].
#[must_use = "dropping the transaction commits it immediately"]
pub struct AutoCommitTransaction<'a> {
    conn: &'a DbConnection,
    name: String,
    resolved: bool,
}

impl<'a> AutoCommitTransaction<'a> {
    pub fn new(conn: &'a DbConnection, name: &str) -> Result<Self> {
        conn.transaction_start(name)?;
        Ok(Self {
            conn,
            name: name.to_owned(),
            resolved: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commit(mut self) -> Result<()> {
        self.resolved = true;
        self.conn.transaction_commit(&self.name)
    }

    pub fn rollback(mut self) -> Result<()> {
        self.resolved = true;
        self.conn.transaction_rollback(&self.name)
    }
}

impl Drop for AutoCommitTransaction<'_> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        if let Err(e) = self.conn.transaction_commit(&self.name) {
            error!(
                "Automatic commit of savepoint {} failed, session is unusable: {e}",
                self.name
            );
            self.conn.poison();
        }
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
            dir.path().join("tx.cdz"),
            OpenMode::Create,
            &StoreConfig::default(),
        )
        .unwrap()
    }

    fn tag_count(conn: &DbConnection) -> i64 {
        conn.connection()
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap()
    }

    fn add_tag(conn: &DbConnection, name: &str) {
        conn.connection()
            .execute("INSERT INTO tags (name, value) VALUES (?1, NULL)", [name])
            .unwrap();
    }

    #[rstest]
    #[case::empty("")]
    #[case::leading_digit("1st")]
    #[case::injection("x; DROP TABLE tags")]
    #[case::dash("my-save")]
    fn test_invalid_names(#[case] name: &str) {
        assert!(matches!(validate_name(name), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_inner_rollback_keeps_outer_work() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);

        conn.transaction_start("outer").unwrap();
        add_tag(&conn, "kept");
        conn.transaction_start("inner").unwrap();
        add_tag(&conn, "dropped");
        conn.transaction_rollback("inner").unwrap();
        conn.transaction_commit("outer").unwrap();

        assert_eq!(tag_count(&conn), 1);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_scope_exit_commits() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        {
            let _tx = AutoCommitTransaction::new(&conn, "edit").unwrap();
            add_tag(&conn, "a");
        }
        assert_eq!(tag_count(&conn), 1);

        let tx = AutoCommitTransaction::new(&conn, "edit").unwrap();
        add_tag(&conn, "b");
        tx.rollback().unwrap();
        assert_eq!(tag_count(&conn), 1);
    }

    #[test_log::test]
    fn test_failed_auto_commit_poisons_session() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        {
            let tx = AutoCommitTransaction::new(&conn, "edit").unwrap();
            // resolve behind the guard's back so its own release fails
            conn.transaction_commit(tx.name()).unwrap();
        }
        assert!(conn.is_poisoned());
        assert!(matches!(
            conn.transaction_start("next"),
            Err(Error::Poisoned)
        ));
    }
}
