// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Project file schema: installation, verification and upgrade.
//!
//! Every project file carries two engine-level stamps: `application_id`
//! identifies it as ours and `user_version` records the schema revision.
//! Both are checked each time a file is opened.

use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Application tag stamped into every project file ("CDZA").
pub const APPLICATION_ID: i32 = i32::from_be_bytes(*b"CDZA");

/// Current schema revision.
pub const SCHEMA_VERSION: i32 = 1;

/// Table definitions. `<schema>` is replaced by the schema name (`main` or an
/// attached database) before execution.
const SCHEMA_TEMPLATE: &str = r#"
create table if not exists <schema>.project (
    id   integer primary key,
    dict blob,
    doc  blob
);

create table if not exists <schema>.autosave (
    id   integer primary key,
    dict blob,
    doc  blob
);

create table if not exists <schema>.tags (
    name  text,
    value blob
);

create table if not exists <schema>.sampleblocks (
    blockid      integer primary key autoincrement,
    sampleformat integer,
    summin       real,
    summax       real,
    sumrms       real,
    summary256   blob,
    summary64k   blob,
    samples      blob
);
"#;

/// Schema SQL for the given database name.
pub(crate) fn schema_sql(schema: &str) -> String {
    SCHEMA_TEMPLATE.replace("<schema>", schema)
}

/// Create the tables in `schema` and stamp the application tag and version.
pub(crate) fn install(conn: &Connection, schema: &str) -> Result<()> {
    conn.execute_batch(&schema_sql(schema))?;
    conn.execute_batch(&format!(
        "PRAGMA {schema}.application_id = {APPLICATION_ID};
         PRAGMA {schema}.user_version = {SCHEMA_VERSION};"
    ))?;
    debug!("Installed project schema into '{schema}'");
    Ok(())
}

pub(crate) fn application_id(conn: &Connection, schema: &str) -> Result<i32> {
    Ok(conn.query_row(&format!("PRAGMA {schema}.application_id"), [], |row| {
        row.get(0)
    })?)
}

pub(crate) fn user_version(conn: &Connection, schema: &str) -> Result<i32> {
    Ok(conn.query_row(&format!("PRAGMA {schema}.user_version"), [], |row| {
        row.get(0)
    })?)
}

fn table_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM main.sqlite_master WHERE type = 'table'",
        [],
        |row| row.get(0),
    )?)
}

/// Check that `main` is a project file of a supported revision.
///
/// A file without any tables is treated as new and receives the schema. An
/// older revision is upgraded in place; a failed upgrade changes nothing.
pub(crate) fn verify(conn: &Connection, path: &Path) -> Result<()> {
    if table_count(conn)? == 0 {
        return install(conn, "main");
    }

    check_application_id(conn, "main", path)?;

    let found = user_version(conn, "main")?;
    if found > SCHEMA_VERSION {
        return Err(Error::TooNew {
            path: path.to_owned(),
            found,
            supported: SCHEMA_VERSION,
        });
    }
    if found < SCHEMA_VERSION {
        upgrade(conn, found, SCHEMA_VERSION)?;
    }
    Ok(())
}

pub(crate) fn check_application_id(conn: &Connection, schema: &str, path: &Path) -> Result<()> {
    let found = application_id(conn, schema)?;
    if found != APPLICATION_ID {
        return Err(Error::NotOurFormat {
            path: path.to_owned(),
            found,
        });
    }
    Ok(())
}

/// Bring `main` from revision `from` to `to` inside one transaction.
///
/// Each step must be safe to run more than once.
fn upgrade(conn: &Connection, from: i32, to: i32) -> Result<()> {
    let wrap = |source| Error::Upgrade { from, to, source };

    let tx = conn.unchecked_transaction().map_err(wrap)?;
    for version in (from + 1)..=to {
        upgrade_step(&tx, version).map_err(wrap)?;
    }
    tx.execute_batch(&format!("PRAGMA main.user_version = {to}"))
        .map_err(wrap)?;
    tx.commit().map_err(wrap)?;

    info!("Upgraded project schema from version {from} to {to}");
    Ok(())
}

fn upgrade_step(conn: &Connection, version: i32) -> rusqlite::Result<()> {
    match version {
        // Revision 1 is the initial layout; ensure every table exists.
        1 => conn.execute_batch(&schema_sql("main")),
        _ => Ok(()),
    }
}
