//! Database schema.
//!
//! The version lives in SQLite's `user_version` header field, so an empty
//! file reads as version 0.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Create the schema on a fresh database and check the version of an
/// existing one.
///
/// A database written by a newer build is refused rather than read with the
/// wrong layout.
pub fn initialize(conn: &Connection) -> Result<()> {
    match user_version(conn)? {
        0 => {
            conn.execute_batch(
                r#"
                BEGIN;
                CREATE TABLE IF NOT EXISTS bridge_connection (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    bridge_ip TEXT NOT NULL,
                    credential TEXT NOT NULL,
                    last_success_at INTEGER NOT NULL,
                    validated INTEGER NOT NULL
                );
                PRAGMA user_version = 1;
                COMMIT;
                "#,
            )?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        found => Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
    }
}

fn user_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}
