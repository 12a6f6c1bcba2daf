//! Main store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use wakelink_types::{ConnectionRecord, Credentials};

use crate::error::{Error, Result};
use crate::schema;

/// Durable storage for the single bridge connection record.
///
/// Every write is a single statement, so a record is never observed
/// half-written. Implementations must be safe to call from several tasks;
/// the last write wins.
pub trait ConnectionStore: Send + Sync {
    /// Load the stored record, if any.
    fn load(&self) -> Result<Option<ConnectionRecord>>;

    /// Create or overwrite the record.
    fn save(&self, record: &ConnectionRecord) -> Result<()>;

    /// Refresh `last_success_at` for the record holding `credentials`.
    ///
    /// The stored timestamp never moves backwards. Returns `false` when the
    /// stored record belongs to a different ip/credential pair (or there is
    /// none), in which case nothing is written.
    fn touch_success(&self, credentials: &Credentials, at: OffsetDateTime) -> Result<bool>;

    /// Forget the stored record.
    fn clear(&self) -> Result<()>;
}

/// SQLite-based connection store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening connection store at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }
}

impl ConnectionStore for Store {
    fn load(&self) -> Result<Option<ConnectionRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT bridge_ip, credential, last_success_at, validated
                 FROM bridge_connection WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(bridge_ip, credential, last_success_ms, validated)| {
            Ok(ConnectionRecord {
                bridge_ip,
                credential,
                last_success_at: from_millis(last_success_ms)?,
                validated,
            })
        })
        .transpose()
    }

    fn save(&self, record: &ConnectionRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bridge_connection (id, bridge_ip, credential, last_success_at, validated)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                bridge_ip = excluded.bridge_ip,
                credential = excluded.credential,
                last_success_at = excluded.last_success_at,
                validated = excluded.validated",
            rusqlite::params![
                record.bridge_ip,
                record.credential,
                to_millis(record.last_success_at),
                record.validated,
            ],
        )?;
        debug!("Saved connection record for {}", record.bridge_ip);
        Ok(())
    }

    fn touch_success(&self, credentials: &Credentials, at: OffsetDateTime) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE bridge_connection SET
                last_success_at = MAX(last_success_at, ?3),
                validated = 1
             WHERE id = 1 AND bridge_ip = ?1 AND credential = ?2",
            rusqlite::params![credentials.bridge_ip, credentials.credential, to_millis(at)],
        )?;
        Ok(changed > 0)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM bridge_connection", [])?;
        info!("Cleared stored bridge connection");
        Ok(())
    }
}

fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(ms: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .map_err(|e| Error::InvalidTimestamp(format!("{} ms: {}", ms, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    fn creds() -> Credentials {
        Credentials::new("192.168.1.20", "token-a")
    }

    #[test]
    fn test_open_in_memory_is_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let store = Store::open_in_memory().unwrap();
        let at = datetime!(2026-10-19 06:30:15.250 UTC);
        let record = ConnectionRecord::validated(&creds(), at);

        store.save(&record).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded, record);
        assert_eq!(loaded.last_success_at, at);
    }

    #[test]
    fn test_save_overwrites_single_record() {
        let store = Store::open_in_memory().unwrap();
        let at = datetime!(2026-10-19 06:00 UTC);
        store
            .save(&ConnectionRecord::validated(&creds(), at))
            .unwrap();

        let other = Credentials::new("192.168.1.42", "token-b");
        store
            .save(&ConnectionRecord::validated(&other, at))
            .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.matches(&other));

        let count: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM bridge_connection", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_touch_success_is_monotonic() {
        let store = Store::open_in_memory().unwrap();
        let at = datetime!(2026-10-19 06:00 UTC);
        store
            .save(&ConnectionRecord::validated(&creds(), at))
            .unwrap();

        assert!(store.touch_success(&creds(), at + Duration::minutes(5)).unwrap());
        assert!(store.touch_success(&creds(), at - Duration::hours(1)).unwrap());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.last_success_at, at + Duration::minutes(5));
    }

    #[test]
    fn test_touch_success_ignores_other_credentials() {
        let store = Store::open_in_memory().unwrap();
        let at = datetime!(2026-10-19 06:00 UTC);
        store
            .save(&ConnectionRecord::validated(&creds(), at))
            .unwrap();

        let other = Credentials::new("192.168.1.20", "token-b");
        assert!(!store.touch_success(&other, at + Duration::hours(1)).unwrap());
        assert_eq!(store.load().unwrap().unwrap().last_success_at, at);
    }

    #[test]
    fn test_touch_success_without_record() {
        let store = Store::open_in_memory().unwrap();
        assert!(
            !store
                .touch_success(&creds(), datetime!(2026-10-19 06:00 UTC))
                .unwrap()
        );
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let store = Store::open_in_memory().unwrap();
        store
            .save(&ConnectionRecord::validated(
                &creds(),
                datetime!(2026-10-19 06:00 UTC),
            ))
            .unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_unvalidated_flag_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let mut record = ConnectionRecord::validated(&creds(), datetime!(2026-10-19 06:00 UTC));
        record.validated = false;
        store.save(&record).unwrap();
        assert!(!store.load().unwrap().unwrap().validated);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("connection.db");
        let record = ConnectionRecord::validated(&creds(), datetime!(2026-10-19 06:00 UTC));

        {
            let store = Store::open(&path).unwrap();
            store.save(&record).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.load().unwrap(), Some(record));
    }
}
