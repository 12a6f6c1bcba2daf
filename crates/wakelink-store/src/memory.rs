//! In-memory connection store for tests and ephemeral setups.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use time::OffsetDateTime;

use wakelink_types::{ConnectionRecord, Credentials};

use crate::error::{Error, Result};
use crate::store::ConnectionStore;

/// A [`ConnectionStore`] that keeps the record in memory.
///
/// Writes can be made to fail with [`MemoryStore::set_read_only`] to exercise
/// persistence-failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<ConnectionRecord>>,
    read_only: AtomicBool,
    write_count: AtomicU32,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `record`.
    pub fn with_record(record: ConnectionRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            ..Self::default()
        }
    }

    /// Make every subsequent write fail with [`Error::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u32 {
        self.write_count.load(Ordering::SeqCst)
    }

    fn record(&self) -> Result<MutexGuard<'_, Option<ConnectionRecord>>> {
        self.record.lock().map_err(|_| Error::LockPoisoned)
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }
}

impl ConnectionStore for MemoryStore {
    fn load(&self) -> Result<Option<ConnectionRecord>> {
        Ok(self.record()?.clone())
    }

    fn save(&self, record: &ConnectionRecord) -> Result<()> {
        self.check_writable()?;
        *self.record()? = Some(record.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn touch_success(&self, credentials: &Credentials, at: OffsetDateTime) -> Result<bool> {
        self.check_writable()?;
        let mut guard = self.record()?;
        match guard.as_mut() {
            Some(record) if record.matches(credentials) => {
                record.last_success_at = record.last_success_at.max(at);
                record.validated = true;
                self.write_count.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn clear(&self) -> Result<()> {
        self.check_writable()?;
        *self.record()? = None;
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let creds = Credentials::new("10.0.0.2", "k");
        let at = datetime!(2026-10-19 06:00 UTC);

        assert!(store.load().unwrap().is_none());
        store.save(&ConnectionRecord::validated(&creds, at)).unwrap();
        assert!(store.touch_success(&creds, at + Duration::minutes(1)).unwrap());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.last_success_at, at + Duration::minutes(1));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let creds = Credentials::new("10.0.0.2", "k");
        let at = datetime!(2026-10-19 06:00 UTC);
        let store = MemoryStore::with_record(ConnectionRecord::validated(&creds, at));
        store.set_read_only(true);

        assert!(matches!(
            store.save(&ConnectionRecord::validated(&creds, at)),
            Err(Error::ReadOnly)
        ));
        assert!(matches!(store.clear(), Err(Error::ReadOnly)));
        // Reads still work
        assert!(store.load().unwrap().is_some());
    }
}
