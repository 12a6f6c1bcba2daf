//! Durable persistence for the wakelink bridge connection.
//!
//! The store holds exactly one record: the bridge IP, its credential, the last
//! time the bridge accepted that credential, and whether the record was
//! validated. It is read once at process start and written only when a
//! connection is established or successfully re-validated.
//!
//! # Example
//!
//! ```no_run
//! use wakelink_store::{ConnectionStore, Store};
//!
//! let store = Store::open_default()?;
//! if let Some(record) = store.load()? {
//!     println!("Last bridge: {}", record.bridge_ip);
//! }
//! # Ok::<(), wakelink_store::Error>(())
//! ```

mod error;
mod memory;
mod schema;
mod store;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use store::{ConnectionStore, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/wakelink/connection.db`
/// - macOS: `~/Library/Application Support/wakelink/connection.db`
/// - Windows: `C:\Users\<user>\AppData\Local\wakelink\connection.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("wakelink")
        .join("connection.db")
}
