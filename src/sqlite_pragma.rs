//! Shared SQLite connection tuning
//!
//! Every connection opened against the inventory database (the single writer
//! and each snapshot reader) goes through `apply_optimized_pragmas` so that the
//! writer and readers agree on journal mode and checkpoint behaviour.

use rusqlite::Connection;
use std::time::Duration;

/// Pages written to the WAL before an automatic checkpoint
pub const WAL_AUTOCHECKPOINT_PAGES: i64 = 1000;

/// How long a connection waits on a locked database before giving up
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply WAL, NORMAL sync, MEMORY temp store, mmap, cache and autocheckpoint
///
/// WAL is what lets readers keep a consistent snapshot while the generator
/// commits new movements; readers never block the writer and vice versa.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    // journal_mode returns a row, pragma_update handles that
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 64 * 1024 * 1024_i64)?;
    conn.pragma_update(None, "cache_size", -16_000_i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", WAL_AUTOCHECKPOINT_PAGES)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    log::debug!("📊 SQLite pragmas applied (WAL, NORMAL, MEMORY, autocheckpoint={})", WAL_AUTOCHECKPOINT_PAGES);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wal_checkpoint_configured() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("pragma.db");
        let conn = Connection::open(&db_path).unwrap();

        apply_optimized_pragmas(&conn).unwrap();

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let checkpoint: i64 = conn
            .query_row("PRAGMA wal_autocheckpoint", [], |row| row.get(0))
            .unwrap();
        assert_eq!(checkpoint, WAL_AUTOCHECKPOINT_PAGES);

        let foreign_keys: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }
}
