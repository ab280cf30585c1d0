//! Single-writer gate for the embedded database
//!
//! SQLite accepts many readers but only one writer at a time. Every
//! write-capable operation goes through [`WriteSerializer::run_in_transaction`],
//! which holds a process-wide guard for the whole begin/commit/rollback
//! sequence.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::StorageResult;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Owns the write connection and serializes access to it
///
/// Waiting callers block until the current writer releases the guard.
/// The guard is released on success, on error and on panic; a panic
/// inside a transaction leaves it rolled back, so a poisoned guard is
/// recovered rather than propagated.
pub struct WriteSerializer {
    conn: Mutex<Connection>,
}

impl WriteSerializer {
    /// Wraps an already configured connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens the write connection for a database file and initializes the schema
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `busy_timeout` - How long the driver waits on a lock held by
    ///   another process before reporting `SQLITE_BUSY`
    pub fn open(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(busy_timeout)?;

        initialize_schema(&conn)?;

        Ok(Self::new(conn))
    }

    /// Runs `f` inside an IMMEDIATE transaction while holding the write guard
    ///
    /// Commits when `f` returns `Ok`. When `f` returns `Err` (or panics) the
    /// transaction is dropped, which rolls it back.
    pub fn run_in_transaction<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StorageResult<T>,
    {
        let mut guard = self.acquire();
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs `f` against the write connection outside any transaction
    pub fn with_connection<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let guard = self.acquire();
        f(&guard)
    }

    fn acquire(&self) -> MutexGuard<'_, Connection> {
        let started = Instant::now();
        let guard = self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Write guard was poisoned by a panicking writer, recovering");
            poisoned.into_inner()
        });

        let waited = started.elapsed();
        if waited > Duration::from_millis(100) {
            tracing::debug!("Waited {}ms for the write guard", waited.as_millis());
        }

        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn serializer() -> WriteSerializer {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE counter (n INTEGER NOT NULL);")
            .unwrap();
        WriteSerializer::new(conn)
    }

    fn count_rows(serializer: &WriteSerializer) -> i64 {
        serializer
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM counter", [], |row| row.get(0))?)
            })
            .unwrap()
    }

    #[test]
    fn test_commit_on_success() {
        let serializer = serializer();

        serializer
            .run_in_transaction(|tx| {
                tx.execute("INSERT INTO counter (n) VALUES (1)", [])?;
                Ok(())
            })
            .unwrap();

        assert_eq!(count_rows(&serializer), 1);
    }

    #[test]
    fn test_rollback_on_error() {
        let serializer = serializer();

        let result: StorageResult<()> = serializer.run_in_transaction(|tx| {
            tx.execute("INSERT INTO counter (n) VALUES (1)", [])?;
            Err(StorageError::Corrupt("abort".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(count_rows(&serializer), 0);
    }

    #[test]
    fn test_guard_released_after_error() {
        let serializer = serializer();

        let _ = serializer.run_in_transaction(|_| -> StorageResult<()> {
            Err(StorageError::Corrupt("abort".to_string()))
        });

        // A second writer must not deadlock
        serializer
            .run_in_transaction(|tx| {
                tx.execute("INSERT INTO counter (n) VALUES (2)", [])?;
                Ok(())
            })
            .unwrap();
        assert_eq!(count_rows(&serializer), 1);
    }

    #[test]
    fn test_guard_recovered_after_panic() {
        let serializer = Arc::new(serializer());

        let panicking = Arc::clone(&serializer);
        let handle = thread::spawn(move || {
            let _ = panicking.run_in_transaction(|tx| -> StorageResult<()> {
                tx.execute("INSERT INTO counter (n) VALUES (1)", [])?;
                panic!("writer crashed");
            });
        });
        assert!(handle.join().is_err());

        serializer
            .run_in_transaction(|tx| {
                tx.execute("INSERT INTO counter (n) VALUES (2)", [])?;
                Ok(())
            })
            .unwrap();

        // The panicking insert was rolled back
        assert_eq!(count_rows(&serializer), 1);
    }

    #[test]
    fn test_at_most_one_writer_at_a_time() {
        let serializer = Arc::new(serializer());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let serializer = Arc::clone(&serializer);
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    serializer
                        .run_in_transaction(|tx| {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tx.execute("INSERT INTO counter (n) VALUES (?1)", [i])?;
                            thread::sleep(Duration::from_millis(5));
                            active.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(count_rows(&serializer), 8);
    }
}
