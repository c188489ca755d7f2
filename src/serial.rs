//! Single-connection serialization.
//!
//! SQLite forbids driving one connection from two threads at once, and the store is
//! opened with `SQLITE_OPEN_NO_MUTEX`, so all access goes through one owner at a time.
//! Calls from other threads block until the owner is done. A nested call made by code
//! already running under the lock (for example a store operation invoked from inside
//! another operation's closure) runs inline on the same connection instead of
//! waiting on itself.

use parking_lot::ReentrantMutex;
use rusqlite::Connection;
use tracing::trace;

pub struct SerialConnection {
    conn: ReentrantMutex<Connection>,
}

impl SerialConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: ReentrantMutex::new(conn),
        }
    }

    /// True while the calling thread is already executing inside [`Self::with_connection`].
    pub fn is_inside(&self) -> bool {
        self.conn.is_owned_by_current_thread()
    }

    /// Run `f` with exclusive use of the connection.
    pub fn with_connection<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&Connection) -> T,
    {
        if self.is_inside() {
            trace!("nested connection use, running inline");
        }
        let guard = self.conn.lock();
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counter_db() -> SerialConnection {
        let conn = Connection::open_in_memory().expect("memory db");
        conn.execute_batch("CREATE TABLE t (n INTEGER); INSERT INTO t VALUES (1), (2), (3);")
            .expect("schema");
        SerialConnection::new(conn)
    }

    #[test]
    fn nested_use_does_not_deadlock() {
        let serial = counter_db();
        assert!(!serial.is_inside());
        let total: i64 = serial.with_connection(|outer| {
            assert!(serial.is_inside());
            let inner: i64 = serial.with_connection(|conn| {
                conn.query_row("SELECT SUM(n) FROM t", [], |row| row.get(0))
                    .expect("inner query")
            });
            let count: i64 = outer
                .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                .expect("outer query");
            inner + count
        });
        assert_eq!(total, 9);
        assert!(!serial.is_inside());
    }

    #[test]
    fn concurrent_callers_are_serialized() {
        let serial = Arc::new(counter_db());
        let active = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let serial = Arc::clone(&serial);
                let active = Arc::clone(&active);
                thread::spawn(move || {
                    for _ in 0..50 {
                        serial.with_connection(|conn| {
                            assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                            let n: i64 = conn
                                .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                                .expect("query");
                            assert_eq!(n, 3);
                            active.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker");
        }
    }
}
