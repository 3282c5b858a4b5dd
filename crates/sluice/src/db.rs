//! Helpers shared by the SQLite and PostgreSQL adapters.
//!
//! Both drivers are synchronous, so every call runs on the blocking pool
//! while holding the connection mutex.

use std::sync::{Arc, LazyLock, Mutex};

use chrono::NaiveDateTime;
use regex::Regex;
use snafu::ResultExt;

use crate::error::{DatabaseError, TaskJoinSnafu};

/// `SQLite` datetime format (no timezone suffix).
pub(crate) const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("identifier pattern is a valid regex")
});

/// True for `table` or `schema.table` made of plain identifier characters.
///
/// Table names come from configuration and are spliced into SQL text, so
/// anything else is refused at load time.
pub fn is_sql_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Run `f` against the locked connection on the blocking thread pool.
pub(crate) async fn with_connection<C, T, F>(
    conn: &Arc<Mutex<C>>,
    f: F,
) -> Result<T, DatabaseError>
where
    C: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut C) -> Result<T, DatabaseError> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&mut guard)
    })
    .await
    .context(TaskJoinSnafu)?
}

/// A synchronous client that is never dropped on an async worker thread.
///
/// The sync `postgres::Client` owns a private runtime, and dropping a
/// runtime from async code panics.
pub(crate) struct BlockingDrop<C: Send + 'static>(Option<C>);

impl<C: Send + 'static> BlockingDrop<C> {
    pub(crate) fn new(inner: C) -> Self {
        Self(Some(inner))
    }
}

impl<C: Send + 'static> std::ops::Deref for BlockingDrop<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.0.as_ref().expect("client is present until drop")
    }
}

impl<C: Send + 'static> std::ops::DerefMut for BlockingDrop<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.0.as_mut().expect("client is present until drop")
    }
}

impl<C: Send + 'static> Drop for BlockingDrop<C> {
    fn drop(&mut self) {
        if let Some(inner) = self.0.take() {
            if tokio::runtime::Handle::try_current().is_ok() {
                std::thread::spawn(move || drop(inner));
            } else {
                drop(inner);
            }
        }
    }
}

/// Parse an optional `SQLite` timestamp. Unparseable values read as absent.
pub(crate) fn parse_sqlite_datetime(raw: Option<String>) -> Option<NaiveDateTime> {
    raw.and_then(|raw| NaiveDateTime::parse_from_str(raw.trim(), SQLITE_DATETIME_FMT).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flag(Arc<std::sync::atomic::AtomicBool>);

    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn test_blocking_drop_outside_runtime_is_immediate() {
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let client = BlockingDrop::new(Flag(dropped.clone()));
        drop(client);
        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_identifiers() {
        assert!(is_sql_identifier("saas_ingstn_log"));
        assert!(is_sql_identifier("fusion_metadata.saas_ingstn_stream_control"));
        assert!(!is_sql_identifier("a.b.c"));
        assert!(!is_sql_identifier("log; DROP TABLE x"));
        assert!(!is_sql_identifier("1table"));
        assert!(!is_sql_identifier(""));
    }

    #[test]
    fn test_parse_sqlite_datetime() {
        let parsed = parse_sqlite_datetime(Some("2024-03-01 10:15:00".to_string())).unwrap();
        assert_eq!(parsed.to_string(), "2024-03-01 10:15:00");
        assert!(parse_sqlite_datetime(Some("yesterday".to_string())).is_none());
        assert!(parse_sqlite_datetime(None).is_none());
    }

    #[tokio::test]
    async fn test_with_connection_runs_on_blocking_pool() {
        let conn = Arc::new(Mutex::new(41_i64));
        let value = with_connection(&conn, |n| {
            *n += 1;
            Ok(*n)
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
    }
}
