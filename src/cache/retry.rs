//! Bounded retry for transient SQLite contention

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// SQLite primary result codes that indicate the write may succeed later
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CANTOPEN: i32 = 14;

/// Fixed-backoff retry policy applied at the cache boundary.
///
/// `lock_wait` is SQLite's own busy timeout inside a single attempt; the
/// policy retries once that wait is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub lock_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            lock_wait: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            ..Self::default()
        }
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Returns the last error together with the number of attempts made.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, (sqlx::Error, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < self.max_attempts => {
                    warn!(
                        "⚠️ {} hit storage contention (attempt {}/{}): {}. Retrying...",
                        what, attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

/// Whether a storage error is worth retrying
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => {
            let primary = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            match primary {
                Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) | Some(SQLITE_CANTOPEN) => true,
                _ => {
                    let message = db.message();
                    message.contains("database is locked")
                        || message.contains("unable to open database file")
                }
            }
        }
        _ => false,
    }
}
