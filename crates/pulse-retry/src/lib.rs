//! # pulse-retry
//!
//! Bounded retry for the I/O edges of the pipeline: file snapshots,
//! Postgres statements and agent HTTP sends.
//!
//! An operation is attempted up to four times with sleeps of 1 s, 3 s and
//! 5 s between attempts. Only *transient* failures are retried:
//!
//! - network errors that timed out or carry a connection-level signature
//!   (`connection refused`, `connection reset`, `network is unreachable`);
//! - database errors whose SQLSTATE class is `08` (connection exception);
//! - filesystem errors reporting `busy` or `temporarily` unavailable.
//!
//! Anything else fails fast on the first attempt.

#![forbid(unsafe_code)]

use std::error::Error as StdError;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

/// Sleep intervals between attempts; one more attempt than intervals.
pub const BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

const NET_SIGNATURES: [&str; 5] = [
    "connection refused",
    "connection reset",
    "network is unreachable",
    "timed out",
    "timeout",
];

const FS_SIGNATURES: [&str; 2] = ["busy", "temporarily"];

/// Reports whether the error (or anything in its `source()` chain) is a
/// transient failure worth retrying.
#[must_use]
pub fn is_transient(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if classify_one(e) {
            return true;
        }
        current = e.source();
    }
    false
}

fn classify_one(err: &(dyn StdError + 'static)) -> bool {
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        if matches!(
            io_err.kind(),
            ErrorKind::TimedOut | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
        ) {
            return true;
        }
    }

    if let Some(sqlx::Error::Database(db_err)) = err.downcast_ref::<sqlx::Error>() {
        if let Some(code) = db_err.code() {
            if code.starts_with("08") {
                return true;
            }
        }
    }

    let text = err.to_string().to_ascii_lowercase();
    NET_SIGNATURES.iter().any(|sig| text.contains(sig))
        || FS_SIGNATURES.iter().any(|sig| text.contains(sig))
}

/// Runs `op` with up to four attempts and backoff sleeps in between.
///
/// Non-transient errors are returned immediately; after the last attempt
/// the final error is returned as-is.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn retry<T, E, F, Fut>(mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError + 'static,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_transient(&err) || attempt >= BACKOFF.len() {
                    return Err(err);
                }
                debug!(attempt = attempt + 1, error = %err, "transient failure, will retry");
                tokio::time::sleep(BACKOFF[attempt]).await;
                attempt += 1;
            }
        }
    }
}

/// Like [`retry`], but the inter-attempt sleep is cut short when the
/// shutdown signal flips to `true`; the pending error is returned at once.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn retry_with_cancel<T, E, F, Fut>(
    mut op: F,
    mut shutdown: watch::Receiver<bool>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError + 'static,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_transient(&err) || attempt >= BACKOFF.len() {
                    return Err(err);
                }
                debug!(attempt = attempt + 1, error = %err, "transient failure, will retry");
                tokio::select! {
                    () = tokio::time::sleep(BACKOFF[attempt]) => {}
                    () = wait_for_shutdown(&mut shutdown) => return Err(err),
                }
                attempt += 1;
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    while shutdown.changed().await.is_ok() {
        if *shutdown.borrow() {
            return;
        }
    }
    // Sender dropped: treat as shutdown so callers never hang here.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("wrapper: {source}")]
    struct Wrapper {
        #[source]
        source: io::Error,
    }

    mod classification_tests {
        use super::*;

        #[test]
        fn timeout_kind_is_transient() {
            let err = io::Error::new(ErrorKind::TimedOut, "deadline exceeded");
            assert!(is_transient(&err));
        }

        #[test]
        fn connection_kinds_are_transient() {
            assert!(is_transient(&io::Error::new(
                ErrorKind::ConnectionRefused,
                "refused"
            )));
            assert!(is_transient(&io::Error::new(
                ErrorKind::ConnectionReset,
                "reset"
            )));
        }

        #[test]
        fn net_signature_text_is_transient() {
            let err = io::Error::other("dial tcp: network is unreachable");
            assert!(is_transient(&err));
        }

        #[test]
        fn fs_signature_text_is_transient() {
            assert!(is_transient(&io::Error::other("resource busy")));
            assert!(is_transient(&io::Error::other(
                "resource temporarily unavailable"
            )));
        }

        #[test]
        fn classification_walks_source_chain() {
            let err = Wrapper {
                source: io::Error::new(ErrorKind::ConnectionRefused, "refused"),
            };
            assert!(is_transient(&err));
        }

        #[test]
        fn plain_errors_are_not_transient() {
            assert!(!is_transient(&io::Error::new(
                ErrorKind::PermissionDenied,
                "permission denied"
            )));
            assert!(!is_transient(&io::Error::other("no such metric")));
        }
    }

    mod retry_tests {
        use super::*;

        fn transient() -> io::Error {
            io::Error::new(ErrorKind::ConnectionRefused, "connection refused")
        }

        #[tokio::test(start_paused = true)]
        async fn first_success_needs_one_attempt() {
            let calls = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&calls);
            let result: Result<u32, io::Error> = retry(move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                }
            })
            .await;
            assert_eq!(result.unwrap(), 7);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn transient_error_exhausts_four_attempts() {
            let calls = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&calls);
            let result: Result<(), io::Error> = retry(move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 4);
        }

        #[tokio::test(start_paused = true)]
        async fn non_transient_error_fails_fast() {
            let calls = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&calls);
            let result: Result<(), io::Error> = retry(move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(io::Error::other("schema violation"))
                }
            })
            .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn recovers_mid_sequence() {
            let calls = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&calls);
            let result: Result<u32, io::Error> = retry(move || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(99)
                    }
                }
            })
            .await;
            assert_eq!(result.unwrap(), 99);
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        }

        #[tokio::test(start_paused = true)]
        async fn cancellation_cuts_the_sleep() {
            let (tx, rx) = watch::channel(false);
            let calls = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&calls);

            let task = tokio::spawn(retry_with_cancel(
                move || {
                    let c = Arc::clone(&c);
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err::<(), io::Error>(transient())
                    }
                },
                rx,
            ));

            // Let the first attempt land in its backoff sleep, then cancel.
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(true).unwrap();

            let result = task.await.unwrap();
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
