//! Request coalescing.
//!
//! The first caller for a key becomes the leader: its work runs in a spawned
//! task and publishes one outcome through a `watch` channel. Callers arriving
//! while the work runs, or within `window` after it finished, wait on that
//! channel and receive a clone of the same outcome.
//!
//! Because the work runs in its own task, a waiter that gives up (timeout,
//! dropped future) never cancels the work other waiters depend on.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::errors::MarketDataError;

type Outcome<T> = Result<T, MarketDataError>;

/// Counters reported by [`Deduplicator::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    /// Calls that ran the work themselves.
    pub executed: u64,
    /// Calls that joined an existing flight.
    pub coalesced: u64,
    /// Flights whose work has not finished yet.
    pub in_flight: usize,
}

struct Inner<K, T> {
    flights: Mutex<HashMap<K, watch::Receiver<Option<Outcome<T>>>>>,
    executed: AtomicU64,
    coalesced: AtomicU64,
}

impl<K: Eq + Hash, T> Inner<K, T> {
    fn lock_flights(&self) -> MutexGuard<'_, HashMap<K, watch::Receiver<Option<Outcome<T>>>>> {
        self.flights.lock().unwrap_or_else(|poisoned| {
            warn!("Deduplicator mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Owns a key's slot in the flight table and frees it when dropped, even if
/// the task running the work unwinds or is aborted.
struct Flight<K: Eq + Hash, T> {
    inner: Arc<Inner<K, T>>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for Flight<K, T> {
    fn drop(&mut self) {
        self.inner.lock_flights().remove(&self.key);
    }
}

/// Coalesces concurrent identical requests.
pub struct Deduplicator<K, T> {
    inner: Arc<Inner<K, T>>,
}

impl<K, T> Deduplicator<K, T>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                flights: Mutex::new(HashMap::new()),
                executed: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
            }),
        }
    }

    /// Run `work` unless an identical request is already in flight, in which
    /// case wait for and return its outcome.
    ///
    /// The finished flight stays joinable for `window` before its entry is
    /// removed.
    pub async fn execute_once<F, Fut>(&self, key: K, window: Duration, work: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        let mut rx = {
            let mut flights = self.inner.lock_flights();
            match flights.get(&key) {
                Some(rx) => {
                    self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!("Dedup: joining in-flight request {}", key);
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    flights.insert(key.clone(), rx.clone());
                    self.inner.executed.fetch_add(1, Ordering::Relaxed);

                    let flight = Flight {
                        inner: Arc::clone(&self.inner),
                        key: key.clone(),
                    };
                    let fut = work();
                    tokio::spawn(async move {
                        let (outcome, panicked) = match AssertUnwindSafe(fut).catch_unwind().await {
                            Ok(outcome) => (outcome, false),
                            Err(_) => {
                                error!("Dedup: work for {} panicked", flight.key);
                                (Err(MarketDataError::NoDataAvailable), true)
                            }
                        };
                        // The table holds a receiver, so the send cannot fail.
                        let _ = tx.send(Some(outcome));
                        // A panicked flight is not reused; the next caller retries.
                        if !panicked && !window.is_zero() {
                            tokio::time::sleep(window).await;
                        }
                        drop(flight);
                    });
                    rx
                }
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            // Only reachable if the work task was aborted.
            error!("Dedup: in-flight request was abandoned without an outcome");
            Err(MarketDataError::NoDataAvailable)
        })
    }

    /// Flights whose work is still running.
    pub fn in_flight(&self) -> usize {
        self.inner
            .lock_flights()
            .values()
            .filter(|rx| rx.borrow().is_none())
            .count()
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            executed: self.inner.executed.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}

impl<K, T> Default for Deduplicator<K, T>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_work(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        outcome: Outcome<u32>,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Outcome<u32>> + Send>> {
        let calls = Arc::clone(calls);
        move || {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                outcome
            })
        }
    }

    fn exploding_work(
        delay: Duration,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Outcome<u32>> + Send>> {
        move || {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                let missing: Option<u32> = None;
                Ok(missing.expect("adapter blew up"))
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let dedup: Arc<Deduplicator<String, u32>> = Arc::new(Deduplicator::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dedup = Arc::clone(&dedup);
            let work = counting_work(&calls, Duration::from_millis(50), Ok(42));
            handles.push(tokio::spawn(async move {
                dedup
                    .execute_once("quote:AAPL".to_string(), Duration::from_millis(10), work)
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = dedup.stats();
        assert_eq!(stats.executed, 1);
        assert_eq!(stats.coalesced, 7);
    }

    #[tokio::test]
    async fn test_errors_are_shared_too() {
        let dedup: Arc<Deduplicator<String, u32>> = Arc::new(Deduplicator::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let failure = MarketDataError::Configuration("bad".to_string());

        let a = dedup.execute_once(
            "k".to_string(),
            Duration::ZERO,
            counting_work(&calls, Duration::from_millis(30), Err(failure.clone())),
        );
        let b = dedup.execute_once(
            "k".to_string(),
            Duration::ZERO,
            counting_work(&calls, Duration::from_millis(30), Ok(1)),
        );
        let (a, b) = tokio::join!(a, b);

        assert_eq!(a, Err(failure.clone()));
        assert_eq!(b, Err(failure));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_window_absorbs_late_arrivals() {
        let dedup: Deduplicator<String, u32> = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Duration::from_millis(100);

        let first = dedup
            .execute_once("k".to_string(), window, counting_work(&calls, Duration::ZERO, Ok(1)))
            .await;
        let late = dedup
            .execute_once("k".to_string(), window, counting_work(&calls, Duration::ZERO, Ok(2)))
            .await;
        assert_eq!((first, late), (Ok(1), Ok(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.in_flight(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let fresh = dedup
            .execute_once("k".to_string(), window, counting_work(&calls, Duration::ZERO, Ok(3)))
            .await;
        assert_eq!(fresh, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let dedup: Deduplicator<String, u32> = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = dedup.execute_once(
            "a".to_string(),
            Duration::ZERO,
            counting_work(&calls, Duration::from_millis(10), Ok(1)),
        );
        let b = dedup.execute_once(
            "b".to_string(),
            Duration::ZERO,
            counting_work(&calls, Duration::from_millis(10), Ok(2)),
        );
        assert_eq!(tokio::join!(a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_work_frees_the_key() {
        let dedup: Deduplicator<String, u32> = Deduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Duration::from_millis(100);

        let failed = dedup
            .execute_once("quote:X".to_string(), window, exploding_work(Duration::ZERO))
            .await;
        assert_eq!(failed, Err(MarketDataError::NoDataAvailable));

        // Let the work task finish unwinding its slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dedup.in_flight(), 0);

        let retried = dedup
            .execute_once(
                "quote:X".to_string(),
                window,
                counting_work(&calls, Duration::ZERO, Ok(42)),
            )
            .await;
        assert_eq!(retried, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.stats().executed, 2);
    }

    #[tokio::test]
    async fn test_panic_reaches_every_waiter() {
        let dedup: Arc<Deduplicator<String, u32>> = Arc::new(Deduplicator::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = dedup.execute_once(
            "k".to_string(),
            Duration::ZERO,
            exploding_work(Duration::from_millis(30)),
        );
        let follower = dedup.execute_once(
            "k".to_string(),
            Duration::ZERO,
            counting_work(&calls, Duration::ZERO, Ok(1)),
        );
        let (leader, follower) = tokio::join!(leader, follower);

        assert_eq!(leader, Err(MarketDataError::NoDataAvailable));
        assert_eq!(follower, Err(MarketDataError::NoDataAvailable));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_cancel_work() {
        let dedup: Arc<Deduplicator<String, u32>> = Arc::new(Deduplicator::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let impatient = tokio::time::timeout(
            Duration::from_millis(10),
            dedup.execute_once(
                "k".to_string(),
                Duration::from_millis(200),
                counting_work(&calls, Duration::from_millis(50), Ok(7)),
            ),
        )
        .await;
        assert!(impatient.is_err());
        assert_eq!(dedup.in_flight(), 1);

        let patient = dedup
            .execute_once(
                "k".to_string(),
                Duration::from_millis(200),
                counting_work(&calls, Duration::ZERO, Ok(8)),
            )
            .await;
        assert_eq!(patient, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
