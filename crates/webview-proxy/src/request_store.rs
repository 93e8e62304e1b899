//! Pending-request correlation for proxied webview fetches.
//!
//! The webview cannot reach the hosting window directly: every proxied fetch
//! goes out as a message carrying a request id, and the matching response
//! arrives on a separate channel some time later, or never (the host page
//! navigated away, or the message was dropped). `RequestStore` hands out the
//! ids, parks a shared future per outstanding request, and reaps entries
//! that were never answered so the table cannot grow without bound.
//!
//! One store instance serves one logical request/response channel; the proxy
//! holds separate stores for resource loads and localhost lookups.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use log::debug;
use tokio::task::JoinHandle;

/// Correlation id for one outstanding request.
///
/// Strictly increasing per store instance, first issued id is 1, never
/// reused while the store lives.
pub type RequestId = u64;

/// How long an unanswered entry stays in the table before it is reaped.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Future side of one correlation entry.
///
/// Resolves to `Some(value)` when the matching response is delivered and to
/// `None` once the entry expired unanswered. Clonable: the future returned
/// by [`RequestStore::create`] and any later [`RequestStore::get`] observe
/// the same resolution.
pub struct ResponseFuture<T: Clone> {
    inner: Shared<oneshot::Receiver<T>>,
}

impl<T: Clone> Clone for ResponseFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Future for ResponseFuture<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the reaper removed the entry; surface that
        // as an explicit None instead of hanging forever.
        Pin::new(&mut self.get_mut().inner)
            .poll(cx)
            .map(|result| result.ok())
    }
}

struct Entry<T: Clone> {
    /// Resolution side; consumed by `resolve`, dropped by the reaper.
    tx: oneshot::Sender<T>,
    /// Shared future handed to `create` and `get` callers.
    future: ResponseFuture<T>,
    /// Identity of this entry. Ids are never reused, so the token only
    /// matters as an invariant check: a reaper firing late must not remove
    /// an entry it was not armed for.
    token: u64,
    /// Scoped cleanup timer; aborted when the entry resolves first.
    reaper: JoinHandle<()>,
}

/// Correlates request/response pairs across an asynchronous message
/// boundary without leaking memory when responses never arrive.
pub struct RequestStore<T: Clone> {
    entries: Arc<Mutex<HashMap<RequestId, Entry<T>>>>,
    next_id: AtomicU64,
    next_token: AtomicU64,
    resolve_timeout: Duration,
}

impl<T: Clone + Send + Sync + 'static> RequestStore<T> {
    /// Create a store with the default 30 second resolve timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_RESOLVE_TIMEOUT)
    }

    /// Create a store with a custom resolve timeout.
    pub fn with_timeout(resolve_timeout: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            next_token: AtomicU64::new(0),
            resolve_timeout,
        }
    }

    /// Allocate a correlation id and park a future for its response.
    ///
    /// The caller embeds the id in the outgoing message and awaits the
    /// future. Must be called from within a tokio runtime: the cleanup
    /// task for the entry is spawned here.
    pub fn create(&self) -> (RequestId, ResponseFuture<T>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let future = ResponseFuture { inner: rx.shared() };

        let entries = self.entries.clone();
        let timeout = self.resolve_timeout;
        let reaper = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut entries = entries.lock().unwrap();
            // Remove the entry only if it is still the one this timer was
            // armed for. Dropping the sender settles the shared future to
            // None for anyone still waiting.
            if entries.get(&id).is_some_and(|e| e.token == token) {
                debug!("[request-store] Request {} expired unanswered", id);
                entries.remove(&id);
            }
        });

        let entry = Entry {
            tx,
            future: future.clone(),
            token,
            reaper,
        };
        self.entries.lock().unwrap().insert(id, entry);

        (id, future)
    }

    /// Look up the shared future for a still-pending request.
    ///
    /// Returns `None` when the id was never issued, already resolved, or
    /// already expired.
    pub fn get(&self, id: RequestId) -> Option<ResponseFuture<T>> {
        self.entries
            .lock()
            .unwrap()
            .get(&id)
            .map(|entry| entry.future.clone())
    }

    /// Deliver `value` to the request's waiting future.
    ///
    /// Returns `false` when no entry exists for `id` (unknown, already
    /// resolved, or expired). Late responses are ordinary under message
    /// loss; the caller logs a diagnostic and drops them.
    pub fn resolve(&self, id: RequestId, value: T) -> bool {
        let entry = self.entries.lock().unwrap().remove(&id);
        match entry {
            Some(entry) => {
                entry.reaper.abort();
                // Every waiter may have dropped its future already; the
                // entry still counts as resolved.
                let _ = entry.tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Number of outstanding requests.
    pub fn pending(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for RequestStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_strictly_increasing_from_one() {
        let store: RequestStore<String> = RequestStore::new();
        let ids: Vec<RequestId> = (0..5).map(|_| store.create().0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_resolve_delivers_value_once() {
        let store: RequestStore<String> = RequestStore::new();
        let (id, future) = store.create();

        assert!(store.resolve(id, "hello".to_string()));
        assert_eq!(future.await, Some("hello".to_string()));

        // Second resolve on the same id is a no-op.
        assert!(!store.resolve(id, "again".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_has_no_side_effect() {
        let store: RequestStore<String> = RequestStore::new();
        let (_, _future) = store.create();

        assert!(!store.resolve(999, "ghost".to_string()));
        assert_eq!(store.pending(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_resolution() {
        let store: RequestStore<String> = RequestStore::new();
        let (id1, future1) = store.create();
        let (id2, future2) = store.create();
        assert_eq!((id1, id2), (1, 2));

        assert!(store.resolve(2, "B".to_string()));
        assert_eq!(future2.await, Some("B".to_string()));

        assert!(store.resolve(1, "A".to_string()));
        assert_eq!(future1.await, Some("A".to_string()));

        assert!(!store.resolve(1, "A".to_string()));
    }

    #[tokio::test]
    async fn test_get_observes_same_resolution_as_create() {
        let store: RequestStore<u32> = RequestStore::new();
        let (id, created) = store.create();
        let looked_up = store.get(id).expect("entry should be pending");

        assert!(store.resolve(id, 7));
        assert_eq!(created.await, Some(7));
        assert_eq!(looked_up.await, Some(7));

        // Resolved entries are gone from the table.
        assert!(store.get(id).is_none());
    }

    #[tokio::test]
    async fn test_expiry_reaps_entry_and_settles_future() {
        let store: RequestStore<String> = RequestStore::with_timeout(Duration::from_millis(10));
        let (id, future) = store.create();
        assert!(store.get(id).is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.get(id).is_none());
        assert_eq!(store.pending(), 0);
        assert!(!store.resolve(id, "X".to_string()));
        assert_eq!(future.await, None);
    }

    #[tokio::test]
    async fn test_resolve_cancels_reaper() {
        let store: RequestStore<String> = RequestStore::with_timeout(Duration::from_millis(10));
        let (id, future) = store.create();

        assert!(store.resolve(id, "fast".to_string()));
        assert_eq!(future.await, Some("fast".to_string()));

        // Give the (aborted) reaper a chance to have fired; creating a new
        // entry afterwards must be unaffected by the old timer.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (id2, _future2) = store.create();
        assert_ne!(id, id2);
        assert_eq!(store.pending(), 1);
    }

    #[tokio::test]
    async fn test_entry_tokens_are_unique() {
        let store: RequestStore<u8> = RequestStore::new();
        let (id1, _f1) = store.create();
        let (id2, _f2) = store.create();

        let entries = store.entries.lock().unwrap();
        let token1 = entries.get(&id1).unwrap().token;
        let token2 = entries.get(&id2).unwrap().token;
        assert_ne!(token1, token2);
    }

    #[tokio::test]
    async fn test_stores_are_independent() {
        let a: RequestStore<u8> = RequestStore::new();
        let b: RequestStore<u8> = RequestStore::new();

        let (id_a, _fa) = a.create();
        let (id_b, future_b) = b.create();
        assert_eq!(id_a, 1);
        assert_eq!(id_b, 1);

        assert!(a.resolve(1, 42));
        assert_eq!(b.pending(), 1);
        assert!(b.resolve(1, 43));
        assert_eq!(future_b.await, Some(43));
    }
}
