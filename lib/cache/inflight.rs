//! Concurrent deduplication of in-flight async computations.
//!
//! Given a key and an async factory, ensures that while a computation for the key is running,
//! every other caller for the same key awaits that same computation via a [`Shared`] future
//! instead of starting its own. Once the computation settles the slot is vacated, so the next
//! caller starts fresh: this map never caches results, callers keep their own cache.

use std::panic::AssertUnwindSafe;
use std::{fmt::Debug, future::Future, hash::Hash, pin::Pin};

use futures::FutureExt as _;
use futures::future::Shared;

type SharedFut<V> = Shared<Pin<Box<dyn Future<Output = Option<V>> + Send>>>;

/// Deduplicating map of running computations.
///
/// The `Shared` output is `Option<V>`; `None` signals that the factory panicked (caught by
/// `catch_unwind`). A panicked slot is removed so the next caller retries.
pub struct InFlight<K, V: Clone + Send + 'static> {
    map: scc::HashMap<K, SharedFut<V>>,
}

impl<K, V> Default for InFlight<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self {
            map: scc::HashMap::default(),
        }
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Debug + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Run `factory` for `key`, or join the computation already running for `key`.
    ///
    /// The factory future is driven by whichever caller polls it; if every caller is dropped
    /// before it completes, the slot keeps the unfinished future and the next caller for the same
    /// key resumes it rather than starting over.
    ///
    /// # Panics
    ///
    /// Panics if the factory this caller joined panicked.
    pub async fn run<F, Fut>(&self, key: K, factory: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = match self.map.entry_async(key.clone()).await {
            scc::hash_map::Entry::Occupied(occ) => {
                tracing::trace!(key = ?occ.key(), "joining in-flight computation");
                occ.get().clone()
            }
            scc::hash_map::Entry::Vacant(vac) => {
                let shared = Self::make_shared(factory);
                let ret = shared.clone();
                vac.insert_entry(shared);
                ret
            }
        };

        let result = shared.clone().await;
        // Only vacate our own slot: a settled computation may already have been replaced by a
        // newer one for the same key.
        drop(
            self.map
                .remove_if_sync(&key, |slot| Shared::ptr_eq(slot, &shared)),
        );

        match result {
            Some(v) => v,
            None => panic!("InFlight: joined a computation that panicked for key {key:?}"),
        }
    }

    /// Wrap a factory future in `catch_unwind`, producing a `Shared` with `Output = Option<V>`.
    fn make_shared<F, Fut>(factory: F) -> SharedFut<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let fut = AssertUnwindSafe(factory()).catch_unwind();
        let boxed: Pin<Box<dyn Future<Output = Option<V>> + Send>> =
            Box::pin(async move { fut.await.ok() });
        boxed.shared()
    }
}
