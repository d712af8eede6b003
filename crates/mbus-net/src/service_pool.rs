//! Per-thread resolver cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;

use crate::address::ServiceAddress;
use crate::mirror::NameServiceMirror;
use crate::resolver::ServiceResolver;

/// Default number of resolvers cached per thread.
pub const DEFAULT_CAPACITY: usize = 4096;

thread_local! {
    static RESOLVERS: RefCell<HashMap<u64, LruCache<String, ServiceResolver>>> =
        RefCell::new(HashMap::new());
}

static POOL_IDS: AtomicU64 = AtomicU64::new(0);

/// Caches one [`ServiceResolver`] per pattern, per calling thread.
///
/// Patterns repeat heavily on the send path, so each thread keeps its own
/// bounded LRU of resolvers and never takes a lock. Caching the resolver
/// rather than the answer preserves round-robin position and the mirror
/// generation check between calls.
pub struct ServicePool {
    id: u64,
    capacity: NonZeroUsize,
    mirror: Arc<dyn NameServiceMirror>,
}

impl ServicePool {
    pub fn new(capacity: usize, mirror: Arc<dyn NameServiceMirror>) -> Self {
        ServicePool {
            id: POOL_IDS.fetch_add(1, Ordering::Relaxed),
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            mirror,
        }
    }

    /// Resolves `pattern` to a concrete address through this thread's cache.
    pub fn resolve(&self, pattern: &str) -> Option<ServiceAddress> {
        RESOLVERS.with(|cell| {
            let mut caches = cell.borrow_mut();
            let cache = caches
                .entry(self.id)
                .or_insert_with(|| LruCache::new(self.capacity));
            if !cache.contains(pattern) {
                cache.put(
                    pattern.to_string(),
                    ServiceResolver::new(pattern, Arc::clone(&self.mirror)),
                );
            }
            cache.get_mut(pattern).and_then(|resolver| resolver.resolve())
        })
    }
}

impl Drop for ServicePool {
    fn drop(&mut self) {
        // Frees the dropping thread's slot. Slots on other threads die with
        // their threads.
        let _ = RESOLVERS.try_with(|cell| {
            cell.borrow_mut().remove(&self.id);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{LocalMirror, MirrorEntry, NameServiceRegister};
    use std::sync::atomic::AtomicUsize;

    struct CountingMirror {
        inner: LocalMirror,
        lookups: AtomicUsize,
    }

    impl CountingMirror {
        fn new() -> Arc<Self> {
            Arc::new(CountingMirror {
                inner: LocalMirror::new(),
                lookups: AtomicUsize::new(0),
            })
        }
    }

    impl NameServiceMirror for CountingMirror {
        fn lookup(&self, pattern: &str) -> Vec<MirrorEntry> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup(pattern)
        }

        fn updates(&self) -> u64 {
            self.inner.updates()
        }

        fn ready(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_cached_resolver_skips_repeat_lookups() {
        let mirror = CountingMirror::new();
        mirror.inner.register("search/a", "host-a:1");

        let pool = ServicePool::new(16, mirror.clone());
        for _ in 0..5 {
            assert!(pool.resolve("search/*").is_some());
        }
        // One resolver, one lookup; the generation never changed.
        assert_eq!(mirror.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_round_robin_state_survives_caching() {
        let mirror = Arc::new(LocalMirror::new());
        mirror.register("search/a", "host-a:1");
        mirror.register("search/b", "host-b:1");

        let pool = ServicePool::new(16, mirror);
        let first = pool.resolve("search/*").unwrap();
        let second = pool.resolve("search/*").unwrap();
        assert_ne!(first.service_name(), second.service_name());
    }

    #[test]
    fn test_eviction_rebuilds_resolver() {
        let mirror = CountingMirror::new();
        mirror.inner.register("search/a", "host-a:1");
        mirror.inner.register("index/a", "host-b:1");

        // Capacity one: the second pattern evicts the first.
        let pool = ServicePool::new(1, mirror.clone());
        pool.resolve("search/*").unwrap();
        pool.resolve("index/*").unwrap();
        pool.resolve("search/*").unwrap();
        assert_eq!(mirror.lookups.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_pools_are_isolated() {
        let mirror = Arc::new(LocalMirror::new());
        mirror.register("search/a", "host-a:1");

        let pool_a = ServicePool::new(16, mirror.clone());
        let pool_b = ServicePool::new(16, mirror);
        assert!(pool_a.resolve("search/*").is_some());
        assert!(pool_b.resolve("search/*").is_some());
        drop(pool_a);
        // pool_b keeps resolving after pool_a's slot is gone.
        assert!(pool_b.resolve("search/*").is_some());
    }

    #[test]
    fn test_threads_do_their_own_lookups() {
        let mirror = CountingMirror::new();
        mirror.inner.register("search/a", "host-a:1");

        let pool = Arc::new(ServicePool::new(16, mirror.clone()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.resolve("search/*").is_some())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        // Each thread built its own resolver.
        assert_eq!(mirror.lookups.load(Ordering::SeqCst), 4);
    }
}
