//! Memoizer
//!
//! Caches the results of a pure function keyed by its arguments.
//!
//! # How It Works
//!
//! 1. Each call derives a string key from the arguments. By default the key
//!    is the `Debug` rendering of the arguments; a key function overrides it.
//!
//! 2. On a hit the cached value is cloned out and the entry becomes the most
//!    recently used.
//!
//! 3. On a miss the function runs without the cache lock held (so a memoized
//!    function may call itself recursively), then the result is stored.
//!
//! 4. With `max_size` set, inserting past the bound evicts the least
//!    recently used entry. Without it the cache grows without limit; that is
//!    the caller's trade-off to make.
//!
//! Each entry carries a use stamp from a monotonic counter, and a `BTreeMap`
//! from stamp to key orders entries by recency. A hit restamps its entry and
//! eviction pops the smallest stamp, both in logarithmic time.
//!
//! # Thread Safety
//!
//! Unlike the rest of the runtime, a `Memo` is `Send + Sync`. Pure functions
//! can be shared freely, so the cache sits behind a mutex.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug};

use parking_lot::Mutex;

type ComputeFn<A, R> = Box<dyn Fn(&A) -> R + Send + Sync>;
type KeyFn<A> = Box<dyn Fn(&A) -> String + Send + Sync>;

struct Entry<R> {
    value: R,
    stamp: u64,
}

/// Cached results ordered by last use.
struct Cache<R> {
    entries: HashMap<String, Entry<R>>,
    recency: BTreeMap<u64, String>,
    next_stamp: u64,
}

impl<R> Cache<R> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_stamp: 0,
        }
    }

    fn stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    /// Look up `key` and mark it most recently used.
    fn touch(&mut self, key: &str) -> Option<&R> {
        let stamp = self.stamp();
        let entry = self.entries.get_mut(key)?;
        if let Some(owned) = self.recency.remove(&entry.stamp) {
            self.recency.insert(stamp, owned);
        }
        entry.stamp = stamp;
        Some(&entry.value)
    }

    fn insert(&mut self, key: String, value: R) {
        let stamp = self.stamp();
        if let Some(old) = self.entries.remove(&key) {
            self.recency.remove(&old.stamp);
        }
        self.recency.insert(stamp, key.clone());
        self.entries.insert(key, Entry { value, stamp });
    }

    /// Drop least recently used entries until at most `max_size` remain.
    fn evict_to(&mut self, max_size: usize) {
        while self.entries.len() > max_size {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&key);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }
}

/// Options for [`memo_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoOptions {
    /// Upper bound on cached entries. `None` means unbounded.
    pub max_size: Option<usize>,
}

impl MemoOptions {
    pub fn bounded(max_size: usize) -> Self {
        Self {
            max_size: Some(max_size),
        }
    }
}

/// A memoized function.
///
/// # Type Parameters
///
/// - `A`: the argument type; use a tuple for several arguments.
/// - `R`: the result type. Must be `Clone` because hits hand out copies.
pub struct Memo<A, R> {
    compute: ComputeFn<A, R>,
    key: KeyFn<A>,
    cache: Mutex<Cache<R>>,
    max_size: Option<usize>,
}

/// Memoize `compute` with the default key and no size bound.
pub fn memo<A, R, F>(compute: F) -> Memo<A, R>
where
    A: Debug + 'static,
    R: Clone,
    F: Fn(&A) -> R + Send + Sync + 'static,
{
    Memo::new(compute)
}

/// Memoize `compute` with an optional key function and options.
pub fn memo_with<A, R, F, K>(compute: F, key: Option<K>, options: MemoOptions) -> Memo<A, R>
where
    A: Debug + 'static,
    R: Clone,
    F: Fn(&A) -> R + Send + Sync + 'static,
    K: Fn(&A) -> String + Send + Sync + 'static,
{
    let memo = Memo::new(compute);
    let memo = match key {
        Some(key) => memo.with_key(key),
        None => memo,
    };
    match options.max_size {
        Some(max_size) => memo.with_max_size(max_size),
        None => memo,
    }
}

impl<A, R> Memo<A, R>
where
    R: Clone,
{
    /// Create an unbounded memo keyed by the `Debug` rendering of `A`.
    pub fn new<F>(compute: F) -> Self
    where
        A: Debug + 'static,
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        Self {
            compute: Box::new(compute),
            key: Box::new(|args: &A| format!("{args:?}")),
            cache: Mutex::new(Cache::new()),
            max_size: None,
        }
    }

    /// Derive cache keys with `key` instead of the default.
    pub fn with_key<K>(mut self, key: K) -> Self
    where
        K: Fn(&A) -> String + Send + Sync + 'static,
    {
        self.key = Box::new(key);
        self
    }

    /// Bound the cache to `max_size` entries with LRU eviction.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Call the memoized function.
    pub fn call(&self, args: &A) -> R {
        let key = (self.key)(args);

        if let Some(value) = self.cache.lock().touch(&key) {
            return value.clone();
        }

        let value = (self.compute)(args);

        let mut cache = self.cache.lock();
        cache.insert(key, value.clone());
        if let Some(max_size) = self.max_size {
            cache.evict_to(max_size);
        }
        value
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Check if `args` currently has a cached result. Does not touch recency.
    pub fn contains(&self, args: &A) -> bool {
        let key = (self.key)(args);
        self.cache.lock().contains(&key)
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }
}

impl<A, R> Debug for Memo<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("len", &self.cache.lock().len())
            .field("max_size", &self.max_size)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counted(calls: &Arc<AtomicI32>) -> impl Fn(&i32) -> i32 + Send + Sync + 'static {
        let calls = calls.clone();
        move |x: &i32| {
            calls.fetch_add(1, Ordering::SeqCst);
            x * 10
        }
    }

    #[test]
    fn memo_computes_once_per_key() {
        let calls = Arc::new(AtomicI32::new(0));
        let m = memo(counted(&calls));

        for _ in 0..5 {
            assert_eq!(m.call(&4), 40);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(m.call(&5), 50);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unbounded_memo_never_evicts() {
        let calls = Arc::new(AtomicI32::new(0));
        let m = memo(counted(&calls));

        for i in 0..1000 {
            m.call(&i);
        }
        assert_eq!(m.len(), 1000);
        m.call(&0);
        assert_eq!(calls.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn bounded_memo_evicts_least_recently_used() {
        let calls = Arc::new(AtomicI32::new(0));
        let m = Memo::new(counted(&calls)).with_max_size(2);

        m.call(&1);
        m.call(&2);
        // Touch 1 so 2 becomes the oldest
        m.call(&1);
        m.call(&3);

        assert_eq!(m.len(), 2);
        assert!(m.contains(&1));
        assert!(!m.contains(&2));
        assert!(m.contains(&3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // The evicted key recomputes
        m.call(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn large_bounded_memo_keeps_recency_order() {
        let calls = Arc::new(AtomicI32::new(0));
        let m = Memo::new(counted(&calls)).with_max_size(10_000);

        for i in 0..10_000 {
            m.call(&i);
        }
        // Refresh the even keys, oldest first.
        for i in (0..10_000).step_by(2) {
            m.call(&i);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 10_000);

        // New keys push out the odd keys in insertion order.
        for i in 10_000..10_003 {
            m.call(&i);
        }
        assert_eq!(m.len(), 10_000);
        assert!(!m.contains(&1));
        assert!(!m.contains(&3));
        assert!(!m.contains(&5));
        assert!(m.contains(&7));
        assert!(m.contains(&0));
    }

    #[test]
    fn custom_key_function_collapses_arguments() {
        let calls = Arc::new(AtomicI32::new(0));
        let c = calls.clone();
        let m = memo_with(
            move |(name, _noise): &(String, u32)| {
                c.fetch_add(1, Ordering::SeqCst);
                name.len()
            },
            Some(|(name, _): &(String, u32)| name.clone()),
            MemoOptions::default(),
        );

        assert_eq!(m.call(&("abc".to_string(), 1)), 3);
        assert_eq!(m.call(&("abc".to_string(), 2)), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recursive_memo_does_not_deadlock() {
        use std::sync::OnceLock;

        static FIB: OnceLock<Memo<u64, u64>> = OnceLock::new();
        let fib = FIB.get_or_init(|| {
            Memo::new(|n: &u64| {
                if *n < 2 {
                    *n
                } else {
                    let fib = FIB.get().expect("initialized");
                    fib.call(&(n - 1)) + fib.call(&(n - 2))
                }
            })
        });

        assert_eq!(fib.call(&50), 12_586_269_025);
    }

    #[test]
    fn clear_forces_recomputation() {
        let calls = Arc::new(AtomicI32::new(0));
        let m = memo(counted(&calls));
        m.call(&1);
        m.clear();
        assert!(m.is_empty());
        m.call(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
