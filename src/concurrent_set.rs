//! ConcurrentSet: hash set storage behind a per-instance reader/writer lock.

use crate::error::LockError;
use crate::local_lock::LocalRawRwLock;
use crate::lock_order::next_id;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use hashbrown::HashSet;
use log::{debug, trace};
use parking_lot::lock_api::{RawRwLock, RwLock};
use std::collections::hash_map::RandomState;

/// A set of unique values guarded by a reader/writer lock.
///
/// Mutations (`add`, `remove`, `clear`, `with_write_lock`, ...) take the lock
/// exclusively; queries (`contains`, `len`, `to_vec`, `iterate`, ...) take it
/// shared. The raw lock `R` selects the mode: the default
/// `parking_lot::RawRwLock` is safe to share between threads, while
/// [`LocalRawRwLock`] (see [`LocalSet`]) elides synchronization for
/// single-threaded use.
///
/// Callbacks passed to `iterate`, `with_read_lock` and `with_write_lock` run
/// while the lock is held. They must not call back into the same set: on a
/// synchronized set that deadlocks, on a [`LocalSet`] it panics. A slow
/// callback stalls every other user of the instance.
pub struct ConcurrentSet<T, S = RandomState, R = parking_lot::RawRwLock> {
    pub(crate) id: u64,
    pub(crate) inner: RwLock<R, HashSet<T, S>>,
}

/// Set without thread synchronization. `!Sync`, so the compiler keeps it on
/// one thread at a time; nested conflicting access panics.
pub type LocalSet<T, S = RandomState> = ConcurrentSet<T, S, LocalRawRwLock>;

impl<T> ConcurrentSet<T>
where
    T: Eq + Hash,
{
    /// Create an empty, synchronized set.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<T> ConcurrentSet<T, RandomState, LocalRawRwLock>
where
    T: Eq + Hash,
{
    /// Create an empty set with locking elided. Not shareable across threads.
    pub fn unsynchronized() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<T, S, R> ConcurrentSet<T, S, R>
where
    T: Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::from_storage(HashSet::with_hasher(hasher))
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self::from_storage(HashSet::with_capacity_and_hasher(capacity, hasher))
    }

    /// Wrap storage nobody else can see yet; no locking is needed to fill it.
    pub(crate) fn from_storage(storage: HashSet<T, S>) -> Self {
        Self {
            id: next_id(),
            inner: RwLock::new(storage),
        }
    }

    /// Fresh, unshared storage using this set's hasher type.
    pub(crate) fn empty_storage() -> HashSet<T, S> {
        HashSet::with_hasher(S::default())
    }

    /// Insert every item under a single exclusive lock. Duplicates collapse.
    ///
    /// `items` is drained before the lock is taken, so it may read this set.
    pub fn add<I>(&self, items: I) -> &Self
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = items.into_iter().collect();
        self.inner.write().extend(items);
        self
    }

    /// Insert `item` if absent. Returns `true` when it was inserted.
    pub fn add_if_absent(&self, item: T) -> bool {
        self.inner.write().insert(item)
    }

    /// Insert `item` if absent and `approve` returns `true`.
    ///
    /// `approve` runs under the exclusive lock and only when `item` is
    /// absent, so the check and the insert are atomic together. It must not
    /// touch this set.
    pub fn add_if_absent_with<F>(&self, item: T, approve: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let mut g = self.inner.write();
        if g.contains(&item) || !approve() {
            return false;
        }
        g.insert(item)
    }

    /// Remove `item` if present; absent items are ignored.
    pub fn remove<Q>(&self, item: &Q) -> &Self
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.inner.write().remove(item);
        self
    }

    /// Replace the storage with a fresh empty one, releasing its memory.
    pub fn clear(&self) -> &Self {
        let mut g = self.inner.write();
        debug!("set {}: clearing {} elements", self.id, g.len());
        let fresh = HashSet::with_hasher(g.hasher().clone());
        *g = fresh;
        self
    }

    /// Replace every element by `f(element)` under one exclusive lock.
    /// Elements that map to the same value collapse.
    pub fn walk<F>(&self, mut f: F) -> &Self
    where
        F: FnMut(&T) -> T,
    {
        let mut g = self.inner.write();
        let mut next = HashSet::with_capacity_and_hasher(g.len(), g.hasher().clone());
        next.extend(g.iter().map(&mut f));
        *g = next;
        self
    }

    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.inner.read().contains(item)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Visit elements under a shared lock held for the whole traversal.
    /// Returning `false` from `visit` stops early.
    pub fn iterate<F>(&self, mut visit: F) -> &Self
    where
        F: FnMut(&T) -> bool,
    {
        let g = self.inner.read();
        for item in g.iter() {
            if !visit(item) {
                break;
            }
        }
        self
    }

    /// Run `f` on the raw storage under the exclusive lock.
    ///
    /// The storage reference cannot outlive the call. The lock is released
    /// on every exit path, including a panic inside `f`.
    pub fn with_write_lock<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&mut HashSet<T, S>),
    {
        let mut g = self.inner.write();
        f(&mut g);
        self
    }

    /// Run `f` on the raw storage under the shared lock.
    pub fn with_read_lock<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&HashSet<T, S>),
    {
        let g = self.inner.read();
        f(&g);
        self
    }

    /// Like [`with_write_lock`](Self::with_write_lock), but fails instead of
    /// waiting when the lock is held.
    pub fn try_with_write_lock<F>(&self, f: F) -> Result<&Self, LockError>
    where
        F: FnOnce(&mut HashSet<T, S>),
    {
        let mut g = self.inner.try_write().ok_or(LockError::WouldBlock)?;
        f(&mut g);
        Ok(self)
    }

    /// Like [`with_read_lock`](Self::with_read_lock), but fails instead of
    /// waiting when the lock is held exclusively.
    pub fn try_with_read_lock<F>(&self, f: F) -> Result<&Self, LockError>
    where
        F: FnOnce(&HashSet<T, S>),
    {
        let g = self.inner.try_read().ok_or(LockError::WouldBlock)?;
        f(&g);
        Ok(self)
    }

    /// Direct access through a unique borrow; no locking involved.
    pub fn get_mut(&mut self) -> &mut HashSet<T, S> {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> HashSet<T, S> {
        self.inner.into_inner()
    }

    /// Move the elements into a thread-safe set. The instance id is kept.
    pub fn into_synchronized(self) -> ConcurrentSet<T, S> {
        self.into_lock()
    }

    /// Move the elements into a set without synchronization.
    pub fn into_unsynchronized(self) -> LocalSet<T, S> {
        self.into_lock()
    }

    fn into_lock<R2: RawRwLock>(self) -> ConcurrentSet<T, S, R2> {
        let id = self.id;
        let storage = self.inner.into_inner();
        debug!("set {id}: switching lock mode with {} elements", storage.len());
        ConcurrentSet {
            id,
            inner: RwLock::new(storage),
        }
    }
}

impl<T, S, R> ConcurrentSet<T, S, R>
where
    T: Eq + Hash + Clone,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    /// Point-in-time copy of the elements in unspecified order.
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.read().iter().cloned().collect()
    }

    /// Remove and return an arbitrary element.
    pub fn pop(&self) -> Option<T> {
        self.pops(1).pop()
    }

    /// Remove and return up to `n` arbitrary elements.
    pub fn pops(&self, n: usize) -> Vec<T> {
        let mut g = self.inner.write();
        let picked: Vec<T> = g.iter().take(n).cloned().collect();
        for item in &picked {
            g.remove(item);
        }
        trace!("set {}: popped {} of {} requested", self.id, picked.len(), n);
        picked
    }

    /// Stringify a snapshot and join the tokens with `separator`.
    pub fn join(&self, separator: &str) -> String
    where
        T: fmt::Display,
    {
        self.to_vec()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl<T, S, R> Default for ConcurrentSet<T, S, R>
where
    T: Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

/// Deep copy taken under the shared lock. The copy is a new instance.
impl<T, S, R> Clone for ConcurrentSet<T, S, R>
where
    T: Eq + Hash + Clone,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    fn clone(&self) -> Self {
        Self::from_storage(self.inner.read().clone())
    }
}

impl<T, S, R> fmt::Debug for ConcurrentSet<T, S, R>
where
    T: fmt::Debug,
    R: RawRwLock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Some(g) => f.debug_set().entries(g.iter()).finish(),
            None => f.write_str("ConcurrentSet { <locked> }"),
        }
    }
}

/// Elements joined by `,`.
impl<T, S, R> fmt::Display for ConcurrentSet<T, S, R>
where
    T: Eq + Hash + Clone + fmt::Display,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join(","))
    }
}

impl<T, S, R> PartialEq for ConcurrentSet<T, S, R>
where
    T: Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl<T, S, R> Eq for ConcurrentSet<T, S, R>
where
    T: Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
}

impl<T, S, R> FromIterator<T> for ConcurrentSet<T, S, R>
where
    T: Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut storage = Self::empty_storage();
        storage.extend(iter);
        Self::from_storage(storage)
    }
}

impl<T, S, R> Extend<T> for ConcurrentSet<T, S, R>
where
    T: Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.get_mut().extend(iter);
    }
}

impl<T, S, R> From<HashSet<T, S>> for ConcurrentSet<T, S, R>
where
    T: Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    fn from(storage: HashSet<T, S>) -> Self {
        Self::from_storage(storage)
    }
}

impl<T, S, R> IntoIterator for ConcurrentSet<T, S, R>
where
    T: Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    type Item = T;
    type IntoIter = hashbrown::hash_set::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_inner().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sorted<T: Ord>(v: Vec<T>) -> Vec<T> {
        let mut v = v;
        v.sort();
        v
    }

    /// Invariant: duplicates collapse and removal of a present item sticks.
    #[test]
    fn add_remove_scenario() {
        let s = ConcurrentSet::new();
        s.add([1, 2, 3]).remove(&2);
        assert_eq!(s.len(), 2);
        assert!(s.contains(&1));
        assert!(!s.contains(&2));
        assert_eq!(sorted(s.to_vec()), vec![1, 3]);
    }

    #[test]
    fn duplicates_collapse() {
        let s = ConcurrentSet::new();
        s.add([5, 5, 5]).add([5, 6]);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn add_items_may_read_the_same_set() {
        let s = ConcurrentSet::new();
        s.add([1, 2]);
        let incoming = [2, 3, 4];
        s.add(incoming.iter().filter(|x| !s.contains(*x)).copied());
        assert_eq!(sorted(s.to_vec()), vec![1, 2, 3, 4]);

        let local: LocalSet<i32> = ConcurrentSet::unsynchronized();
        local.add([1]);
        local.add(incoming.iter().filter(|x| !local.contains(*x)).copied());
        assert_eq!(sorted(local.to_vec()), vec![1, 2, 3, 4]);
    }

    #[test]
    fn remove_absent_is_noop() {
        let s: ConcurrentSet<i32> = ConcurrentSet::new();
        s.remove(&42);
        assert!(s.is_empty());
    }

    #[test]
    fn clear_then_reuse() {
        let s = ConcurrentSet::with_capacity(16);
        s.add(0..10);
        s.clear();
        assert_eq!(s.len(), 0);
        s.add([3]);
        assert_eq!(s.to_vec(), vec![3]);
    }

    #[test]
    fn borrowed_lookup() {
        let s = ConcurrentSet::new();
        s.add(["a".to_string(), "b".to_string()]);
        assert!(s.contains("a"));
        s.remove("a");
        assert!(!s.contains("a"));
    }

    #[test]
    fn add_if_absent_reports_insertion() {
        let s = ConcurrentSet::new();
        assert!(s.add_if_absent(1));
        assert!(!s.add_if_absent(1));
        assert!(!s.add_if_absent_with(2, || false));
        assert!(!s.contains(&2));
        assert!(s.add_if_absent_with(2, || true));
        let mut called = false;
        assert!(!s.add_if_absent_with(2, || {
            called = true;
            true
        }));
        assert!(!called, "approval must not run for present items");
    }

    #[test]
    fn iterate_stops_early() {
        let s = ConcurrentSet::new();
        s.add(0..100);
        let mut seen = 0;
        s.iterate(|_| {
            seen += 1;
            seen < 10
        });
        assert_eq!(seen, 10);
    }

    #[test]
    fn iterate_visits_all_when_never_stopped() {
        let s = ConcurrentSet::new();
        s.add(0..20);
        let mut seen = BTreeSet::new();
        s.iterate(|x| seen.insert(*x));
        assert_eq!(seen, (0..20).collect());
    }

    #[test]
    fn scoped_access_sees_raw_storage() {
        let s = ConcurrentSet::new();
        s.add([1, 2, 3]);
        s.with_write_lock(|m| {
            m.retain(|x| x % 2 == 1);
            m.insert(9);
        });
        let mut total = 0;
        s.with_read_lock(|m| total = m.iter().sum());
        assert_eq!(total, 1 + 3 + 9);
    }

    #[test]
    fn write_lock_released_after_panic() {
        let s = ConcurrentSet::new();
        s.add([1]);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.with_write_lock(|m| {
                m.insert(2);
                panic!("callback failure");
            });
        }));
        assert!(res.is_err());
        // Lock must be free again
        assert!(s.try_with_write_lock(|m| {
            m.insert(3);
        })
        .is_ok());
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn try_lock_reports_contention() {
        let s = ConcurrentSet::new();
        s.add([1]);
        s.with_read_lock(|_| {
            assert_eq!(
                s.try_with_write_lock(|_| {}).err(),
                Some(LockError::WouldBlock)
            );
            assert!(s.try_with_read_lock(|m| assert_eq!(m.len(), 1)).is_ok());
        });
    }

    #[test]
    fn walk_rewrites_and_collapses() {
        let s = ConcurrentSet::new();
        s.add([1, 2, 3, 4]);
        s.walk(|x| x / 2);
        assert_eq!(sorted(s.to_vec()), vec![0, 1, 2]);
    }

    #[test]
    fn pop_and_pops_drain() {
        let s = ConcurrentSet::new();
        s.add(0..5);
        let first = s.pop().expect("non-empty");
        assert!(!s.contains(&first));
        let rest = s.pops(10);
        assert_eq!(rest.len(), 4);
        assert!(s.is_empty());
        assert_eq!(s.pop(), None);
        assert!(s.pops(3).is_empty());
    }

    #[test]
    fn join_and_display() {
        let s = ConcurrentSet::new();
        s.add([7]);
        assert_eq!(s.join("|"), "7");
        s.add([8]);
        let joined = s.join("|");
        assert!(joined == "7|8" || joined == "8|7");
        let shown = s.to_string();
        assert!(shown == "7,8" || shown == "8,7");
        let empty: ConcurrentSet<i32> = ConcurrentSet::new();
        assert_eq!(empty.join(","), "");
    }

    #[test]
    fn debug_reports_locked() {
        let s = ConcurrentSet::new();
        s.add([1]);
        assert_eq!(format!("{s:?}"), "{1}");
        s.with_write_lock(|_| {
            assert_eq!(format!("{s:?}"), "ConcurrentSet { <locked> }");
        });
    }

    #[test]
    fn clone_is_independent() {
        let a = ConcurrentSet::new();
        a.add([1, 2]);
        let b = a.clone();
        b.add([3]);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 3);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn collect_extend_and_into_iter() {
        let mut s: ConcurrentSet<u8> = (0..4).collect();
        s.extend([4, 4]);
        assert_eq!(s.len(), 5);
        let mut all: Vec<u8> = s.into_iter().collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn mode_conversion_keeps_elements_and_id() {
        let s = ConcurrentSet::new();
        s.add(["x", "y"]);
        let id = s.id;
        let local = s.into_unsynchronized();
        assert_eq!(local.id, id);
        assert!(local.contains("x"));
        let back = local.into_synchronized();
        assert_eq!(back.len(), 2);
        assert_eq!(back.id, id);
    }

    #[test]
    fn local_set_basic_ops() {
        let s: LocalSet<i32> = ConcurrentSet::unsynchronized();
        s.add([1, 2, 3]).remove(&1);
        assert_eq!(sorted(s.to_vec()), vec![2, 3]);
        s.clear();
        assert!(s.is_empty());
    }

    #[test]
    fn local_set_reentrant_write_panics() {
        let s: LocalSet<i32> = ConcurrentSet::unsynchronized();
        s.add([1, 2]);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.iterate(|x| {
                s.add([*x + 10]);
                true
            });
        }));
        assert!(res.is_err(), "mutating from inside iterate must panic");
        // The read guard was released while unwinding
        s.add([3]);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn local_set_nested_reads_are_fine() {
        let s: LocalSet<i32> = ConcurrentSet::unsynchronized();
        s.add([1, 2]);
        let mut hits = 0;
        s.iterate(|x| {
            if s.contains(x) {
                hits += 1;
            }
            true
        });
        assert_eq!(hits, 2);
    }
}
