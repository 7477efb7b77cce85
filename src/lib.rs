//! conc-set: a generic hash set behind a per-instance reader/writer lock,
//! with an opt-out to an unsynchronized mode and set algebra across
//! instances.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one container, `ConcurrentSet<T, S, R>`, whose only real design
//!   content is its locking discipline. Layers:
//!   - Storage: a `hashbrown::HashSet<T, S>` owned exclusively by the set.
//!   - Guard: `lock_api::RwLock<R, _>` around the storage. `R` defaults to
//!     `parking_lot::RawRwLock`; `local_lock::LocalRawRwLock` gives the
//!     unsynchronized mode (`LocalSet`).
//!   - Cross-set: `lock_order` assigns every instance an id and locks groups
//!     of sets in ascending id order; `set_ops` builds comparison and
//!     algebra on top of it.
//!
//! Constraints
//! - `T: Eq + Hash`. Snapshot and algebra operations copy, so they also
//!   need `T: Clone`. Elements must not change hash or equality while
//!   stored.
//! - Mutations take the lock exclusively, once per call (a batch `add`
//!   locks once). Queries take it shared.
//! - Derived sets (`union`, `diff`, `intersect`, `complement`) are filled in
//!   storage nobody else can see and then wrapped; they never alias an
//!   operand.
//! - No ordering among elements, no capacity bound, no eviction.
//!
//! Scoped access
//! - `with_write_lock`/`with_read_lock` hand the raw storage to a closure.
//!   The reference is bounded by the call so it cannot escape the lock; the
//!   guard releases on every exit path including unwinding. `parking_lot`
//!   locks do not poison.
//!
//! Caller obligations
//! - Callbacks run with the lock held (`iterate`, `with_read_lock`,
//!   `with_write_lock`, `add_if_absent_with`). Re-entering the same set from
//!   inside one is a precondition violation: a synchronized set deadlocks,
//!   a `LocalSet` panics. A slow callback stalls every other user.
//! - `LocalSet` is `!Sync`; the compiler keeps it on one thread at a time.
//!
//! Lock ordering
//! - Cross-set operations take their locks in ascending instance id; an
//!   operand appearing more than once is locked once. Opposite-order calls
//!   from two threads (`a.equal(&b)` against `b.equal(&a)`) therefore
//!   cannot deadlock.
//! - N-ary `union`/`diff`/`intersect` hold every operand's shared lock for
//!   the whole call, so no writer can interleave between passes. `merge`
//!   locks `self` with one operand at a time.
//!
//! Notes and non-goals
//! - No persistence, no cross-process sharing, no blocking beyond mutual
//!   exclusion (the `try_*` variants never wait).

mod concurrent_set;
mod concurrent_set_proptest;
pub mod error;
pub mod local_lock;
mod lock_order;
#[cfg(feature = "serde")]
mod serde_impl;
mod set_ops;

// Public surface
pub use concurrent_set::{ConcurrentSet, LocalSet};
pub use error::LockError;
pub use local_lock::LocalRawRwLock;
