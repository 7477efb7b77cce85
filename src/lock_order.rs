//! Instance identity and ordered lock acquisition for cross-set operations.
//!
//! Every set gets a process-unique id at construction. Whenever several sets
//! must be locked together, locks are taken in ascending id order; an
//! instance that appears more than once is locked once. Holding to this
//! order across all callers rules out the inversion where one thread runs
//! `a.equal(&b)` while another runs `b.equal(&a)` and each waits on the
//! other's lock behind a queued writer.

use log::trace;
use parking_lot::lock_api::{RawRwLock, RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh instance id. Ids are never reused within a process.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// One side of a paired acquisition: the owner's id and its lock.
pub(crate) type Side<'a, R, D> = (u64, &'a RwLock<R, D>);

/// Run `f` with shared access to both sides, locked in ascending id order.
///
/// When both sides carry the same id, the lock is taken once and `f` sees
/// the same storage twice.
pub(crate) fn read_pair<R, D, U, F>(first: Side<'_, R, D>, second: Side<'_, R, D>, f: F) -> U
where
    R: RawRwLock,
    F: FnOnce(&D, &D) -> U,
{
    let (first_id, first_lock) = first;
    let (second_id, second_lock) = second;

    if first_id == second_id {
        trace!("set {first_id}: paired with itself, single shared lock");
        let g = first_lock.read();
        return f(&g, &g);
    }

    if first_id < second_id {
        trace!("shared locks in order {first_id} -> {second_id}");
        let a = first_lock.read();
        let b = second_lock.read();
        f(&a, &b)
    } else {
        trace!("shared locks in order {second_id} -> {first_id}");
        let b = second_lock.read();
        let a = first_lock.read();
        f(&a, &b)
    }
}

/// Run `f` with shared access to `first` and every side in `rest`, all
/// locks held for the whole call.
///
/// Locks are taken in ascending id order, each distinct id once. `f`
/// receives `first`'s storage and then `rest`'s storage in argument order;
/// repeated ids map to the same storage.
pub(crate) fn read_all<'a, R, D, U, F>(first: Side<'a, R, D>, rest: &[Side<'a, R, D>], f: F) -> U
where
    R: RawRwLock,
    F: FnOnce(&D, &[&D]) -> U,
{
    let sides: Vec<Side<'a, R, D>> = core::iter::once(first).chain(rest.iter().copied()).collect();
    let mut order: Vec<usize> = (0..sides.len()).collect();
    order.sort_by_key(|&i| sides[i].0);

    let mut guards: Vec<Option<RwLockReadGuard<'a, R, D>>> = (0..sides.len()).map(|_| None).collect();
    // For each side, the index of the guard it reads through.
    let mut slot = vec![0usize; sides.len()];
    let mut last: Option<(u64, usize)> = None;
    for &i in &order {
        let (id, lock) = sides[i];
        match last {
            Some((held, g)) if held == id => slot[i] = g,
            _ => {
                trace!("shared lock on set {id}");
                guards[i] = Some(lock.read());
                slot[i] = i;
                last = Some((id, i));
            }
        }
    }

    let views: Vec<&D> = slot.iter().filter_map(|&g| guards[g].as_deref()).collect();
    f(views[0], &views[1..])
}

/// Run `f` with exclusive access to `target` and shared access to `source`,
/// locked in ascending id order.
///
/// Callers must not pass the same instance on both sides; there is no
/// meaningful way to hold one lock both exclusively and shared.
pub(crate) fn write_read_pair<R, D, U, F>(target: Side<'_, R, D>, source: Side<'_, R, D>, f: F) -> U
where
    R: RawRwLock,
    F: FnOnce(&mut D, &D) -> U,
{
    let (target_id, target_lock) = target;
    let (source_id, source_lock) = source;
    debug_assert_ne!(target_id, source_id, "write_read_pair on a single instance");

    if target_id < source_id {
        trace!("exclusive {target_id} then shared {source_id}");
        let mut t = target_lock.write();
        let s = source_lock.read();
        f(&mut t, &s)
    } else {
        trace!("shared {source_id} then exclusive {target_id}");
        let s = source_lock.read();
        let mut t = target_lock.write();
        f(&mut t, &s)
    }
}
