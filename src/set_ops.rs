//! Comparison and set algebra across instances.
//!
//! Binary operations lock the pair through `lock_order` (lower instance id
//! first, same instance once). N-ary `union`, `diff` and `intersect` take
//! every distinct operand's shared lock, `self` included, in id order before
//! reading anything and keep them until the result is filled, so the result
//! reflects one state of each operand. `merge` mutates `self` one operand at
//! a time. Results are fresh instances filled in unshared storage and
//! wrapped at the end; they keep no link to their operands.
//!
//! N-ary `diff` and `intersect` merge per-operand passes:
//! `a.diff(&[b, c])` is `(a - b) ∪ (a - c)`, not `a - (b ∪ c)`, and
//! `a.intersect(&[b, c])` is `(a ∩ b) ∪ (a ∩ c)`, not `a ∩ b ∩ c`.
//! Chain binary calls when the other reading is wanted.

use crate::concurrent_set::ConcurrentSet;
use crate::lock_order::{read_all, read_pair, write_read_pair};
use core::hash::{BuildHasher, Hash};
use hashbrown::HashSet;
use parking_lot::lock_api::RawRwLock;

impl<T, S, R> ConcurrentSet<T, S, R>
where
    T: Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    /// Same elements. Sizes are compared first, then membership, with both
    /// shared locks held.
    pub fn equal(&self, other: &Self) -> bool {
        if self.id == other.id {
            return true;
        }
        read_pair((self.id, &self.inner), (other.id, &other.inner), |mine, theirs| {
            mine.len() == theirs.len() && mine.iter().all(|x| theirs.contains(x))
        })
    }

    /// Every element of `self` is in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        if self.id == other.id {
            return true;
        }
        read_pair((self.id, &self.inner), (other.id, &other.inner), |mine, theirs| {
            mine.iter().all(|x| theirs.contains(x))
        })
    }
}

impl<T, S, R> ConcurrentSet<T, S, R>
where
    T: Eq + Hash + Clone,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    /// Elements in `self` or in any of `others`. With no operands the result
    /// is a copy of `self`.
    pub fn union(&self, others: &[&Self]) -> Self {
        self.with_operands(others, |mine, theirs, out| {
            out.extend(mine.iter().cloned());
            for other in theirs {
                out.extend(other.iter().cloned());
            }
        })
    }

    /// Elements of `self` missing from at least one of `others`, merged over
    /// per-operand passes. No operands gives an empty set.
    pub fn diff(&self, others: &[&Self]) -> Self {
        self.with_operands(others, |mine, theirs, out| {
            for other in theirs {
                out.extend(mine.iter().filter(|x| !other.contains(*x)).cloned());
            }
        })
    }

    /// Elements of `self` also found in at least one of `others`, merged over
    /// per-operand passes. No operands gives an empty set.
    pub fn intersect(&self, others: &[&Self]) -> Self {
        self.with_operands(others, |mine, theirs, out| {
            for other in theirs {
                out.extend(mine.iter().filter(|x| other.contains(*x)).cloned());
            }
        })
    }

    /// Fill a fresh set from `self` and `others`, with every distinct
    /// operand read-locked for the whole fill.
    fn with_operands<F>(&self, others: &[&Self], fill: F) -> Self
    where
        F: FnOnce(&HashSet<T, S>, &[&HashSet<T, S>], &mut HashSet<T, S>),
    {
        let mut out = Self::empty_storage();
        let sides: Vec<_> = others.iter().map(|o| (o.id, &o.inner)).collect();
        read_all((self.id, &self.inner), &sides, |mine, theirs| {
            fill(mine, theirs, &mut out)
        });
        Self::from_storage(out)
    }

    /// Elements of `full` not in `self`. When `full` is not a superset of
    /// `self` this is plain `full - self`.
    pub fn complement(&self, full: &Self) -> Self {
        let mut out = Self::empty_storage();
        read_pair((self.id, &self.inner), (full.id, &full.inner), |mine, theirs| {
            out.extend(theirs.iter().filter(|x| !mine.contains(*x)).cloned());
        });
        Self::from_storage(out)
    }

    /// In-place union: add every element of each of `others` to `self`.
    pub fn merge(&self, others: &[&Self]) -> &Self {
        for other in others {
            if self.id == other.id {
                continue;
            }
            write_read_pair((self.id, &self.inner), (other.id, &other.inner), |mine, theirs| {
                mine.extend(theirs.iter().cloned());
            });
        }
        self
    }
}
