//! Sets serialize as a sequence snapshot taken under the shared lock and
//! deserialize from any sequence, collapsing duplicates.

use crate::concurrent_set::ConcurrentSet;
use core::hash::{BuildHasher, Hash};
use parking_lot::lock_api::RawRwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

impl<T, S, R> Serialize for ConcurrentSet<T, S, R>
where
    T: Serialize,
    R: RawRwLock,
{
    fn serialize<Ser>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error>
    where
        Ser: Serializer,
    {
        let g = self.inner.read();
        serializer.collect_seq(g.iter())
    }
}

impl<'de, T, S, R> Deserialize<'de> for ConcurrentSet<T, S, R>
where
    T: Deserialize<'de> + Eq + Hash,
    S: BuildHasher + Clone + Default,
    R: RawRwLock,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}
