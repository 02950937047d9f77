use std::{
    collections::{HashMap, HashSet},
    hash::{BuildHasherDefault, Hasher},
};

/// A `HashMap` keyed by integers that are already well distributed, such as
/// primary-key hashes.
///
/// The key value itself is used as the hash, so clustered keys (small dense
/// ranges) degrade lookup performance.
///
/// # Examples
///
/// ```
/// use amudai_collections::identity_hash::IdentityHashMap;
///
/// let mut map: IdentityHashMap<u64, u32> = IdentityHashMap::default();
/// map.insert(0x9e37_79b9_7f4a_7c15, 0);
/// assert_eq!(map.get(&0x9e37_79b9_7f4a_7c15), Some(&0));
/// ```
pub type IdentityHashMap<K, V> = HashMap<K, V, BuildHasherDefault<IdentityHasher>>;

/// A `HashSet` counterpart of [`IdentityHashMap`].
pub type IdentityHashSet<K> = HashSet<K, BuildHasherDefault<IdentityHasher>>;

/// A hasher that returns the written integer unchanged.
///
/// # Panics
///
/// Only primitive integers up to 64 bits can be hashed. Hashing anything that
/// goes through [`Hasher::write`] (strings, slices, composite keys) panics.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, _bytes: &[u8]) {
        panic!("IdentityHasher only hashes primitive integers up to 64 bits");
    }

    #[inline]
    fn write_u8(&mut self, i: u8) {
        self.0 = u64::from(i);
    }

    #[inline]
    fn write_u16(&mut self, i: u16) {
        self.0 = u64::from(i);
    }

    #[inline]
    fn write_u32(&mut self, i: u32) {
        self.0 = u64::from(i);
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        self.0 = i as u64;
    }

    #[inline]
    fn write_i32(&mut self, i: i32) {
        self.write_u32(i as u32);
    }

    #[inline]
    fn write_i64(&mut self, i: i64) {
        self.write_u64(i as u64);
    }
}

#[cfg(test)]
mod tests {
    use std::hash::{BuildHasher, Hash};

    use super::*;

    #[test]
    fn test_hash_is_key() {
        let build = BuildHasherDefault::<IdentityHasher>::default();
        assert_eq!(build.hash_one(42u64), 42);
        assert_eq!(build.hash_one(u64::MAX), u64::MAX);
        assert_eq!(build.hash_one(7u32), 7);
        assert_eq!(build.hash_one(-1i32), u64::from(u32::MAX));
    }

    #[test]
    fn test_map_random_keys() {
        fastrand::seed(90210);
        let keys = (0..5000).map(|_| fastrand::u64(..)).collect::<Vec<_>>();
        let mut map = IdentityHashMap::<u64, usize>::default();
        for (i, &key) in keys.iter().enumerate() {
            map.insert(key, i);
        }
        for (i, key) in keys.iter().enumerate().rev() {
            let slot = map[key];
            assert!(slot >= i && keys[slot] == *key);
        }

        let set = keys.iter().copied().collect::<IdentityHashSet<u64>>();
        assert_eq!(set.len(), map.len());
    }

    #[test]
    #[should_panic(expected = "only hashes primitive integers")]
    fn test_non_integer_key_panics() {
        let mut hasher = IdentityHasher::default();
        "pk".hash(&mut hasher);
    }
}
