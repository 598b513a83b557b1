use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// Storage for resolved keys. Entries are write-once: inserting a key that is already present
/// leaves the existing entry untouched.
pub trait Cache {
    type K;
    type V;

    fn contains(&self, key: &Self::K) -> bool;

    /// Returns the values associated with the provided keys, in the order of `keys`.
    fn get(&self, keys: &[Self::K]) -> Vec<Option<&Self::V>>;

    /// Inserts the value unless the key is already cached. Returns whether the value was stored.
    fn insert(&mut self, key: Self::K, value: Self::V) -> bool;

    fn insert_many<I: IntoIterator<Item = (Self::K, Self::V)>>(&mut self, key_vals: I) {
        for (key, value) in key_vals.into_iter() {
            self.insert(key, value);
        }
    }
}

impl<K, V, S: BuildHasher> Cache for HashMap<K, V, S>
where
    K: Eq + Hash,
{
    type K = K;
    type V = V;

    fn contains(&self, key: &Self::K) -> bool {
        self.contains_key(key)
    }

    fn get(&self, keys: &[Self::K]) -> Vec<Option<&Self::V>> {
        keys.iter().map(|k| HashMap::get(self, k)).collect::<Vec<_>>()
    }

    fn insert(&mut self, key: Self::K, value: Self::V) -> bool {
        match self.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }
}
