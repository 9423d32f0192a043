//! Hash map aliases backed by `ahash`.

/// A `hashbrown` map using the `ahash` hasher.
pub type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// A `hashbrown` set using the `ahash` hasher.
pub type FastHashSet<T> = hashbrown::HashSet<T, ahash::RandomState>;
