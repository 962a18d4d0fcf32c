//! Fx-hashed maps for the symbol-keyed tables (method dictionaries, class
//! and global registries). Keys are small interned ids, so a fast
//! non-cryptographic hasher is enough.

pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

#[inline]
pub fn fast_hash_map_new<K, V>() -> FastHashMap<K, V> {
    rustc_hash::FxHashMap::default()
}

/// One-shot Fx hash of a value.
#[inline]
pub fn fast_hash<T: std::hash::Hash + ?Sized>(value: &T) -> u64 {
    use std::hash::{BuildHasher, BuildHasherDefault};
    BuildHasherDefault::<rustc_hash::FxHasher>::default().hash_one(value)
}
