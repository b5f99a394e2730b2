//! Read caches
//!
//! Bounded LRU maps in front of the files: ID → bytes for `get_data` and
//! bytes → ID for `get_id`. Only intact values are cached.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

/// The two value store caches; a capacity of 0 disables one
pub(crate) struct ValueCaches {
    values: Option<Mutex<LruCache<u32, Vec<u8>>>>,
    ids: Option<Mutex<LruCache<Vec<u8>, u32>>>,
}

impl ValueCaches {
    pub(crate) fn new(value_capacity: usize, id_capacity: usize) -> Self {
        Self {
            values: NonZeroUsize::new(value_capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            ids: NonZeroUsize::new(id_capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub(crate) fn value(&self, id: u32) -> Option<Vec<u8>> {
        self.values.as_ref()?.lock().get(&id).cloned()
    }

    pub(crate) fn id(&self, data: &[u8]) -> Option<u32> {
        self.ids.as_ref()?.lock().get(data).copied()
    }

    pub(crate) fn insert_value(&self, id: u32, data: &[u8]) {
        if let Some(values) = &self.values {
            values.lock().put(id, data.to_vec());
        }
    }

    pub(crate) fn insert_id(&self, data: &[u8], id: u32) {
        if let Some(ids) = &self.ids {
            ids.lock().put(data.to_vec(), id);
        }
    }

    /// Remember that `id` holds `data`, in both directions
    pub(crate) fn insert(&self, id: u32, data: &[u8]) {
        self.insert_value(id, data);
        self.insert_id(data, id);
    }

    pub(crate) fn clear(&self) {
        if let Some(values) = &self.values {
            values.lock().clear();
        }
        if let Some(ids) = &self.ids {
            ids.lock().clear();
        }
    }
}
