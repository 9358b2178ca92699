// src/files/cache.rs

//! Bounded (parent, name) -> child resolution cache
//!
//! Only live (non-trashed) children are cached. Entries are evicted
//! explicitly whenever the child is trashed or revived.

use super::PathType;
use lru::LruCache;
use std::num::NonZeroUsize;

#[derive(Debug)]
pub struct PathCache {
    entries: LruCache<(i32, String), (i32, PathType)>,
}

impl PathCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, parent: i32, name: &str) -> Option<(i32, PathType)> {
        self.entries.get(&(parent, name.to_string())).copied()
    }

    pub fn put(&mut self, parent: i32, name: &str, child: i32, path_type: PathType) {
        self.entries
            .put((parent, name.to_string()), (child, path_type));
    }

    pub fn invalidate(&mut self, parent: i32, name: &str) {
        self.entries.pop(&(parent, name.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_invalidate() {
        let mut cache = PathCache::new(NonZeroUsize::new(4).unwrap());
        cache.put(0, "src", 1, PathType::Directory);
        assert_eq!(cache.get(0, "src"), Some((1, PathType::Directory)));
        assert_eq!(cache.get(1, "src"), None);

        cache.invalidate(0, "src");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_bound() {
        let mut cache = PathCache::new(NonZeroUsize::new(2).unwrap());
        cache.put(0, "a", 1, PathType::File);
        cache.put(0, "b", 2, PathType::File);
        cache.get(0, "a");
        cache.put(0, "c", 3, PathType::File);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(0, "b"), None);
        assert_eq!(cache.get(0, "a"), Some((1, PathType::File)));
    }
}
