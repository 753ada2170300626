//! Visited-set bookkeeping for traversals.
//!
//! A branch gets a child tracker that shares its ancestors' sets through
//! `Rc`, so entering a branch costs one allocation instead of a copy of
//! everything visited so far.

use std::collections::HashSet;
use std::hash::Hash;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Tracker<K> {
    visited: HashSet<K>,
    parent: Option<Rc<Tracker<K>>>,
}

impl<K> Default for Tracker<K> {
    fn default() -> Self {
        Self {
            visited: HashSet::new(),
            parent: None,
        }
    }
}

impl<K: Eq + Hash> Tracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracker that also treats everything `parent` has seen as visited.
    pub fn child_of(parent: Rc<Tracker<K>>) -> Self {
        Self {
            visited: HashSet::new(),
            parent: Some(parent),
        }
    }

    /// Whether `item` was visited here or by any ancestor.
    pub fn has_visited(&self, item: &K) -> bool {
        let mut tracker = Some(self);
        while let Some(t) = tracker {
            if t.visited.contains(item) {
                return true;
            }
            tracker = t.parent.as_deref();
        }
        false
    }

    /// Record `item`. Returns false if it had already been visited.
    pub fn visit(&mut self, item: K) -> bool {
        if self.parent.as_deref().is_some_and(|p| p.has_visited(&item)) {
            return false;
        }
        self.visited.insert(item)
    }

    /// Forget this tracker's own visits. Ancestors are unaffected.
    pub fn clear(&mut self) {
        self.visited.clear();
    }

    /// Number of items visited by this tracker, excluding ancestors.
    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}
