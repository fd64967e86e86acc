//! Ordered lease collection
//!
//! A small sorted vector whose ordering depends on state the items mutate
//! themselves. The collection cannot see those mutations, so whoever
//! changes an item must call [`OrderedLeaseCollection::notify_changed`]
//! before the next ordered read.
//!
//! Sizes are bounded by the configured channel count (usually single
//! digits), so insertion into a `Vec` beats any tree or heap here.

use std::cmp::Ordering;
use std::fmt;

/// Comparator over mutable item state
pub type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Items kept in ascending comparator order
pub struct OrderedLeaseCollection<T> {
    items: Vec<T>,
    compare: Comparator<T>,
}

impl<T> OrderedLeaseCollection<T> {
    /// Create an empty collection ordered by `compare`
    pub fn new(compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        Self {
            items: Vec::new(),
            compare: Box::new(compare),
        }
    }

    /// Insert an item at its ordered position.
    ///
    /// Equal items keep insertion order.
    pub fn add(&mut self, item: T) {
        let pos = self
            .items
            .partition_point(|existing| (self.compare)(existing, &item) != Ordering::Greater);
        self.items.insert(pos, item);
    }

    /// Remove and return the maximum item
    pub fn remove_max(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// The minimum item, without removing it
    pub fn peek_min(&self) -> Option<&T> {
        self.items.first()
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Scan every item for the first one matching `predicate`.
    ///
    /// Linear because callers search by properties the ordering knows nothing
    /// about.
    pub fn find_linear(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| predicate(item))
    }

    /// Iterate in ascending order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Restore ordering after an item changed its sort key.
    ///
    /// Insertion sort: a single moved item costs one pass.
    pub fn notify_changed(&mut self) {
        for i in 1..self.items.len() {
            let mut j = i;
            while j > 0 && (self.compare)(&self.items[j - 1], &self.items[j]) == Ordering::Greater
            {
                self.items.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}

impl<T: Clone> OrderedLeaseCollection<T> {
    /// Ordered copy of the current items, safe to use after the owning lock
    /// is released
    pub fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for OrderedLeaseCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Item {
        token: u32,
        load: Arc<AtomicU32>,
    }

    impl Item {
        fn new(token: u32, load: u32) -> Self {
            Self {
                token,
                load: Arc::new(AtomicU32::new(load)),
            }
        }

        fn load(&self) -> u32 {
            self.load.load(AtomicOrdering::SeqCst)
        }

        fn set_load(&self, load: u32) {
            self.load.store(load, AtomicOrdering::SeqCst);
        }
    }

    fn by_load_then_token() -> OrderedLeaseCollection<Item> {
        OrderedLeaseCollection::new(|a: &Item, b: &Item| {
            (a.load(), a.token).cmp(&(b.load(), b.token))
        })
    }

    fn tokens(collection: &OrderedLeaseCollection<Item>) -> Vec<u32> {
        collection.iter().map(|item| item.token).collect()
    }

    #[test]
    fn test_add_keeps_order() {
        let mut collection = by_load_then_token();
        collection.add(Item::new(3, 1));
        collection.add(Item::new(1, 2));
        collection.add(Item::new(2, 0));

        assert_eq!(tokens(&collection), vec![2, 3, 1]);
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn test_peek_min_and_remove_max() {
        let mut collection = by_load_then_token();
        assert!(collection.peek_min().is_none());
        assert!(collection.remove_max().is_none());

        collection.add(Item::new(1, 5));
        collection.add(Item::new(2, 0));
        collection.add(Item::new(3, 0));

        assert_eq!(collection.peek_min().map(|i| i.token), Some(2));
        assert_eq!(collection.remove_max().map(|i| i.token), Some(1));
        // Tie on load resolves by token
        assert_eq!(collection.remove_max().map(|i| i.token), Some(3));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_notify_changed_reorders() {
        let mut collection = by_load_then_token();
        let a = Item::new(1, 0);
        let b = Item::new(2, 0);
        let c = Item::new(3, 0);
        collection.add(a.clone());
        collection.add(b.clone());
        collection.add(c.clone());

        a.set_load(2);
        collection.notify_changed();
        assert_eq!(tokens(&collection), vec![2, 3, 1]);

        c.set_load(1);
        b.set_load(3);
        collection.notify_changed();
        assert_eq!(tokens(&collection), vec![3, 1, 2]);
    }

    #[test]
    fn test_without_notify_order_is_stale() {
        let mut collection = by_load_then_token();
        let a = Item::new(1, 0);
        collection.add(a.clone());
        collection.add(Item::new(2, 0));

        a.set_load(4);
        assert_eq!(collection.peek_min().map(|i| i.token), Some(1));

        collection.notify_changed();
        assert_eq!(collection.peek_min().map(|i| i.token), Some(2));
    }

    #[test]
    fn test_find_linear_ignores_order() {
        let mut collection = by_load_then_token();
        collection.add(Item::new(10, 3));
        collection.add(Item::new(20, 1));
        collection.add(Item::new(30, 2));

        let found = collection.find_linear(|item| item.token == 10);
        assert_eq!(found.map(|i| i.load()), Some(3));
        assert!(collection.find_linear(|item| item.token == 99).is_none());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut collection = by_load_then_token();
        collection.add(Item::new(1, 0));
        collection.add(Item::new(2, 1));

        let snapshot = collection.snapshot();
        collection.remove_max();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].token, 1);
        assert_eq!(snapshot[1].token, 2);
        assert_eq!(collection.len(), 1);
    }
}
