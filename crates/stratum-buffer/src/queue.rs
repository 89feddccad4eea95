//! Recency queue for page eviction.

use std::collections::HashMap;
use std::hash::Hash;

/// A slot in the queue's node slab.
#[derive(Debug)]
struct Node<K> {
    key: K,
    /// Toward the most recently touched end.
    prev: Option<usize>,
    /// Toward the least recently touched end.
    next: Option<usize>,
}

/// Doubly linked recency list with O(1) touch, removal and eviction.
///
/// Every access re-splices the key to the front; eviction takes from the
/// back, so victims come out least-recently-touched first.
#[derive(Debug)]
pub struct FloatingQueue<K> {
    /// Node slab; `None` slots are on the free list.
    nodes: Vec<Option<Node<K>>>,
    /// Reusable slab slots.
    free: Vec<usize>,
    /// Key to slab slot.
    index: HashMap<K, usize>,
    /// Most recently touched.
    head: Option<usize>,
    /// Least recently touched.
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone> Default for FloatingQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone> FloatingQueue<K> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    /// Number of queued keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Checks membership without touching.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Adds `key` at the front, or moves it there if already queued.
    pub fn enqueue_or_tag(&mut self, key: K) {
        if let Some(&slot) = self.index.get(&key) {
            self.unlink(slot);
            self.push_front(slot);
            return;
        }

        let node = Node {
            key: key.clone(),
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.push_front(slot);
    }

    /// Removes and returns the least recently touched key.
    pub fn dequeue(&mut self) -> Option<K> {
        let slot = self.tail?;
        self.unlink(slot);
        let node = self.nodes[slot].take()?;
        self.free.push(slot);
        self.index.remove(&node.key);
        Some(node.key)
    }

    /// Returns the least recently touched key without removing it.
    pub fn peek(&self) -> Option<&K> {
        self.tail
            .and_then(|slot| self.nodes[slot].as_ref())
            .map(|node| &node.key)
    }

    /// Removes `key`; returns false if it was not queued.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(slot) => {
                self.unlink(slot);
                self.nodes[slot] = None;
                self.free.push(slot);
                true
            }
            None => false,
        }
    }

    /// Removes every key matching `predicate`.
    pub fn remove_where<F: Fn(&K) -> bool>(&mut self, predicate: F) -> usize {
        let doomed: Vec<K> = self
            .index
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    /// Keys from least to most recently touched.
    pub fn iter_lru(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.tail;
        std::iter::from_fn(move || {
            let node = self.nodes[cursor?].as_ref()?;
            cursor = node.prev;
            Some(&node.key)
        })
    }

    fn push_front(&mut self, slot: usize) {
        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = None;
            node.next = self.head;
        }
        if let Some(old_head) = self.head {
            if let Some(node) = self.nodes[old_head].as_mut() {
                node.prev = Some(slot);
            }
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.nodes[slot].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(node) = self.nodes[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.nodes[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_evicts_in_touch_order() {
        let mut queue = FloatingQueue::new();
        for i in 0..4 {
            queue.enqueue_or_tag(i);
        }
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.dequeue(), Some(0));
        assert_eq!(queue.dequeue(), Some(1));
    }

    #[test]
    fn test_queue_retouch_moves_to_front() {
        let mut queue = FloatingQueue::new();
        for i in 0..3 {
            queue.enqueue_or_tag(i);
        }
        queue.enqueue_or_tag(0);
        assert_eq!(queue.iter_lru().copied().collect::<Vec<_>>(), vec![1, 2, 0]);
        assert_eq!(queue.peek(), Some(&1));
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(0));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_remove_and_reuse() {
        let mut queue = FloatingQueue::new();
        queue.enqueue_or_tag("a");
        queue.enqueue_or_tag("b");
        queue.enqueue_or_tag("c");
        assert!(queue.remove(&"b"));
        assert!(!queue.remove(&"b"));
        queue.enqueue_or_tag("d");
        assert_eq!(queue.iter_lru().copied().collect::<Vec<_>>(), vec!["a", "c", "d"]);
        assert!(!queue.contains(&"b"));
    }

    #[test]
    fn test_queue_remove_where() {
        let mut queue = FloatingQueue::new();
        for i in 0..10 {
            queue.enqueue_or_tag(i);
        }
        assert_eq!(queue.remove_where(|k| k % 2 == 0), 5);
        assert_eq!(
            queue.iter_lru().copied().collect::<Vec<_>>(),
            vec![1, 3, 5, 7, 9]
        );
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_queue_single_element() {
        let mut queue = FloatingQueue::new();
        queue.enqueue_or_tag(7);
        queue.enqueue_or_tag(7);
        assert_eq!(queue.len(), 1);
        assert!(queue.remove(&7));
        assert!(queue.is_empty());
        queue.enqueue_or_tag(8);
        assert_eq!(queue.dequeue(), Some(8));
    }
}
