//! Lock-free, append-only counter chains
//!
//! A chain is a singly linked list of [`CounterNode`]s, one per distinct
//! content hash, living in one `(minute, partition)` slot of a cube.
//!
//! - Nodes are linked with a single compare-and-swap on the tail's `next`
//!   pointer and are never unlinked, relinked or freed while the chain lives.
//! - A node's count is its only mutable field and is updated with one
//!   atomic add, so concurrent increments of the same event never lose
//!   updates.
//! - Readers walk the list without locks. Because nothing is reclaimed
//!   before the chain is dropped (which needs `&mut self`), a pointer
//!   loaded from the list stays valid for as long as the chain is borrowed.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::hash::hash_encoded_event;
use crate::query::{matches_filter, Counts, Filter, GroupBy, GroupingPolicy};
use crate::types::EncodedEvent;

/// Counter for one distinct encoded event
#[derive(Debug)]
pub struct CounterNode {
    hash: u64,
    event: EncodedEvent,
    count: AtomicU64,
    next: AtomicPtr<CounterNode>,
}

impl CounterNode {
    /// Create an unlinked node, hashing the event
    pub fn new(event: EncodedEvent, count: u64) -> Self {
        let hash = hash_encoded_event(&event);
        Self::with_hash(hash, event, count)
    }

    /// Create an unlinked node with a precomputed content hash
    pub fn with_hash(hash: u64, event: EncodedEvent, count: u64) -> Self {
        Self {
            hash,
            event,
            count: AtomicU64::new(count),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Content hash identifying the event
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The encoded event this node counts
    pub fn event(&self) -> &EncodedEvent {
        &self.event
    }

    /// Current count
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Result of [`CounterChain::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The node was linked in as the new tail; carries its initial count
    Inserted(u64),
    /// An existing node with the same hash absorbed the count; carries the new total
    Incremented(u64),
}

impl Upsert {
    /// Count of the event after the operation
    pub fn count(self) -> u64 {
        match self {
            Upsert::Inserted(count) | Upsert::Incremented(count) => count,
        }
    }

    /// Whether a new node was linked
    pub fn is_inserted(self) -> bool {
        matches!(self, Upsert::Inserted(_))
    }
}

/// Head of an append-only list of counter nodes
#[derive(Debug)]
pub struct CounterChain {
    head: AtomicPtr<CounterNode>,
}

impl CounterChain {
    /// Create an empty chain
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Whether no node has been linked yet
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Insert a fresh node or add its count to the node with the same hash
    ///
    /// Walks from the head comparing content hashes. On a match the node's
    /// count is added atomically and `node` is dropped. At the tail the node
    /// is published with a CAS on the empty `next` pointer; if another writer
    /// got there first, the walk resumes at the node it linked.
    pub fn upsert(&self, mut node: Box<CounterNode>) -> Upsert {
        let delta = *node.count.get_mut();
        let mut link = &self.head;

        loop {
            let current = link.load(Ordering::Acquire);

            if current.is_null() {
                let raw = Box::into_raw(node);
                match link.compare_exchange(
                    ptr::null_mut(),
                    raw,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Upsert::Inserted(delta),
                    Err(_) => {
                        // SAFETY: the CAS failed, so `raw` was never published
                        // and we still hold the only pointer to it.
                        node = unsafe { Box::from_raw(raw) };
                        continue;
                    },
                }
            }

            // SAFETY: every non-null pointer in the chain was produced by
            // `Box::into_raw` and is only freed in `Drop`, which cannot run
            // while `self` is borrowed.
            let existing = unsafe { &*current };
            if existing.hash == node.hash {
                let previous = existing.count.fetch_add(delta, Ordering::Relaxed);
                return Upsert::Incremented(previous.wrapping_add(delta));
            }
            link = &existing.next;
        }
    }

    /// Node with the given content hash, if linked
    pub fn get(&self, hash: u64) -> Option<&CounterNode> {
        self.iter().find(|node| node.hash == hash)
    }

    /// Iterate over linked nodes in insertion order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            current: load_node(&self.head),
        }
    }

    /// Number of linked nodes
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Accumulate the counts of matching nodes into `acc`
    ///
    /// A node contributes when it passes `filter` and carries at least one
    /// of the `group_by` dimensions; its bucket is chosen by `policy`.
    pub fn scan(
        &self,
        group_by: &GroupBy,
        filter: &Filter,
        policy: GroupingPolicy,
        acc: &mut Counts,
    ) {
        for node in self.iter() {
            if !matches_filter(&node.event, filter) {
                continue;
            }
            if let Some(key) = policy.group_key(&node.event, group_by) {
                *acc.entry(key).or_insert(0) += node.count();
            }
        }
    }
}

impl Default for CounterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CounterChain {
    fn drop(&mut self) {
        // Iterative so long chains cannot overflow the stack
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            // SAFETY: `&mut self` means no reader or writer is active, and
            // each node is linked exactly once, so it is freed exactly once.
            let mut node = unsafe { Box::from_raw(current) };
            current = *node.next.get_mut();
        }
    }
}

#[inline]
fn load_node(link: &AtomicPtr<CounterNode>) -> Option<&CounterNode> {
    let ptr = link.load(Ordering::Acquire);
    // SAFETY: see `CounterChain::upsert`; linked nodes outlive the borrow
    // of the chain that `link` belongs to.
    unsafe { ptr.as_ref() }
}

/// Iterator over the nodes of a chain
pub struct Iter<'a> {
    current: Option<&'a CounterNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a CounterNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = load_node(&node.next);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DimensionId, ValueId};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    fn event(pairs: &[(u32, u32)]) -> EncodedEvent {
        pairs
            .iter()
            .map(|&(d, v)| (DimensionId(d), ValueId(v)))
            .collect()
    }

    fn node(pairs: &[(u32, u32)], count: u64) -> Box<CounterNode> {
        Box::new(CounterNode::new(event(pairs), count))
    }

    #[test]
    fn test_insert_then_increment() {
        let chain = CounterChain::new();
        assert!(chain.is_empty());

        assert_eq!(chain.upsert(node(&[(0, 0)], 2)), Upsert::Inserted(2));
        assert_eq!(chain.upsert(node(&[(0, 0)], 3)), Upsert::Incremented(5));
        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
    }

    #[test]
    fn test_distinct_events_get_distinct_nodes() {
        let chain = CounterChain::new();
        chain.upsert(node(&[(0, 0)], 1));
        chain.upsert(node(&[(0, 1)], 1));
        chain.upsert(node(&[(1, 0)], 1));
        chain.upsert(node(&[(0, 1)], 4));

        assert_eq!(chain.len(), 3);
        let hash = hash_encoded_event(&event(&[(0, 1)]));
        assert_eq!(chain.get(hash).map(CounterNode::count), Some(5));
        assert!(chain.get(0).is_none());
    }

    #[test]
    fn test_iteration_is_insertion_order() {
        let chain = CounterChain::new();
        for d in 0..5 {
            chain.upsert(node(&[(d, 0)], u64::from(d)));
        }
        let counts: Vec<u64> = chain.iter().map(CounterNode::count).collect();
        assert_eq!(counts, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_scan_filters_and_groups() {
        let chain = CounterChain::new();
        chain.upsert(node(&[(0, 0), (1, 0)], 2));
        chain.upsert(node(&[(0, 1), (1, 0)], 3));
        chain.upsert(node(&[(0, 1), (1, 1)], 7));
        chain.upsert(node(&[(1, 1)], 11));

        let group_by: GroupBy = [DimensionId(0)].into_iter().collect();
        let mut filter = Filter::new();
        filter.insert(DimensionId(1), [ValueId(0)].into_iter().collect());

        let mut acc = HashMap::new();
        chain.scan(&group_by, &filter, GroupingPolicy::Value, &mut acc);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.values().sum::<u64>(), 5);

        let mut acc = HashMap::new();
        chain.scan(&group_by, &Filter::new(), GroupingPolicy::Presence, &mut acc);
        // The node without dimension 0 contributes nowhere
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.values().sum::<u64>(), 12);
    }

    #[test]
    fn test_scan_accumulates_into_existing_buckets() {
        let chain = CounterChain::new();
        chain.upsert(node(&[(0, 0)], 4));

        let group_by: GroupBy = [DimensionId(0)].into_iter().collect();
        let key = GroupingPolicy::Value
            .group_key(&event(&[(0, 0)]), &group_by)
            .unwrap();
        let mut acc = HashMap::from([(key, 10)]);
        chain.scan(&group_by, &Filter::new(), GroupingPolicy::Value, &mut acc);
        assert_eq!(acc[&key], 14);
    }

    #[test]
    fn test_concurrent_increments_lose_nothing() {
        let chain = Arc::new(CounterChain::new());
        let threads = 8;
        let per_thread = 1_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let chain = Arc::clone(&chain);
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        chain.upsert(node(&[(0, 0), (1, 1)], 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(chain.len(), 1);
        assert_eq!(
            chain.iter().next().map(CounterNode::count),
            Some(threads * per_thread)
        );
    }

    #[test]
    fn test_concurrent_inserts_keep_hashes_unique() {
        let chain = Arc::new(CounterChain::new());

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let chain = Arc::clone(&chain);
                thread::spawn(move || {
                    for i in 0..50u32 {
                        // Every thread races to create the same 50 events
                        chain.upsert(node(&[(0, i)], t + 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(chain.len(), 50);
        let mut hashes: Vec<u64> = chain.iter().map(CounterNode::hash).collect();
        hashes.sort_unstable();
        hashes.dedup();
        assert_eq!(hashes.len(), 50);
        // 1 + 2 + ... + 8 from each thread, per event
        assert!(chain.iter().all(|n| n.count() == 36));
    }

    #[test]
    fn test_drop_releases_long_chain() {
        let chain = CounterChain::new();
        for i in 0..5_000u32 {
            chain.upsert(node(&[(0, i)], 1));
        }
        assert_eq!(chain.len(), 5_000);
        drop(chain);
    }
}
