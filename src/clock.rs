//! Clock & Timer Service (§4.3): a single min-heap of deadlines shared by
//! every per-sequence retransmit timer, avoiding one OS timer per inflight
//! packet. Cancellation does not touch the heap directly (binary heaps
//! don't support efficient arbitrary removal) -- instead each scheduled
//! entry carries a generation, and `cancel` simply bumps the generation
//! stored in a side table so a stale heap entry is recognized and skipped
//! when it is eventually popped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use crate::seq::{modular_cmp, SeqNum};

/// Wall-clock milliseconds since an arbitrary fixed epoch, used as the
/// `ts_ms` field on the wire. Monotonic within a process.
pub fn now_ms(epoch: Instant) -> u32 {
    Instant::now().duration_since(epoch).as_millis() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry<K> {
    deadline: Instant,
    generation: u64,
    key: K,
}

impl<K: Eq + Copy + Into<SeqNum>> Ord for HeapEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest deadline
        // first, and -- on a tie -- the lowest sequence number first (§4.2's
        // tie-break), compared modularly since keys are 16-bit sequence
        // numbers that wrap.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| modular_cmp(other.key.into(), self.key.into()))
    }
}

impl<K: Eq + Copy + Into<SeqNum>> PartialOrd for HeapEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A single-heap timer service keyed by `K` (a sequence number in
/// practice). Only one timer may be outstanding per key at a time;
/// scheduling a new deadline for an already-scheduled key implicitly
/// cancels the old one by advancing its generation.
#[derive(Debug)]
pub struct TimerWheel<K> {
    heap: BinaryHeap<HeapEntry<K>>,
    generations: HashMap<K, u64>,
}

impl<K: std::hash::Hash + Eq + Clone> Default for TimerWheel<K> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            generations: HashMap::new(),
        }
    }
}

impl<K: std::hash::Hash + Eq + Clone> TimerWheel<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `key` to fire after `delay`.
    pub fn schedule(&mut self, key: K, delay: Duration) {
        let generation = self.generations.entry(key.clone()).or_insert(0);
        *generation += 1;
        let generation = *generation;
        self.heap.push(HeapEntry {
            deadline: Instant::now() + delay,
            generation,
            key,
        });
    }

    /// Cancel any outstanding timer for `key`. The stale heap entry (if
    /// any) is left in place and discarded lazily by `poll_expired`.
    pub fn cancel(&mut self, key: &K) {
        self.generations.remove(key);
    }

    /// Pop every entry whose deadline has passed and is still live (its
    /// generation matches what `schedule` last recorded). Cancelled or
    /// superseded entries are dropped silently.
    pub fn poll_expired(&mut self, now: Instant) -> Vec<K> {
        let mut fired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry must pop");
            match self.generations.get(&entry.key) {
                Some(&g) if g == entry.generation => {
                    self.generations.remove(&entry.key);
                    fired.push(entry.key);
                }
                _ => continue, // stale: cancelled or superseded by a later schedule()
            }
        }
        fired
    }

    /// Duration until the next live deadline, if any timer is armed.
    /// Used by the recv loop to bound its idle-tick wait.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap
            .iter()
            .filter(|e| self.generations.get(&e.key) == Some(&e.generation))
            .map(|e| e.deadline)
            .min()
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.generations.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.generations.len()
    }
}
