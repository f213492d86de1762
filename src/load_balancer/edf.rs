//! Earliest Deadline First scheduler.
//!
//! Weighted round robin: every entry carries a deadline, `next()` serves the
//! smallest one and pushes it back by `1/weight`. Over a long window each
//! entry is served in proportion to its weight, and equal weights degrade to
//! plain round robin in insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use parking_lot::Mutex;

struct EdfEntry<T> {
    item: T,
    weight: u32,
    /// Times this entry has been served.
    picks: u64,
    /// Insertion position, breaks deadline ties.
    order: usize,
    deadline: f64,
}

impl<T> EdfEntry<T> {
    fn new(item: T, weight: u32, order: usize) -> Self {
        Self {
            item,
            weight,
            picks: 0,
            order,
            deadline: 1.0 / f64::from(weight),
        }
    }

    // Derived from the pick count so rounding error never accumulates.
    fn advance(&mut self) {
        self.picks += 1;
        self.deadline = (self.picks + 1) as f64 / f64::from(self.weight);
    }
}

// BinaryHeap is a max-heap: the earliest deadline must compare greatest.
impl<T> Ord for EdfEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .total_cmp(&self.deadline)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl<T> PartialOrd for EdfEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for EdfEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for EdfEntry<T> {}

struct EdfState<T> {
    queue: BinaryHeap<EdfEntry<T>>,
    added: usize,
    total_weight: u64,
}

/// Weighted round robin scheduler.
///
/// Safe to share: `add` and `next` serialize on an internal mutex.
pub struct EdfScheduler<T> {
    state: Mutex<EdfState<T>>,
}

impl<T: Clone> EdfScheduler<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EdfState {
                queue: BinaryHeap::new(),
                added: 0,
                total_weight: 0,
            }),
        }
    }

    /// Admit an item with the given weight.
    ///
    /// A zero weight cannot be scheduled and is admitted as weight 1.
    pub fn add(&self, item: T, weight: u32) {
        let weight = if weight == 0 {
            tracing::warn!("EDF entry added with zero weight, treating as 1");
            1
        } else {
            weight
        };

        let mut state = self.state.lock();
        let order = state.added;
        state.added += 1;
        state.total_weight += u64::from(weight);
        state.queue.push(EdfEntry::new(item, weight, order));
    }

    /// Serve the entry with the earliest deadline and reschedule it.
    ///
    /// Returns `None` only when the scheduler is empty.
    pub fn next(&self) -> Option<T> {
        let mut state = self.state.lock();
        let mut entry = state.queue.peek_mut()?;
        let item = entry.item.clone();
        entry.advance();
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of admitted weights: the number of picks in one full cycle, in
    /// which every entry is served at least once.
    pub fn total_weight(&self) -> u64 {
        self.state.lock().total_weight
    }
}

impl<T: Clone> Default for EdfScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EdfScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdfScheduler")
            .field("entries", &self.state.lock().queue.len())
            .finish()
    }
}
