// src/dag/ready_queue.rs

//! Ordered set of tasks waiting for an execution slot.
//!
//! Pops in descending priority, ties broken by ascending registration
//! index, so dispatch order is reproducible.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::types::{Priority, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadyEntry {
    priority: Priority,
    registration: usize,
    id: TaskId,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.registration.cmp(&self.registration))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct ReadyQueue {
    heap: BinaryHeap<ReadyEntry>,
    /// Ids currently queued. Heap entries not in here were removed and are
    /// skipped on pop.
    queued: HashSet<TaskId>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task. Returns `false` if it was already queued.
    pub fn push(&mut self, id: TaskId, priority: Priority, registration: usize) -> bool {
        if !self.queued.insert(id.clone()) {
            return false;
        }
        self.heap.push(ReadyEntry {
            priority,
            registration,
            id,
        });
        true
    }

    pub fn pop(&mut self) -> Option<TaskId> {
        while let Some(entry) = self.heap.pop() {
            if self.queued.remove(&entry.id) {
                return Some(entry.id);
            }
        }
        None
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.queued.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.queued.contains(id)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.queued.clear();
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}
