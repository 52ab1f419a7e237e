//! Cooperative Scheduler
//!
//! Host-pumped task queue. Every "later" in the preloader is a task here:
//! the 250ms poll chain and the zero-delay ready notifications. The host
//! calls [`Scheduler::pop_due`] (via `Preloader::run_due`) from its own
//! timer or frame loop; nothing runs between pumps, and nothing blocks.

use std::collections::VecDeque;
use std::time::Instant;

/// Task identifier, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Timed<T> {
    id: TaskId,
    due: Instant,
    task: T,
}

/// Deadline-ordered task queue with an immediate lane
///
/// Immediate tasks run before any timed task on the next pump. Timed tasks
/// run in deadline order, FIFO among equal deadlines. Cancellation by
/// [`TaskId`] removes a task without running it.
#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    immediate: VecDeque<(TaskId, T)>,
    timed: Vec<Timed<T>>,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            immediate: VecDeque::new(),
            timed: Vec::new(),
        }
    }

    fn fresh_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Schedule a task for a deadline
    pub fn schedule_at(&mut self, due: Instant, task: T) -> TaskId {
        let id = self.fresh_id();
        self.timed.push(Timed { id, due, task });
        id
    }

    /// Schedule a task for the next pump, ahead of all timed tasks
    pub fn schedule_immediate(&mut self, task: T) -> TaskId {
        let id = self.fresh_id();
        self.immediate.push_back((id, task));
        id
    }

    /// Cancel a pending task, returning whether it was still queued
    pub fn cancel(&mut self, id: TaskId) -> bool {
        if let Some(pos) = self.immediate.iter().position(|(tid, _)| *tid == id) {
            self.immediate.remove(pos);
            return true;
        }
        if let Some(pos) = self.timed.iter().position(|t| t.id == id) {
            self.timed.swap_remove(pos);
            return true;
        }
        false
    }

    /// Pop the next runnable task: immediate lane first, then the earliest
    /// timed task with `due <= now` (FIFO among ties)
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        if let Some((_, task)) = self.immediate.pop_front() {
            return Some(task);
        }

        let mut best: Option<usize> = None;
        for (i, t) in self.timed.iter().enumerate() {
            if t.due > now {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let cur = &self.timed[b];
                    // Earlier deadline wins; scheduling order breaks ties
                    if (t.due, t.id.0) < (cur.due, cur.id.0) {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best.map(|i| self.timed.swap_remove(i).task)
    }

    /// Earliest pending timed deadline; immediate tasks are due at once and
    /// are not reported here
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timed.iter().map(|t| t.due).min()
    }

    /// Number of queued tasks in both lanes
    pub fn pending(&self) -> usize {
        self.immediate.len() + self.timed.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Whether any immediate task is waiting for the next pump
    pub fn has_immediate(&self) -> bool {
        !self.immediate.is_empty()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
