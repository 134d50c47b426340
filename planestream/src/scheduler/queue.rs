//! Priority queue for intercepted tile jobs.
//!
//! Jobs are ordered by priority (higher values first), then by enqueue
//! sequence (FIFO within the same band). The sequence counter is owned by
//! the queue, not a global, so independent engine instances never share
//! state.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::render::TileRequest;

use super::job::Priority;

/// A tile job waiting for a dispatch slot.
#[derive(Debug, Clone)]
pub struct TileJob {
    /// The intercepted request.
    pub request: TileRequest,
    /// Scheduling priority.
    pub priority: Priority,
    /// Enqueue sequence for FIFO ordering within a band.
    sequence: u64,
    /// When the job was enqueued.
    pub enqueued_at: Instant,
}

impl TileJob {
    /// Sequence number assigned at enqueue time.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// How long this job has been waiting.
    pub fn wait_time(&self) -> std::time::Duration {
        self.enqueued_at.elapsed()
    }
}

impl PartialEq for TileJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for TileJob {}

impl PartialOrd for TileJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TileJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first; within a band, lower sequence
        // (older) first.
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// Priority queue of pending tile jobs.
///
/// Not thread-safe; the scheduler wraps it in a mutex.
#[derive(Debug, Default)]
pub struct JobQueue {
    heap: BinaryHeap<TileJob>,
    next_sequence: u64,
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a request at a priority, returning its sequence number.
    pub fn enqueue(&mut self, request: TileRequest, priority: Priority) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(TileJob {
            request,
            priority,
            sequence,
            enqueued_at: Instant::now(),
        });
        sequence
    }

    /// Remove and return the highest-priority job.
    pub fn pop(&mut self) -> Option<TileJob> {
        self.heap.pop()
    }

    /// Highest-priority job without removing it.
    pub fn peek(&self) -> Option<&TileJob> {
        self.heap.peek()
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every pending job.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Keep only jobs satisfying the predicate; returns how many were
    /// removed.
    pub fn retain(&mut self, keep: impl Fn(&TileJob) -> bool) -> usize {
        let before = self.heap.len();
        let remaining: Vec<_> = self.heap.drain().filter(|j| keep(j)).collect();
        let removed = before - remaining.len();
        self.heap = BinaryHeap::from(remaining);
        removed
    }

    /// Recompute every job's priority, preserving sequence numbers.
    pub fn reprioritize(&mut self, priority_of: impl Fn(&TileRequest) -> Priority) {
        let jobs: Vec<_> = self
            .heap
            .drain()
            .map(|mut job| {
                job.priority = priority_of(&job.request);
                job
            })
            .collect();
        self.heap = BinaryHeap::from(jobs);
    }

    /// Enforce the queue cap by dropping lowest-priority tail entries.
    ///
    /// The job with sequence `protect` (the one just submitted) is never a
    /// victim. Returns how many jobs were dropped.
    pub fn enforce_cap(&mut self, cap: usize, protect: u64) -> usize {
        if self.heap.len() <= cap {
            return 0;
        }

        let mut jobs: Vec<_> = self.heap.drain().collect();
        // Best first: priority descending, then sequence ascending.
        jobs.sort_by(|a, b| b.cmp(a));

        let mut dropped = 0;
        while jobs.len() > cap {
            // Drop from the tail, skipping the protected job.
            let victim = jobs
                .iter()
                .rposition(|j| j.sequence != protect)
                .unwrap_or(jobs.len() - 1);
            jobs.remove(victim);
            dropped += 1;
        }

        self.heap = BinaryHeap::from(jobs);
        dropped
    }

    /// Iterate over pending jobs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &TileJob> {
        self.heap.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> TileRequest {
        TileRequest::new(url, 0, None, None)
    }

    #[test]
    fn test_priority_ordering() {
        let mut queue = JobQueue::new();
        queue.enqueue(request("background"), Priority::BACKGROUND);
        queue.enqueue(request("viewport"), Priority::VIEWPORT);
        queue.enqueue(request("neighbor"), Priority::NEIGHBOR);

        assert_eq!(queue.pop().unwrap().request.url, "viewport");
        assert_eq!(queue.pop().unwrap().request.url, "neighbor");
        assert_eq!(queue.pop().unwrap().request.url, "background");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_band() {
        let mut queue = JobQueue::new();
        queue.enqueue(request("first"), Priority::NEIGHBOR);
        queue.enqueue(request("second"), Priority::NEIGHBOR);
        queue.enqueue(request("third"), Priority::NEIGHBOR);

        assert_eq!(queue.pop().unwrap().request.url, "first");
        assert_eq!(queue.pop().unwrap().request.url, "second");
        assert_eq!(queue.pop().unwrap().request.url, "third");
    }

    #[test]
    fn test_mixed_bands_and_fifo() {
        let mut queue = JobQueue::new();
        queue.enqueue(request("bg1"), Priority::BACKGROUND);
        queue.enqueue(request("vp1"), Priority::VIEWPORT);
        queue.enqueue(request("bg2"), Priority::BACKGROUND);
        queue.enqueue(request("vp2"), Priority::VIEWPORT);

        assert_eq!(queue.pop().unwrap().request.url, "vp1");
        assert_eq!(queue.pop().unwrap().request.url, "vp2");
        assert_eq!(queue.pop().unwrap().request.url, "bg1");
        assert_eq!(queue.pop().unwrap().request.url, "bg2");
    }

    #[test]
    fn test_dequeue_order_non_increasing() {
        let mut queue = JobQueue::new();
        for i in 0..20 {
            let priority = match i % 3 {
                0 => Priority::VIEWPORT,
                1 => Priority::NEIGHBOR,
                _ => Priority::BACKGROUND,
            };
            queue.enqueue(request(&format!("job{i}")), priority);
        }

        let mut last: Option<(Priority, u64)> = None;
        while let Some(job) = queue.pop() {
            if let Some((prev_priority, prev_seq)) = last {
                assert!(
                    job.priority < prev_priority
                        || (job.priority == prev_priority && job.sequence() > prev_seq),
                    "dequeue order violated"
                );
            }
            last = Some((job.priority, job.sequence()));
        }
    }

    #[test]
    fn test_retain_removes_matching() {
        let mut queue = JobQueue::new();
        queue.enqueue(request("keep1"), Priority::VIEWPORT);
        queue.enqueue(request("drop1"), Priority::BACKGROUND);
        queue.enqueue(request("keep2"), Priority::NEIGHBOR);
        queue.enqueue(request("drop2"), Priority::BACKGROUND);

        let removed = queue.retain(|j| j.priority > Priority::BACKGROUND);
        assert_eq!(removed, 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_reprioritize_preserves_sequence() {
        let mut queue = JobQueue::new();
        let s1 = queue.enqueue(request("a"), Priority::BACKGROUND);
        let s2 = queue.enqueue(request("b"), Priority::BACKGROUND);

        // Promote everything; FIFO order must still hold by sequence
        queue.reprioritize(|_| Priority::VIEWPORT);

        let first = queue.pop().unwrap();
        let second = queue.pop().unwrap();
        assert_eq!(first.sequence(), s1);
        assert_eq!(second.sequence(), s2);
        assert_eq!(first.priority, Priority::VIEWPORT);
    }

    #[test]
    fn test_enforce_cap_drops_lowest_tail() {
        let mut queue = JobQueue::new();
        queue.enqueue(request("vp"), Priority::VIEWPORT);
        queue.enqueue(request("bg1"), Priority::BACKGROUND);
        queue.enqueue(request("bg2"), Priority::BACKGROUND);
        let new_seq = queue.enqueue(request("new"), Priority::NEIGHBOR);

        let dropped = queue.enforce_cap(2, new_seq);
        assert_eq!(dropped, 2);
        assert_eq!(queue.len(), 2);

        // The two background jobs are gone; viewport and the new job remain
        assert_eq!(queue.pop().unwrap().request.url, "vp");
        assert_eq!(queue.pop().unwrap().request.url, "new");
    }

    #[test]
    fn test_enforce_cap_never_drops_protected_job() {
        let mut queue = JobQueue::new();
        queue.enqueue(request("vp1"), Priority::VIEWPORT);
        queue.enqueue(request("vp2"), Priority::VIEWPORT);
        // The newest job is also the lowest priority
        let new_seq = queue.enqueue(request("new-bg"), Priority::BACKGROUND);

        let dropped = queue.enforce_cap(2, new_seq);
        assert_eq!(dropped, 1);

        let urls: Vec<_> = queue.iter().map(|j| j.request.url.clone()).collect();
        assert!(urls.contains(&"new-bg".to_string()));
    }

    #[test]
    fn test_enforce_cap_noop_under_cap() {
        let mut queue = JobQueue::new();
        let seq = queue.enqueue(request("only"), Priority::VIEWPORT);
        assert_eq!(queue.enforce_cap(10, seq), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_queue_length_never_exceeds_cap() {
        let mut queue = JobQueue::new();
        for i in 0..100 {
            let seq = queue.enqueue(request(&format!("job{i}")), Priority::BACKGROUND);
            queue.enforce_cap(16, seq);
            assert!(queue.len() <= 16, "cap exceeded after admission {i}");
        }
    }

    #[test]
    fn test_clear() {
        let mut queue = JobQueue::new();
        queue.enqueue(request("a"), Priority::VIEWPORT);
        queue.enqueue(request("b"), Priority::NEIGHBOR);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut queue = JobQueue::new();
        queue.enqueue(request("a"), Priority::VIEWPORT);
        assert_eq!(queue.peek().unwrap().request.url, "a");
        assert_eq!(queue.len(), 1);
    }
}
