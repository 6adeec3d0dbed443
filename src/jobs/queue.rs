//! FIFO of job ids waiting for the worker.
//!
//! The queue only holds ids. A job can leave the registry while its id is
//! still queued; callers discard such ids explicitly, and the worker treats an
//! id that no longer resolves as a no-op.

use crate::jobs::model::JobId;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct WorkQueue {
    ids: VecDeque<JobId>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: JobId) {
        self.ids.push_back(id);
    }

    pub fn pop(&mut self) -> Option<JobId> {
        self.ids.pop_front()
    }

    /// 1-based rank of `id`, or `None` if it isn't queued.
    pub fn position(&self, id: &JobId) -> Option<usize> {
        self.ids.iter().position(|queued| queued == id).map(|idx| idx + 1)
    }

    /// Drop the given ids, keeping the order of the rest.
    pub fn discard<'a>(&mut self, gone: impl IntoIterator<Item = &'a JobId>) -> usize {
        let gone: HashSet<&JobId> = gone.into_iter().collect();
        if gone.is_empty() {
            return 0;
        }
        let before = self.ids.len();
        self.ids.retain(|id| !gone.contains(id));
        before - self.ids.len()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_and_positions() {
        let mut queue = WorkQueue::new();
        for name in ["a", "b", "c"] {
            queue.push(JobId::from(name));
        }

        assert_eq!(queue.position(&JobId::from("c")), Some(3));
        assert_eq!(queue.pop(), Some(JobId::from("a")));
        assert_eq!(queue.position(&JobId::from("c")), Some(2));
        assert_eq!(queue.position(&JobId::from("a")), None);
    }

    #[test]
    fn test_discard_keeps_remaining_order() {
        let mut queue = WorkQueue::new();
        for name in ["a", "b", "c", "d"] {
            queue.push(JobId::from(name));
        }

        let gone = [JobId::from("b"), JobId::from("zzz")];
        assert_eq!(queue.discard(gone.iter()), 1);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(JobId::from("a")));
        assert_eq!(queue.pop(), Some(JobId::from("c")));
        assert_eq!(queue.pop(), Some(JobId::from("d")));
        assert!(queue.is_empty());
    }
}
